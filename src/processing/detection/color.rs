use super::RegionDetector;
use crate::models::{DetectionConfig, DetectorKind, RegionCandidate};
use crate::processing::geometry;
use crate::processing::image::ImageProcessor;
use crate::utils::ExtractionError;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::geometry::contour_area;
use imageproc::morphology::close;
use log::debug;

/// Finds the document by its printed background colour.
pub struct ColorMaskDetector {
    config: DetectionConfig,
}

impl ColorMaskDetector {
    pub fn new(config: DetectionConfig) -> Self {
        ColorMaskDetector { config }
    }

    pub fn mask(&self, image: &DynamicImage) -> GrayImage {
        let rgb = image.to_rgb8();
        let mut mask = GrayImage::new(rgb.width(), rgb.height());

        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (h, s, v) = ImageProcessor::rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
            if self
                .config
                .document_colours
                .iter()
                .any(|range| range.contains(h, s, v))
            {
                mask.put_pixel(x, y, Luma([255]));
            }
        }

        close(&mask, Norm::LInf, self.config.closing_radius)
    }
}

impl RegionDetector for ColorMaskDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::ColorMask
    }

    fn detect(&self, image: &DynamicImage) -> Result<Vec<RegionCandidate>, ExtractionError> {
        if self.config.document_colours.is_empty() {
            return Ok(Vec::new());
        }

        let mask = self.mask(image);
        let (width, height) = mask.dimensions();

        let contours = find_contours::<i32>(&mask);
        let largest = contours
            .iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .map(|c| (contour_area(&c.points).abs(), c))
            .max_by(|a, b| a.0.total_cmp(&b.0));

        let Some((_, contour)) = largest else {
            return Ok(Vec::new());
        };

        let vertices = geometry::approximate_vertex_count(&contour.points, self.config.polygon_epsilon);
        let Some(raw) = geometry::candidate_from_contour(
            &contour.points,
            vertices,
            false,
            width,
            height,
            self.config.border_margin,
            DetectorKind::ColorMask,
        ) else {
            return Ok(Vec::new());
        };

        let padded = geometry::pad_quad(raw.corners, self.config.colour_padding, width, height);
        let candidate = geometry::candidate_from_corners(
            padded,
            raw.vertex_count,
            false,
            raw.touches_border,
            width,
            height,
            DetectorKind::ColorMask,
        );

        let aspect_ok = candidate.aspect_ratio >= self.config.colour_aspect_min
            && candidate.aspect_ratio <= self.config.colour_aspect_max;
        if candidate.area_ratio < self.config.colour_min_area_ratio || !aspect_ok {
            debug!(
                "Colour region rejected: area ratio {:.3}, aspect {:.3}",
                candidate.area_ratio, candidate.aspect_ratio
            );
            return Ok(Vec::new());
        }

        Ok(vec![candidate])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn detector() -> ColorMaskDetector {
        ColorMaskDetector::new(DetectionConfig::default())
    }

    #[test]
    fn test_finds_pink_card_on_olive_background() {
        let mut canvas = RgbImage::from_pixel(400, 300, Rgb([70, 80, 60]));
        draw_filled_rect_mut(&mut canvas, Rect::at(50, 60).of_size(260, 164), Rgb([236, 170, 200]));
        // Printed text must not split the region.
        draw_filled_rect_mut(&mut canvas, Rect::at(120, 100).of_size(120, 12), Rgb([30, 30, 30]));

        let found = detector()
            .detect(&DynamicImage::ImageRgb8(canvas))
            .unwrap();
        assert_eq!(found.len(), 1);

        let candidate = &found[0];
        assert!((candidate.aspect_ratio - 1.585).abs() < 0.05);
        assert!(!candidate.touches_border);
        assert!(candidate.corners[0].x < 52.0 && candidate.corners[0].y < 62.0);
    }

    #[test]
    fn test_rejects_square_colour_patch() {
        let mut canvas = RgbImage::from_pixel(300, 300, Rgb([70, 80, 60]));
        draw_filled_rect_mut(&mut canvas, Rect::at(50, 50).of_size(150, 150), Rgb([236, 170, 200]));

        let found = detector()
            .detect(&DynamicImage::ImageRgb8(canvas))
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_small_patch_is_below_area_floor() {
        // Same card shape at under 1% and over 3% of the frame.
        let mut small = RgbImage::from_pixel(400, 300, Rgb([70, 80, 60]));
        draw_filled_rect_mut(&mut small, Rect::at(150, 120).of_size(40, 25), Rgb([236, 170, 200]));
        let mut larger = RgbImage::from_pixel(400, 300, Rgb([70, 80, 60]));
        draw_filled_rect_mut(&mut larger, Rect::at(150, 120).of_size(80, 50), Rgb([236, 170, 200]));

        let small_found = detector().detect(&DynamicImage::ImageRgb8(small)).unwrap();
        assert!(small_found.is_empty());

        let larger_found = detector().detect(&DynamicImage::ImageRgb8(larger)).unwrap();
        assert_eq!(larger_found.len(), 1);
        assert!(larger_found[0].area_ratio > 0.02);
    }

    #[test]
    fn test_grey_image_yields_nothing() {
        let canvas = RgbImage::from_pixel(200, 120, Rgb([128, 128, 128]));
        let found = detector()
            .detect(&DynamicImage::ImageRgb8(canvas))
            .unwrap();
        assert!(found.is_empty());
    }
}

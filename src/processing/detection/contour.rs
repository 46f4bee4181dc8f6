use super::{contrast_range, RegionDetector, MIN_CONTRAST};
use crate::models::{DetectionConfig, DetectorKind, RegionCandidate};
use crate::processing::geometry;
use crate::utils::ExtractionError;
use image::{DynamicImage, GrayImage};
use imageproc::contours::find_contours;
use imageproc::contrast::equalize_histogram;
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::close;
use log::debug;

/// Looks for the rounded inner frame of the card among edge contours.
pub struct EdgeContourDetector {
    config: DetectionConfig,
}

impl EdgeContourDetector {
    pub fn new(config: DetectionConfig) -> Self {
        EdgeContourDetector { config }
    }

    /// Union of a strict and a sensitive Canny pass, gaps closed.
    pub fn edge_map(&self, gray: &GrayImage) -> GrayImage {
        let enhanced = equalize_histogram(gray);
        let blurred = gaussian_blur_f32(&enhanced, self.config.blur_sigma);

        let strict = canny(&blurred, self.config.canny_low, self.config.canny_high);
        let mut edges = canny(
            &blurred,
            self.config.canny_sensitive_low,
            self.config.canny_sensitive_high,
        );
        for (e, s) in edges.pixels_mut().zip(strict.pixels()) {
            e[0] = e[0].max(s[0]);
        }

        close(&edges, Norm::LInf, self.config.closing_radius)
    }

    fn accepts(&self, candidate: &RegionCandidate) -> bool {
        let c = &self.config;
        if candidate.vertex_count < c.min_vertices || candidate.vertex_count > c.max_vertices {
            return false;
        }
        if candidate.area_ratio < c.contour_min_area_ratio {
            return false;
        }
        if candidate.aspect_ratio < c.contour_aspect_min || candidate.aspect_ratio > c.contour_aspect_max {
            return false;
        }
        // Border-hugging and huge: the outer card body or the photo frame.
        !(candidate.touches_border && candidate.area_ratio > c.outer_frame_area_ratio)
    }
}

impl RegionDetector for EdgeContourDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::EdgeContour
    }

    fn detect(&self, image: &DynamicImage) -> Result<Vec<RegionCandidate>, ExtractionError> {
        let gray = image.to_luma8();
        if contrast_range(&gray) < MIN_CONTRAST {
            return Err(ExtractionError::degraded("edge_contour", "image has no contrast"));
        }

        let edges = self.edge_map(&gray);
        let (width, height) = edges.dimensions();
        let min_points = ((width.min(height) as usize) / 4).max(8);

        let mut candidates = Vec::new();
        for contour in find_contours::<i32>(&edges) {
            if contour.points.len() < min_points {
                continue;
            }

            let vertices =
                geometry::approximate_vertex_count(&contour.points, self.config.polygon_epsilon);
            let Some(candidate) = geometry::candidate_from_contour(
                &contour.points,
                vertices,
                contour.parent.is_some(),
                width,
                height,
                self.config.border_margin,
                DetectorKind::EdgeContour,
            ) else {
                continue;
            };

            if self.accepts(&candidate) {
                candidates.push(candidate);
            }
        }

        debug!("Edge contours kept {} candidates", candidates.len());
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::{draw_filled_rect_mut, draw_polygon_mut};
    use imageproc::rect::Rect;
    use imageproc::point::Point;

    fn chamfered_card(width: u32, height: u32, x: i32, y: i32, w: i32, h: i32, chamfer: i32) -> GrayImage {
        let mut image = GrayImage::from_pixel(width, height, Luma([40]));
        if chamfer == 0 {
            let rect = Rect::at(x, y).of_size(w as u32, h as u32);
            draw_filled_rect_mut(&mut image, rect, Luma([220]));
            return image;
        }
        let outline = [
            Point::new(x + chamfer, y),
            Point::new(x + w - chamfer, y),
            Point::new(x + w, y + chamfer),
            Point::new(x + w, y + h - chamfer),
            Point::new(x + w - chamfer, y + h),
            Point::new(x + chamfer, y + h),
            Point::new(x, y + h - chamfer),
            Point::new(x, y + chamfer),
        ];
        draw_polygon_mut(&mut image, &outline, Luma([220]));
        image
    }

    #[test]
    fn test_rounded_frame_is_found() {
        let image = chamfered_card(400, 280, 40, 40, 320, 200, 40);
        let detector = EdgeContourDetector::new(DetectionConfig::default());

        let found = detector.detect(&DynamicImage::ImageLuma8(image)).unwrap();
        assert!(!found.is_empty());
        for candidate in &found {
            assert!((5..=8).contains(&candidate.vertex_count));
            assert!(candidate.aspect_ratio > 1.4 && candidate.aspect_ratio < 1.8);
            assert!(!candidate.touches_border);
        }
    }

    #[test]
    fn test_square_cornered_card_is_not_a_frame() {
        let image = chamfered_card(400, 280, 40, 40, 320, 200, 0);
        let detector = EdgeContourDetector::new(DetectionConfig::default());

        let found = detector.detect(&DynamicImage::ImageLuma8(image)).unwrap();
        assert!(found.is_empty());
    }

    fn frame(x: f32, y: f32, w: f32, h: f32, touches_border: bool) -> RegionCandidate {
        use crate::models::Point2;
        geometry::candidate_from_corners(
            [
                Point2::new(x, y),
                Point2::new(x + w, y),
                Point2::new(x + w, y + h),
                Point2::new(x, y + h),
            ],
            8,
            false,
            touches_border,
            400,
            280,
            DetectorKind::EdgeContour,
        )
    }

    #[test]
    fn test_border_hugging_outer_frame_is_rejected() {
        let detector = EdgeContourDetector::new(DetectionConfig::default());

        let outer = frame(0.0, 0.0, 390.0, 270.0, true);
        assert!(outer.area_ratio > 0.7);
        assert!(!detector.accepts(&outer));

        // Same outline away from the border passes every other check.
        assert!(detector.accepts(&frame(0.0, 0.0, 390.0, 270.0, false)));

        // Touching the border alone is not enough.
        let inset = frame(0.0, 0.0, 300.0, 200.0, true);
        assert!(inset.area_ratio < 0.7);
        assert!(detector.accepts(&inset));
    }

    #[test]
    fn test_flat_image_degrades() {
        let image = GrayImage::from_pixel(100, 80, Luma([90]));
        let detector = EdgeContourDetector::new(DetectionConfig::default());
        let err = detector.detect(&DynamicImage::ImageLuma8(image)).unwrap_err();
        assert!(matches!(err, ExtractionError::StageDegraded { .. }));
    }
}

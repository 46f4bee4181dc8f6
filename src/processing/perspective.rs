use crate::models::{CanonicalDocumentImage, NormalizationConfig, Point2, RegionCandidate, SourceImage};
use crate::processing::geometry;
use crate::utils::ExtractionError;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use log::{debug, warn};

/// Maps the selected quadrilateral onto a fixed-size canonical rectangle.
pub struct PerspectiveNormalizer {
    config: NormalizationConfig,
}

impl PerspectiveNormalizer {
    pub fn new(config: NormalizationConfig) -> Self {
        PerspectiveNormalizer { config }
    }

    /// Canonical pixel size for a document with landscape `aspect`;
    /// swapped when the region was photographed portrait.
    pub fn canonical_size(&self, aspect: f64, portrait: bool) -> (u32, u32) {
        let long = self.config.canonical_width;
        let short = ((long as f64 / aspect).round() as u32).max(1);
        if portrait {
            (short, long)
        } else {
            (long, short)
        }
    }

    pub fn normalize(
        &self,
        source: &SourceImage,
        candidate: &RegionCandidate,
        aspect: f64,
    ) -> Result<CanonicalDocumentImage, ExtractionError> {
        let corners = geometry::order_corners(candidate.corners);
        let (quad_width, quad_height) = geometry::quad_dimensions(&corners);
        if quad_width < 2.0 || quad_height < 2.0 {
            return Err(ExtractionError::PerspectiveError(format!(
                "Degenerate region {:.1}x{:.1}",
                quad_width, quad_height
            )));
        }

        let (out_w, out_h) = self.canonical_size(aspect, quad_height > quad_width);
        let warped = match self.warp(source.image(), &corners, out_w, out_h) {
            Some(warped) => warped,
            None => {
                warn!("Projective transform is degenerate, cropping the bounding box instead");
                self.bounding_box_crop(source.image(), &corners, out_w, out_h)?
            }
        };

        let trimmed = self.trim_background(warped);
        debug!("Normalized document to {}x{}", trimmed.width(), trimmed.height());
        Ok(CanonicalDocumentImage::new(trimmed))
    }

    fn warp(&self, image: &DynamicImage, corners: &[Point2; 4], out_w: u32, out_h: u32) -> Option<DynamicImage> {
        let src = corners.map(|p| (p.x, p.y));
        let dest = [
            (0.0, 0.0),
            (out_w as f32, 0.0),
            (out_w as f32, out_h as f32),
            (0.0, out_h as f32),
        ];
        let projection = Projection::from_control_points(src, dest)?;

        let input = image.to_rgb8();
        let mut output = RgbImage::new(out_w, out_h);
        warp_into(&input, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut output);
        Some(DynamicImage::ImageRgb8(output))
    }

    fn bounding_box_crop(
        &self,
        image: &DynamicImage,
        corners: &[Point2; 4],
        out_w: u32,
        out_h: u32,
    ) -> Result<DynamicImage, ExtractionError> {
        let max_x = image.width().saturating_sub(1) as f32;
        let max_y = image.height().saturating_sub(1) as f32;
        let left = corners.iter().map(|p| p.x).fold(f32::MAX, f32::min).clamp(0.0, max_x);
        let top = corners.iter().map(|p| p.y).fold(f32::MAX, f32::min).clamp(0.0, max_y);
        let right = corners.iter().map(|p| p.x).fold(f32::MIN, f32::max).clamp(0.0, max_x);
        let bottom = corners.iter().map(|p| p.y).fold(f32::MIN, f32::max).clamp(0.0, max_y);

        let width = (right - left).round() as u32;
        let height = (bottom - top).round() as u32;
        if width == 0 || height == 0 {
            return Err(ExtractionError::PerspectiveError(
                "Region collapses outside the image".to_string(),
            ));
        }

        Ok(image
            .crop_imm(left as u32, top as u32, width, height)
            .resize_exact(out_w, out_h, FilterType::Triangle))
    }

    /// Crops to the largest foreground contour plus a margin, then restores
    /// the canonical size. Skipped when the crop would cut into the document.
    fn trim_background(&self, warped: DynamicImage) -> DynamicImage {
        let (width, height) = (warped.width(), warped.height());
        let gray = warped.to_luma8();
        let level = otsu_level(&gray);
        let mut mask = threshold(&gray, level, ThresholdType::Binary);

        // The document fills most of the warp, so the majority class is foreground.
        let bright = mask.pixels().filter(|p| p[0] > 0).count();
        if bright * 2 < mask.pixels().len() {
            for pixel in mask.pixels_mut() {
                pixel[0] = 255 - pixel[0];
            }
        }

        let largest = find_contours::<i32>(&mask)
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer)
            .filter_map(|c| {
                let min_x = c.points.iter().map(|p| p.x).min()?;
                let max_x = c.points.iter().map(|p| p.x).max()?;
                let min_y = c.points.iter().map(|p| p.y).min()?;
                let max_y = c.points.iter().map(|p| p.y).max()?;
                Some((min_x, min_y, max_x, max_y))
            })
            .max_by_key(|(x0, y0, x1, y1)| (x1 - x0 + 1) as i64 * (y1 - y0 + 1) as i64);

        let Some((x0, y0, x1, y1)) = largest else {
            return warped;
        };

        let margin_x = ((x1 - x0) as f64 * self.config.trim_margin).round() as i32;
        let margin_y = ((y1 - y0) as f64 * self.config.trim_margin).round() as i32;
        let left = (x0 - margin_x).max(0) as u32;
        let top = (y0 - margin_y).max(0) as u32;
        let right = ((x1 + margin_x).max(0) as u32).min(width - 1);
        let bottom = ((y1 + margin_y).max(0) as u32).min(height - 1);
        let crop_w = right.saturating_sub(left) + 1;
        let crop_h = bottom.saturating_sub(top) + 1;

        let kept = (crop_w as f64 * crop_h as f64) / (width as f64 * height as f64);
        if kept < self.config.min_trim_area_ratio || (crop_w == width && crop_h == height) {
            return warped;
        }

        debug!("Trimmed residual background, kept {:.1}% of the warp", kept * 100.0);
        warped
            .crop_imm(left, top, crop_w, crop_h)
            .resize_exact(width, height, FilterType::Triangle)
    }
}

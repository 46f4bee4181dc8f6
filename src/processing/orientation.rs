use crate::models::{CanonicalDocumentImage, OrientationConfig, Rotation};
use crate::processing::ocr::TextRecognizer;
use crate::utils::ExtractionError;
use image::imageops::FilterType;
use image::GrayImage;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use log::{debug, info, warn};

/// Removes quarter-turn rotations left after perspective correction and
/// fixes the canonical size. Every step is best-effort.
pub struct OrientationCorrector {
    config: OrientationConfig,
    canonical_width: u32,
}

impl OrientationCorrector {
    pub fn new(config: OrientationConfig, canonical_width: u32) -> Self {
        OrientationCorrector {
            config,
            canonical_width,
        }
    }

    pub fn correct(
        &self,
        canonical: CanonicalDocumentImage,
        aspect: f64,
        recognizer: &dyn TextRecognizer,
    ) -> CanonicalDocumentImage {
        let mut current = canonical;

        match Self::gradient_energies(&current.image.to_luma8()) {
            Ok((horizontal, vertical)) => {
                debug!("Gradient energy: horizontal {:.2}, vertical {:.2}", horizontal, vertical);
                if horizontal > vertical * self.config.gradient_ratio {
                    info!("Gradient heuristic rotates the document by 90°");
                    current = current.rotated(Rotation::Deg90);
                }
            }
            Err(e) => warn!("Gradient heuristic skipped: {}", e),
        }

        if self.config.use_engine_detection {
            match recognizer.detect_orientation(&current.image) {
                Ok(Rotation::Deg0) => {}
                Ok(rotation) => {
                    info!("Orientation detection rotates the document by {}°", rotation.degrees());
                    current = current.rotated(rotation);
                }
                Err(e) => warn!("Orientation detection skipped: {}", e),
            }
        }

        if current.is_portrait() {
            debug!("Forcing landscape orientation");
            current = current.rotated(Rotation::Deg90);
        }

        self.crop_to_aspect(current, aspect)
    }

    /// Mean absolute Sobel response along x and along y.
    pub fn gradient_energies(gray: &GrayImage) -> Result<(f64, f64), ExtractionError> {
        if gray.width() < 3 || gray.height() < 3 {
            return Err(ExtractionError::degraded("gradient", "image too small"));
        }

        let pixels = (gray.width() as f64) * (gray.height() as f64);
        let horizontal = horizontal_sobel(gray)
            .pixels()
            .map(|p| (p[0] as f64).abs())
            .sum::<f64>()
            / pixels;
        let vertical = vertical_sobel(gray)
            .pixels()
            .map(|p| (p[0] as f64).abs())
            .sum::<f64>()
            / pixels;

        if horizontal + vertical <= f64::EPSILON {
            return Err(ExtractionError::degraded("gradient", "image has no edges"));
        }
        Ok((horizontal, vertical))
    }

    /// Centre crop to `aspect` without stretching, then resize to the canonical size.
    fn crop_to_aspect(&self, canonical: CanonicalDocumentImage, aspect: f64) -> CanonicalDocumentImage {
        let (width, height) = (canonical.width(), canonical.height());
        let (crop_w, crop_h) = if canonical.aspect_ratio() > aspect {
            (((height as f64 * aspect).round() as u32).clamp(1, width), height)
        } else {
            (width, ((width as f64 / aspect).round() as u32).clamp(1, height))
        };
        let x = (width - crop_w) / 2;
        let y = (height - crop_h) / 2;

        let target_w = self.canonical_width;
        let target_h = ((target_w as f64 / aspect).round() as u32).max(1);

        let image = canonical
            .image
            .crop_imm(x, y, crop_w, crop_h)
            .resize_exact(target_w, target_h, FilterType::Triangle);

        CanonicalDocumentImage {
            image,
            rotation: canonical.rotation,
        }
    }
}

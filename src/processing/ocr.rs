use crate::models::{FontStyle, Rotation, TuningProfile};
use crate::utils::ExtractionError;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::morphology::close;

/// The text-recognition engine boundary. Implementations must be
/// deterministic for identical input and profile.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &DynamicImage, profile: &TuningProfile) -> Result<String, ExtractionError>;

    /// Clockwise rotation that makes `image` upright.
    fn detect_orientation(&self, image: &DynamicImage) -> Result<Rotation, ExtractionError>;
}

/// Applies the preprocessing a profile asks for: upscaling, Otsu
/// binarisation with dark ink on white, and joining of dot-matrix dots.
pub fn prepare_region(image: &DynamicImage, profile: &TuningProfile) -> DynamicImage {
    let mut gray = image.to_luma8();

    if profile.scale > 1.0 {
        let width = ((gray.width() as f32) * profile.scale).round() as u32;
        let height = ((gray.height() as f32) * profile.scale).round() as u32;
        gray = image::imageops::resize(&gray, width.max(1), height.max(1), FilterType::CatmullRom);
    }

    if !profile.binarize {
        return DynamicImage::ImageLuma8(gray);
    }

    let level = otsu_level(&gray);
    let mut binary = threshold(&gray, level, ThresholdType::Binary);

    // Ink is the minority class; make it black.
    let white = binary.pixels().filter(|p| p[0] > 0).count();
    if white * 2 < binary.pixels().len() {
        invert(&mut binary);
    }

    if profile.font_style == FontStyle::DotMatrix {
        invert(&mut binary);
        binary = close(&binary, Norm::LInf, 1);
        invert(&mut binary);
    }

    DynamicImage::ImageLuma8(binary)
}

fn invert(image: &mut GrayImage) {
    for pixel in image.pixels_mut() {
        pixel[0] = 255 - pixel[0];
    }
}

/// Collapses runs of whitespace and trims.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(feature = "tesseract")]
pub use engine::TesseractRecognizer;

#[cfg(feature = "tesseract")]
mod engine {
    use super::*;
    use crate::models::PageSegmentation;
    use crate::processing::image::ImageProcessor;
    use log::debug;
    use tesseract::{PageSegMode, Tesseract};

    /// Tesseract behind the recognizer boundary. A fresh engine is created
    /// per call so the recognizer can be shared across threads.
    pub struct TesseractRecognizer {
        datapath: Option<String>,
        language: String,
    }

    impl TesseractRecognizer {
        pub fn new(datapath: Option<String>, language: &str) -> Self {
            TesseractRecognizer {
                datapath,
                language: language.to_string(),
            }
        }

        fn page_seg_mode(segmentation: PageSegmentation) -> PageSegMode {
            match segmentation {
                PageSegmentation::Auto => PageSegMode::PsmAuto,
                PageSegmentation::SingleBlock => PageSegMode::PsmSingleBlock,
                PageSegmentation::SingleLine => PageSegMode::PsmSingleLine,
                PageSegmentation::SparseText => PageSegMode::PsmSparseText,
            }
        }

        fn engine(&self, language: &str, png: &[u8]) -> Result<Tesseract, ExtractionError> {
            Tesseract::new(self.datapath.as_deref(), Some(language))
                .map_err(|e| ExtractionError::OcrError(format!("Tesseract init error: {}", e)))?
                .set_image_from_mem(png)
                .map_err(|e| ExtractionError::OcrError(format!("Tesseract set image error: {}", e)))
        }

        /// Text and mean word confidence of one full pass.
        fn run(&self, image: &DynamicImage, profile: &TuningProfile) -> Result<(String, i32), ExtractionError> {
            let prepared = prepare_region(image, profile);
            let png = ImageProcessor::encode_png(&prepared)?;

            let language = if profile.language.is_empty() {
                self.language.as_str()
            } else {
                profile.language.as_str()
            };

            let mut tess = self.engine(language, &png)?;
            if let Some(whitelist) = &profile.char_whitelist {
                tess = tess
                    .set_variable("tessedit_char_whitelist", whitelist)
                    .map_err(|e| ExtractionError::OcrError(format!("Tesseract set variable error: {}", e)))?;
            }
            tess.set_page_seg_mode(Self::page_seg_mode(profile.page_segmentation));

            let text = tess
                .get_text()
                .map_err(|e| ExtractionError::OcrError(format!("Tesseract error: {}", e)))?;
            let confidence = tess.mean_text_conf();
            Ok((text, confidence))
        }
    }

    impl TextRecognizer for TesseractRecognizer {
        fn recognize(&self, image: &DynamicImage, profile: &TuningProfile) -> Result<String, ExtractionError> {
            let (text, confidence) = self.run(image, profile)?;
            debug!("Tesseract read {} chars at confidence {}", text.len(), confidence);
            Ok(text)
        }

        // Scores every quarter turn by mean word confidence.
        fn detect_orientation(&self, image: &DynamicImage) -> Result<Rotation, ExtractionError> {
            let profile = TuningProfile::document();
            let mut best = (Rotation::Deg0, i32::MIN);

            for rotation in Rotation::ALL {
                let (_, confidence) = self.run(&rotation.apply(image), &profile)?;
                debug!("Orientation {}°: confidence {}", rotation.degrees(), confidence);
                if confidence > best.1 {
                    best = (rotation, confidence);
                }
            }

            Ok(best.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    #[test]
    fn test_prepare_region_scales_and_binarizes() {
        let mut image = RgbImage::from_pixel(40, 10, Rgb([220, 220, 220]));
        for x in 5..12 {
            for y in 2..8 {
                image.put_pixel(x, y, Rgb([30, 30, 30]));
            }
        }
        let profile = TuningProfile::for_style(FontStyle::Monospace);
        let prepared = prepare_region(&DynamicImage::ImageRgb8(image), &profile).to_luma8();

        assert_eq!(prepared.dimensions(), (80, 20));
        assert!(prepared.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert_eq!(prepared.get_pixel(0, 0), &Luma([255]));
        assert_eq!(prepared.get_pixel(16, 10), &Luma([0]));
    }

    #[test]
    fn test_dot_matrix_dots_are_joined() {
        let mut image = GrayImage::from_pixel(20, 9, Luma([240]));
        for x in (2..18).step_by(2) {
            image.put_pixel(x, 4, Luma([10]));
        }
        let mut profile = TuningProfile::for_style(FontStyle::DotMatrix);
        profile.scale = 1.0;

        let prepared = prepare_region(&DynamicImage::ImageLuma8(image), &profile).to_luma8();
        // The gap between two dots is filled.
        assert_eq!(prepared.get_pixel(3, 4), &Luma([0]));
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  MORGAN \n\t SARAH "), "MORGAN SARAH");
        assert_eq!(clean_text("\n \n"), "");
    }
}

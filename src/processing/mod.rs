pub mod detection;
pub mod extractors;
pub mod field_extractor;
pub mod font_analysis;
pub mod geometry;
pub mod image;
pub mod ocr;
pub mod orientation;
pub mod perspective;
pub mod scoring;
pub mod trials;

pub use detection::RegionLocator;
pub use extractors::PatternExtractor;
pub use field_extractor::{ProfileCache, TemplateFieldExtractor};
pub use font_analysis::FontAnalyzer;
pub use image::ImageProcessor;
pub use ocr::{prepare_region, TextRecognizer};
#[cfg(feature = "tesseract")]
pub use ocr::TesseractRecognizer;
pub use orientation::OrientationCorrector;
pub use perspective::PerspectiveNormalizer;
pub use scoring::CandidateScorer;
pub use trials::TrialController;

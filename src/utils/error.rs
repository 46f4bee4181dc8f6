use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Image processing error: {0}")]
    ImageProcessingError(String),

    #[error("No document region found in image")]
    NoRegionFound,

    #[error("Perspective error: {0}")]
    PerspectiveError(String),

    #[error("Template error: {0}")]
    TemplateError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("OCR engine error: {0}")]
    OcrError(String),

    /// An optional refinement could not run; callers skip the stage.
    #[error("Stage '{stage}' degraded: {reason}")]
    StageDegraded { stage: &'static str, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unknown document type: {0}")]
    UnknownDocumentType(String),
}

impl ExtractionError {
    pub fn degraded(stage: &'static str, reason: impl Into<String>) -> Self {
        ExtractionError::StageDegraded {
            stage,
            reason: reason.into(),
        }
    }

    /// Only a missing document region (or an unreadable photo) ends an invocation.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExtractionError::NoRegionFound | ExtractionError::ImageProcessingError(_)
        )
    }
}

impl From<image::ImageError> for ExtractionError {
    fn from(err: image::ImageError) -> Self {
        ExtractionError::ImageProcessingError(err.to_string())
    }
}

impl From<serde_json::Error> for ExtractionError {
    fn from(err: serde_json::Error) -> Self {
        ExtractionError::ConfigError(err.to_string())
    }
}

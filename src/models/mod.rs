pub mod config;
pub mod data;
pub mod document;
pub mod template;

pub use config::{
    DebugConfig, DetectionConfig, HsvRange, NormalizationConfig, OrientationConfig,
    PipelineConfig, ScoringConfig, TrialConfig,
};
pub use data::*;
pub use document::DocumentType;
pub use template::{
    ExtractionMode, FieldDefinition, FieldTemplate, FontStyle, ImageSize, NormalizedRect,
    PageSegmentation, TuningProfile,
};

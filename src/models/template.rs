use crate::models::DocumentType;
use crate::utils::ExtractionError;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

const DRIVING_LICENCE_TEMPLATE: &str = include_str!("../../templates/driving_licence.json");
const VEHICLE_REGISTRATION_TEMPLATE: &str =
    include_str!("../../templates/vehicle_registration.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    Text,
    Image,
    Both,
}

impl ExtractionMode {
    pub fn wants_text(self) -> bool {
        matches!(self, ExtractionMode::Text | ExtractionMode::Both)
    }

    pub fn wants_image(self) -> bool {
        matches!(self, ExtractionMode::Image | ExtractionMode::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontStyle {
    DotMatrix,
    Monospace,
    Standard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSegmentation {
    Auto,
    SingleBlock,
    SingleLine,
    SparseText,
}

fn default_language() -> String {
    "eng".to_string()
}

fn default_scale() -> f32 {
    1.0
}

/// Recognition settings tuned to the font of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TuningProfile {
    pub font_style: FontStyle,
    pub page_segmentation: PageSegmentation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_whitelist: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    /// Upscale factor applied to the crop before recognition.
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default)]
    pub binarize: bool,
}

impl TuningProfile {
    /// Full-page recognition of a whole canonical image.
    pub fn document() -> Self {
        TuningProfile {
            font_style: FontStyle::Standard,
            page_segmentation: PageSegmentation::Auto,
            char_whitelist: None,
            language: default_language(),
            scale: 1.0,
            binarize: false,
        }
    }

    pub fn for_style(style: FontStyle) -> Self {
        match style {
            // Dots need upscaling and joining before an engine sees strokes.
            FontStyle::DotMatrix => TuningProfile {
                font_style: style,
                page_segmentation: PageSegmentation::SingleLine,
                char_whitelist: None,
                language: default_language(),
                scale: 2.5,
                binarize: true,
            },
            FontStyle::Monospace => TuningProfile {
                font_style: style,
                page_segmentation: PageSegmentation::SingleLine,
                char_whitelist: None,
                language: default_language(),
                scale: 2.0,
                binarize: true,
            },
            FontStyle::Standard => TuningProfile {
                font_style: style,
                page_segmentation: PageSegmentation::SingleBlock,
                char_whitelist: None,
                language: default_language(),
                scale: 1.5,
                binarize: false,
            },
        }
    }
}

/// A rectangle in fractions of the canonical image size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedRect {
    pub fn is_within_unit_square(&self) -> bool {
        self.x >= 0.0
            && self.y >= 0.0
            && self.x + self.width <= 1.0 + 1e-9
            && self.y + self.height <= 1.0 + 1e-9
    }

    /// Pixel rectangle `(x, y, width, height)` clamped to `image_width × image_height`.
    /// `None` when nothing of the rectangle lies inside the image.
    pub fn to_pixels(&self, image_width: u32, image_height: u32) -> Option<(u32, u32, u32, u32)> {
        let w = image_width as f64;
        let h = image_height as f64;

        let left = (self.x * w).round().clamp(0.0, w);
        let top = (self.y * h).round().clamp(0.0, h);
        let right = ((self.x + self.width) * w).round().clamp(0.0, w);
        let bottom = ((self.y + self.height) * h).round().clamp(0.0, h);

        if right - left < 1.0 || bottom - top < 1.0 {
            return None;
        }

        Some((
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub field_id: String,
    pub label: String,
    pub normalized_card: NormalizedRect,
    pub extraction_type: ExtractionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning_profile: Option<TuningProfile>,
}

/// Ordered field layout of one document type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldTemplate {
    /// Coordinate space the fractions were authored against.
    pub image_size: ImageSize,
    pub fields: Vec<FieldDefinition>,
}

impl FieldTemplate {
    pub fn from_json_str(json: &str) -> Result<Self, ExtractionError> {
        let template: FieldTemplate = serde_json::from_str(json)
            .map_err(|e| ExtractionError::TemplateError(format!("Invalid template JSON: {}", e)))?;
        template.validate()?;
        Ok(template)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ExtractionError> {
        let json = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ExtractionError::TemplateError(format!(
                "Failed to read template {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_json_str(&json)
    }

    pub fn default_for(document_type: DocumentType) -> Result<Self, ExtractionError> {
        match document_type {
            DocumentType::DrivingLicence => Self::from_json_str(DRIVING_LICENCE_TEMPLATE),
            DocumentType::VehicleRegistration => Self::from_json_str(VEHICLE_REGISTRATION_TEMPLATE),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, ExtractionError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ExtractionError::TemplateError(format!("Failed to encode template: {}", e)))
    }

    pub fn validate(&self) -> Result<(), ExtractionError> {
        if self.fields.is_empty() {
            return Err(ExtractionError::TemplateError(
                "Template defines no fields".to_string(),
            ));
        }
        if self.image_size.width == 0 || self.image_size.height == 0 {
            return Err(ExtractionError::TemplateError(
                "Template image size must be non-zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.field_id.trim().is_empty() {
                return Err(ExtractionError::TemplateError(
                    "Field with empty id".to_string(),
                ));
            }
            if !seen.insert(field.field_id.as_str()) {
                return Err(ExtractionError::TemplateError(format!(
                    "Duplicate field id '{}'",
                    field.field_id
                )));
            }

            let rect = &field.normalized_card;
            let finite = [rect.x, rect.y, rect.width, rect.height]
                .iter()
                .all(|v| v.is_finite());
            if !finite || rect.width <= 0.0 || rect.height <= 0.0 {
                return Err(ExtractionError::TemplateError(format!(
                    "Field '{}' has an invalid rectangle",
                    field.field_id
                )));
            }
            if !rect.is_within_unit_square() {
                // Clamped when cropping.
                warn!(
                    "Field '{}' extends outside the card and will be clamped",
                    field.field_id
                );
            }
        }

        Ok(())
    }

    pub fn field(&self, field_id: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.field_id == field_id)
    }

    pub fn contains(&self, field_id: &str) -> bool {
        self.field(field_id).is_some()
    }
}

use crate::models::DocumentType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A point in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub fn new(x: f32, y: f32) -> Self {
        Point2 { x, y }
    }

    pub fn distance(&self, other: &Point2) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

/// The decoded photograph, already rotated according to its EXIF orientation.
#[derive(Debug, Clone)]
pub struct SourceImage {
    image: DynamicImage,
}

impl SourceImage {
    pub fn new(image: DynamicImage) -> Self {
        SourceImage { image }
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Which strategy proposed a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    ColorMask,
    EdgeContour,
    DominantLines,
    Fallback,
}

/// A proposed document boundary.
#[derive(Debug, Clone)]
pub struct RegionCandidate {
    /// top-left, top-right, bottom-right, bottom-left
    pub corners: [Point2; 4],
    pub area: f64,
    /// `area` relative to the image it was detected in.
    pub area_ratio: f64,
    /// Long side over short side, always >= 1.
    pub aspect_ratio: f64,
    pub vertex_count: usize,
    pub touches_border: bool,
    pub nested: bool,
    pub score: f64,
    pub source: DetectorKind,
}

impl RegionCandidate {
    /// Same candidate with its corners multiplied by `factor`.
    pub fn scaled(&self, factor: f32) -> RegionCandidate {
        let mut scaled = self.clone();
        for corner in scaled.corners.iter_mut() {
            corner.x *= factor;
            corner.y *= factor;
        }
        scaled.area = self.area * (factor as f64) * (factor as f64);
        scaled
    }
}

/// Clockwise quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub const ALL: [Rotation; 4] = [
        Rotation::Deg0,
        Rotation::Deg90,
        Rotation::Deg180,
        Rotation::Deg270,
    ];

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Nearest quarter turn, accepting negative (counter-clockwise) angles.
    pub fn from_degrees(degrees: i32) -> Rotation {
        let quarter = ((degrees as f64 / 90.0).round() as i32).rem_euclid(4);
        match quarter {
            1 => Rotation::Deg90,
            2 => Rotation::Deg180,
            3 => Rotation::Deg270,
            _ => Rotation::Deg0,
        }
    }

    pub fn then(self, other: Rotation) -> Rotation {
        Rotation::from_degrees((self.degrees() + other.degrees()) as i32)
    }

    pub fn apply(self, image: &DynamicImage) -> DynamicImage {
        match self {
            Rotation::Deg0 => image.clone(),
            Rotation::Deg90 => image.rotate90(),
            Rotation::Deg180 => image.rotate180(),
            Rotation::Deg270 => image.rotate270(),
        }
    }
}

/// The perspective-corrected document plus the rotation applied so far.
#[derive(Debug, Clone)]
pub struct CanonicalDocumentImage {
    pub image: DynamicImage,
    pub rotation: Rotation,
}

impl CanonicalDocumentImage {
    pub fn new(image: DynamicImage) -> Self {
        CanonicalDocumentImage {
            image,
            rotation: Rotation::Deg0,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width() as f64 / self.height().max(1) as f64
    }

    pub fn is_portrait(&self) -> bool {
        self.height() > self.width()
    }

    pub fn rotated(&self, rotation: Rotation) -> CanonicalDocumentImage {
        CanonicalDocumentImage {
            image: rotation.apply(&self.image),
            rotation: self.rotation.then(rotation),
        }
    }
}

/// Text and/or crop recovered for one template field.
#[derive(Debug, Clone, Default)]
pub struct FieldValue {
    pub text: Option<String>,
    pub image: Option<DynamicImage>,
}

/// Per-field output of template extraction. Only the template extractor
/// inserts, and only ids taken from the active template.
#[derive(Debug, Clone, Default)]
pub struct FieldExtractionResult {
    fields: BTreeMap<String, FieldValue>,
}

impl FieldExtractionResult {
    pub(crate) fn insert(&mut self, field_id: &str, value: FieldValue) {
        self.fields.insert(field_id.to_string(), value);
    }

    pub fn get(&self, field_id: &str) -> Option<&FieldValue> {
        self.fields.get(field_id)
    }

    pub fn field_ids(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn texts(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .filter_map(|(id, value)| value.text.as_ref().map(|t| (id.clone(), t.clone())))
            .collect()
    }

    pub fn images(&self) -> impl Iterator<Item = (&str, &DynamicImage)> {
        self.fields
            .iter()
            .filter_map(|(id, value)| value.image.as_ref().map(|img| (id.as_str(), img)))
    }
}

/// One trial at a fixed rotation of the canonical image.
#[derive(Debug, Clone)]
pub struct ExtractionAttempt {
    pub rotation: Rotation,
    pub fields: BTreeMap<String, String>,
    pub template_result: Option<FieldExtractionResult>,
    pub raw_text: String,
    pub confidence: f64,
}

impl ExtractionAttempt {
    pub fn empty(rotation: Rotation) -> Self {
        ExtractionAttempt {
            rotation,
            fields: BTreeMap::new(),
            template_result: None,
            raw_text: String::new(),
            confidence: 0.0,
        }
    }
}

/// What the caller receives from one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentExtractionOutcome {
    pub success: bool,
    pub invocation_id: String,
    pub document_type: DocumentType,
    pub raw_text: String,
    pub extracted_fields: BTreeMap<String, String>,
    /// Base64-encoded PNG crops, keyed by field id.
    pub images: BTreeMap<String, String>,
    pub confidence: f64,
    pub rotation_used: u32,
    pub debug_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentExtractionOutcome {
    pub fn failure(
        invocation_id: &str,
        document_type: DocumentType,
        error: String,
        debug_urls: Vec<String>,
    ) -> Self {
        DocumentExtractionOutcome {
            success: false,
            invocation_id: invocation_id.to_string(),
            document_type,
            raw_text: String::new(),
            extracted_fields: BTreeMap::new(),
            images: BTreeMap::new(),
            confidence: 0.0,
            rotation_used: 0,
            debug_urls,
            error: Some(error),
        }
    }
}

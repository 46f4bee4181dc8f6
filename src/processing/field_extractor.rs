use crate::models::{
    CanonicalDocumentImage, DocumentType, FieldDefinition, FieldExtractionResult, FieldTemplate,
    FieldValue, FontStyle, TuningProfile,
};
use crate::processing::font_analysis::FontAnalyzer;
use crate::processing::ocr::{clean_text, TextRecognizer};
use image::DynamicImage;
use log::{debug, warn};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Tuning profiles learned by font analysis, shared across invocations.
/// A stored profile is never replaced.
#[derive(Debug, Default)]
pub struct ProfileCache {
    profiles: RwLock<HashMap<String, TuningProfile>>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(document_type: DocumentType, field_id: &str) -> String {
        format!("{}/{}", document_type.as_str(), field_id)
    }

    pub fn get(&self, document_type: DocumentType, field_id: &str) -> Option<TuningProfile> {
        self.profiles
            .read()
            .get(&Self::key(document_type, field_id))
            .cloned()
    }

    /// Stores `profile` unless one exists; returns whichever is cached.
    pub fn insert_if_absent(
        &self,
        document_type: DocumentType,
        field_id: &str,
        profile: TuningProfile,
    ) -> TuningProfile {
        self.profiles
            .write()
            .entry(Self::key(document_type, field_id))
            .or_insert(profile)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }

    /// Copies cached profiles into fields of `template` that have none.
    /// Returns how many fields were filled.
    pub fn apply_to(&self, document_type: DocumentType, template: &mut FieldTemplate) -> usize {
        let profiles = self.profiles.read();
        let mut applied = 0;
        for field in template.fields.iter_mut() {
            if field.tuning_profile.is_some() {
                continue;
            }
            if let Some(profile) = profiles.get(&Self::key(document_type, &field.field_id)) {
                field.tuning_profile = Some(profile.clone());
                applied += 1;
            }
        }
        applied
    }
}

/// Crops every template field out of a canonical image and reads the text ones.
pub struct TemplateFieldExtractor<'a> {
    recognizer: &'a dyn TextRecognizer,
    cache: &'a ProfileCache,
    document_type: DocumentType,
}

impl<'a> TemplateFieldExtractor<'a> {
    pub fn new(
        recognizer: &'a dyn TextRecognizer,
        cache: &'a ProfileCache,
        document_type: DocumentType,
    ) -> Self {
        TemplateFieldExtractor {
            recognizer,
            cache,
            document_type,
        }
    }

    pub fn extract(
        &self,
        canonical: &CanonicalDocumentImage,
        template: &FieldTemplate,
    ) -> FieldExtractionResult {
        let mut result = FieldExtractionResult::default();
        let (width, height) = (canonical.width(), canonical.height());

        for field in &template.fields {
            let Some((x, y, w, h)) = field.normalized_card.to_pixels(width, height) else {
                warn!("Field '{}' lies outside the image, skipped", field.field_id);
                continue;
            };
            let crop = canonical.image.crop_imm(x, y, w, h);

            let mut value = FieldValue::default();
            if field.extraction_type.wants_text() {
                value.text = self.read_text(field, &crop);
            }
            if field.extraction_type.wants_image() {
                value.image = Some(crop);
            }

            if value.text.is_some() || value.image.is_some() {
                result.insert(&field.field_id, value);
            }
        }

        debug!("Template extraction produced {} fields", result.len());
        result
    }

    fn read_text(&self, field: &FieldDefinition, crop: &DynamicImage) -> Option<String> {
        let profile = self.profile_for(field, crop);
        match self.recognizer.recognize(crop, &profile) {
            Ok(text) => {
                let text = clean_text(&text);
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            }
            Err(e) => {
                warn!("Recognition failed for field '{}': {}", field.field_id, e);
                None
            }
        }
    }

    /// Template profile, then cached profile, then a fresh font analysis.
    fn profile_for(&self, field: &FieldDefinition, crop: &DynamicImage) -> TuningProfile {
        if let Some(profile) = &field.tuning_profile {
            return profile.clone();
        }
        if let Some(profile) = self.cache.get(self.document_type, &field.field_id) {
            return profile;
        }

        match FontAnalyzer::analyze(crop) {
            Ok(analysis) => {
                debug!(
                    "Field '{}' looks {:?} ({:?})",
                    field.field_id, analysis.style, analysis.metrics
                );
                self.cache
                    .insert_if_absent(self.document_type, &field.field_id, analysis.profile())
            }
            Err(e) => {
                debug!("Font analysis skipped for '{}': {}", field.field_id, e);
                TuningProfile::for_style(FontStyle::Standard)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractionMode, ImageSize, NormalizedRect, Rotation};
    use crate::utils::ExtractionError;
    use image::{GrayImage, Luma};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;
    use std::sync::Mutex;

    /// Answers with the mean brightness of whatever it is shown.
    struct BrightnessRecognizer {
        profiles: Mutex<Vec<TuningProfile>>,
    }

    impl TextRecognizer for BrightnessRecognizer {
        fn recognize(&self, image: &DynamicImage, profile: &TuningProfile) -> Result<String, ExtractionError> {
            self.profiles.lock().unwrap().push(profile.clone());
            let gray = image.to_luma8();
            let mean = gray.pixels().map(|p| p[0] as u64).sum::<u64>() / gray.pixels().len() as u64;
            if mean > 250 {
                return Err(ExtractionError::OcrError("blank".to_string()));
            }
            Ok(format!(" {} \n", mean))
        }

        fn detect_orientation(&self, _image: &DynamicImage) -> Result<Rotation, ExtractionError> {
            Ok(Rotation::Deg0)
        }
    }

    fn field(id: &str, x: f64, y: f64, w: f64, h: f64, mode: ExtractionMode) -> FieldDefinition {
        FieldDefinition {
            field_id: id.to_string(),
            label: id.to_string(),
            normalized_card: NormalizedRect {
                x,
                y,
                width: w,
                height: h,
            },
            extraction_type: mode,
            tuning_profile: None,
        }
    }

    fn canonical() -> CanonicalDocumentImage {
        let mut image = GrayImage::from_pixel(200, 100, Luma([255]));
        draw_filled_rect_mut(&mut image, Rect::at(0, 0).of_size(100, 50), Luma([100]));
        CanonicalDocumentImage::new(DynamicImage::ImageLuma8(image))
    }

    #[test]
    fn test_extracts_only_template_fields_with_clamping() {
        let template = FieldTemplate {
            image_size: ImageSize {
                width: 200,
                height: 100,
            },
            fields: vec![
                field("name", 0.0, 0.0, 0.5, 0.5, ExtractionMode::Text),
                field("photo", 0.9, 0.9, 0.5, 0.5, ExtractionMode::Image),
                field("blank", 0.5, 0.5, 0.5, 0.5, ExtractionMode::Both),
                field("gone", 1.5, 0.0, 0.1, 0.1, ExtractionMode::Text),
            ],
        };
        let recognizer = BrightnessRecognizer {
            profiles: Mutex::new(Vec::new()),
        };
        let cache = ProfileCache::new();
        let extractor = TemplateFieldExtractor::new(&recognizer, &cache, DocumentType::DrivingLicence);

        let result = extractor.extract(&canonical(), &template);

        assert_eq!(result.get("name").unwrap().text.as_deref(), Some("100"));
        let photo = result.get("photo").unwrap().image.as_ref().unwrap();
        assert_eq!((photo.width(), photo.height()), (20, 10));
        // Engine failure drops the text but keeps the crop.
        let blank = result.get("blank").unwrap();
        assert!(blank.text.is_none() && blank.image.is_some());
        assert!(result.get("gone").is_none());
        assert!(result.field_ids().all(|id| template.contains(id)));
    }

    #[test]
    fn test_template_profile_wins_over_analysis() {
        let mut name = field("name", 0.0, 0.0, 0.5, 0.5, ExtractionMode::Text);
        name.tuning_profile = Some(TuningProfile::for_style(FontStyle::DotMatrix));
        let template = FieldTemplate {
            image_size: ImageSize {
                width: 200,
                height: 100,
            },
            fields: vec![name],
        };
        let recognizer = BrightnessRecognizer {
            profiles: Mutex::new(Vec::new()),
        };
        let cache = ProfileCache::new();
        TemplateFieldExtractor::new(&recognizer, &cache, DocumentType::DrivingLicence)
            .extract(&canonical(), &template);

        let seen = recognizer.profiles.lock().unwrap();
        assert_eq!(seen[0].font_style, FontStyle::DotMatrix);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_keeps_first_profile_and_fills_templates() {
        let cache = ProfileCache::new();
        let first = TuningProfile::for_style(FontStyle::Monospace);
        let stored = cache.insert_if_absent(DocumentType::VehicleRegistration, "vin", first.clone());
        assert_eq!(stored, first);

        let second = TuningProfile::for_style(FontStyle::Standard);
        let stored = cache.insert_if_absent(DocumentType::VehicleRegistration, "vin", second);
        assert_eq!(stored, first);
        assert!(cache.get(DocumentType::DrivingLicence, "vin").is_none());

        let mut template = FieldTemplate {
            image_size: ImageSize {
                width: 10,
                height: 10,
            },
            fields: vec![
                field("vin", 0.0, 0.0, 0.5, 0.5, ExtractionMode::Text),
                field("make", 0.5, 0.0, 0.5, 0.5, ExtractionMode::Text),
            ],
        };
        assert_eq!(cache.apply_to(DocumentType::VehicleRegistration, &mut template), 1);
        assert_eq!(template.fields[0].tuning_profile, Some(first));
        assert!(template.fields[1].tuning_profile.is_none());
    }
}

use crate::models::{
    CanonicalDocumentImage, DocumentExtractionOutcome, DocumentType, ExtractionAttempt,
    FieldExtractionResult, FieldTemplate, PipelineConfig, RegionCandidate, Rotation, SourceImage,
    TuningProfile,
};
use crate::processing::detection::RegionLocator;
use crate::processing::extractors::PatternExtractor;
use crate::processing::field_extractor::{ProfileCache, TemplateFieldExtractor};
use crate::processing::image::ImageProcessor;
use crate::processing::ocr::TextRecognizer;
use crate::processing::orientation::OrientationCorrector;
use crate::processing::perspective::PerspectiveNormalizer;
use crate::processing::trials::TrialController;
use crate::utils::{DebugArtifacts, ExtractionError};
use crate::validation::{FieldConfidenceScorer, LicenceNumberDecoder};
use image::imageops::FilterType;
use image::{DynamicImage, Rgb};
use imageproc::drawing::draw_line_segment_mut;
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use uuid::Uuid;

/// One photograph queued for [`DocumentExtractor::extract_batch`].
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub image_bytes: Vec<u8>,
    pub document_type: DocumentType,
    pub template: Option<FieldTemplate>,
}

/// Runs the full pipeline for one photograph at a time. Invocations share
/// nothing mutable except the profile cache, so one extractor can serve
/// many threads.
pub struct DocumentExtractor {
    config: PipelineConfig,
    recognizer: Arc<dyn TextRecognizer>,
    profiles: Arc<ProfileCache>,
}

impl DocumentExtractor {
    pub fn new(config: PipelineConfig, recognizer: Arc<dyn TextRecognizer>) -> Self {
        DocumentExtractor {
            config,
            recognizer,
            profiles: Arc::new(ProfileCache::new()),
        }
    }

    pub fn with_profile_cache(mut self, profiles: Arc<ProfileCache>) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn profile_cache(&self) -> &ProfileCache {
        &self.profiles
    }

    /// Never fails: fatal problems come back as `success: false`.
    pub fn extract(
        &self,
        image_bytes: &[u8],
        document_type: DocumentType,
        custom_template: Option<&FieldTemplate>,
    ) -> DocumentExtractionOutcome {
        let invocation_id = Uuid::new_v4().to_string();
        info!("[{}] Extracting {} from {} bytes", invocation_id, document_type, image_bytes.len());

        let mut artifacts = DebugArtifacts::new(&self.config.debug, &invocation_id);
        match self.run(image_bytes, document_type, custom_template, &invocation_id, &mut artifacts) {
            Ok(outcome) => {
                info!(
                    "[{}] Done: confidence {:.3}, rotation {}°, {} fields, {} images",
                    invocation_id,
                    outcome.confidence,
                    outcome.rotation_used,
                    outcome.extracted_fields.len(),
                    outcome.images.len()
                );
                outcome
            }
            Err(e) => {
                if e.is_fatal() {
                    warn!("[{}] Extraction failed: {}", invocation_id, e);
                } else {
                    error!("[{}] Unexpected pipeline error: {}", invocation_id, e);
                }
                DocumentExtractionOutcome::failure(
                    &invocation_id,
                    document_type,
                    e.to_string(),
                    artifacts.into_urls(),
                )
            }
        }
    }

    /// Extracts independent submissions on scoped worker threads, keeping input order.
    pub fn extract_batch(&self, jobs: &[BatchJob]) -> Vec<DocumentExtractionOutcome> {
        if jobs.is_empty() {
            return Vec::new();
        }

        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(jobs.len());
        let chunk_size = (jobs.len() + workers - 1) / workers;

        thread::scope(|scope| {
            let handles: Vec<_> = jobs
                .chunks(chunk_size)
                .map(|chunk| {
                    let handle = scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|job| {
                                self.extract(&job.image_bytes, job.document_type, job.template.as_ref())
                            })
                            .collect::<Vec<_>>()
                    });
                    (chunk, handle)
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|(chunk, handle)| match handle.join() {
                    Ok(outcomes) => outcomes,
                    Err(_) => chunk
                        .iter()
                        .map(|job| {
                            DocumentExtractionOutcome::failure(
                                &Uuid::new_v4().to_string(),
                                job.document_type,
                                "Worker thread panicked".to_string(),
                                Vec::new(),
                            )
                        })
                        .collect(),
                })
                .collect()
        })
    }

    fn run(
        &self,
        image_bytes: &[u8],
        document_type: DocumentType,
        custom_template: Option<&FieldTemplate>,
        invocation_id: &str,
        artifacts: &mut DebugArtifacts,
    ) -> Result<DocumentExtractionOutcome, ExtractionError> {
        if let Some(template) = custom_template {
            template.validate()?;
        }

        let source = ImageProcessor::load_source(image_bytes)?;
        artifacts.save("source", source.image());

        let default_template;
        let template = match custom_template {
            Some(template) => template,
            None => {
                default_template = FieldTemplate::default_for(document_type)?;
                &default_template
            }
        };
        let aspect = document_type.aspect_ratio();

        // Detection
        let locator = RegionLocator::new(
            self.config.detection.clone(),
            self.config.scoring.clone(),
            aspect,
        );
        let candidate = locator.locate(&source)?;
        if artifacts.is_enabled() {
            artifacts.save("candidate", &Self::draw_candidate(&source, &candidate));
        }

        // Perspective
        let normalizer = PerspectiveNormalizer::new(self.config.normalization.clone());
        let canonical = match normalizer.normalize(&source, &candidate, aspect) {
            Ok(canonical) => canonical,
            Err(e) => {
                warn!("[{}] {}; using the whole photo", invocation_id, e);
                let (width, height) = normalizer.canonical_size(aspect, source.height() > source.width());
                CanonicalDocumentImage::new(source.image().resize_exact(width, height, FilterType::Triangle))
            }
        };
        artifacts.save("normalized", &canonical.image);

        // Orientation
        let corrector = OrientationCorrector::new(
            self.config.orientation.clone(),
            self.config.normalization.canonical_width,
        );
        let oriented = corrector.correct(canonical, aspect, self.recognizer.as_ref());
        info!("[{}] Orientation correction: {}°", invocation_id, oriented.rotation.degrees());
        artifacts.save("oriented", &oriented.image);

        // Trials
        let extractor =
            TemplateFieldExtractor::new(self.recognizer.as_ref(), &self.profiles, document_type);
        let controller = TrialController::new(self.config.trials.high_confidence);
        let neutral = self.config.trials.neutral_confidence;

        let trial = if custom_template.is_some() {
            // Every rotation would score the same neutral confidence.
            controller.run(&[Rotation::Deg0], |rotation| {
                let rotated = oriented.rotated(rotation);
                let result = extractor.extract(&rotated, template);
                ExtractionAttempt {
                    rotation,
                    fields: result.texts(),
                    template_result: Some(result),
                    raw_text: String::new(),
                    confidence: neutral,
                }
            })
        } else {
            controller.run(&Rotation::ALL, |rotation| {
                self.pattern_attempt(&oriented.rotated(rotation), rotation, document_type)
            })
        };
        let best = trial.unwrap_or_else(|| ExtractionAttempt::empty(Rotation::Deg0));

        let chosen = oriented.rotated(best.rotation);
        info!(
            "[{}] Best trial at {}° with confidence {:.3}",
            invocation_id,
            best.rotation.degrees(),
            best.confidence
        );
        artifacts.save("selected", &chosen.image);

        let (mut fields, template_result, confidence) = match best.template_result {
            Some(result) => (best.fields, result, best.confidence),
            None => {
                let result = extractor.extract(&chosen, template);
                let mut merged = best.fields;
                // Template crops are read with tuned profiles, so they win.
                merged.extend(result.texts());
                let confidence = FieldConfidenceScorer::score(document_type, &merged);
                (merged, result, confidence)
            }
        };

        if confidence < neutral {
            info!("[{}] Low confidence extraction ({:.3})", invocation_id, confidence);
        }

        if document_type == DocumentType::DrivingLicence {
            Self::append_licence_details(&mut fields);
        }

        Ok(DocumentExtractionOutcome {
            success: true,
            invocation_id: invocation_id.to_string(),
            document_type,
            raw_text: best.raw_text,
            extracted_fields: fields,
            images: Self::encode_images(&template_result),
            confidence,
            rotation_used: chosen.rotation.degrees(),
            debug_urls: artifacts.urls().to_vec(),
            error: None,
        })
    }

    fn pattern_attempt(
        &self,
        rotated: &CanonicalDocumentImage,
        rotation: Rotation,
        document_type: DocumentType,
    ) -> ExtractionAttempt {
        let raw_text = match self.recognizer.recognize(&rotated.image, &TuningProfile::document()) {
            Ok(text) => text,
            Err(e) => {
                warn!("Full-page recognition failed at {}°: {}", rotation.degrees(), e);
                return ExtractionAttempt::empty(rotation);
            }
        };

        let fields = PatternExtractor::extract(document_type, &raw_text);
        let confidence = FieldConfidenceScorer::score(document_type, &fields);
        ExtractionAttempt {
            rotation,
            fields,
            template_result: None,
            raw_text,
            confidence,
        }
    }

    fn append_licence_details(fields: &mut BTreeMap<String, String>) {
        let Some(number) = fields.get("licence_number") else {
            return;
        };
        let decoded = LicenceNumberDecoder::decode(number);
        debug!("Decoded licence number: {:?}", decoded);
        for (key, value) in decoded.to_fields() {
            fields.entry(key).or_insert(value);
        }
    }

    fn encode_images(result: &FieldExtractionResult) -> BTreeMap<String, String> {
        let mut images = BTreeMap::new();
        for (field_id, image) in result.images() {
            match ImageProcessor::encode_base64_png(image) {
                Ok(encoded) => {
                    images.insert(field_id.to_string(), encoded);
                }
                Err(e) => warn!("Could not encode image for '{}': {}", field_id, e),
            }
        }
        images
    }

    fn draw_candidate(source: &SourceImage, candidate: &RegionCandidate) -> DynamicImage {
        let mut overlay = source.image().to_rgb8();
        for i in 0..4 {
            let a = candidate.corners[i];
            let b = candidate.corners[(i + 1) % 4];
            draw_line_segment_mut(&mut overlay, (a.x, a.y), (b.x, b.y), Rgb([255, 0, 0]));
        }
        DynamicImage::ImageRgb8(overlay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractionMode, FieldDefinition, ImageSize, NormalizedRect};
    use image::{GrayImage, Luma, RgbImage};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const FULL_TEXT: &str = "DRIVING LICENCE\n\
        1. MORGAN\n\
        2. SARAH MEREDITH\n\
        3. 11.03.1976 UNITED KINGDOM\n\
        4a. 19.01.2013\n\
        4b. 18.01.2023\n\
        4c. DVLA\n\
        5. MORGA753116SM9IJ\n\
        8. 122 BURNS CRESCENT EDINBURGH EH1 9GP\n\
        9. AM/A/B1/B/F/K/L/N/P/Q\n";

    /// (field id, grey level painted into its box, text "printed" there)
    const TEXT_FIELDS: [(&str, u8, &str); 9] = [
        ("surname", 40, "MORGAN"),
        ("first_names", 55, "SARAH MEREDITH"),
        ("date_of_birth", 70, "11.03.1976"),
        ("issue_date", 85, "19.01.2013"),
        ("issuing_authority", 100, "DVLA"),
        ("expiry_date", 115, "18.01.2023"),
        ("licence_number", 130, "MORGA753116SM9IJ"),
        ("address", 145, "122 BURNS CRESCENT EDINBURGH EH1 9GP"),
        ("categories", 160, "AM/A/B1/B/F/K/L/N/P/Q"),
    ];

    /// Reads a synthetic licence: whole pages are legible only when upright
    /// (photo on the left), field boxes are identified by their grey level.
    struct CardStub {
        full_page_calls: AtomicUsize,
    }

    impl CardStub {
        fn new() -> Self {
            CardStub {
                full_page_calls: AtomicUsize::new(0),
            }
        }
    }

    fn column_mean(gray: &GrayImage, x0: u32, x1: u32) -> f64 {
        let mut sum = 0u64;
        for y in 0..gray.height() {
            for x in x0..x1 {
                sum += gray.get_pixel(x, y)[0] as u64;
            }
        }
        sum as f64 / ((x1 - x0) as f64 * gray.height() as f64)
    }

    impl TextRecognizer for CardStub {
        fn recognize(&self, image: &DynamicImage, _profile: &TuningProfile) -> Result<String, ExtractionError> {
            let gray = image.to_luma8();
            let (width, height) = gray.dimensions();

            if width.max(height) >= 800 {
                self.full_page_calls.fetch_add(1, Ordering::SeqCst);
                if width <= height {
                    return Ok(String::new());
                }
                let third = width / 3;
                let left = column_mean(&gray, 0, third);
                let right = column_mean(&gray, width - third, width);
                return Ok(if left + 20.0 < right {
                    FULL_TEXT.to_string()
                } else {
                    String::new()
                });
            }

            let mut histogram = [0u32; 256];
            for pixel in gray.pixels() {
                histogram[pixel[0] as usize] += 1;
            }
            let mode = (0..256).max_by_key(|&v| histogram[v]).unwrap_or(0) as i32;

            Ok(TEXT_FIELDS
                .iter()
                .min_by_key(|(_, level, _)| (*level as i32 - mode).abs())
                .filter(|(_, level, _)| (*level as i32 - mode).abs() <= 6)
                .map(|(_, _, text)| text.to_string())
                .unwrap_or_default())
        }

        fn detect_orientation(&self, _image: &DynamicImage) -> Result<Rotation, ExtractionError> {
            Ok(Rotation::Deg0)
        }
    }

    /// A pink licence turned a quarter clockwise on an olive table, about 60% of the frame.
    fn photographed_licence() -> Vec<u8> {
        let template = FieldTemplate::default_for(DocumentType::DrivingLicence).unwrap();
        let mut card = RgbImage::from_pixel(316, 200, Rgb([236, 170, 200]));

        let mut paint = |field_id: &str, level: u8| {
            let field = template.field(field_id).unwrap();
            let (x, y, w, h) = field.normalized_card.to_pixels(316, 200).unwrap();
            draw_filled_rect_mut(&mut card, Rect::at(x as i32, y as i32).of_size(w, h), Rgb([level, level, level]));
        };
        paint("photo", 20);
        paint("signature", 10);
        for (field_id, level, _) in TEXT_FIELDS {
            paint(field_id, level);
        }

        let turned = DynamicImage::ImageRgb8(card).rotate90().to_rgb8();
        let mut photo = RgbImage::from_pixel(280, 376, Rgb([70, 80, 60]));
        image::imageops::overlay(&mut photo, &turned, 40, 30);

        ImageProcessor::encode_png(&DynamicImage::ImageRgb8(photo)).unwrap()
    }

    fn extractor(stub: Arc<CardStub>) -> DocumentExtractor {
        DocumentExtractor::new(PipelineConfig::default(), stub)
    }

    #[test]
    fn test_rotated_licence_end_to_end() {
        let stub = Arc::new(CardStub::new());
        let outcome = extractor(stub.clone()).extract(
            &photographed_licence(),
            DocumentType::DrivingLicence,
            None,
        );

        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(outcome.rotation_used, 270);
        for (field_id, _, text) in TEXT_FIELDS {
            assert_eq!(outcome.extracted_fields.get(field_id).map(String::as_str), Some(text));
        }
        assert!(outcome.images.contains_key("photo"));
        assert!(outcome.images.contains_key("signature"));
        assert_eq!(outcome.extracted_fields["licence_birth_date"], "11.03.1976");
        assert_eq!(outcome.extracted_fields["licence_sex"], "female");
        assert!((outcome.confidence - 1.0).abs() < 1e-9);
        assert!(outcome.raw_text.contains("MORGA753116SM9IJ"));

        // 0°, 90° and 180° were tried; 180° was confident enough to stop.
        assert_eq!(stub.full_page_calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_repeated_runs_agree() {
        let bytes = photographed_licence();
        let extractor = extractor(Arc::new(CardStub::new()));

        let first = extractor.extract(&bytes, DocumentType::DrivingLicence, None);
        let second = extractor.extract(&bytes, DocumentType::DrivingLicence, None);

        assert_eq!(first.rotation_used, second.rotation_used);
        assert_eq!(first.extracted_fields, second.extracted_fields);
        assert_ne!(first.invocation_id, second.invocation_id);
    }

    #[test]
    fn test_blank_photo_reports_no_region() {
        let blank = DynamicImage::ImageLuma8(GrayImage::from_pixel(320, 240, Luma([128])));
        let bytes = ImageProcessor::encode_png(&blank).unwrap();

        let outcome = extractor(Arc::new(CardStub::new())).extract(
            &bytes,
            DocumentType::DrivingLicence,
            None,
        );
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("No document region found in image"));
        assert!(outcome.extracted_fields.is_empty());
    }

    #[test]
    fn test_undecodable_bytes_fail_cleanly() {
        let outcome = extractor(Arc::new(CardStub::new())).extract(
            b"definitely not a photo",
            DocumentType::VehicleRegistration,
            None,
        );
        assert!(!outcome.success);
        assert_eq!(outcome.document_type, DocumentType::VehicleRegistration);
    }

    #[test]
    fn test_custom_template_runs_a_single_neutral_trial() {
        let template = FieldTemplate {
            image_size: ImageSize {
                width: 856,
                height: 540,
            },
            fields: vec![FieldDefinition {
                field_id: "card".to_string(),
                label: "Whole card".to_string(),
                normalized_card: NormalizedRect {
                    x: 0.0,
                    y: 0.0,
                    width: 1.0,
                    height: 1.0,
                },
                extraction_type: ExtractionMode::Image,
                tuning_profile: None,
            }],
        };
        let stub = Arc::new(CardStub::new());
        let outcome = extractor(stub.clone()).extract(
            &photographed_licence(),
            DocumentType::DrivingLicence,
            Some(&template),
        );

        assert!(outcome.success);
        assert_eq!(outcome.confidence, 0.5);
        // Orientation correction only.
        assert_eq!(outcome.rotation_used, 90);
        assert_eq!(outcome.images.keys().collect::<Vec<_>>(), vec!["card"]);
        assert!(outcome.extracted_fields.is_empty());
        assert_eq!(stub.full_page_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_custom_template_is_a_failure() {
        let field = FieldDefinition {
            field_id: "surname".to_string(),
            label: "Surname".to_string(),
            normalized_card: NormalizedRect {
                x: 0.3,
                y: 0.2,
                width: 0.5,
                height: 0.07,
            },
            extraction_type: ExtractionMode::Text,
            tuning_profile: None,
        };
        let template = FieldTemplate {
            image_size: ImageSize {
                width: 856,
                height: 540,
            },
            fields: vec![field.clone(), field],
        };
        let stub = Arc::new(CardStub::new());
        let outcome = extractor(stub.clone()).extract(
            &photographed_licence(),
            DocumentType::DrivingLicence,
            Some(&template),
        );

        assert!(!outcome.success);
        assert_eq!(
            outcome.error.as_deref(),
            Some("Template error: Duplicate field id 'surname'")
        );
        assert_eq!(stub.full_page_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_debug_artifacts_are_listed() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::default().with_debug_dir(dir.path().to_path_buf());
        let extractor = DocumentExtractor::new(config, Arc::new(CardStub::new()));

        let outcome = extractor.extract(&photographed_licence(), DocumentType::DrivingLicence, None);
        assert_eq!(outcome.debug_urls.len(), 5);
        for url in &outcome.debug_urls {
            assert!(url.starts_with(&outcome.invocation_id));
            assert!(dir.path().join(url).exists());
        }
    }

    #[test]
    fn test_batch_keeps_order() {
        let blank = DynamicImage::ImageLuma8(GrayImage::from_pixel(320, 240, Luma([128])));
        let jobs = vec![
            BatchJob {
                image_bytes: photographed_licence(),
                document_type: DocumentType::DrivingLicence,
                template: None,
            },
            BatchJob {
                image_bytes: ImageProcessor::encode_png(&blank).unwrap(),
                document_type: DocumentType::VehicleRegistration,
                template: None,
            },
        ];

        let outcomes = extractor(Arc::new(CardStub::new())).extract_batch(&jobs);
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].success);
        assert!(!outcomes[1].success);
        assert_eq!(outcomes[1].document_type, DocumentType::VehicleRegistration);
    }
}

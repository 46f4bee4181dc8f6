//! Candidate region detection.
//!
//! Three independent producers propose document boundaries. The
//! [`RegionLocator`] runs them in priority order, scores their proposals and
//! falls back to the largest raw contour when none of them fits.

pub mod color;
pub mod contour;
pub mod lines;

pub use color::ColorMaskDetector;
pub use contour::EdgeContourDetector;
pub use lines::DominantLineDetector;

use crate::models::{DetectionConfig, DetectorKind, RegionCandidate, ScoringConfig, SourceImage};
use crate::processing::geometry;
use crate::processing::image::ImageProcessor;
use crate::processing::scoring::CandidateScorer;
use crate::utils::ExtractionError;
use image::{DynamicImage, GrayImage};
use imageproc::contours::find_contours;
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::edges::canny;
use log::{debug, info, warn};

pub trait RegionDetector: Send + Sync {
    fn kind(&self) -> DetectorKind;

    /// Candidates in the coordinates of `image`.
    fn detect(&self, image: &DynamicImage) -> Result<Vec<RegionCandidate>, ExtractionError>;
}

/// Minimum intensity spread for a grayscale image to carry any shape.
pub(crate) const MIN_CONTRAST: u8 = 16;

pub(crate) fn contrast_range(gray: &GrayImage) -> u8 {
    let mut min = u8::MAX;
    let mut max = u8::MIN;
    for pixel in gray.pixels() {
        min = min.min(pixel[0]);
        max = max.max(pixel[0]);
    }
    max.saturating_sub(min)
}

pub struct RegionLocator {
    config: DetectionConfig,
    scorer: CandidateScorer,
    detectors: Vec<Box<dyn RegionDetector>>,
}

impl RegionLocator {
    pub fn new(config: DetectionConfig, scoring: ScoringConfig, ideal_aspect: f64) -> Self {
        let detectors: Vec<Box<dyn RegionDetector>> = vec![
            Box::new(ColorMaskDetector::new(config.clone())),
            Box::new(EdgeContourDetector::new(config.clone())),
            Box::new(DominantLineDetector::new(config.clone())),
        ];
        Self::with_detectors(config, scoring, ideal_aspect, detectors)
    }

    pub fn with_detectors(
        config: DetectionConfig,
        scoring: ScoringConfig,
        ideal_aspect: f64,
        detectors: Vec<Box<dyn RegionDetector>>,
    ) -> Self {
        RegionLocator {
            config,
            scorer: CandidateScorer::new(scoring, ideal_aspect),
            detectors,
        }
    }

    /// Selects exactly one region in full-resolution coordinates of `source`.
    pub fn locate(&self, source: &SourceImage) -> Result<RegionCandidate, ExtractionError> {
        let (working, factor) = ImageProcessor::downscale(source.image(), self.config.max_dimension);

        let mut pool = Vec::new();
        for detector in &self.detectors {
            let found = match detector.detect(&working) {
                Ok(found) => found,
                Err(e) => {
                    warn!("{:?} detector skipped: {}", detector.kind(), e);
                    continue;
                }
            };
            debug!("{:?} detector proposed {} candidates", detector.kind(), found.len());

            if found.len() == 1 {
                let score = self.scorer.score(&found[0]);
                if score >= self.config.early_exit_score {
                    info!(
                        "{:?} detector produced a single match scoring {:.3}, skipping the rest",
                        detector.kind(),
                        score
                    );
                    pool = found;
                    break;
                }
            }
            pool.extend(found);
        }

        let selected = match self.scorer.select(pool) {
            Some(candidate) => candidate,
            None => {
                warn!("No detector produced a candidate, using the largest raw contour");
                let fallback = self.largest_raw_contour(&working)?;
                self.scorer
                    .select(vec![fallback])
                    .ok_or(ExtractionError::NoRegionFound)?
            }
        };

        info!(
            "Selected {:?} region, score {:.3}, corners {:?}",
            selected.source, selected.score, selected.corners
        );

        Ok(if factor != 1.0 {
            selected.scaled(factor)
        } else {
            selected
        })
    }

    /// Last resort: the biggest contour of the Otsu mask and edge map, whatever its shape.
    fn largest_raw_contour(&self, image: &DynamicImage) -> Result<RegionCandidate, ExtractionError> {
        let gray = image.to_luma8();

        let level = otsu_level(&gray);
        let mut mask = threshold(&gray, level, ThresholdType::Binary);
        let foreground = mask.pixels().filter(|p| p[0] > 0).count();
        if foreground == 0 || foreground == mask.pixels().len() {
            // One class only: the frame itself is not a region.
            mask.pixels_mut().for_each(|p| p[0] = 0);
        }
        let edges = canny(&gray, self.config.canny_low, self.config.canny_high);
        for (m, e) in mask.pixels_mut().zip(edges.pixels()) {
            m[0] = m[0].max(e[0]);
        }

        let (width, height) = gray.dimensions();
        find_contours::<i32>(&mask)
            .iter()
            .filter_map(|contour| {
                geometry::candidate_from_contour(
                    &contour.points,
                    4,
                    contour.parent.is_some(),
                    width,
                    height,
                    self.config.border_margin,
                    DetectorKind::Fallback,
                )
            })
            .max_by(|a, b| a.area.total_cmp(&b.area))
            .filter(|candidate| candidate.area > 0.0)
            .ok_or(ExtractionError::NoRegionFound)
    }
}

use crate::models::{ExtractionAttempt, Rotation};
use log::debug;

/// Runs extraction attempts over a fixed list of rotations and keeps the best.
pub struct TrialController {
    high_confidence: f64,
}

impl TrialController {
    pub fn new(high_confidence: f64) -> Self {
        TrialController { high_confidence }
    }

    /// Evaluates `attempt` for each rotation in order. A later attempt only
    /// replaces the best one on strictly higher confidence, and the loop ends
    /// as soon as an attempt clears the high-confidence cutoff.
    pub fn run<F>(&self, rotations: &[Rotation], mut attempt: F) -> Option<ExtractionAttempt>
    where
        F: FnMut(Rotation) -> ExtractionAttempt,
    {
        let mut best: Option<ExtractionAttempt> = None;

        for &rotation in rotations {
            let result = attempt(rotation);
            debug!(
                "Trial at {}°: confidence {:.3}, {} fields",
                rotation.degrees(),
                result.confidence,
                result.fields.len()
            );

            let confident = result.confidence > self.high_confidence;
            let better = best
                .as_ref()
                .map_or(true, |current| result.confidence > current.confidence);
            if better {
                best = Some(result);
            }

            if confident {
                debug!("Confidence above {:.2}, stopping trials", self.high_confidence);
                break;
            }
        }

        best
    }
}

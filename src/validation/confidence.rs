use crate::models::DocumentType;
use std::collections::BTreeMap;

const MANDATORY_WEIGHT: f64 = 0.6;
const SECONDARY_WEIGHT: f64 = 0.25;
const COUNT_WEIGHT: f64 = 0.15;
const COUNT_SATURATION: usize = 10;

pub struct FieldConfidenceScorer;

impl FieldConfidenceScorer {
    /// Document confidence in [0, 1] from which fields were recovered.
    /// Blank values do not count as recovered.
    pub fn score(document_type: DocumentType, fields: &BTreeMap<String, String>) -> f64 {
        let present = |id: &str| fields.get(id).map_or(false, |v| !v.trim().is_empty());
        let total = fields.values().filter(|v| !v.trim().is_empty()).count();
        if total == 0 {
            return 0.0;
        }

        let fraction = |set: &[&str]| {
            if set.is_empty() {
                0.0
            } else {
                set.iter().filter(|id| present(id)).count() as f64 / set.len() as f64
            }
        };

        let score = MANDATORY_WEIGHT * fraction(document_type.mandatory_fields())
            + SECONDARY_WEIGHT * fraction(document_type.secondary_fields())
            + COUNT_WEIGHT * total.min(COUNT_SATURATION) as f64 / COUNT_SATURATION as f64;
        score.clamp(0.0, 1.0)
    }
}

use crate::models::{RegionCandidate, ScoringConfig};
use log::debug;

/// Ranks region candidates against the expected document shape.
pub struct CandidateScorer {
    config: ScoringConfig,
    ideal_aspect: f64,
}

impl CandidateScorer {
    pub fn new(config: ScoringConfig, ideal_aspect: f64) -> Self {
        CandidateScorer {
            config,
            ideal_aspect,
        }
    }

    /// Weighted score in [0, 1].
    pub fn score(&self, candidate: &RegionCandidate) -> f64 {
        let c = &self.config;
        let total = c.aspect_weight * self.aspect_score(candidate.aspect_ratio)
            + c.size_weight * self.size_score(candidate.area_ratio)
            + c.vertex_weight * self.vertex_score(candidate.vertex_count)
            + c.border_weight * self.border_score(candidate.touches_border);
        total.clamp(0.0, 1.0)
    }

    fn aspect_score(&self, aspect: f64) -> f64 {
        if !aspect.is_finite() {
            return 0.0;
        }
        (1.0 - (aspect - self.ideal_aspect).abs() / self.config.aspect_tolerance).max(0.0)
    }

    // Peaks on the ideal band, linear ramps either side.
    fn size_score(&self, area_ratio: f64) -> f64 {
        let c = &self.config;
        if area_ratio < c.ideal_area_min {
            (area_ratio / c.ideal_area_min).max(0.0)
        } else if area_ratio <= c.ideal_area_max {
            1.0
        } else {
            let span = (1.0 - c.ideal_area_max).max(f64::EPSILON);
            (1.0 - (area_ratio - c.ideal_area_max) / span).max(0.0)
        }
    }

    fn vertex_score(&self, vertices: usize) -> f64 {
        if vertices >= self.config.preferred_min_vertices
            && vertices <= self.config.preferred_max_vertices
        {
            1.0
        } else if vertices == 4 {
            0.6
        } else {
            0.2
        }
    }

    fn border_score(&self, touches_border: bool) -> f64 {
        if touches_border {
            self.config.border_penalty
        } else {
            1.0
        }
    }

    /// Scores every candidate in place and returns the best one.
    /// Ties go to the larger area, then to the earlier candidate.
    pub fn select(&self, candidates: Vec<RegionCandidate>) -> Option<RegionCandidate> {
        let mut best: Option<RegionCandidate> = None;

        for mut candidate in candidates {
            candidate.score = self.score(&candidate);
            debug!(
                "Candidate from {:?}: score {:.3}, area ratio {:.3}, aspect {:.3}, vertices {}, border {}",
                candidate.source,
                candidate.score,
                candidate.area_ratio,
                candidate.aspect_ratio,
                candidate.vertex_count,
                candidate.touches_border
            );

            let replace = match &best {
                None => true,
                Some(current) => {
                    candidate.score > current.score
                        || (candidate.score == current.score && candidate.area > current.area)
                }
            };
            if replace {
                best = Some(candidate);
            }
        }

        best
    }
}

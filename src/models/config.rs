use crate::utils::ExtractionError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Hue in degrees (the range may wrap past 360), saturation and value in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HsvRange {
    pub hue_min: f32,
    pub hue_max: f32,
    pub sat_min: f32,
    pub sat_max: f32,
    pub val_min: f32,
    pub val_max: f32,
}

impl HsvRange {
    pub fn contains(&self, hue: f32, sat: f32, val: f32) -> bool {
        let hue_ok = if self.hue_min <= self.hue_max {
            hue >= self.hue_min && hue <= self.hue_max
        } else {
            // e.g. 320..20 spans red
            hue >= self.hue_min || hue <= self.hue_max
        };
        hue_ok
            && sat >= self.sat_min
            && sat <= self.sat_max
            && val >= self.val_min
            && val <= self.val_max
    }
}

fn default_document_colours() -> Vec<HsvRange> {
    vec![
        // Pink photocard background
        HsvRange {
            hue_min: 300.0,
            hue_max: 360.0,
            sat_min: 0.12,
            sat_max: 0.60,
            val_min: 0.55,
            val_max: 1.0,
        },
        // Green and blue-green registration certificates
        HsvRange {
            hue_min: 80.0,
            hue_max: 170.0,
            sat_min: 0.12,
            sat_max: 0.60,
            val_min: 0.55,
            val_max: 1.0,
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Longest side used by the detectors; bigger photos are downscaled first.
    pub max_dimension: u32,
    pub document_colours: Vec<HsvRange>,
    pub colour_min_area_ratio: f64,
    pub colour_aspect_min: f64,
    pub colour_aspect_max: f64,
    /// Padding added around the colour contour, as a fraction of its size.
    pub colour_padding: f64,
    pub closing_radius: u8,
    pub contour_min_area_ratio: f64,
    pub contour_aspect_min: f64,
    pub contour_aspect_max: f64,
    pub min_vertices: usize,
    pub max_vertices: usize,
    /// Border-touching regions larger than this are the outer frame.
    pub outer_frame_area_ratio: f64,
    /// Relative to the contour perimeter.
    pub polygon_epsilon: f64,
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    pub canny_sensitive_low: f32,
    pub canny_sensitive_high: f32,
    pub border_margin: f32,
    /// Hough vote threshold as a fraction of the shorter image side.
    pub line_vote_ratio: f64,
    pub line_suppression_radius: u32,
    pub line_angle_tolerance: f32,
    /// Cluster window as a fraction of the image dimension.
    pub line_cluster_tolerance: f32,
    /// Single candidate with at least this score stops the detector chain.
    pub early_exit_score: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        DetectionConfig {
            max_dimension: 1024,
            document_colours: default_document_colours(),
            colour_min_area_ratio: 0.02,
            colour_aspect_min: 1.4,
            colour_aspect_max: 1.9,
            colour_padding: 0.01,
            closing_radius: 3,
            contour_min_area_ratio: 0.20,
            contour_aspect_min: 1.3,
            contour_aspect_max: 2.0,
            min_vertices: 5,
            max_vertices: 8,
            outer_frame_area_ratio: 0.70,
            polygon_epsilon: 0.01,
            blur_sigma: 1.4,
            canny_low: 50.0,
            canny_high: 150.0,
            canny_sensitive_low: 20.0,
            canny_sensitive_high: 60.0,
            border_margin: 3.0,
            line_vote_ratio: 0.25,
            line_suppression_radius: 8,
            line_angle_tolerance: 20.0,
            line_cluster_tolerance: 0.03,
            early_exit_score: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub aspect_weight: f64,
    pub size_weight: f64,
    pub vertex_weight: f64,
    pub border_weight: f64,
    /// Aspect deviation at which the aspect score reaches zero.
    pub aspect_tolerance: f64,
    pub ideal_area_min: f64,
    pub ideal_area_max: f64,
    pub preferred_min_vertices: usize,
    pub preferred_max_vertices: usize,
    pub border_penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            aspect_weight: 0.35,
            size_weight: 0.25,
            vertex_weight: 0.15,
            border_weight: 0.25,
            aspect_tolerance: 0.4,
            ideal_area_min: 0.5,
            ideal_area_max: 0.7,
            preferred_min_vertices: 5,
            preferred_max_vertices: 8,
            border_penalty: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Canonical width in pixels; height follows the document aspect ratio.
    pub canonical_width: u32,
    /// Safety margin around the trimmed contour, as a fraction of its size.
    pub trim_margin: f64,
    /// Trim is dropped when it would keep less than this share of the warp.
    pub min_trim_area_ratio: f64,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        NormalizationConfig {
            canonical_width: 856,
            trim_margin: 0.01,
            min_trim_area_ratio: 0.85,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrientationConfig {
    pub gradient_ratio: f64,
    pub use_engine_detection: bool,
}

impl Default for OrientationConfig {
    fn default() -> Self {
        OrientationConfig {
            gradient_ratio: 1.15,
            use_engine_detection: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialConfig {
    pub high_confidence: f64,
    pub neutral_confidence: f64,
}

impl Default for TrialConfig {
    fn default() -> Self {
        TrialConfig {
            high_confidence: 0.7,
            neutral_confidence: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub enabled: bool,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub detection: DetectionConfig,
    pub scoring: ScoringConfig,
    pub normalization: NormalizationConfig,
    pub orientation: OrientationConfig,
    pub trials: TrialConfig,
    pub debug: DebugConfig,
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ExtractionError> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ExtractionError> {
        let json = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ExtractionError::ConfigError(format!(
                "Failed to read config {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_json_str(&json)
    }

    pub fn with_debug_dir(mut self, output_dir: PathBuf) -> Self {
        self.debug = DebugConfig {
            enabled: true,
            output_dir,
        };
        self
    }

    pub fn validate(&self) -> Result<(), ExtractionError> {
        let d = &self.detection;
        if d.max_dimension < 64 {
            return Err(ExtractionError::ConfigError(
                "detection.max_dimension must be at least 64".to_string(),
            ));
        }
        if d.min_vertices > d.max_vertices {
            return Err(ExtractionError::ConfigError(
                "detection.min_vertices exceeds max_vertices".to_string(),
            ));
        }
        if d.colour_aspect_min > d.colour_aspect_max || d.contour_aspect_min > d.contour_aspect_max
        {
            return Err(ExtractionError::ConfigError(
                "aspect window is inverted".to_string(),
            ));
        }

        let s = &self.scoring;
        let weights = s.aspect_weight + s.size_weight + s.vertex_weight + s.border_weight;
        if (weights - 1.0).abs() > 1e-6 {
            return Err(ExtractionError::ConfigError(format!(
                "scoring weights must sum to 1, got {:.3}",
                weights
            )));
        }
        if s.aspect_tolerance <= 0.0 || s.ideal_area_min > s.ideal_area_max {
            return Err(ExtractionError::ConfigError(
                "invalid scoring tolerances".to_string(),
            ));
        }

        if self.normalization.canonical_width < 32 {
            return Err(ExtractionError::ConfigError(
                "normalization.canonical_width must be at least 32".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_carry_tuned_thresholds() {
        let config = PipelineConfig::default();
        assert_eq!(config.detection.outer_frame_area_ratio, 0.70);
        assert_eq!(config.scoring.aspect_tolerance, 0.4);
        assert_eq!(config.trials.high_confidence, 0.7);
        assert!(!config.debug.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_overrides_defaults() {
        let config = PipelineConfig::from_json_str(
            r#"{"detection": {"outer_frame_area_ratio": 0.8}, "trials": {"high_confidence": 0.9}}"#,
        )
        .unwrap();
        assert_eq!(config.detection.outer_frame_area_ratio, 0.8);
        assert_eq!(config.detection.contour_min_area_ratio, 0.20);
        assert_eq!(config.trials.high_confidence, 0.9);
        assert_eq!(config.trials.neutral_confidence, 0.5);
    }

    #[test]
    fn test_rejects_unbalanced_weights() {
        let err = PipelineConfig::from_json_str(r#"{"scoring": {"aspect_weight": 0.9}}"#)
            .unwrap_err();
        assert!(matches!(err, ExtractionError::ConfigError(_)));
    }

    #[test]
    fn test_hue_range_wraps() {
        let red = HsvRange {
            hue_min: 340.0,
            hue_max: 20.0,
            sat_min: 0.2,
            sat_max: 1.0,
            val_min: 0.2,
            val_max: 1.0,
        };
        assert!(red.contains(350.0, 0.5, 0.5));
        assert!(red.contains(10.0, 0.5, 0.5));
        assert!(!red.contains(180.0, 0.5, 0.5));
    }
}

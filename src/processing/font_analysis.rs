use crate::models::{FontStyle, TuningProfile};
use crate::processing::detection::{contrast_range, MIN_CONTRAST};
use crate::utils::ExtractionError;
use image::DynamicImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};

const MIN_CROP_SIDE: u32 = 8;
const MIN_COMPONENTS: usize = 3;

/// Connected-component statistics of the ink in a field crop.
#[derive(Debug, Clone, PartialEq)]
pub struct FontMetrics {
    pub component_count: usize,
    /// Components per crop-height of width.
    pub density: f64,
    /// Median component height over crop height.
    pub median_height_ratio: f64,
    /// Coefficient of variation of the left-edge spacing.
    pub spacing_cv: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FontAnalysis {
    pub style: FontStyle,
    pub metrics: FontMetrics,
}

impl FontAnalysis {
    pub fn profile(&self) -> TuningProfile {
        TuningProfile::for_style(self.style)
    }
}

pub struct FontAnalyzer;

impl FontAnalyzer {
    /// Classifies the printing style of a field crop. Crops without usable
    /// ink report `StageDegraded` and the caller keeps its default profile.
    pub fn analyze(crop: &DynamicImage) -> Result<FontAnalysis, ExtractionError> {
        if crop.width() < MIN_CROP_SIDE || crop.height() < MIN_CROP_SIDE {
            return Err(ExtractionError::degraded("font_analysis", "crop too small"));
        }

        let gray = crop.to_luma8();
        if contrast_range(&gray) < MIN_CONTRAST {
            return Err(ExtractionError::degraded("font_analysis", "crop has no contrast"));
        }

        let level = otsu_level(&gray);
        let mut ink = threshold(&gray, level, ThresholdType::Binary);
        let bright = ink.pixels().filter(|p| p[0] > 0).count();
        if bright * 2 > ink.pixels().len() {
            // Dark text on a light card: make the ink the foreground.
            for pixel in ink.pixels_mut() {
                pixel[0] = 255 - pixel[0];
            }
        }

        // (left, right, height) per ink blob
        let mut boxes: Vec<(i32, i32, i32)> = find_contours::<i32>(&ink)
            .iter()
            .filter(|c| c.border_type == BorderType::Outer)
            .filter_map(|c| {
                let left = c.points.iter().map(|p| p.x).min()?;
                let right = c.points.iter().map(|p| p.x).max()?;
                let top = c.points.iter().map(|p| p.y).min()?;
                let bottom = c.points.iter().map(|p| p.y).max()?;
                Some((left, right, bottom - top + 1))
            })
            .collect();

        if boxes.len() < MIN_COMPONENTS {
            return Err(ExtractionError::degraded(
                "font_analysis",
                format!("only {} ink components", boxes.len()),
            ));
        }

        boxes.sort_by_key(|b| b.0);
        let metrics = Self::metrics(&boxes, crop.width(), crop.height());
        let style = Self::classify(&metrics);

        Ok(FontAnalysis { style, metrics })
    }

    fn metrics(boxes: &[(i32, i32, i32)], width: u32, height: u32) -> FontMetrics {
        let height_f = height as f64;

        let mut heights: Vec<i32> = boxes.iter().map(|b| b.2).collect();
        heights.sort_unstable();
        let median_height = heights[heights.len() / 2] as f64;

        let gaps: Vec<f64> = boxes.windows(2).map(|w| (w[1].0 - w[0].0) as f64).collect();
        let mean_gap = gaps.iter().sum::<f64>() / gaps.len().max(1) as f64;
        let spacing_cv = if mean_gap <= f64::EPSILON {
            f64::INFINITY
        } else {
            let variance =
                gaps.iter().map(|g| (g - mean_gap).powi(2)).sum::<f64>() / gaps.len().max(1) as f64;
            variance.sqrt() / mean_gap
        };

        FontMetrics {
            component_count: boxes.len(),
            density: boxes.len() as f64 / (width as f64 / height_f),
            median_height_ratio: median_height / height_f,
            spacing_cv,
        }
    }

    fn classify(metrics: &FontMetrics) -> FontStyle {
        // Dot-matrix glyphs break into many tiny dots.
        if metrics.median_height_ratio < 0.2 && metrics.density > 6.0 {
            FontStyle::DotMatrix
        } else if metrics.spacing_cv < 0.2 && metrics.component_count >= 4 {
            FontStyle::Monospace
        } else {
            FontStyle::Standard
        }
    }
}

use super::{contrast_range, RegionDetector, MIN_CONTRAST};
use crate::models::{DetectionConfig, DetectorKind, Point2, RegionCandidate};
use crate::processing::geometry;
use crate::utils::ExtractionError;
use image::DynamicImage;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::hough::{detect_lines, LineDetectionOptions, PolarLine};
use log::debug;

/// Rebuilds the document rectangle from the outermost strong straight edges.
pub struct DominantLineDetector {
    config: DetectionConfig,
}

/// Lines of one orientation that fall within the cluster window.
#[derive(Debug, Clone)]
struct LineCluster {
    position: f32,
    representative: PolarLine,
}

impl DominantLineDetector {
    pub fn new(config: DetectionConfig) -> Self {
        DominantLineDetector { config }
    }

    // x cos(t) + y sin(t) = r: t near 0/180 is a vertical line, t near 90 horizontal.
    fn is_vertical(&self, line: &PolarLine) -> bool {
        let angle = line.angle_in_degrees as f32;
        angle <= self.config.line_angle_tolerance || angle >= 180.0 - self.config.line_angle_tolerance
    }

    fn is_horizontal(&self, line: &PolarLine) -> bool {
        let angle = line.angle_in_degrees as f32;
        (angle - 90.0).abs() <= self.config.line_angle_tolerance
    }

    /// Where a vertical line crosses the horizontal centre line, or a
    /// horizontal line crosses the vertical one.
    fn position(line: &PolarLine, vertical: bool, cx: f32, cy: f32) -> f32 {
        let theta = (line.angle_in_degrees as f32).to_radians();
        if vertical {
            (line.r - cy * theta.sin()) / theta.cos()
        } else {
            (line.r - cx * theta.cos()) / theta.sin()
        }
    }

    fn cluster(lines: &[(f32, PolarLine)], tolerance: f32) -> Vec<LineCluster> {
        let mut sorted = lines.to_vec();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut clusters: Vec<Vec<(f32, PolarLine)>> = Vec::new();
        for entry in sorted {
            match clusters.last_mut() {
                Some(group) if entry.0 - group[group.len() - 1].0 <= tolerance => group.push(entry),
                _ => clusters.push(vec![entry]),
            }
        }

        clusters
            .into_iter()
            .map(|group| {
                let mean = group.iter().map(|(p, _)| *p).sum::<f32>() / group.len() as f32;
                let representative = group
                    .iter()
                    .min_by(|a, b| (a.0 - mean).abs().total_cmp(&(b.0 - mean).abs()))
                    .map(|(_, line)| *line)
                    .unwrap_or(group[0].1);
                LineCluster {
                    position: mean,
                    representative,
                }
            })
            .collect()
    }

    fn intersect(a: &PolarLine, b: &PolarLine) -> Option<Point2> {
        let ta = (a.angle_in_degrees as f32).to_radians();
        let tb = (b.angle_in_degrees as f32).to_radians();
        let det = ta.cos() * tb.sin() - ta.sin() * tb.cos();
        if det.abs() < 1e-6 {
            return None;
        }
        let x = (a.r * tb.sin() - b.r * ta.sin()) / det;
        let y = (ta.cos() * b.r - tb.cos() * a.r) / det;
        Some(Point2::new(x, y))
    }
}

impl RegionDetector for DominantLineDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::DominantLines
    }

    fn detect(&self, image: &DynamicImage) -> Result<Vec<RegionCandidate>, ExtractionError> {
        let gray = image.to_luma8();
        if contrast_range(&gray) < MIN_CONTRAST {
            return Err(ExtractionError::degraded("dominant_lines", "image has no contrast"));
        }

        let (width, height) = gray.dimensions();
        let blurred = gaussian_blur_f32(&gray, self.config.blur_sigma);
        let edges = canny(&blurred, self.config.canny_low, self.config.canny_high);

        let options = LineDetectionOptions {
            vote_threshold: ((width.min(height) as f64) * self.config.line_vote_ratio).max(10.0) as u32,
            suppression_radius: self.config.line_suppression_radius,
        };
        let lines = detect_lines(&edges, options);
        debug!("Hough transform found {} lines", lines.len());

        let cx = width as f32 / 2.0;
        let cy = height as f32 / 2.0;
        let mut verticals = Vec::new();
        let mut horizontals = Vec::new();
        for line in lines {
            if self.is_vertical(&line) {
                verticals.push((Self::position(&line, true, cx, cy), line));
            } else if self.is_horizontal(&line) {
                horizontals.push((Self::position(&line, false, cx, cy), line));
            }
        }

        let vertical_clusters =
            Self::cluster(&verticals, self.config.line_cluster_tolerance * width as f32);
        let horizontal_clusters =
            Self::cluster(&horizontals, self.config.line_cluster_tolerance * height as f32);
        if vertical_clusters.len() < 2 || horizontal_clusters.len() < 2 {
            return Ok(Vec::new());
        }

        // Clusters are sorted by position, so the ends are the outermost.
        let left = &vertical_clusters[0].representative;
        let right = &vertical_clusters[vertical_clusters.len() - 1].representative;
        let top = &horizontal_clusters[0].representative;
        let bottom = &horizontal_clusters[horizontal_clusters.len() - 1].representative;

        let corners = match (
            Self::intersect(left, top),
            Self::intersect(right, top),
            Self::intersect(right, bottom),
            Self::intersect(left, bottom),
        ) {
            (Some(tl), Some(tr), Some(br), Some(bl)) => [tl, tr, br, bl],
            _ => return Ok(Vec::new()),
        };

        let outside = corners.iter().any(|p| {
            !p.x.is_finite()
                || !p.y.is_finite()
                || p.x < -1.0
                || p.y < -1.0
                || p.x > width as f32
                || p.y > height as f32
        });
        if outside {
            return Ok(Vec::new());
        }

        let corners = geometry::order_corners(corners);
        let candidate = geometry::candidate_from_corners(
            corners,
            4,
            false,
            geometry::touches_border(&corners, width, height, self.config.border_margin),
            width,
            height,
            DetectorKind::DominantLines,
        );

        let c = &self.config;
        let accepted = candidate.area_ratio >= c.contour_min_area_ratio
            && candidate.aspect_ratio >= c.contour_aspect_min
            && candidate.aspect_ratio <= c.contour_aspect_max
            && !(candidate.touches_border && candidate.area_ratio > c.outer_frame_area_ratio);
        if !accepted {
            debug!(
                "Line rectangle rejected: area ratio {:.3}, aspect {:.3}",
                candidate.area_ratio, candidate.aspect_ratio
            );
            return Ok(Vec::new());
        }

        Ok(vec![candidate])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    #[test]
    fn test_rectangle_from_outer_lines() {
        let mut image = GrayImage::from_pixel(400, 300, Luma([30]));
        draw_filled_rect_mut(&mut image, Rect::at(60, 50).of_size(280, 180), Luma([210]));

        let detector = DominantLineDetector::new(DetectionConfig::default());
        let found = detector.detect(&DynamicImage::ImageLuma8(image)).unwrap();
        assert_eq!(found.len(), 1);

        let candidate = &found[0];
        assert!((candidate.corners[0].x - 60.0).abs() < 4.0);
        assert!((candidate.corners[0].y - 50.0).abs() < 4.0);
        assert!((candidate.corners[2].x - 340.0).abs() < 4.0);
        assert!((candidate.corners[2].y - 230.0).abs() < 4.0);
        assert_eq!(candidate.vertex_count, 4);
    }

    #[test]
    fn test_intersection_of_axis_lines() {
        let vertical = PolarLine {
            r: 60.0,
            angle_in_degrees: 0,
        };
        let horizontal = PolarLine {
            r: 50.0,
            angle_in_degrees: 90,
        };
        let p = DominantLineDetector::intersect(&vertical, &horizontal).unwrap();
        assert!((p.x - 60.0).abs() < 1e-3);
        assert!((p.y - 50.0).abs() < 1e-3);
        assert!(DominantLineDetector::intersect(&vertical, &vertical).is_none());
    }

    #[test]
    fn test_clustering_merges_close_lines() {
        let line = |r: f32| PolarLine {
            r,
            angle_in_degrees: 0,
        };
        let clusters = DominantLineDetector::cluster(
            &[(60.0, line(60.0)), (62.0, line(62.0)), (300.0, line(300.0))],
            10.0,
        );
        assert_eq!(clusters.len(), 2);
        assert!((clusters[0].position - 61.0).abs() < 1e-3);
    }
}

use crate::models::{DetectorKind, Point2, RegionCandidate};
use imageproc::geometry::{approximate_polygon_dp, arc_length, contour_area, min_area_rect};
use imageproc::point::Point;

/// Unsigned area of a closed polygon.
pub fn polygon_area(points: &[Point2]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let points: Vec<Point<f32>> = points.iter().map(|p| Point::new(p.x, p.y)).collect();
    contour_area(&points).abs()
}

/// Orders four corners as top-left, top-right, bottom-right, bottom-left.
///
/// The smallest and largest `x + y` pick top-left and bottom-right, the
/// smallest and largest `y - x` pick top-right and bottom-left. When two
/// picks land on the same point (a square rotated by 45°, repeated corners)
/// the corners are ordered by angle around their centroid instead.
pub fn order_corners(corners: [Point2; 4]) -> [Point2; 4] {
    let sum = |p: &Point2| p.x + p.y;
    let diff = |p: &Point2| p.y - p.x;

    let index_by = |key: &dyn Fn(&Point2) -> f32, want_max: bool| -> usize {
        let mut best = 0;
        for i in 1..4 {
            let better = if want_max {
                key(&corners[i]) > key(&corners[best])
            } else {
                key(&corners[i]) < key(&corners[best])
            };
            if better {
                best = i;
            }
        }
        best
    };

    let tl = index_by(&sum, false);
    let br = index_by(&sum, true);
    let tr = index_by(&diff, false);
    let bl = index_by(&diff, true);

    let mut used = [false; 4];
    let mut distinct = true;
    for i in [tl, tr, br, bl] {
        if used[i] {
            distinct = false;
        }
        used[i] = true;
    }

    if distinct {
        [corners[tl], corners[tr], corners[br], corners[bl]]
    } else {
        order_by_angle(corners)
    }
}

fn order_by_angle(corners: [Point2; 4]) -> [Point2; 4] {
    let cx = corners.iter().map(|p| p.x).sum::<f32>() / 4.0;
    let cy = corners.iter().map(|p| p.y).sum::<f32>() / 4.0;

    let mut sorted = corners;
    // y grows downwards, so ascending atan2 walks clockwise from the left.
    sorted.sort_by(|a, b| {
        let angle_a = (a.y - cy).atan2(a.x - cx);
        let angle_b = (b.y - cy).atan2(b.x - cx);
        angle_a.total_cmp(&angle_b)
    });

    let start = (0..4)
        .min_by(|&i, &j| (sorted[i].x + sorted[i].y).total_cmp(&(sorted[j].x + sorted[j].y)))
        .unwrap_or(0);
    [
        sorted[start],
        sorted[(start + 1) % 4],
        sorted[(start + 2) % 4],
        sorted[(start + 3) % 4],
    ]
}

/// Mean width and mean height of an ordered quadrilateral.
pub fn quad_dimensions(corners: &[Point2; 4]) -> (f64, f64) {
    let [tl, tr, br, bl] = corners;
    let width = (tl.distance(tr) + bl.distance(br)) / 2.0;
    let height = (tl.distance(bl) + tr.distance(br)) / 2.0;
    (width, height)
}

/// Long side over short side of an ordered quadrilateral, never below 1.
pub fn quad_aspect_ratio(corners: &[Point2; 4]) -> f64 {
    let (width, height) = quad_dimensions(corners);
    let short = width.min(height);
    if short <= f64::EPSILON {
        return 0.0;
    }
    width.max(height) / short
}

pub fn touches_border(points: &[Point2], width: u32, height: u32, margin: f32) -> bool {
    let max_x = width as f32 - 1.0 - margin;
    let max_y = height as f32 - 1.0 - margin;
    points
        .iter()
        .any(|p| p.x <= margin || p.y <= margin || p.x >= max_x || p.y >= max_y)
}

pub fn to_point2(points: &[Point<i32>]) -> Vec<Point2> {
    points
        .iter()
        .map(|p| Point2::new(p.x as f32, p.y as f32))
        .collect()
}

/// Vertices of the Douglas-Peucker approximation of a closed contour, with
/// the tolerance given relative to its perimeter.
pub fn approximate_vertex_count(points: &[Point<i32>], epsilon_ratio: f64) -> usize {
    if points.len() < 3 {
        return points.len();
    }

    let epsilon = (arc_length(points, true) * epsilon_ratio).max(1.0);
    let mut approx = to_point2(&approximate_polygon_dp(points, epsilon, true));
    if approx.len() > 1 && approx.first() == approx.last() {
        approx.pop();
    }
    prune_collinear(&mut approx, epsilon);
    approx.len()
}

// The traced start point survives the approximation even on a straight edge.
fn prune_collinear(points: &mut Vec<Point2>, epsilon: f64) {
    let mut i = 0;
    let mut stable = 0;
    while points.len() > 3 && stable < points.len() {
        let n = points.len();
        let prev = points[(i + n - 1) % n];
        let here = points[i % n];
        let next = points[(i + 1) % n];

        if distance_to_line(&here, &prev, &next) < epsilon {
            points.remove(i % n);
            stable = 0;
        } else {
            stable += 1;
            i += 1;
        }
        i %= points.len().max(1);
    }
}

fn distance_to_line(p: &Point2, a: &Point2, b: &Point2) -> f64 {
    let length = a.distance(b);
    if length <= f64::EPSILON {
        return p.distance(a);
    }
    let cross = (b.x - a.x) as f64 * (p.y - a.y) as f64 - (b.y - a.y) as f64 * (p.x - a.x) as f64;
    cross.abs() / length
}

/// Grows an ordered quadrilateral away from its centroid by `fraction`.
pub fn pad_quad(corners: [Point2; 4], fraction: f64, width: u32, height: u32) -> [Point2; 4] {
    let cx = corners.iter().map(|p| p.x).sum::<f32>() / 4.0;
    let cy = corners.iter().map(|p| p.y).sum::<f32>() / 4.0;
    let grow = 1.0 + fraction as f32;
    let max_x = width.saturating_sub(1) as f32;
    let max_y = height.saturating_sub(1) as f32;

    corners.map(|p| {
        Point2::new(
            (cx + (p.x - cx) * grow).clamp(0.0, max_x),
            (cy + (p.y - cy) * grow).clamp(0.0, max_y),
        )
    })
}

/// Builds a candidate from the rotated minimum-area rectangle of `points`.
pub fn candidate_from_contour(
    points: &[Point<i32>],
    vertex_count: usize,
    nested: bool,
    image_width: u32,
    image_height: u32,
    border_margin: f32,
    source: DetectorKind,
) -> Option<RegionCandidate> {
    if points.len() < 4 {
        return None;
    }

    let rect = min_area_rect(points);
    let corners = order_corners(rect.map(|p| Point2::new(p.x as f32, p.y as f32)));
    let contour = to_point2(points);
    Some(candidate_from_corners(
        corners,
        vertex_count,
        nested,
        touches_border(&contour, image_width, image_height, border_margin),
        image_width,
        image_height,
        source,
    ))
}

pub fn candidate_from_corners(
    corners: [Point2; 4],
    vertex_count: usize,
    nested: bool,
    touches_border: bool,
    image_width: u32,
    image_height: u32,
    source: DetectorKind,
) -> RegionCandidate {
    let area = polygon_area(&corners);
    let image_area = (image_width as f64 * image_height as f64).max(1.0);

    RegionCandidate {
        corners,
        area,
        area_ratio: area / image_area,
        aspect_ratio: quad_aspect_ratio(&corners),
        vertex_count,
        touches_border,
        nested,
        score: 0.0,
        source,
    }
}

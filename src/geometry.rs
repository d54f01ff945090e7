//! Geometry kernel for zone evaluation.
//!
//! All coordinates are normalized to the camera frame (`0.0..=1.0` on both
//! axes). Every test here is a pure function over `f64` values. Comparisons
//! are exact unless a [`Tolerance`] with a non-zero epsilon is supplied, in
//! which case anything within `epsilon` of a zone edge counts as touching it.
//!
//! Boundaries are inclusive: a point on a polygon edge is inside, and a box
//! that only touches a polygon edge intersects it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized 2-D coordinate relative to frame width/height.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in normalized coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a rectangle from two opposite corners in any order.
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x: x1.min(x2),
            y: y1.min(y2),
            width: (x2 - x1).abs(),
            height: (y2 - y1).abs(),
        }
    }

    pub fn min_x(&self) -> f64 {
        self.x.min(self.x + self.width)
    }

    pub fn max_x(&self) -> f64 {
        self.x.max(self.x + self.width)
    }

    pub fn min_y(&self) -> f64 {
        self.y.min(self.y + self.height)
    }

    pub fn max_y(&self) -> f64 {
        self.y.max(self.y + self.height)
    }

    /// Corners in drawing order: top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.min_x(), self.min_y()),
            Point::new(self.max_x(), self.min_y()),
            Point::new(self.max_x(), self.max_y()),
            Point::new(self.min_x(), self.max_y()),
        ]
    }

    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.min_x() && p.x <= self.max_x() && p.y >= self.min_y() && p.y <= self.max_y()
    }

    fn edges(&self) -> [(Point, Point); 4] {
        let [a, b, c, d] = self.corners();
        [(a, b), (b, c), (c, d), (d, a)]
    }

    fn expanded(&self, margin: f64) -> Rect {
        Rect::from_corners(
            self.min_x() - margin,
            self.min_y() - margin,
            self.max_x() + margin,
            self.max_y() + margin,
        )
    }

    fn overlaps(&self, other: &Rect) -> bool {
        self.min_x() <= other.max_x()
            && other.min_x() <= self.max_x()
            && self.min_y() <= other.max_y()
            && other.min_y() <= self.max_y()
    }
}

/// Center of a bounding box.
pub fn centroid(rect: &Rect) -> Point {
    Point::new(
        (rect.min_x() + rect.max_x()) / 2.0,
        (rect.min_y() + rect.max_y()) / 2.0,
    )
}

/// Distance below which a detection is treated as touching a zone edge.
///
/// The default is exact. A small epsilon (e.g. `0.005`, half a percent of the
/// frame) keeps decisions stable when detector boxes jitter across an edge.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Tolerance {
    pub epsilon: f64,
}

impl Tolerance {
    pub const EXACT: Tolerance = Tolerance { epsilon: 0.0 };

    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon: if epsilon.is_finite() {
                epsilon.max(0.0)
            } else {
                0.0
            },
        }
    }

    fn is_exact(&self) -> bool {
        self.epsilon <= 0.0
    }
}

/// Reasons a drawn polygon cannot be evaluated.
#[derive(Clone, Debug, PartialEq)]
pub enum PolygonError {
    /// Fewer than three distinct vertices.
    TooFewVertices { found: usize },
    /// A coordinate is NaN or infinite.
    NonFiniteCoordinate { index: usize },
    /// A coordinate lies outside the normalized frame.
    OutOfFrame { index: usize },
    /// All vertices are collinear, so the polygon has no interior.
    Degenerate,
}

impl fmt::Display for PolygonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolygonError::TooFewVertices { found } => {
                write!(f, "polygon needs at least 3 distinct vertices, found {}", found)
            }
            PolygonError::NonFiniteCoordinate { index } => {
                write!(f, "vertex {} has a non-finite coordinate", index)
            }
            PolygonError::OutOfFrame { index } => {
                write!(f, "vertex {} lies outside the 0..1 frame", index)
            }
            PolygonError::Degenerate => write!(f, "polygon vertices are collinear"),
        }
    }
}

impl std::error::Error for PolygonError {}

/// A validated zone polygon.
///
/// Only constructible through [`Polygon::new`], so evaluation never has to
/// re-check vertex counts or coordinate ranges.
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    vertices: Vec<Point>,
    bounds: Rect,
}

impl Polygon {
    /// Validates and normalizes a vertex list.
    ///
    /// Consecutive duplicates and an explicit closing vertex are dropped.
    /// Self-intersecting outlines are accepted and evaluated with the
    /// even-odd rule.
    pub fn new(points: Vec<Point>) -> Result<Self, PolygonError> {
        for (index, p) in points.iter().enumerate() {
            if !p.x.is_finite() || !p.y.is_finite() {
                return Err(PolygonError::NonFiniteCoordinate { index });
            }
            if !(0.0..=1.0).contains(&p.x) || !(0.0..=1.0).contains(&p.y) {
                return Err(PolygonError::OutOfFrame { index });
            }
        }

        let mut vertices: Vec<Point> = Vec::with_capacity(points.len());
        for p in points {
            if vertices.last() != Some(&p) {
                vertices.push(p);
            }
        }
        while vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }

        let distinct = vertices
            .iter()
            .enumerate()
            .filter(|(i, p)| !vertices[..*i].contains(p))
            .count();
        if distinct < 3 {
            return Err(PolygonError::TooFewVertices { found: distinct });
        }

        let origin = vertices[0];
        let Some(direction) = vertices.iter().copied().find(|p| *p != origin) else {
            return Err(PolygonError::Degenerate);
        };
        if vertices
            .iter()
            .all(|p| orientation(origin, direction, *p) == 0.0)
        {
            return Err(PolygonError::Degenerate);
        }

        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for p in &vertices {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }

        Ok(Self {
            vertices,
            bounds: Rect::from_corners(min_x, min_y, max_x, max_y),
        })
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }
}

/// Point-in-polygon test (even-odd rule, boundary inclusive).
pub fn contains(polygon: &Polygon, point: Point, tolerance: Tolerance) -> bool {
    if !polygon
        .bounds
        .expanded(tolerance.epsilon)
        .contains_point(point)
    {
        return false;
    }

    if polygon
        .edges()
        .any(|(a, b)| near_segment(point, a, b, tolerance))
    {
        return true;
    }

    let mut inside = false;
    for (a, b) in polygon.edges() {
        if (a.y > point.y) != (b.y > point.y) {
            let x_cross = a.x + (point.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if point.x < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

/// True when the rectangle and polygon share any area or touch.
pub fn intersects(polygon: &Polygon, rect: &Rect, tolerance: Tolerance) -> bool {
    if !polygon.bounds.expanded(tolerance.epsilon).overlaps(rect) {
        return false;
    }

    // Covers a box lying entirely inside the polygon.
    if rect
        .corners()
        .iter()
        .any(|corner| contains(polygon, *corner, tolerance))
    {
        return true;
    }

    // Covers a polygon lying entirely inside the box.
    let reach = rect.expanded(tolerance.epsilon);
    if polygon.vertices.iter().any(|v| reach.contains_point(*v)) {
        return true;
    }

    let box_edges = rect.edges();
    polygon.edges().any(|(a, b)| {
        box_edges
            .iter()
            .any(|(c, d)| segments_within(a, b, *c, *d, tolerance))
    })
}

/// Signed area of the triangle (a, b, c), doubled.
fn orientation(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn within_span(a: Point, b: Point, p: Point) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

fn near_segment(p: Point, a: Point, b: Point, tolerance: Tolerance) -> bool {
    if tolerance.is_exact() {
        return orientation(a, b, p) == 0.0 && within_span(a, b, p);
    }
    point_segment_distance_sq(p, a, b) <= tolerance.epsilon * tolerance.epsilon
}

fn point_segment_distance_sq(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (qx, qy) = (a.x + t * dx, a.y + t * dy);
    (p.x - qx) * (p.x - qx) + (p.y - qy) * (p.y - qy)
}

fn segments_intersect(p1: Point, p2: Point, q1: Point, q2: Point) -> bool {
    let d1 = orientation(q1, q2, p1);
    let d2 = orientation(q1, q2, p2);
    let d3 = orientation(p1, p2, q1);
    let d4 = orientation(p1, p2, q2);

    let straddles = |a: f64, b: f64| (a > 0.0 && b < 0.0) || (a < 0.0 && b > 0.0);
    if straddles(d1, d2) && straddles(d3, d4) {
        return true;
    }

    (d1 == 0.0 && within_span(q1, q2, p1))
        || (d2 == 0.0 && within_span(q1, q2, p2))
        || (d3 == 0.0 && within_span(p1, p2, q1))
        || (d4 == 0.0 && within_span(p1, p2, q2))
}

fn segments_within(p1: Point, p2: Point, q1: Point, q2: Point, tolerance: Tolerance) -> bool {
    if segments_intersect(p1, p2, q1, q2) {
        return true;
    }
    if tolerance.is_exact() {
        return false;
    }
    let limit = tolerance.epsilon * tolerance.epsilon;
    point_segment_distance_sq(p1, q1, q2) <= limit
        || point_segment_distance_sq(p2, q1, q2) <= limit
        || point_segment_distance_sq(q1, p1, p2) <= limit
        || point_segment_distance_sq(q2, p1, p2) <= limit
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poly(points: &[[f64; 2]]) -> Polygon {
        Polygon::new(points.iter().copied().map(Point::from).collect()).expect("valid polygon")
    }

    fn left_half() -> Polygon {
        poly(&[[0.0, 0.0], [0.5, 0.0], [0.5, 1.0], [0.0, 1.0]])
    }

    #[test]
    fn centroid_is_box_center() {
        let c = centroid(&Rect::new(0.1, 0.2, 0.2, 0.4));
        assert!((c.x - 0.2).abs() < 1e-12);
        assert!((c.y - 0.4).abs() < 1e-12);
    }

    #[test]
    fn contains_interior_and_rejects_exterior() {
        let zone = left_half();
        assert!(contains(&zone, Point::new(0.25, 0.5), Tolerance::EXACT));
        assert!(!contains(&zone, Point::new(0.75, 0.5), Tolerance::EXACT));
    }

    #[test]
    fn boundary_points_are_inside() {
        let zone = left_half();
        assert!(contains(&zone, Point::new(0.5, 0.5), Tolerance::EXACT));
        assert!(contains(&zone, Point::new(0.0, 0.0), Tolerance::EXACT));
        assert!(contains(&zone, Point::new(0.25, 1.0), Tolerance::EXACT));
    }

    #[test]
    fn concave_notch_is_outside() {
        // L-shape: the upper-right quadrant is cut away.
        let zone = poly(&[
            [0.0, 0.0],
            [0.5, 0.0],
            [0.5, 0.5],
            [1.0, 0.5],
            [1.0, 1.0],
            [0.0, 1.0],
        ]);
        assert!(!contains(&zone, Point::new(0.75, 0.25), Tolerance::EXACT));
        assert!(contains(&zone, Point::new(0.75, 0.75), Tolerance::EXACT));
        assert!(contains(&zone, Point::new(0.25, 0.25), Tolerance::EXACT));
    }

    #[test]
    fn self_intersecting_bowtie_uses_even_odd() {
        let bowtie = poly(&[[0.0, 0.0], [1.0, 1.0], [1.0, 0.0], [0.0, 1.0]]);
        assert!(contains(&bowtie, Point::new(0.1, 0.5), Tolerance::EXACT));
        assert!(contains(&bowtie, Point::new(0.9, 0.5), Tolerance::EXACT));
        assert!(!contains(&bowtie, Point::new(0.5, 0.1), Tolerance::EXACT));
    }

    #[test]
    fn box_inside_polygon_intersects() {
        let zone = left_half();
        assert!(intersects(
            &zone,
            &Rect::new(0.1, 0.1, 0.1, 0.1),
            Tolerance::EXACT
        ));
    }

    #[test]
    fn polygon_inside_box_intersects() {
        let zone = poly(&[[0.4, 0.4], [0.6, 0.4], [0.5, 0.6]]);
        assert!(intersects(
            &zone,
            &Rect::new(0.0, 0.0, 1.0, 1.0),
            Tolerance::EXACT
        ));
    }

    #[test]
    fn crossing_edges_intersect_without_contained_vertices() {
        let strip = poly(&[[0.45, 0.1], [0.55, 0.1], [0.55, 0.9], [0.45, 0.9]]);
        let bar = Rect::from_corners(0.1, 0.45, 0.9, 0.55);
        assert!(intersects(&strip, &bar, Tolerance::EXACT));
    }

    #[test]
    fn disjoint_box_does_not_intersect() {
        let zone = left_half();
        assert!(!intersects(
            &zone,
            &Rect::new(0.7, 0.7, 0.1, 0.1),
            Tolerance::EXACT
        ));
    }

    #[test]
    fn touching_edge_counts_as_intersecting() {
        let zone = left_half();
        assert!(intersects(
            &zone,
            &Rect::new(0.5, 0.2, 0.2, 0.2),
            Tolerance::EXACT
        ));
    }

    #[test]
    fn epsilon_absorbs_near_misses() {
        let zone = left_half();
        let near = Rect::new(0.51, 0.2, 0.2, 0.2);
        assert!(!intersects(&zone, &near, Tolerance::EXACT));
        assert!(intersects(&zone, &near, Tolerance::new(0.02)));

        let point = Point::new(0.505, 0.5);
        assert!(!contains(&zone, point, Tolerance::EXACT));
        assert!(contains(&zone, point, Tolerance::new(0.01)));
    }

    #[test]
    fn tolerance_rejects_negative_and_nan() {
        assert_eq!(Tolerance::new(-1.0), Tolerance::EXACT);
        assert_eq!(Tolerance::new(f64::NAN), Tolerance::EXACT);
    }

    #[test]
    fn validation_rejects_short_outlines() {
        let err = Polygon::new(vec![Point::new(0.1, 0.1), Point::new(0.2, 0.2)]).unwrap_err();
        assert_eq!(err, PolygonError::TooFewVertices { found: 2 });

        // Closing vertex and repeats do not count as distinct.
        let err = Polygon::new(vec![
            Point::new(0.1, 0.1),
            Point::new(0.2, 0.2),
            Point::new(0.2, 0.2),
            Point::new(0.1, 0.1),
        ])
        .unwrap_err();
        assert_eq!(err, PolygonError::TooFewVertices { found: 2 });
    }

    #[test]
    fn validation_rejects_collinear_and_out_of_frame() {
        let err = Polygon::new(vec![
            Point::new(0.1, 0.1),
            Point::new(0.2, 0.2),
            Point::new(0.3, 0.3),
        ])
        .unwrap_err();
        assert_eq!(err, PolygonError::Degenerate);

        let err = Polygon::new(vec![
            Point::new(0.1, 0.1),
            Point::new(1.2, 0.2),
            Point::new(0.3, 0.9),
        ])
        .unwrap_err();
        assert_eq!(err, PolygonError::OutOfFrame { index: 1 });

        let err = Polygon::new(vec![
            Point::new(0.1, f64::NAN),
            Point::new(0.2, 0.2),
            Point::new(0.3, 0.9),
        ])
        .unwrap_err();
        assert_eq!(err, PolygonError::NonFiniteCoordinate { index: 0 });
    }

    #[test]
    fn validation_drops_closing_vertex() {
        let zone = poly(&[[0.0, 0.0], [0.5, 0.0], [0.5, 1.0], [0.0, 0.0]]);
        assert_eq!(zone.vertices().len(), 3);
        assert_eq!(zone.bounds(), Rect::from_corners(0.0, 0.0, 0.5, 1.0));
    }
}

//! Intersection and containment tests
//!
//! Pure functions over `Vec2`. Degenerate input (zero-length segments,
//! zero or NaN radii, NaN coordinates) reports "no hit" rather than
//! dividing by zero: a missed occlusion corrects itself next frame,
//! a panic stops rendering.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::consts::{DEGENERATE_LENGTH_SQ, PARALLEL_EPSILON, PARAM_EPSILON};

/// A single blocking edge in world space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub p1: Vec2,
    pub p2: Vec2,
}

impl Segment {
    pub fn new(p1: Vec2, p2: Vec2) -> Self {
        Self { p1, p2 }
    }

    #[inline]
    pub fn direction(&self) -> Vec2 {
        self.p2 - self.p1
    }

    #[inline]
    pub fn length_squared(&self) -> f32 {
        self.direction().length_squared()
    }

    /// True for zero-length or non-finite segments
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        !(self.length_squared() > DEGENERATE_LENGTH_SQ)
    }
}

/// Axis-aligned rectangle (inclusive bounds)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    /// Build from any two opposite corners
    pub fn from_corners(a: Vec2, b: Vec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// The four edges, counter-clockwise from the min corner
    pub fn edges(&self) -> [Segment; 4] {
        let bl = self.min;
        let br = Vec2::new(self.max.x, self.min.y);
        let tr = self.max;
        let tl = Vec2::new(self.min.x, self.max.y);
        [
            Segment::new(bl, br),
            Segment::new(br, tr),
            Segment::new(tr, tl),
            Segment::new(tl, bl),
        ]
    }
}

/// Intersection point of two segments.
///
/// Parallel and collinear segments report no intersection: an edge
/// grazing along another edge does not block at a single point.
pub fn segments_intersect(a: &Segment, b: &Segment) -> Option<Vec2> {
    let r = a.direction();
    let s = b.direction();
    let denom = r.perp_dot(s);
    // Negated so NaN also bails out
    if !(denom.abs() > PARALLEL_EPSILON) {
        return None;
    }

    let qp = b.p1 - a.p1;
    let t = qp.perp_dot(s) / denom;
    let u = qp.perp_dot(r) / denom;

    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some(a.p1 + r * t)
    } else {
        None
    }
}

/// Parameter `t` along the ray `origin -> end` where it crosses `seg`.
///
/// Both parameters are validated on both sides: `t` outside `[0, 1]` is
/// behind the origin or past the end of the ray, `u` outside `[0, 1]` misses
/// the segment. A small slack absorbs rounding on exact endpoint hits.
pub fn ray_segment_intersection(origin: Vec2, end: Vec2, seg: &Segment) -> Option<f32> {
    let r = end - origin;
    let s = seg.direction();
    let denom = r.perp_dot(s);
    if !(denom.abs() > PARALLEL_EPSILON) {
        return None;
    }

    let qp = seg.p1 - origin;
    let t = qp.perp_dot(s) / denom;
    let u = qp.perp_dot(r) / denom;

    let range = -PARAM_EPSILON..=1.0 + PARAM_EPSILON;
    if range.contains(&t) && range.contains(&u) {
        Some(t.clamp(0.0, 1.0))
    } else {
        None
    }
}

/// Closest point on `seg` to `p`, or `None` for a degenerate segment
pub fn closest_point_on_segment(p: Vec2, seg: &Segment) -> Option<Vec2> {
    if seg.is_degenerate() {
        return None;
    }
    let d = seg.direction();
    let t = ((p - seg.p1).dot(d) / seg.length_squared()).clamp(0.0, 1.0);
    let closest = seg.p1 + d * t;
    closest.is_finite().then_some(closest)
}

/// True if the segment comes within `radius` of `center` (touching counts)
pub fn segment_intersects_circle(seg: &Segment, center: Vec2, radius: f32) -> bool {
    if !(radius > 0.0) || !center.is_finite() {
        return false;
    }
    match closest_point_on_segment(center, seg) {
        Some(closest) => closest.distance_squared(center) <= radius * radius,
        None => false,
    }
}

/// Inclusive point-in-rectangle test
#[inline]
pub fn point_in_rect(p: Vec2, rect: &Rect) -> bool {
    p.x >= rect.min.x && p.x <= rect.max.x && p.y >= rect.min.y && p.y <= rect.max.y
}

/// True if either endpoint is inside `rect` or the segment crosses an edge
pub fn segment_intersects_rect(seg: &Segment, rect: &Rect) -> bool {
    if seg.is_degenerate() {
        return false;
    }
    if point_in_rect(seg.p1, rect) || point_in_rect(seg.p2, rect) {
        return true;
    }
    rect.edges()
        .iter()
        .any(|edge| segments_intersect(seg, edge).is_some())
}

/// Ray-casting point-in-polygon test (odd crossings = inside)
pub fn point_in_polygon(p: Vec2, vertices: &[Vec2]) -> bool {
    let n = vertices.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let vi = vertices[i];
        let vj = vertices[j];
        if (vi.y > p.y) != (vj.y > p.y) {
            let intersect_x = (vj.x - vi.x) * (p.y - vi.y) / (vj.y - vi.y) + vi.x;
            if p.x < intersect_x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Polygon area via the shoelace formula, positive for either winding
pub fn polygon_area(vertices: &[Vec2]) -> f32 {
    let n = vertices.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        area += vertices[i].perp_dot(vertices[j]);
    }
    area.abs() / 2.0
}

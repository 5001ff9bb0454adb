//! Visibility polygons via angular ray sweep
//!
//! Rays are cast from the viewpoint toward every blocking endpoint, a hair
//! either side of it (so both faces of a corner resolve), toward the points
//! where blockers cross the sight circle, and at evenly spaced angles so
//! open space follows the circle. Each ray keeps its closest hit; the hits
//! sorted by angle form the polygon.

use std::f32::consts::{PI, TAU};

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::primitives::{
    Rect, Segment, point_in_polygon, polygon_area, ray_segment_intersection,
    segment_intersects_circle,
};
use crate::consts::{DEFAULT_CIRCLE_SAMPLES, PARAM_EPSILON, RAY_ANGLE_EPSILON};
use crate::{angle_between, normalize_angle, polar_to_cartesian};

/// Stable viewer identifier (a light, or a token's eye)
pub type ViewerId = u32;

/// A point that sees or illuminates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewer {
    pub id: ViewerId,
    pub position: Vec2,
    /// Maximum sight / illumination distance
    pub radius: f32,
    /// Ignores all barriers
    #[serde(default)]
    pub incorporeal: bool,
}

impl Viewer {
    pub fn new(id: ViewerId, position: Vec2, radius: f32) -> Self {
        Self {
            id,
            position,
            radius,
            incorporeal: false,
        }
    }
}

/// Sweep tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepParams {
    /// Evenly spaced rays around the full circle
    pub circle_samples: usize,
    /// Angular offset of the extra rays either side of an endpoint
    pub ray_epsilon: f32,
}

impl Default for SweepParams {
    fn default() -> Self {
        Self {
            circle_samples: DEFAULT_CIRCLE_SAMPLES,
            ray_epsilon: RAY_ANGLE_EPSILON,
        }
    }
}

/// Closed region visible from a point, vertices ordered by angle.
///
/// Produced fresh for each (viewer, barrier set); never edited in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisibilityPolygon {
    points: Vec<Vec2>,
}

impl VisibilityPolygon {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.len() < 3
    }

    pub fn contains(&self, p: Vec2) -> bool {
        point_in_polygon(p, &self.points)
    }

    pub fn area(&self) -> f32 {
        polygon_area(&self.points)
    }

    /// Axis-aligned bounds, None when empty
    pub fn bounds(&self) -> Option<Rect> {
        let first = *self.points.first()?;
        let (min, max) = self
            .points
            .iter()
            .fold((first, first), |(lo, hi), &p| (lo.min(p), hi.max(p)));
        Some(Rect { min, max })
    }
}

/// Visibility polygon with default sweep parameters
pub fn compute_visibility_polygon(
    viewpoint: Vec2,
    radius: f32,
    segments: &[Segment],
) -> VisibilityPolygon {
    compute_visibility_polygon_with(viewpoint, radius, segments, &SweepParams::default())
}

/// Visibility polygon from `viewpoint` out to `radius`, blocked by `segments`
pub fn compute_visibility_polygon_with(
    viewpoint: Vec2,
    radius: f32,
    segments: &[Segment],
    params: &SweepParams,
) -> VisibilityPolygon {
    if !(radius > 0.0) || !radius.is_finite() || !viewpoint.is_finite() {
        return VisibilityPolygon::empty();
    }
    let samples = params.circle_samples.max(3);

    // Anything that can't reach the sight circle can't block
    let blockers: Vec<&Segment> = segments
        .iter()
        .filter(|s| segment_intersects_circle(s, viewpoint, radius))
        .collect();

    if blockers.is_empty() {
        return VisibilityPolygon {
            points: circle_points(viewpoint, radius, samples),
        };
    }

    let eps = params.ray_epsilon;
    let mut angles = Vec::with_capacity(blockers.len() * 8 + samples);
    let mut push_target = |target: Vec2| {
        let a = angle_between(viewpoint, target);
        if a.is_finite() {
            angles.push(a);
            angles.push(normalize_angle(a - eps));
            angles.push(normalize_angle(a + eps));
        }
    };
    for seg in &blockers {
        push_target(seg.p1);
        push_target(seg.p2);
        for crossing in circle_crossings(seg, viewpoint, radius).into_iter().flatten() {
            push_target(crossing);
        }
    }
    angles.extend((0..samples).map(|i| -PI + TAU * i as f32 / samples as f32));

    angles.sort_by(f32::total_cmp);
    angles.dedup();

    let mut points: Vec<Vec2> = Vec::with_capacity(angles.len());
    for &angle in &angles {
        let hit = cast_ray(viewpoint, radius, angle, &blockers);
        if points
            .last()
            .is_some_and(|last| last.distance_squared(hit) < 1.0e-8)
        {
            continue;
        }
        points.push(hit);
    }
    if points.len() > 1 && points[0].distance_squared(points[points.len() - 1]) < 1.0e-8 {
        points.pop();
    }

    VisibilityPolygon { points }
}

/// Closest hit along a ray of length `radius`, or the circle point.
///
/// Hits at the viewpoint itself are skipped: a viewer standing on a
/// barrier sees along both of its faces.
fn cast_ray(viewpoint: Vec2, radius: f32, angle: f32, blockers: &[&Segment]) -> Vec2 {
    let end = viewpoint + polar_to_cartesian(radius, angle);
    let t = blockers
        .iter()
        .filter_map(|seg| ray_segment_intersection(viewpoint, end, seg))
        .filter(|&t| t > PARAM_EPSILON)
        .fold(1.0_f32, f32::min);
    viewpoint + (end - viewpoint) * t
}

fn circle_points(center: Vec2, radius: f32, samples: usize) -> Vec<Vec2> {
    (0..samples)
        .map(|i| center + polar_to_cartesian(radius, -PI + TAU * i as f32 / samples as f32))
        .collect()
}

/// Points where `seg` crosses the circle boundary (0, 1 or 2)
fn circle_crossings(seg: &Segment, center: Vec2, radius: f32) -> [Option<Vec2>; 2] {
    let d = seg.direction();
    let f = seg.p1 - center;
    let a = d.length_squared();
    let b = 2.0 * f.dot(d);
    let c = f.length_squared() - radius * radius;
    let disc = b * b - 4.0 * a * c;
    if !(a > 0.0) || !(disc >= 0.0) {
        return [None, None];
    }
    let root = disc.sqrt();
    let at = |t: f32| (0.0..=1.0).contains(&t).then(|| seg.p1 + d * t);
    [at((-b - root) / (2.0 * a)), at((-b + root) / (2.0 * a))]
}

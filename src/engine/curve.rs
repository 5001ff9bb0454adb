//! Curve flattening for curved barriers and authored paths
//!
//! A barrier is described by its two endpoints plus optional control
//! points; the engine only ever sees the resulting polyline:
//! - 0 control points: straight line, `segments + 1` points
//! - 1 control point: quadratic Bézier passing through the control point
//! - 2+ control points: cubic spans with centripetal Catmull-Rom tangents
//!
//! End tangents are one-sided. Endpoints are never duplicated to invent a
//! tangent: duplicated knots give zero-length parameter intervals and the
//! divisions turn into NaN.

use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec2;

use super::barrier::{Barrier, BarrierId};
use crate::consts::DEGENERATE_LENGTH_SQ;

/// Flatten an open curve from `p1` to `p2` through `control_points`
pub fn flatten(p1: Vec2, p2: Vec2, control_points: &[Vec2], segments: usize) -> Vec<Vec2> {
    let n = segments.max(1);
    let controls: Vec<Vec2> = control_points
        .iter()
        .copied()
        .filter(|p| p.is_finite())
        .collect();

    match controls.as_slice() {
        [] => linear(p1, p2, n),
        [c] => quadratic_through(p1, *c, p2, n),
        _ => {
            let mut points = Vec::with_capacity(controls.len() + 2);
            points.push(p1);
            points.extend(controls);
            points.push(p2);
            catmull_rom(&points, n, false)
        }
    }
}

/// Flatten a closed loop through `points`.
///
/// Indices wrap modulo the point count; the returned polyline ends on its
/// first point so consumers can walk it edge by edge.
pub fn flatten_closed(points: &[Vec2], segments: usize) -> Vec<Vec2> {
    let points: Vec<Vec2> = points.iter().copied().filter(|p| p.is_finite()).collect();
    catmull_rom(&points, segments.max(1), true)
}

fn linear(p1: Vec2, p2: Vec2, n: usize) -> Vec<Vec2> {
    (0..=n)
        .map(|i| {
            let t = i as f32 / n as f32;
            p1.lerp(p2, t)
        })
        .collect()
}

/// Quadratic Bézier whose midpoint (t = 0.5) lands on `through`
fn quadratic_through(p1: Vec2, through: Vec2, p2: Vec2, n: usize) -> Vec<Vec2> {
    let ctrl = through * 2.0 - (p1 + p2) * 0.5;
    (0..=n)
        .map(|i| {
            let t = i as f32 / n as f32;
            let mt = 1.0 - t;
            p1 * (mt * mt) + ctrl * (2.0 * mt * t) + p2 * (t * t)
        })
        .collect()
}

#[inline]
fn cubic(p0: Vec2, b1: Vec2, b2: Vec2, p1: Vec2, t: f32) -> Vec2 {
    let mt = 1.0 - t;
    p0 * (mt * mt * mt) + b1 * (3.0 * mt * mt * t) + b2 * (3.0 * mt * t * t) + p1 * (t * t * t)
}

/// Drop consecutive points that coincide (and, for loops, a last point
/// equal to the first)
fn collapse_coincident(points: &[Vec2], closed: bool) -> Vec<Vec2> {
    let mut out: Vec<Vec2> = Vec::with_capacity(points.len());
    for &p in points {
        match out.last() {
            Some(&last) if last.distance_squared(p) <= DEGENERATE_LENGTH_SQ => {}
            _ => out.push(p),
        }
    }
    if closed && out.len() > 1 {
        if let (Some(&first), Some(&last)) = (out.first(), out.last()) {
            if first.distance_squared(last) <= DEGENERATE_LENGTH_SQ {
                out.pop();
            }
        }
    }
    out
}

fn catmull_rom(points: &[Vec2], n: usize, closed: bool) -> Vec<Vec2> {
    let pts = collapse_coincident(points, closed);
    let count = pts.len();

    match count {
        0 => return Vec::new(),
        1 => return vec![pts[0]; n + 1],
        2 if !closed => return linear(pts[0], pts[1], n),
        _ => {}
    }

    let span_count = if closed { count } else { count - 1 };
    let next = |i: usize| (i + 1) % count;
    let prev = |i: usize| (i + count - 1) % count;

    // Centripetal knot spacing; strictly positive after collapsing
    let knot: Vec<f32> = (0..span_count)
        .map(|i| pts[i].distance(pts[next(i)]).sqrt())
        .collect();

    let tangent = |i: usize| -> Vec2 {
        if !closed && i == 0 {
            return (pts[1] - pts[0]) / knot[0];
        }
        if !closed && i == count - 1 {
            return (pts[i] - pts[i - 1]) / knot[i - 1];
        }
        let (p_prev, p, p_next) = (pts[prev(i)], pts[i], pts[next(i)]);
        let dt_a = knot[prev(i) % span_count];
        let dt_b = knot[i % span_count];
        (p - p_prev) / dt_a - (p_next - p_prev) / (dt_a + dt_b) + (p_next - p) / dt_b
    };

    let mut out = Vec::with_capacity(span_count * n + 1);
    for i in 0..span_count {
        let j = next(i);
        let dt = knot[i];
        let b1 = pts[i] + tangent(i) * (dt / 3.0);
        let b2 = pts[j] - tangent(j) * (dt / 3.0);
        for k in 0..n {
            let t = k as f32 / n as f32;
            out.push(cubic(pts[i], b1, b2, pts[j], t));
        }
    }
    out.push(if closed { pts[0] } else { pts[count - 1] });
    out
}

/// Value-equality key for a flattened curve
#[derive(Debug, Clone, PartialEq)]
struct CurveKey {
    p1: Vec2,
    p2: Vec2,
    controls: Vec<Vec2>,
    segments: usize,
}

impl CurveKey {
    fn of(barrier: &Barrier, segments: usize) -> Self {
        Self {
            p1: barrier.p1,
            p2: barrier.p2,
            controls: barrier.control_points().to_vec(),
            segments,
        }
    }
}

/// Flattened polylines cached by barrier ID.
///
/// An entry is reused only while the barrier's endpoints, control points
/// and segment count compare equal to the ones it was built from.
#[derive(Debug, Default)]
pub struct FlattenCache {
    entries: HashMap<BarrierId, (CurveKey, Arc<[Vec2]>)>,
    hits: u64,
    misses: u64,
}

impl FlattenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Polyline for `barrier`, re-flattened only if its geometry changed
    pub fn polyline(&mut self, barrier: &Barrier, segments: usize) -> Arc<[Vec2]> {
        let key = CurveKey::of(barrier, segments);
        if let Some((cached_key, points)) = self.entries.get(&barrier.id) {
            if *cached_key == key {
                self.hits += 1;
                return Arc::clone(points);
            }
        }

        self.misses += 1;
        let points: Arc<[Vec2]> = barrier.polyline(segments).into();
        self.entries
            .insert(barrier.id, (key, Arc::clone(&points)));
        points
    }

    /// Drop entries for barriers that no longer exist
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(BarrierId) -> bool,
    {
        self.entries.retain(|id, _| keep(*id));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (hits, misses) since creation
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::barrier::BarrierKind;
    use proptest::prelude::*;

    fn all_finite(points: &[Vec2]) -> bool {
        points.iter().all(|p| p.is_finite())
    }

    #[test]
    fn test_linear_has_endpoints_and_n_plus_one_points() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(100.0, 50.0);
        let pts = flatten(a, b, &[], 4);
        assert_eq!(pts.len(), 5);
        assert_eq!(pts[0], a);
        assert_eq!(pts[4], b);
        assert!(pts[2].distance(Vec2::new(50.0, 25.0)) < 1e-4);
    }

    #[test]
    fn test_zero_segments_treated_as_one() {
        let pts = flatten(Vec2::ZERO, Vec2::ONE, &[], 0);
        assert_eq!(pts, vec![Vec2::ZERO, Vec2::ONE]);
    }

    #[test]
    fn test_quadratic_passes_through_control_point() {
        let a = Vec2::new(0.0, 0.0);
        let c = Vec2::new(50.0, 40.0);
        let b = Vec2::new(100.0, 0.0);
        let pts = flatten(a, b, &[c], 8);
        assert_eq!(pts.len(), 9);
        assert_eq!(pts[0], a);
        assert!(pts[8].distance(b) < 1e-4);
        assert!(pts[4].distance(c) < 1e-3);
    }

    #[test]
    fn test_catmull_rom_interpolates_all_points() {
        let a = Vec2::new(0.0, 0.0);
        let controls = [Vec2::new(30.0, 40.0), Vec2::new(70.0, -40.0)];
        let b = Vec2::new(100.0, 0.0);
        let n = 6;
        let pts = flatten(a, b, &controls, n);
        assert_eq!(pts.len(), 3 * n + 1);
        assert_eq!(pts[0], a);
        assert!(pts[n].distance(controls[0]) < 1e-3);
        assert!(pts[2 * n].distance(controls[1]) < 1e-3);
        assert!(pts[3 * n].distance(b) < 1e-3);
        assert!(all_finite(&pts));
    }

    #[test]
    fn test_coincident_points_never_nan() {
        let p = Vec2::new(10.0, 10.0);
        // Control points stacked on the endpoints
        let pts = flatten(p, Vec2::new(50.0, 10.0), &[p, p, Vec2::new(50.0, 10.0)], 8);
        assert!(all_finite(&pts));

        // Everything in one place
        let pts = flatten(p, p, &[p, p], 8);
        assert!(all_finite(&pts));
        assert_eq!(pts.len(), 9);

        let pts = flatten(p, p, &[p], 8);
        assert!(all_finite(&pts));
    }

    #[test]
    fn test_non_finite_controls_dropped() {
        let pts = flatten(Vec2::ZERO, Vec2::new(10.0, 0.0), &[Vec2::new(f32::NAN, 1.0)], 4);
        assert_eq!(pts.len(), 5);
        assert!(all_finite(&pts));
    }

    #[test]
    fn test_closed_loop_wraps() {
        let square = [
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, 0.0),
            Vec2::new(10.0, 10.0),
            Vec2::new(0.0, 10.0),
        ];
        let n = 4;
        let pts = flatten_closed(&square, n);
        assert_eq!(pts.len(), 4 * n + 1);
        assert_eq!(pts[0], pts[pts.len() - 1]);
        for (i, corner) in square.iter().enumerate() {
            assert!(pts[i * n].distance(*corner) < 1e-3);
        }
        assert!(all_finite(&pts));
    }

    #[test]
    fn test_closed_loop_with_repeated_start() {
        let pts = flatten_closed(
            &[Vec2::ZERO, Vec2::new(10.0, 0.0), Vec2::new(5.0, 8.0), Vec2::ZERO],
            3,
        );
        assert_eq!(pts.len(), 3 * 3 + 1);
        assert!(all_finite(&pts));
    }

    #[test]
    fn test_deterministic() {
        let controls = [Vec2::new(3.0, 7.0), Vec2::new(9.0, -2.0), Vec2::new(12.0, 4.0)];
        let a = flatten(Vec2::ZERO, Vec2::new(20.0, 0.0), &controls, 10);
        let b = flatten(Vec2::ZERO, Vec2::new(20.0, 0.0), &controls, 10);
        assert_eq!(a, b);
    }

    #[test]
    fn test_cache_reuses_until_geometry_changes() {
        let mut cache = FlattenCache::new();
        let mut barrier = Barrier::curved(
            7,
            Vec2::ZERO,
            Vec2::new(100.0, 0.0),
            vec![Vec2::new(50.0, 30.0)],
            BarrierKind::Wall,
        );

        let first = cache.polyline(&barrier, 8);
        let second = cache.polyline(&barrier, 8);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats(), (1, 1));

        barrier.p2 = Vec2::new(120.0, 0.0);
        let third = cache.polyline(&barrier, 8);
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(cache.stats(), (1, 2));

        cache.retain(|id| id != 7);
        assert!(cache.is_empty());
    }

    fn point() -> impl Strategy<Value = Vec2> {
        // Coarse lattice so coincident points show up often
        (-4i32..4, -4i32..4).prop_map(|(x, y)| Vec2::new(x as f32 * 10.0, y as f32 * 10.0))
    }

    proptest! {
        #[test]
        fn prop_flatten_never_nan(
            p1 in point(),
            p2 in point(),
            controls in prop::collection::vec(point(), 0..6),
            segments in 1usize..12,
        ) {
            let pts = flatten(p1, p2, &controls, segments);
            prop_assert!(all_finite(&pts));
            prop_assert_eq!(pts[0], p1);
        }

        #[test]
        fn prop_flatten_closed_never_nan(
            points in prop::collection::vec(point(), 0..8),
            segments in 1usize..8,
        ) {
            let pts = flatten_closed(&points, segments);
            prop_assert!(all_finite(&pts));
        }
    }
}

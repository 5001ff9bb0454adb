//! Authored movement paths
//!
//! Position is a pure function of time: the caller owns the clock and
//! feeds the result through the same collision/visibility checks as any
//! other move.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::curve::{flatten, flatten_closed};
use crate::consts::DEFAULT_CURVE_SEGMENTS;

/// A path followed at constant speed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Waypoints the path passes through
    pub points: Vec<Vec2>,
    /// Loop back to the first waypoint
    #[serde(default)]
    pub closed: bool,
    /// Seconds for one traversal
    pub period: f32,
    /// Flattened path and cumulative lengths
    #[serde(skip)]
    cache: Option<PathCache>,
}

#[derive(Debug, Clone, PartialEq)]
struct PathCache {
    polyline: Vec<Vec2>,
    cumulative: Vec<f32>,
}

impl Trajectory {
    pub fn new(points: Vec<Vec2>, closed: bool, period: f32) -> Self {
        let mut trajectory = Self {
            points,
            closed,
            period,
            cache: None,
        };
        trajectory.rebuild();
        trajectory
    }

    /// Re-flatten after editing `points` or `closed`
    pub fn rebuild(&mut self) {
        let polyline = match (self.closed, self.points.as_slice()) {
            (_, []) => Vec::new(),
            (_, [p]) => vec![*p],
            (true, pts) => flatten_closed(pts, DEFAULT_CURVE_SEGMENTS),
            (false, [first, controls @ .., last]) => {
                flatten(*first, *last, controls, DEFAULT_CURVE_SEGMENTS)
            }
        };
        let mut cumulative = Vec::with_capacity(polyline.len());
        let mut total = 0.0;
        for (i, p) in polyline.iter().enumerate() {
            if i > 0 {
                total += polyline[i - 1].distance(*p);
            }
            cumulative.push(total);
        }
        self.cache = Some(PathCache {
            polyline,
            cumulative,
        });
    }

    /// Total path length
    pub fn length(&self) -> f32 {
        self.cache
            .as_ref()
            .and_then(|c| c.cumulative.last().copied())
            .unwrap_or(0.0)
    }

    /// Position at `time` seconds.
    ///
    /// Closed paths wrap; open paths hold at their ends.
    pub fn position_at(&self, time: f32) -> Option<Vec2> {
        let cache = self.cache.as_ref()?;
        let first = *cache.polyline.first()?;
        let total = self.length();
        if !(total > 0.0) || !(self.period > 0.0) || !time.is_finite() {
            return Some(first);
        }

        let phase = time / self.period;
        let fraction = if self.closed {
            phase.rem_euclid(1.0)
        } else {
            phase.clamp(0.0, 1.0)
        };
        let target = fraction * total;

        // First vertex at or past the target distance
        let idx = cache.cumulative.partition_point(|&d| d < target);
        if idx == 0 {
            return Some(first);
        }
        if idx >= cache.polyline.len() {
            return cache.polyline.last().copied();
        }
        let (d0, d1) = (cache.cumulative[idx - 1], cache.cumulative[idx]);
        let span = d1 - d0;
        let t = if span > 0.0 { (target - d0) / span } else { 0.0 };
        Some(cache.polyline[idx - 1].lerp(cache.polyline[idx], t))
    }
}

//! Fogline - barrier-aware sight and movement for tabletop scenes
//!
//! Core modules:
//! - `engine`: Pure geometry (primitives, curves, barriers, visibility, exploration, collision)
//! - `scene`: Barrier snapshots, generation counters and per-viewer caches
//! - `persistence`: Exploration grid storage contract and debounced writer
//! - `settings`: Engine configuration
//! - `demo`: Seeded demo scenes

pub mod demo;
pub mod engine;
pub mod persistence;
pub mod scene;
pub mod settings;

pub use scene::{Actor, DragSession, Scene, SceneError, SceneSnapshot};
pub use settings::{EngineSettings, QualityPreset};

use glam::Vec2;

/// Engine tuning constants
pub mod consts {
    /// Angular offset (radians) for the extra rays cast either side of a corner
    pub const RAY_ANGLE_EPSILON: f32 = 1.0e-4;
    /// Slack on ray/segment parameters so hits exactly on an endpoint survive rounding
    pub const PARAM_EPSILON: f32 = 1.0e-5;
    /// Cross products below this are treated as parallel
    pub const PARALLEL_EPSILON: f32 = 1.0e-10;
    /// Squared length below which a segment is degenerate
    pub const DEGENERATE_LENGTH_SQ: f32 = 1.0e-12;

    /// Default number of samples for an unobstructed sight circle
    pub const DEFAULT_CIRCLE_SAMPLES: usize = 64;
    /// Default number of line segments per curve span
    pub const DEFAULT_CURVE_SEGMENTS: usize = 16;
    /// Default fog-of-war cell size (scene units)
    pub const DEFAULT_CELL_SIZE: u32 = 50;
    /// Default debounce window for exploration writes
    pub const DEFAULT_PERSIST_DEBOUNCE_MS: u64 = 500;
}

/// Normalized angle to [-π, π)
#[inline]
pub fn normalize_angle(angle: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    if !angle.is_finite() {
        return angle;
    }
    // rem_euclid can round up to exactly TAU
    let a = (angle + PI).rem_euclid(TAU) - PI;
    if a >= PI { a - TAU } else { a }
}

/// Convert polar (r, theta) to cartesian (x, y)
#[inline]
pub fn polar_to_cartesian(r: f32, theta: f32) -> Vec2 {
    Vec2::new(r * theta.cos(), r * theta.sin())
}

/// Angle of `to` as seen from `from`
#[inline]
pub fn angle_between(from: Vec2, to: Vec2) -> f32 {
    let d = to - from;
    d.y.atan2(d.x)
}

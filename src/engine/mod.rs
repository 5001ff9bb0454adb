//! Occlusion geometry engine
//!
//! Everything here is pure given its inputs, except `ExplorationGrid`
//! mutation which is owned per (scene, user):
//! - No I/O, no clocks, no randomness
//! - Degenerate input degrades to "no hit" instead of panicking
//! - Stable iteration order (barriers sorted by ID)

pub mod barrier;
pub mod collision;
pub mod curve;
pub mod exploration;
pub mod primitives;
pub mod snap;
pub mod trajectory;
pub mod visibility;

pub use barrier::{
    Barrier, BarrierId, BarrierKind, BarrierShape, DoorStatus, Purpose, effective_segments,
};
pub use collision::{Contact, circle_segment_contact, first_contact, would_collide};
pub use curve::{FlattenCache, flatten, flatten_closed};
pub use exploration::{CellRect, ExplorationGrid, GridKey, GridRegistry};
pub use primitives::{
    Rect, Segment, point_in_polygon, point_in_rect, polygon_area, ray_segment_intersection,
    segment_intersects_circle, segment_intersects_rect, segments_intersect,
};
pub use snap::GridSpec;
pub use trajectory::Trajectory;
pub use visibility::{
    SweepParams, Viewer, ViewerId, VisibilityPolygon, compute_visibility_polygon,
    compute_visibility_polygon_with,
};

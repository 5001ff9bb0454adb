//! Barrier model and effective-segment resolution
//!
//! Barriers are the editable walls, windows and doors of a scene. What a
//! barrier blocks depends on its kind and current state:
//! - wall: light and movement, always
//! - window: movement always, light unless marked transparent
//! - door: light and movement only while closed

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::curve::{FlattenCache, flatten};
use super::primitives::Segment;

/// Stable barrier identifier assigned by the editing surface
pub type BarrierId = u32;

/// What a set of segments is going to block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Light,
    Movement,
}

/// Door state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoorStatus {
    #[default]
    Closed,
    Open,
    Broken,
}

impl DoorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DoorStatus::Closed => "closed",
            DoorStatus::Open => "open",
            DoorStatus::Broken => "broken",
        }
    }
}

fn full_opacity() -> f32 {
    1.0
}

/// Barrier kind and its kind-specific state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BarrierKind {
    Wall,
    Window {
        /// Lets light through (still blocks movement)
        #[serde(default)]
        transparent: bool,
        /// Renderer tint as 0xRRGGBB
        #[serde(default)]
        tint: Option<u32>,
        /// Renderer opacity (0.0 - 1.0)
        #[serde(default = "full_opacity")]
        opacity: f32,
    },
    Door {
        #[serde(default)]
        status: DoorStatus,
        #[serde(default)]
        locked: bool,
    },
}

impl BarrierKind {
    pub fn window() -> Self {
        BarrierKind::Window {
            transparent: false,
            tint: None,
            opacity: 1.0,
        }
    }

    pub fn door(status: DoorStatus) -> Self {
        BarrierKind::Door {
            status,
            locked: false,
        }
    }
}

/// Barrier geometry. Control points only exist on curved barriers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum BarrierShape {
    #[default]
    Straight,
    Curved {
        #[serde(default, rename = "controlPoints")]
        control_points: Vec<Vec2>,
    },
}

/// A wall, window or door
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Barrier {
    pub id: BarrierId,
    pub p1: Vec2,
    pub p2: Vec2,
    #[serde(flatten)]
    pub shape: BarrierShape,
    #[serde(flatten)]
    pub kind: BarrierKind,
}

impl Barrier {
    pub fn straight(id: BarrierId, p1: Vec2, p2: Vec2, kind: BarrierKind) -> Self {
        Self {
            id,
            p1,
            p2,
            shape: BarrierShape::Straight,
            kind,
        }
    }

    pub fn curved(
        id: BarrierId,
        p1: Vec2,
        p2: Vec2,
        control_points: Vec<Vec2>,
        kind: BarrierKind,
    ) -> Self {
        Self {
            id,
            p1,
            p2,
            shape: BarrierShape::Curved { control_points },
            kind,
        }
    }

    pub fn wall(id: BarrierId, p1: Vec2, p2: Vec2) -> Self {
        Self::straight(id, p1, p2, BarrierKind::Wall)
    }

    pub fn control_points(&self) -> &[Vec2] {
        match &self.shape {
            BarrierShape::Straight => &[],
            BarrierShape::Curved { control_points } => control_points,
        }
    }

    /// Does this barrier block `purpose` in its current state?
    pub fn blocks(&self, purpose: Purpose) -> bool {
        match (&self.kind, purpose) {
            (BarrierKind::Wall, _) => true,
            (BarrierKind::Window { .. }, Purpose::Movement) => true,
            (BarrierKind::Window { transparent, .. }, Purpose::Light) => !transparent,
            (BarrierKind::Door { status, .. }, _) => *status == DoorStatus::Closed,
        }
    }

    pub fn door_status(&self) -> Option<DoorStatus> {
        match self.kind {
            BarrierKind::Door { status, .. } => Some(status),
            _ => None,
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.kind, BarrierKind::Door { locked: true, .. })
    }

    /// Set door status, returning the previous one (None if not a door)
    pub fn set_door_status(&mut self, new_status: DoorStatus) -> Option<DoorStatus> {
        match &mut self.kind {
            BarrierKind::Door { status, .. } => Some(std::mem::replace(status, new_status)),
            _ => None,
        }
    }

    /// Flattened polyline (straight barriers are a single edge)
    pub fn polyline(&self, segments: usize) -> Vec<Vec2> {
        match self.control_points() {
            [] => vec![self.p1, self.p2],
            controls => flatten(self.p1, self.p2, controls, segments),
        }
    }
}

/// Append the non-degenerate edges of a polyline
fn push_edges(points: &[Vec2], out: &mut Vec<Segment>) {
    out.extend(
        points
            .windows(2)
            .map(|w| Segment::new(w[0], w[1]))
            .filter(|s| !s.is_degenerate()),
    );
}

/// Segments that block `purpose` for a viewer.
///
/// An incorporeal viewer ignores every barrier. Barriers are only read.
pub fn effective_segments<'a, I>(
    barriers: I,
    purpose: Purpose,
    viewer_incorporeal: bool,
    curve_segments: usize,
) -> Vec<Segment>
where
    I: IntoIterator<Item = &'a Barrier>,
{
    let mut out = Vec::new();
    if viewer_incorporeal {
        return out;
    }
    for barrier in barriers.into_iter().filter(|b| b.blocks(purpose)) {
        push_edges(&barrier.polyline(curve_segments), &mut out);
    }
    out
}

impl FlattenCache {
    /// Same as [`effective_segments`], reusing cached curve polylines
    pub fn effective_segments<'a, I>(
        &mut self,
        barriers: I,
        purpose: Purpose,
        viewer_incorporeal: bool,
        curve_segments: usize,
    ) -> Vec<Segment>
    where
        I: IntoIterator<Item = &'a Barrier>,
    {
        let mut out = Vec::new();
        if viewer_incorporeal {
            return out;
        }
        for barrier in barriers.into_iter().filter(|b| b.blocks(purpose)) {
            if barrier.control_points().is_empty() {
                push_edges(&[barrier.p1, barrier.p2], &mut out);
            } else {
                push_edges(&self.polyline(barrier, curve_segments), &mut out);
            }
        }
        out
    }
}

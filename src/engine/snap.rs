//! Scene grid snapping
//!
//! The scene grid may be rectangular and offset from the origin; both
//! snapping modes work in the offset frame and translate back.

use glam::Vec2;
use serde::{Deserialize, Serialize};

fn default_cell() -> f32 {
    100.0
}

fn default_snap() -> bool {
    true
}

/// Scene grid layout
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSpec {
    #[serde(default = "default_cell")]
    pub cell_width: f32,
    #[serde(default = "default_cell")]
    pub cell_height: f32,
    #[serde(default)]
    pub offset_x: f32,
    #[serde(default)]
    pub offset_y: f32,
    /// Snap dropped tokens to grid intersections
    #[serde(default = "default_snap")]
    pub snap: bool,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self::square(default_cell())
    }
}

impl GridSpec {
    pub fn square(size: f32) -> Self {
        Self {
            cell_width: size,
            cell_height: size,
            offset_x: 0.0,
            offset_y: 0.0,
            snap: true,
        }
    }

    pub fn with_offset(mut self, x: f32, y: f32) -> Self {
        self.offset_x = x;
        self.offset_y = y;
        self
    }

    fn offset(&self) -> Vec2 {
        Vec2::new(self.offset_x, self.offset_y)
    }

    fn cell(&self) -> Option<Vec2> {
        let cell = Vec2::new(self.cell_width, self.cell_height);
        (cell.x > 0.0 && cell.y > 0.0 && cell.is_finite()).then_some(cell)
    }

    /// Nearest grid intersection; unchanged when snapping is off
    pub fn snap_to_grid(&self, p: Vec2) -> Vec2 {
        if !self.snap {
            return p;
        }
        match self.cell() {
            Some(cell) => ((p - self.offset()) / cell).round() * cell + self.offset(),
            None => p,
        }
    }

    /// Center of the cell containing `p` (regardless of the snap flag)
    pub fn snap_to_grid_center(&self, p: Vec2) -> Vec2 {
        match self.cell() {
            Some(cell) => ((p - self.offset()) / cell).floor() * cell + cell * 0.5 + self.offset(),
            None => p,
        }
    }
}

//! Exploration grid persistence
//!
//! Features:
//! - `ExplorationStore`: the storage contract (get / explore / reveal / hide / reset)
//! - Versioned JSON envelope with backup rotation (tmp → save, old save → backup)
//! - Debounced, fire-and-forget writer so recomputation never waits on storage

pub mod envelope;
pub mod store;
pub mod writer;

pub use envelope::{ENVELOPE_VERSION, GridEnvelope};
pub use store::{JsonFileStore, MemoryStore};
pub use writer::PersistWriter;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::exploration::{CellRect, ExplorationGrid, GridKey};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no exploration grid for scene {scene_id} / user {user_id}")]
    NotFound { scene_id: String, user_id: String },
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt grid record: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("unsupported grid record version {0}")]
    UnsupportedVersion(u32),
}

impl StoreError {
    pub fn not_found(key: &GridKey) -> Self {
        StoreError::NotFound {
            scene_id: key.scene_id.clone(),
            user_id: key.user_id.clone(),
        }
    }
}

/// Shape of a grid created on first access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridDims {
    pub cols: usize,
    pub rows: usize,
    pub cell_size: u32,
}

impl GridDims {
    pub fn new(cols: usize, rows: usize, cell_size: u32) -> Self {
        Self {
            cols,
            rows,
            cell_size,
        }
    }

    pub fn of(grid: &ExplorationGrid) -> Self {
        let (cols, rows) = grid.dims();
        Self::new(cols, rows, grid.cell_size())
    }

    pub fn create(&self, key: &GridKey) -> ExplorationGrid {
        ExplorationGrid::new(
            key.scene_id.clone(),
            key.user_id.clone(),
            self.cols,
            self.rows,
            self.cell_size,
        )
    }
}

/// Storage contract for exploration grids.
///
/// Implementors provide one atomic read-modify-write; the named
/// operations are built on it. `explore` ORs cells in, so replaying the
/// same update is a no-op.
pub trait ExplorationStore: Send + Sync {
    /// Apply `f` to the stored grid under the store's lock.
    ///
    /// With `create = Some(dims)` a missing grid is created all-false;
    /// with `None` it is an error. The grid is written back when `f`
    /// returns true or the grid was just created.
    fn modify(
        &self,
        key: &GridKey,
        create: Option<GridDims>,
        f: &mut dyn FnMut(&mut ExplorationGrid) -> bool,
    ) -> Result<ExplorationGrid, StoreError>;

    /// Current grid, auto-created if absent
    fn get(&self, key: &GridKey, dims: GridDims) -> Result<ExplorationGrid, StoreError> {
        self.modify(key, Some(dims), &mut |_| false)
    }

    /// OR-merge explored cells
    fn explore(&self, key: &GridKey, update: &[Vec<bool>]) -> Result<ExplorationGrid, StoreError> {
        self.modify(key, None, &mut |grid| grid.merge_explored(update))
    }

    fn reveal(&self, key: &GridKey, area: CellRect) -> Result<ExplorationGrid, StoreError> {
        self.modify(key, None, &mut |grid| grid.reveal_area(area))
    }

    fn hide(&self, key: &GridKey, area: CellRect) -> Result<ExplorationGrid, StoreError> {
        self.modify(key, None, &mut |grid| grid.hide_area(area))
    }

    fn reset(&self, key: &GridKey) -> Result<ExplorationGrid, StoreError> {
        self.modify(key, None, &mut |grid| {
            grid.reset();
            true
        })
    }
}

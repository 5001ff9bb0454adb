//! In-memory and JSON-file exploration stores

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::envelope::GridEnvelope;
use super::{ExplorationStore, GridDims, StoreError};
use crate::engine::exploration::{ExplorationGrid, GridKey};

/// Grids held in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    grids: Mutex<HashMap<GridKey, ExplorationGrid>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a grid (scene or user deleted)
    pub fn delete(&self, key: &GridKey) -> bool {
        self.grids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.grids.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ExplorationStore for MemoryStore {
    fn modify(
        &self,
        key: &GridKey,
        create: Option<GridDims>,
        f: &mut dyn FnMut(&mut ExplorationGrid) -> bool,
    ) -> Result<ExplorationGrid, StoreError> {
        let mut grids = self.grids.lock().unwrap_or_else(PoisonError::into_inner);
        if !grids.contains_key(key) {
            match create {
                Some(dims) => {
                    grids.insert(key.clone(), dims.create(key));
                }
                None => return Err(StoreError::not_found(key)),
            }
        }
        let grid = grids.get_mut(key).ok_or_else(|| StoreError::not_found(key))?;
        f(grid);
        Ok(grid.clone())
    }
}

/// One JSON envelope per grid under a directory.
///
/// Writes go to a temp file that is renamed over the record; the previous
/// record is copied to a `.bak` first. Missing or unreadable records fall
/// back to those leftovers.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (creating if needed) a store directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        log::info!("Exploration store at {}", dir.display());
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record path; IDs are hex-encoded so any string is a safe file name
    fn record_path(&self, key: &GridKey) -> PathBuf {
        self.dir
            .join(format!("{}__{}.json", hex(&key.scene_id), hex(&key.user_id)))
    }

    fn load(&self, key: &GridKey) -> Result<Option<ExplorationGrid>, StoreError> {
        let path = self.record_path(key);
        if !path.exists() {
            // A save interrupted by a crash can leave only the temp or backup file
            let recovered = recover(&path);
            if recovered.is_some() {
                log::warn!("Grid record {} missing, recovered from leftovers", path.display());
            }
            return Ok(recovered);
        }
        match read_record(&path) {
            Ok(grid) => Ok(Some(grid)),
            Err(e) => {
                log::warn!("Grid record {} unreadable ({e}), trying backup", path.display());
                recover(&path).map(Some).ok_or(e)
            }
        }
    }

    /// Write the new record to a temp file, copy the current one to `.bak`,
    /// then rename the temp file over the record. The rename is the only
    /// step that touches the live file.
    fn save(&self, grid: &ExplorationGrid) -> Result<(), StoreError> {
        let path = self.record_path(&grid.key());
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, GridEnvelope::wrap(grid.clone()).to_json()?)?;
        if path.exists() {
            fs::copy(&path, path.with_extension("json.bak"))?;
        }
        fs::rename(&tmp, &path)?;
        log::debug!(
            "Saved exploration grid for scene {} / user {} ({} explored)",
            grid.scene_id,
            grid.user_id,
            grid.explored_count()
        );
        Ok(())
    }

    /// Remove a grid with its backup and temp files
    pub fn delete(&self, key: &GridKey) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let path = self.record_path(key);
        let existed = path.exists();
        for file in [
            path.with_extension("json.tmp"),
            path.with_extension("json.bak"),
            path,
        ] {
            if file.exists() {
                fs::remove_file(file)?;
            }
        }
        Ok(existed)
    }
}

fn read_record(path: &Path) -> Result<ExplorationGrid, StoreError> {
    GridEnvelope::from_json(&fs::read_to_string(path)?)
}

/// First readable leftover of `path`: a finished temp file, then the backup
fn recover(path: &Path) -> Option<ExplorationGrid> {
    ["json.tmp", "json.bak"]
        .into_iter()
        .map(|ext| path.with_extension(ext))
        .filter(|file| file.exists())
        .find_map(|file| read_record(&file).ok())
}

impl ExplorationStore for JsonFileStore {
    fn modify(
        &self,
        key: &GridKey,
        create: Option<GridDims>,
        f: &mut dyn FnMut(&mut ExplorationGrid) -> bool,
    ) -> Result<ExplorationGrid, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut grid, created) = match (self.load(key)?, create) {
            (Some(grid), _) => (grid, false),
            (None, Some(dims)) => (dims.create(key), true),
            (None, None) => return Err(StoreError::not_found(key)),
        };
        if f(&mut grid) || created {
            self.save(&grid)?;
        }
        Ok(grid)
    }
}

fn hex(s: &str) -> String {
    s.bytes().map(|b| format!("{b:02x}")).collect()
}

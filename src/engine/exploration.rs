//! Fog-of-war exploration grids
//!
//! One grid per (scene, user). `explored` only ever grows: a cell flips to
//! true when its center falls inside a visibility polygon, and only
//! `reset` clears it. `revealed` is set and cleared directly by the GM,
//! independent of sight.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, PoisonError};

use glam::Vec2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::primitives::Rect;
use super::visibility::VisibilityPolygon;

/// Owner of an exploration grid
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridKey {
    pub scene_id: String,
    pub user_id: String,
}

impl GridKey {
    pub fn new(scene_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            scene_id: scene_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// Inclusive rectangle of cells (column/row indices)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellRect {
    pub min_col: usize,
    pub min_row: usize,
    pub max_col: usize,
    pub max_row: usize,
}

impl CellRect {
    pub fn new(col_a: usize, row_a: usize, col_b: usize, row_b: usize) -> Self {
        Self {
            min_col: col_a.min(col_b),
            min_row: row_a.min(row_b),
            max_col: col_a.max(col_b),
            max_row: row_a.max(row_b),
        }
    }
}

/// Explored and revealed cells for one (scene, user).
///
/// Deserialized grids are squared off (see `normalize_shape`) before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredGrid")]
pub struct ExplorationGrid {
    pub scene_id: String,
    pub user_id: String,
    #[serde(rename = "gridCellSize")]
    cell_size: u32,
    #[serde(rename = "exploredGrid")]
    explored: Vec<Vec<bool>>,
    #[serde(rename = "revealedGrid")]
    revealed: Vec<Vec<bool>>,
}

/// Grid record exactly as stored; may be ragged
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredGrid {
    scene_id: String,
    user_id: String,
    #[serde(rename = "gridCellSize")]
    cell_size: u32,
    #[serde(rename = "exploredGrid", default)]
    explored: Vec<Vec<bool>>,
    #[serde(rename = "revealedGrid", default)]
    revealed: Vec<Vec<bool>>,
}

impl From<StoredGrid> for ExplorationGrid {
    fn from(stored: StoredGrid) -> Self {
        Self::from_parts(
            GridKey::new(stored.scene_id, stored.user_id),
            stored.cell_size,
            stored.explored,
            stored.revealed,
        )
    }
}

impl ExplorationGrid {
    /// All-false grid of `cols` x `rows` cells
    pub fn new(
        scene_id: impl Into<String>,
        user_id: impl Into<String>,
        cols: usize,
        rows: usize,
        cell_size: u32,
    ) -> Self {
        Self {
            scene_id: scene_id.into(),
            user_id: user_id.into(),
            cell_size: cell_size.max(1),
            explored: vec![vec![false; cols]; rows],
            revealed: vec![vec![false; cols]; rows],
        }
    }

    /// Grid covering a `width` x `height` scene
    pub fn for_scene_size(
        scene_id: impl Into<String>,
        user_id: impl Into<String>,
        width: f32,
        height: f32,
        cell_size: u32,
    ) -> Self {
        let cs = cell_size.max(1) as f32;
        let cols = (width.max(0.0) / cs).ceil() as usize;
        let rows = (height.max(0.0) / cs).ceil() as usize;
        Self::new(scene_id, user_id, cols, rows, cell_size)
    }

    /// Rebuild from stored matrices, squaring off ragged rows
    pub fn from_parts(
        key: GridKey,
        cell_size: u32,
        explored: Vec<Vec<bool>>,
        revealed: Vec<Vec<bool>>,
    ) -> Self {
        let mut grid = Self {
            scene_id: key.scene_id,
            user_id: key.user_id,
            cell_size: cell_size.max(1),
            explored,
            revealed,
        };
        grid.normalize_shape();
        grid
    }

    /// Pad both matrices to a common rectangular shape
    pub fn normalize_shape(&mut self) {
        self.cell_size = self.cell_size.max(1);
        let rows = self.explored.len().max(self.revealed.len());
        let cols = self
            .explored
            .iter()
            .chain(self.revealed.iter())
            .map(Vec::len)
            .max()
            .unwrap_or(0);
        for matrix in [&mut self.explored, &mut self.revealed] {
            matrix.resize_with(rows, Vec::new);
            for row in matrix.iter_mut() {
                row.resize(cols, false);
            }
        }
    }

    pub fn key(&self) -> GridKey {
        GridKey::new(self.scene_id.clone(), self.user_id.clone())
    }

    pub fn cell_size(&self) -> u32 {
        self.cell_size
    }

    /// (cols, rows)
    pub fn dims(&self) -> (usize, usize) {
        (self.explored.first().map_or(0, Vec::len), self.explored.len())
    }

    pub fn explored_rows(&self) -> &[Vec<bool>] {
        &self.explored
    }

    pub fn revealed_rows(&self) -> &[Vec<bool>] {
        &self.revealed
    }

    pub fn is_explored(&self, col: usize, row: usize) -> bool {
        self.explored.get(row).and_then(|r| r.get(col)).copied().unwrap_or(false)
    }

    pub fn is_revealed(&self, col: usize, row: usize) -> bool {
        self.revealed.get(row).and_then(|r| r.get(col)).copied().unwrap_or(false)
    }

    /// Cell is drawn without fog
    pub fn is_visible(&self, col: usize, row: usize) -> bool {
        self.is_explored(col, row) || self.is_revealed(col, row)
    }

    pub fn explored_count(&self) -> usize {
        count_true(&self.explored)
    }

    pub fn revealed_count(&self) -> usize {
        count_true(&self.revealed)
    }

    /// Center of a cell in scene coordinates
    pub fn cell_center(&self, col: usize, row: usize) -> Vec2 {
        let cs = self.cell_size as f32;
        Vec2::new((col as f32 + 0.5) * cs, (row as f32 + 0.5) * cs)
    }

    /// Cell containing a scene point
    pub fn cell_at(&self, p: Vec2) -> Option<(usize, usize)> {
        let (cols, rows) = self.dims();
        let cs = self.cell_size as f32;
        if !p.is_finite() || p.x < 0.0 || p.y < 0.0 {
            return None;
        }
        let col = (p.x / cs).floor() as usize;
        let row = (p.y / cs).floor() as usize;
        (col < cols && row < rows).then_some((col, row))
    }

    /// Cells overlapping a scene-space rectangle, clamped to the grid
    pub fn cells_in(&self, area: &Rect) -> Option<CellRect> {
        let (cols, rows) = self.dims();
        let cs = self.cell_size as f32;
        let c = cell_span(area.min.x, area.max.x, cs, cols)?;
        let r = cell_span(area.min.y, area.max.y, cs, rows)?;
        Some(CellRect::new(*c.start(), *r.start(), *c.end(), *r.end()))
    }

    /// Mark every cell whose center lies inside `polygon` as explored.
    ///
    /// Returns whether any cell changed so callers can skip persisting.
    pub fn update_exploration(&mut self, polygon: &VisibilityPolygon) -> bool {
        if polygon.is_empty() {
            return false;
        }
        let Some(bounds) = polygon.bounds() else {
            return false;
        };
        let Some(area) = self.cells_in(&bounds) else {
            return false;
        };

        let mut changed = false;
        for row in area.min_row..=area.max_row {
            for col in area.min_col..=area.max_col {
                if self.explored[row][col] {
                    continue;
                }
                if polygon.contains(self.cell_center(col, row)) {
                    self.explored[row][col] = true;
                    changed = true;
                }
            }
        }
        changed
    }

    /// GM: force cells visible
    pub fn reveal_area(&mut self, area: CellRect) -> bool {
        self.set_revealed(area, true)
    }

    /// GM: clear forced visibility (exploration is untouched)
    pub fn hide_area(&mut self, area: CellRect) -> bool {
        self.set_revealed(area, false)
    }

    fn set_revealed(&mut self, area: CellRect, value: bool) -> bool {
        let (cols, rows) = self.dims();
        if cols == 0 || rows == 0 || area.min_col >= cols || area.min_row >= rows {
            return false;
        }
        let mut changed = false;
        for row in area.min_row..=area.max_row.min(rows - 1) {
            for col in area.min_col..=area.max_col.min(cols - 1) {
                let cell = &mut self.revealed[row][col];
                if *cell != value {
                    *cell = value;
                    changed = true;
                }
            }
        }
        changed
    }

    /// OR `update` into `explored`.
    ///
    /// Commutative and idempotent; cells outside the grid are ignored.
    pub fn merge_explored(&mut self, update: &[Vec<bool>]) -> bool {
        let mut changed = false;
        for (row, update_row) in self.explored.iter_mut().zip(update) {
            for (cell, &incoming) in row.iter_mut().zip(update_row) {
                if incoming && !*cell {
                    *cell = true;
                    changed = true;
                }
            }
        }
        changed
    }

    /// Clear both grids. The only way exploration goes backwards.
    pub fn reset(&mut self) {
        for matrix in [&mut self.explored, &mut self.revealed] {
            for row in matrix.iter_mut() {
                row.fill(false);
            }
        }
    }

    /// Per-cell "no fog" flags for the overlay renderer
    pub fn fog_mask(&self) -> Vec<Vec<bool>> {
        self.explored
            .iter()
            .zip(&self.revealed)
            .map(|(e, r)| e.iter().zip(r).map(|(&e, &r)| e || r).collect())
            .collect()
    }
}

fn count_true(matrix: &[Vec<bool>]) -> usize {
    matrix.iter().map(|row| row.iter().filter(|&&c| c).count()).sum()
}

/// Indices of cells overlapping [lo, hi] along one axis
fn cell_span(lo: f32, hi: f32, cell_size: f32, count: usize) -> Option<RangeInclusive<usize>> {
    if count == 0 || !lo.is_finite() || !hi.is_finite() || hi < 0.0 {
        return None;
    }
    let first = (lo / cell_size).floor().max(0.0) as usize;
    let last = ((hi / cell_size).floor() as usize).min(count - 1);
    (first <= last).then_some(first..=last)
}

/// Shared exploration grids, one lock per (scene, user).
///
/// Two computations never mutate the same grid at once; different users
/// proceed in parallel.
#[derive(Debug, Default)]
pub struct GridRegistry {
    grids: Mutex<HashMap<GridKey, Arc<Mutex<ExplorationGrid>>>>,
}

impl GridRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a grid (e.g. loaded on scene enter), replacing any previous one
    pub fn insert(&self, grid: ExplorationGrid) -> Arc<Mutex<ExplorationGrid>> {
        let handle = Arc::new(Mutex::new(grid));
        let key = lock(&handle).key();
        self.lock_map().insert(key, Arc::clone(&handle));
        handle
    }

    pub fn handle(&self, key: &GridKey) -> Option<Arc<Mutex<ExplorationGrid>>> {
        self.lock_map().get(key).cloned()
    }

    /// Existing grid, or a fresh all-false one
    pub fn get_or_create(
        &self,
        key: &GridKey,
        cols: usize,
        rows: usize,
        cell_size: u32,
    ) -> Arc<Mutex<ExplorationGrid>> {
        let mut map = self.lock_map();
        let handle = map.entry(key.clone()).or_insert_with(|| {
            log::debug!(
                "Creating {}x{} exploration grid for scene {} / user {}",
                cols,
                rows,
                key.scene_id,
                key.user_id
            );
            Arc::new(Mutex::new(ExplorationGrid::new(
                key.scene_id.clone(),
                key.user_id.clone(),
                cols,
                rows,
                cell_size,
            )))
        });
        Arc::clone(handle)
    }

    /// Run `f` with exclusive access to one grid
    pub fn with_grid<R, F>(&self, key: &GridKey, f: F) -> Option<R>
    where
        F: FnOnce(&mut ExplorationGrid) -> R,
    {
        let handle = self.handle(key)?;
        let mut grid = lock(&handle);
        Some(f(&mut grid))
    }

    /// Apply visibility polygons to many grids in parallel.
    ///
    /// Returns, per input entry, whether that grid changed. Unknown keys
    /// report no change.
    pub fn update_many(&self, updates: &[(GridKey, Vec<VisibilityPolygon>)]) -> Vec<(GridKey, bool)> {
        updates
            .par_iter()
            .map(|(key, polygons)| {
                let changed = self
                    .with_grid(key, |grid| {
                        polygons
                            .iter()
                            .fold(false, |acc, poly| grid.update_exploration(poly) | acc)
                    })
                    .unwrap_or(false);
                (key.clone(), changed)
            })
            .collect()
    }

    /// Forget a grid (user left / relationship deleted)
    pub fn remove(&self, key: &GridKey) -> Option<ExplorationGrid> {
        let handle = self.lock_map().remove(key)?;
        let grid = lock(&handle).clone();
        Some(grid)
    }

    /// Forget every grid of a deleted scene
    pub fn remove_scene(&self, scene_id: &str) -> usize {
        let mut map = self.lock_map();
        let before = map.len();
        map.retain(|key, _| key.scene_id != scene_id);
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.lock_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_map().is_empty()
    }

    fn lock_map(&self) -> std::sync::MutexGuard<'_, HashMap<GridKey, Arc<Mutex<ExplorationGrid>>>> {
        self.grids.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Lock a grid; a panic elsewhere doesn't make the cells wrong
pub fn lock(handle: &Mutex<ExplorationGrid>) -> std::sync::MutexGuard<'_, ExplorationGrid> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::primitives::Segment;
    use crate::engine::visibility::compute_visibility_polygon;
    use proptest::prelude::*;

    fn grid(cols: usize, rows: usize) -> ExplorationGrid {
        ExplorationGrid::new("scene", "user", cols, rows, 10)
    }

    #[test]
    fn test_for_scene_size_rounds_up() {
        let g = ExplorationGrid::for_scene_size("s", "u", 105.0, 40.0, 10);
        assert_eq!(g.dims(), (11, 4));
        assert_eq!(g.explored_count(), 0);
    }

    #[test]
    fn test_update_marks_cells_inside_polygon() {
        let mut g = grid(20, 20);
        let poly = compute_visibility_polygon(Vec2::new(100.0, 100.0), 30.0, &[]);
        assert!(g.update_exploration(&poly));
        assert!(g.is_explored(10, 10));
        assert!(g.is_explored(9, 9));
        assert!(!g.is_explored(0, 0));
        assert!(!g.is_explored(19, 19));

        // Same polygon again: nothing new
        assert!(!g.update_exploration(&poly));
    }

    #[test]
    fn test_update_respects_walls() {
        let mut g = grid(20, 20);
        let wall = Segment::new(Vec2::new(120.0, 0.0), Vec2::new(120.0, 200.0));
        let poly = compute_visibility_polygon(Vec2::new(100.0, 100.0), 80.0, &[wall]);
        g.update_exploration(&poly);
        assert!(g.is_explored(11, 10));
        assert!(!g.is_explored(12, 10));
        assert!(!g.is_explored(14, 10));
    }

    #[test]
    fn test_polygon_outside_grid() {
        let mut g = grid(5, 5);
        let poly = compute_visibility_polygon(Vec2::new(-500.0, -500.0), 30.0, &[]);
        assert!(!g.update_exploration(&poly));
        assert!(!g.update_exploration(&VisibilityPolygon::empty()));
    }

    #[test]
    fn test_reveal_and_hide_are_clamped() {
        let mut g = grid(5, 5);
        assert!(g.reveal_area(CellRect::new(3, 3, 10, 10)));
        assert_eq!(g.revealed_count(), 4);
        assert!(!g.reveal_area(CellRect::new(3, 3, 4, 4)));
        assert!(g.hide_area(CellRect::new(4, 4, 4, 4)));
        assert_eq!(g.revealed_count(), 3);
        assert!(!g.reveal_area(CellRect::new(7, 7, 9, 9)));
        // Revealing never explores
        assert_eq!(g.explored_count(), 0);
    }

    #[test]
    fn test_fog_mask_combines_both_layers() {
        let mut g = grid(3, 1);
        g.merge_explored(&[vec![true, false, false]]);
        g.reveal_area(CellRect::new(2, 0, 2, 0));
        assert_eq!(g.fog_mask(), vec![vec![true, false, true]]);
    }

    #[test]
    fn test_merge_is_or_and_ignores_overflow() {
        let mut g = grid(2, 2);
        g.merge_explored(&[vec![true, false]]);
        assert!(g.merge_explored(&[vec![false, true, true], vec![true], vec![true, true]]));
        assert_eq!(g.explored_rows(), &[vec![true, true], vec![true, false]]);
        // Falses never clear
        assert!(!g.merge_explored(&[vec![false, false], vec![false, false]]));
        assert_eq!(g.explored_count(), 3);
    }

    #[test]
    fn test_reset_clears_both() {
        let mut g = grid(4, 4);
        g.merge_explored(&vec![vec![true; 4]; 4]);
        g.reveal_area(CellRect::new(0, 0, 3, 3));
        g.reset();
        assert_eq!(g.explored_count(), 0);
        assert_eq!(g.revealed_count(), 0);
        assert_eq!(g.dims(), (4, 4));
    }

    #[test]
    fn test_cell_lookup() {
        let g = grid(5, 5);
        assert_eq!(g.cell_at(Vec2::new(15.0, 42.0)), Some((1, 4)));
        assert_eq!(g.cell_at(Vec2::new(55.0, 0.0)), None);
        assert_eq!(g.cell_at(Vec2::new(-1.0, 0.0)), None);
        let area = g
            .cells_in(&Rect::from_corners(Vec2::new(-20.0, 5.0), Vec2::new(25.0, 500.0)))
            .expect("overlaps");
        assert_eq!(area, CellRect::new(0, 0, 2, 4));
    }

    #[test]
    fn test_json_contract_and_ragged_rows() {
        let json = r#"{
            "sceneId": "s1",
            "userId": "u1",
            "gridCellSize": 25,
            "exploredGrid": [[true, false, true], [false]],
            "revealedGrid": []
        }"#;
        let g: ExplorationGrid = serde_json::from_str(json).expect("valid grid");
        assert_eq!(g.dims(), (3, 2));
        assert_eq!(g.revealed_rows(), &[vec![false; 3], vec![false; 3]]);
        assert_eq!(g.cell_size(), 25);
        assert_eq!(g.key(), GridKey::new("s1", "u1"));

        let out = serde_json::to_value(&g).expect("serializes");
        assert_eq!(out["exploredGrid"][0][2], serde_json::json!(true));
        assert_eq!(out["gridCellSize"], serde_json::json!(25));
    }

    #[test]
    fn test_mismatched_record_is_safe_to_mutate() {
        let json = r#"{
            "sceneId": "s",
            "userId": "u",
            "gridCellSize": 10,
            "exploredGrid": [[false, false], [false, false]],
            "revealedGrid": []
        }"#;
        let mut g: ExplorationGrid = serde_json::from_str(json).expect("valid grid");
        assert!(g.reveal_area(CellRect::new(0, 0, 1, 1)));
        assert_eq!(g.revealed_count(), 4);

        let json = r#"{
            "sceneId": "s",
            "userId": "u",
            "gridCellSize": 10,
            "exploredGrid": [[false], [false, false, false]]
        }"#;
        let mut g: ExplorationGrid = serde_json::from_str(json).expect("valid grid");
        assert_eq!(g.dims(), (3, 2));
        let poly = compute_visibility_polygon(Vec2::new(15.0, 10.0), 40.0, &[]);
        assert!(g.update_exploration(&poly));
        assert!(g.is_explored(2, 0));
        assert_eq!(g.revealed_rows(), &[vec![false; 3], vec![false; 3]]);
    }

    #[test]
    fn test_registry_update_many() {
        let registry = GridRegistry::new();
        let alice = GridKey::new("scene", "alice");
        let bob = GridKey::new("scene", "bob");
        registry.get_or_create(&alice, 20, 20, 10);
        registry.get_or_create(&bob, 20, 20, 10);

        let near = compute_visibility_polygon(Vec2::new(50.0, 50.0), 30.0, &[]);
        let far = compute_visibility_polygon(Vec2::new(150.0, 150.0), 30.0, &[]);
        let results = registry.update_many(&[
            (alice.clone(), vec![near.clone()]),
            (bob.clone(), vec![far.clone(), near]),
            (GridKey::new("scene", "nobody"), vec![far]),
        ]);
        assert_eq!(results.len(), 3);
        assert!(results[0].1 && results[1].1 && !results[2].1);

        let alice_count = registry.with_grid(&alice, |g| g.explored_count()).expect("exists");
        let bob_count = registry.with_grid(&bob, |g| g.explored_count()).expect("exists");
        assert!(bob_count > alice_count);

        assert_eq!(registry.remove_scene("scene"), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_get_or_create_reuses() {
        let registry = GridRegistry::new();
        let key = GridKey::new("s", "u");
        let a = registry.get_or_create(&key, 2, 2, 10);
        lock(&a).merge_explored(&[vec![true, true]]);
        let b = registry.get_or_create(&key, 9, 9, 10);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(lock(&b).dims(), (2, 2));
        assert_eq!(registry.remove(&key).map(|g| g.explored_count()), Some(2));
    }

    fn matrix(rows: usize, cols: usize) -> impl Strategy<Value = Vec<Vec<bool>>> {
        prop::collection::vec(prop::collection::vec(any::<bool>(), cols), rows)
    }

    proptest! {
        #[test]
        fn prop_exploration_is_monotonic(
            centers in prop::collection::vec((0.0f32..200.0, 0.0f32..200.0, 5.0f32..60.0), 1..8),
        ) {
            let mut g = grid(20, 20);
            let mut previous = g.explored_rows().to_vec();
            for (x, y, r) in centers {
                let poly = compute_visibility_polygon(Vec2::new(x, y), r, &[]);
                g.update_exploration(&poly);
                for (old_row, new_row) in previous.iter().zip(g.explored_rows()) {
                    for (&old, &new) in old_row.iter().zip(new_row) {
                        prop_assert!(!old || new);
                    }
                }
                previous = g.explored_rows().to_vec();
            }
        }

        #[test]
        fn prop_merge_idempotent_and_commutative(
            base in matrix(4, 5),
            a in matrix(4, 5),
            b in matrix(4, 5),
        ) {
            let mut once = grid(5, 4);
            once.merge_explored(&base);
            once.merge_explored(&a);
            let mut twice = once.clone();
            prop_assert!(!twice.merge_explored(&a));
            prop_assert_eq!(&once, &twice);

            let mut ab = once.clone();
            ab.merge_explored(&b);
            let mut ba = grid(5, 4);
            ba.merge_explored(&base);
            ba.merge_explored(&b);
            ba.merge_explored(&a);
            prop_assert_eq!(ab.explored_rows(), ba.explored_rows());
        }
    }
}

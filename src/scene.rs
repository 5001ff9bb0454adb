//! Scene state: barriers, generation counter and derived-geometry caches
//!
//! A `Scene` owns the current barrier set. Every change bumps the
//! generation; effective segments and visibility polygons are cached
//! against it, so reads after an edit recompute lazily and reads without
//! one are free. Readers take `&self` and may run in parallel.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use glam::Vec2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::barrier::{Barrier, BarrierId, DoorStatus, Purpose};
use crate::engine::collision;
use crate::engine::curve::FlattenCache;
use crate::engine::primitives::Segment;
use crate::engine::snap::GridSpec;
use crate::engine::visibility::{
    SweepParams, Viewer, ViewerId, VisibilityPolygon, compute_visibility_polygon_with,
};
use crate::settings::EngineSettings;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("no barrier with id {0}")]
    UnknownBarrier(BarrierId),
    #[error("barrier {0} is not a door")]
    NotADoor(BarrierId),
    #[error("door {0} is locked")]
    DoorLocked(BarrierId),
    #[error("move from {from:?} to {to:?} is blocked")]
    MoveBlocked { from: Vec2, to: Vec2 },
    #[error("invalid scene snapshot: {0}")]
    InvalidSnapshot(#[from] serde_json::Error),
}

/// Who is asking for a change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Gm,
    Player,
}

/// Scene input as delivered by the editing surface
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneSnapshot {
    #[serde(default)]
    pub barriers: Vec<Barrier>,
    #[serde(default)]
    pub viewers: Vec<Viewer>,
    #[serde(default)]
    pub grid: GridSpec,
}

impl SceneSnapshot {
    pub fn from_json(json: &str) -> Result<Self, SceneError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, SceneError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Cached visibility for one viewer
#[derive(Debug, Clone)]
struct CachedView {
    generation: u64,
    position: Vec2,
    radius: f32,
    incorporeal: bool,
    polygon: Arc<VisibilityPolygon>,
}

impl CachedView {
    fn is_valid_for(&self, viewer: &Viewer, generation: u64) -> bool {
        self.generation == generation
            && self.position == viewer.position
            && self.radius == viewer.radius
            && self.incorporeal == viewer.incorporeal
    }
}

/// Barrier set plus caches derived from it
#[derive(Debug)]
pub struct Scene {
    barriers: BTreeMap<BarrierId, Barrier>,
    generation: u64,
    curve_segments: usize,
    sweep: SweepParams,
    flatten: Mutex<FlattenCache>,
    segments: Mutex<HashMap<Purpose, (u64, Arc<[Segment]>)>>,
    views: Mutex<HashMap<ViewerId, CachedView>>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl Scene {
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            barriers: BTreeMap::new(),
            generation: 0,
            curve_segments: settings.curve_segments(),
            sweep: settings.sweep_params(),
            flatten: Mutex::new(FlattenCache::new()),
            segments: Mutex::new(HashMap::new()),
            views: Mutex::new(HashMap::new()),
        }
    }

    /// Scene holding the snapshot's barriers
    pub fn from_snapshot(snapshot: &SceneSnapshot, settings: &EngineSettings) -> Self {
        let mut scene = Self::new(settings);
        scene.replace_barriers(snapshot.barriers.iter().cloned());
        scene
    }

    /// Bumped on every barrier change
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Was `generation` taken from the current barrier set?
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    pub fn barrier(&self, id: BarrierId) -> Option<&Barrier> {
        self.barriers.get(&id)
    }

    /// Barriers in ID order
    pub fn barriers(&self) -> impl Iterator<Item = &Barrier> {
        self.barriers.values()
    }

    pub fn barrier_count(&self) -> usize {
        self.barriers.len()
    }

    /// Curve polylines currently cached
    pub fn cached_curves(&self) -> usize {
        lock(&self.flatten).len()
    }

    /// Insert or replace a barrier, returning the previous version
    pub fn upsert_barrier(&mut self, barrier: Barrier) -> Option<Barrier> {
        let previous = self.barriers.insert(barrier.id, barrier);
        self.bump();
        previous
    }

    pub fn remove_barrier(&mut self, id: BarrierId) -> Result<Barrier, SceneError> {
        let removed = self
            .barriers
            .remove(&id)
            .ok_or(SceneError::UnknownBarrier(id))?;
        self.evict_stale_curves();
        self.bump();
        Ok(removed)
    }

    /// Swap in a whole new barrier set
    pub fn replace_barriers<I>(&mut self, barriers: I)
    where
        I: IntoIterator<Item = Barrier>,
    {
        self.barriers = barriers.into_iter().map(|b| (b.id, b)).collect();
        self.evict_stale_curves();
        self.bump();
        log::debug!(
            "Scene now has {} barriers (generation {})",
            self.barriers.len(),
            self.generation
        );
    }

    /// Change a door's state, returning its previous status.
    ///
    /// Locked doors only open for the GM; anyone may close one. Setting
    /// the current status again changes nothing.
    pub fn set_door_status(
        &mut self,
        id: BarrierId,
        status: DoorStatus,
        actor: Actor,
    ) -> Result<DoorStatus, SceneError> {
        let barrier = self
            .barriers
            .get_mut(&id)
            .ok_or(SceneError::UnknownBarrier(id))?;
        let current = barrier.door_status().ok_or(SceneError::NotADoor(id))?;
        if current == status {
            return Ok(current);
        }
        if barrier.is_locked() && status != DoorStatus::Closed && actor != Actor::Gm {
            log::info!("Door {id} is locked; refusing to set it {}", status.as_str());
            return Err(SceneError::DoorLocked(id));
        }
        let previous = barrier
            .set_door_status(status)
            .ok_or(SceneError::NotADoor(id))?;
        self.bump();
        log::info!(
            "Door {id}: {} -> {} (generation {})",
            previous.as_str(),
            status.as_str(),
            self.generation
        );
        Ok(previous)
    }

    /// Segments blocking `purpose`, cached per generation
    pub fn effective_segments(&self, purpose: Purpose, incorporeal: bool) -> Arc<[Segment]> {
        if incorporeal {
            return Vec::<Segment>::new().into();
        }
        let mut cache = lock(&self.segments);
        if let Some((generation, segments)) = cache.get(&purpose) {
            if *generation == self.generation {
                return Arc::clone(segments);
            }
        }
        let segments: Arc<[Segment]> = lock(&self.flatten)
            .effective_segments(self.barriers.values(), purpose, false, self.curve_segments)
            .into();
        cache.insert(purpose, (self.generation, Arc::clone(&segments)));
        segments
    }

    /// Visibility polygon for a viewer.
    ///
    /// Returns the cached polygon while the viewer and barriers are
    /// unchanged.
    pub fn visibility(&self, viewer: &Viewer) -> Arc<VisibilityPolygon> {
        if let Some(cached) = lock(&self.views).get(&viewer.id) {
            if cached.is_valid_for(viewer, self.generation) {
                return Arc::clone(&cached.polygon);
            }
        }

        let segments = self.effective_segments(Purpose::Light, viewer.incorporeal);
        let polygon = Arc::new(compute_visibility_polygon_with(
            viewer.position,
            viewer.radius,
            &segments,
            &self.sweep,
        ));
        lock(&self.views).insert(
            viewer.id,
            CachedView {
                generation: self.generation,
                position: viewer.position,
                radius: viewer.radius,
                incorporeal: viewer.incorporeal,
                polygon: Arc::clone(&polygon),
            },
        );
        polygon
    }

    /// Visibility for many viewers in parallel, in input order
    pub fn visibility_all(&self, viewers: &[Viewer]) -> Vec<Arc<VisibilityPolygon>> {
        viewers.par_iter().map(|viewer| self.visibility(viewer)).collect()
    }

    /// Drop cached polygons for viewers that no longer exist
    pub fn retain_viewers<F>(&self, mut keep: F)
    where
        F: FnMut(ViewerId) -> bool,
    {
        lock(&self.views).retain(|id, _| keep(*id));
    }

    /// Would a token of `radius` collide with a movement barrier at `to`?
    pub fn would_collide(&self, from: Vec2, to: Vec2, radius: f32, incorporeal: bool) -> bool {
        let segments = self.effective_segments(Purpose::Movement, incorporeal);
        collision::would_collide(from, to, radius, &segments)
    }

    fn bump(&mut self) {
        self.generation += 1;
    }

    fn evict_stale_curves(&mut self) {
        let barriers = &self.barriers;
        lock(&self.flatten).retain(|id| barriers.contains_key(&id));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One token drag, from pick-up to drop.
///
/// Pointer moves that would collide are skipped (the token stays where it
/// last was); the drop position is snapped and checked again against the
/// barriers current at drop time.
#[derive(Debug, Clone)]
pub struct DragSession {
    origin: Vec2,
    position: Vec2,
    radius: f32,
    incorporeal: bool,
    generation: u64,
    skipped: usize,
}

impl DragSession {
    pub fn start(scene: &Scene, origin: Vec2, radius: f32, incorporeal: bool) -> Self {
        Self {
            origin,
            position: origin,
            radius,
            incorporeal,
            generation: scene.generation(),
            skipped: 0,
        }
    }

    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    /// Last accepted position
    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Pointer moves rejected so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Follow the pointer unless the new position collides.
    ///
    /// Returns whether the update was applied.
    pub fn pointer_move(&mut self, scene: &Scene, pos: Vec2) -> bool {
        if !pos.is_finite() || scene.would_collide(self.position, pos, self.radius, self.incorporeal) {
            self.skipped += 1;
            return false;
        }
        self.position = pos;
        self.generation = scene.generation();
        true
    }

    /// Snap the final position to the grid and make the authoritative check
    pub fn finish(&self, scene: &Scene, grid: &GridSpec) -> Result<Vec2, SceneError> {
        if !scene.is_current(self.generation) {
            log::debug!(
                "Barriers changed during drag (generation {} -> {}), rechecking drop",
                self.generation,
                scene.generation()
            );
        }
        let target = grid.snap_to_grid(self.position);
        if scene.would_collide(self.origin, target, self.radius, self.incorporeal) {
            log::info!("Drop at {target:?} blocked; token stays at {:?}", self.origin);
            return Err(SceneError::MoveBlocked {
                from: self.origin,
                to: target,
            });
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::barrier::{BarrierKind, BarrierShape};
    use crate::engine::visibility::compute_visibility_polygon;

    const DOOR: BarrierId = 2;

    fn v(x: f32, y: f32) -> Vec2 {
        Vec2::new(x, y)
    }

    /// Vertical wall at x = 100 with a door between y = 40 and y = 60
    fn doorway_scene(locked: bool) -> Scene {
        let mut scene = Scene::default();
        scene.replace_barriers([
            Barrier::wall(1, v(100.0, -500.0), v(100.0, 40.0)),
            Barrier::straight(
                DOOR,
                v(100.0, 40.0),
                v(100.0, 60.0),
                BarrierKind::Door {
                    status: DoorStatus::Closed,
                    locked,
                },
            ),
            Barrier::wall(3, v(100.0, 60.0), v(100.0, 500.0)),
        ]);
        scene
    }

    #[test]
    fn test_opening_a_door_updates_sight_and_movement() {
        let mut scene = doorway_scene(false);
        let viewer = Viewer::new(1, v(50.0, 50.0), 200.0);
        let beyond = v(150.0, 50.0);

        let closed = scene.visibility(&viewer);
        assert!(!closed.contains(beyond));
        assert!(scene.would_collide(v(50.0, 50.0), v(100.0, 50.0), 5.0, false));
        assert_eq!(scene.effective_segments(Purpose::Movement, false).len(), 3);

        let generation = scene.generation();
        assert_eq!(
            scene.set_door_status(DOOR, DoorStatus::Open, Actor::Player).expect("opens"),
            DoorStatus::Closed
        );
        assert!(!scene.is_current(generation));

        let open = scene.visibility(&viewer);
        assert!(open.contains(beyond));
        assert!(open.area() > closed.area());
        assert!(!scene.would_collide(v(50.0, 50.0), v(100.0, 50.0), 5.0, false));

        // The walls either side still block
        assert_eq!(scene.effective_segments(Purpose::Movement, false).len(), 2);
        assert!(scene.would_collide(v(50.0, 50.0), v(100.0, 0.0), 5.0, false));
        assert!(scene.would_collide(v(50.0, 50.0), v(100.0, 100.0), 5.0, false));
    }

    #[test]
    fn test_locked_door_only_opens_for_gm() {
        let mut scene = doorway_scene(true);
        let generation = scene.generation();
        assert!(matches!(
            scene.set_door_status(DOOR, DoorStatus::Open, Actor::Player),
            Err(SceneError::DoorLocked(DOOR))
        ));
        assert!(scene.is_current(generation));
        assert_eq!(scene.barrier(DOOR).and_then(Barrier::door_status), Some(DoorStatus::Closed));

        scene
            .set_door_status(DOOR, DoorStatus::Open, Actor::Gm)
            .expect("GM opens");
        // Closing is always allowed
        scene
            .set_door_status(DOOR, DoorStatus::Closed, Actor::Player)
            .expect("player closes");
        assert_eq!(scene.generation(), generation + 2);
    }

    #[test]
    fn test_door_errors() {
        let mut scene = doorway_scene(false);
        assert!(matches!(
            scene.set_door_status(1, DoorStatus::Open, Actor::Gm),
            Err(SceneError::NotADoor(1))
        ));
        assert!(matches!(
            scene.set_door_status(42, DoorStatus::Open, Actor::Gm),
            Err(SceneError::UnknownBarrier(42))
        ));
        assert!(matches!(scene.remove_barrier(42), Err(SceneError::UnknownBarrier(42))));
    }

    #[test]
    fn test_same_status_does_not_bump_generation() {
        let mut scene = doorway_scene(false);
        let generation = scene.generation();
        scene
            .set_door_status(DOOR, DoorStatus::Closed, Actor::Player)
            .expect("no-op");
        assert!(scene.is_current(generation));
    }

    #[test]
    fn test_visibility_cache_reuses_until_something_changes() {
        let mut scene = doorway_scene(false);
        let viewer = Viewer::new(7, v(50.0, 50.0), 150.0);

        let first = scene.visibility(&viewer);
        let second = scene.visibility(&viewer);
        assert!(Arc::ptr_eq(&first, &second));

        let moved = Viewer {
            position: v(60.0, 50.0),
            ..viewer
        };
        let third = scene.visibility(&moved);
        assert!(!Arc::ptr_eq(&second, &third));
        assert!(Arc::ptr_eq(&third, &scene.visibility(&moved)));

        scene.upsert_barrier(Barrier::wall(9, v(0.0, 90.0), v(90.0, 90.0)));
        assert!(!Arc::ptr_eq(&third, &scene.visibility(&moved)));

        scene.retain_viewers(|id| id != 7);
        let fresh = scene.visibility(&moved);
        assert!(Arc::ptr_eq(&fresh, &scene.visibility(&moved)));
    }

    #[test]
    fn test_segment_cache_follows_generation() {
        let mut scene = doorway_scene(false);
        let a = scene.effective_segments(Purpose::Light, false);
        let b = scene.effective_segments(Purpose::Light, false);
        assert!(Arc::ptr_eq(&a, &b));
        scene.remove_barrier(1).expect("removed");
        let c = scene.effective_segments(Purpose::Light, false);
        assert_eq!(c.len(), 2);
        assert!(scene.effective_segments(Purpose::Light, true).is_empty());
    }

    #[test]
    fn test_incorporeal_viewer_sees_through_everything() {
        let scene = doorway_scene(false);
        let ghost = Viewer {
            incorporeal: true,
            ..Viewer::new(3, v(50.0, 50.0), 100.0)
        };
        assert!(scene.visibility(&ghost).contains(v(140.0, 50.0)));
        assert!(!scene.would_collide(v(50.0, 50.0), v(100.0, 50.0), 5.0, true));
    }

    #[test]
    fn test_visibility_all_matches_sequential() {
        let scene = doorway_scene(false);
        let viewers: Vec<Viewer> = (0..12)
            .map(|i| Viewer::new(i, v(10.0 + i as f32 * 15.0, 50.0), 120.0))
            .collect();
        let parallel = scene.visibility_all(&viewers);
        assert_eq!(parallel.len(), viewers.len());

        let light = scene.effective_segments(Purpose::Light, false);
        for (viewer, polygon) in viewers.iter().zip(&parallel) {
            let expected = compute_visibility_polygon(viewer.position, viewer.radius, &light);
            assert_eq!(&**polygon, &expected);
        }
    }

    #[test]
    fn test_curve_cache_evicts_removed_barriers() {
        let mut scene = Scene::default();
        scene.upsert_barrier(Barrier::curved(
            5,
            v(0.0, 0.0),
            v(100.0, 0.0),
            vec![v(50.0, 40.0)],
            BarrierKind::Wall,
        ));
        assert!(!scene.effective_segments(Purpose::Light, false).is_empty());
        assert_eq!(scene.cached_curves(), 1);
        scene.remove_barrier(5).expect("removed");
        assert_eq!(scene.cached_curves(), 0);
    }

    #[test]
    fn test_drag_skips_blocked_moves() {
        let scene = doorway_scene(false);
        let mut drag = DragSession::start(&scene, v(50.0, 50.0), 10.0, false);

        assert!(!drag.pointer_move(&scene, v(95.0, 50.0)));
        assert_eq!(drag.position(), v(50.0, 50.0));
        assert!(drag.pointer_move(&scene, v(80.0, 50.0)));
        assert!(!drag.pointer_move(&scene, v(f32::NAN, 50.0)));
        assert_eq!(drag.position(), v(80.0, 50.0));
        assert_eq!(drag.skipped(), 2);

        assert_eq!(drag.finish(&scene, &GridSpec::square(25.0)).expect("free"), v(75.0, 50.0));
    }

    #[test]
    fn test_drag_rejects_blocked_snap() {
        let scene = doorway_scene(false);
        let mut drag = DragSession::start(&scene, v(50.0, 50.0), 10.0, false);
        assert!(drag.pointer_move(&scene, v(80.0, 50.0)));
        // Snaps onto the wall at (100, 100)
        assert!(matches!(
            drag.finish(&scene, &GridSpec::square(100.0)),
            Err(SceneError::MoveBlocked { .. })
        ));
    }

    #[test]
    fn test_drag_rechecks_against_new_barriers() {
        let mut scene = doorway_scene(false);
        let mut drag = DragSession::start(&scene, v(50.0, 50.0), 10.0, false);
        assert!(drag.pointer_move(&scene, v(80.0, 50.0)));

        scene.upsert_barrier(Barrier::wall(10, v(75.0, 0.0), v(75.0, 100.0)));
        assert!(matches!(
            drag.finish(&scene, &GridSpec::square(25.0)),
            Err(SceneError::MoveBlocked { .. })
        ));
    }

    #[test]
    fn test_snapshot_json() {
        let json = r#"{
            "barriers": [
                {"id": 1, "p1": [0, 0], "p2": [100, 0], "shape": "straight", "kind": "wall"},
                {"id": 2, "p1": [0, 50], "p2": [100, 50], "shape": "curved",
                 "controlPoints": [[50, 80]], "kind": "door", "status": "open"}
            ],
            "viewers": [{"id": 1, "position": [50, 25], "radius": 300}],
            "grid": {"cellWidth": 50, "cellHeight": 50}
        }"#;
        let snapshot = SceneSnapshot::from_json(json).expect("valid snapshot");
        assert_eq!(snapshot.barriers.len(), 2);
        assert!(matches!(snapshot.barriers[1].shape, BarrierShape::Curved { .. }));
        assert!(!snapshot.viewers[0].incorporeal);
        assert!(snapshot.grid.snap);

        let scene = Scene::from_snapshot(&snapshot, &EngineSettings::default());
        assert_eq!(scene.barrier_count(), 2);
        // Only the wall blocks movement; the open door is skipped
        assert_eq!(scene.effective_segments(Purpose::Movement, false).len(), 1);

        let again = SceneSnapshot::from_json(&snapshot.to_json().expect("serializes")).expect("parses");
        assert_eq!(again, snapshot);
        assert!(matches!(SceneSnapshot::from_json(r#"{"barriers": 5}"#), Err(SceneError::InvalidSnapshot(_))));
    }
}

//! Seeded demo scenes
//!
//! A rectangular floor plan cut into a grid of rooms. Every shared wall
//! gets a door at a random spot, the top outer wall gets windows, and some
//! rooms get a curved partition. One viewer stands in each room. The same
//! seed always produces the same scene.

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::engine::barrier::{Barrier, BarrierId, BarrierKind, DoorStatus};
use crate::engine::snap::GridSpec;
use crate::engine::visibility::Viewer;
use crate::scene::SceneSnapshot;

/// Door opening width (scene units)
const DOOR_WIDTH: f32 = 40.0;
/// Window width on the outer wall
const WINDOW_WIDTH: f32 = 60.0;

/// Demo floor plan parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemoLayout {
    pub width: f32,
    pub height: f32,
    pub rooms_x: usize,
    pub rooms_y: usize,
}

impl Default for DemoLayout {
    fn default() -> Self {
        Self {
            width: 1200.0,
            height: 800.0,
            rooms_x: 3,
            rooms_y: 2,
        }
    }
}

struct Builder {
    rng: Pcg32,
    next_id: BarrierId,
    barriers: Vec<Barrier>,
}

impl Builder {
    fn id(&mut self) -> BarrierId {
        self.next_id += 1;
        self.next_id
    }

    fn push(&mut self, p1: Vec2, p2: Vec2, kind: BarrierKind) {
        let id = self.id();
        self.barriers.push(Barrier::straight(id, p1, p2, kind));
    }

    /// Wall from `a` to `b` with an opening of `width` filled by `kind`
    fn wall_with_opening(&mut self, a: Vec2, b: Vec2, width: f32, kind: BarrierKind) {
        let length = a.distance(b);
        if length <= width * 2.0 {
            self.push(a, b, BarrierKind::Wall);
            return;
        }
        let dir = (b - a) / length;
        let start = self.rng.random_range(width * 0.5..length - width * 1.5);
        let gap_a = a + dir * start;
        let gap_b = gap_a + dir * width;
        self.push(a, gap_a, BarrierKind::Wall);
        self.push(gap_a, gap_b, kind);
        self.push(gap_b, b, BarrierKind::Wall);
    }

    fn random_door(&mut self) -> BarrierKind {
        let status = match self.rng.random_range(0..10) {
            0..=5 => DoorStatus::Closed,
            6..=8 => DoorStatus::Open,
            _ => DoorStatus::Broken,
        };
        BarrierKind::Door {
            status,
            locked: status == DoorStatus::Closed && self.rng.random_bool(0.25),
        }
    }

    fn random_window(&mut self) -> BarrierKind {
        BarrierKind::Window {
            transparent: self.rng.random_bool(0.5),
            tint: Some(self.rng.random_range(0..0x0100_0000)),
            opacity: self.rng.random_range(0.3..1.0),
        }
    }
}

/// Demo scene with the default layout
pub fn demo_scene(seed: u64) -> SceneSnapshot {
    generate(seed, &DemoLayout::default())
}

/// Build a demo scene for `layout`
pub fn generate(seed: u64, layout: &DemoLayout) -> SceneSnapshot {
    let rooms_x = layout.rooms_x.max(1);
    let rooms_y = layout.rooms_y.max(1);
    let room = Vec2::new(layout.width / rooms_x as f32, layout.height / rooms_y as f32);
    let corner = |col: usize, row: usize| Vec2::new(col as f32 * room.x, row as f32 * room.y);

    let mut b = Builder {
        rng: Pcg32::seed_from_u64(seed),
        next_id: 0,
        barriers: Vec::new(),
    };

    // Outer walls; the top one has a window per room
    for col in 0..rooms_x {
        let kind = b.random_window();
        b.wall_with_opening(corner(col, 0), corner(col + 1, 0), WINDOW_WIDTH, kind);
    }
    b.push(corner(rooms_x, 0), corner(rooms_x, rooms_y), BarrierKind::Wall);
    b.push(corner(rooms_x, rooms_y), corner(0, rooms_y), BarrierKind::Wall);
    b.push(corner(0, rooms_y), corner(0, 0), BarrierKind::Wall);

    // Shared walls, one door each
    for row in 0..rooms_y {
        for col in 1..rooms_x {
            let door = b.random_door();
            b.wall_with_opening(corner(col, row), corner(col, row + 1), DOOR_WIDTH, door);
        }
    }
    for row in 1..rooms_y {
        for col in 0..rooms_x {
            let door = b.random_door();
            b.wall_with_opening(corner(col, row), corner(col + 1, row), DOOR_WIDTH, door);
        }
    }

    // Curved partitions and one viewer per room
    let mut viewers = Vec::with_capacity(rooms_x * rooms_y);
    for row in 0..rooms_y {
        for col in 0..rooms_x {
            let origin = corner(col, row);
            if b.rng.random_bool(0.5) {
                let y = origin.y + room.y * b.rng.random_range(0.6..0.8);
                let p1 = Vec2::new(origin.x + room.x * 0.2, y);
                let p2 = Vec2::new(origin.x + room.x * 0.5, y);
                let bulge = Vec2::new(
                    origin.x + room.x * 0.35,
                    y - room.y * b.rng.random_range(0.1..0.2),
                );
                let id = b.id();
                b.barriers
                    .push(Barrier::curved(id, p1, p2, vec![bulge], BarrierKind::Wall));
            }

            let jitter = Vec2::new(
                b.rng.random_range(-0.1..0.1) * room.x,
                b.rng.random_range(-0.1..0.1) * room.y,
            );
            let id = viewers.len() as u32 + 1;
            let mut viewer = Viewer::new(
                id,
                origin + room * Vec2::new(0.5, 0.25) + jitter,
                b.rng.random_range(0.6..1.2) * room.max_element(),
            );
            viewer.incorporeal = b.rng.random_bool(0.1);
            viewers.push(viewer);
        }
    }

    log::debug!(
        "Demo scene {seed}: {} barriers, {} viewers",
        b.barriers.len(),
        viewers.len()
    );

    SceneSnapshot {
        barriers: b.barriers,
        viewers,
        grid: GridSpec::square(50.0),
    }
}

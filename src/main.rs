//! Fogline entry point
//!
//! Loads a scene snapshot (or builds a demo scene), computes every
//! viewer's visibility, folds it into a fog-of-war grid and optionally
//! persists the grid.
//!
//! Usage: `fogline [SCENE.json] [--seed N] [--settings FILE] [--store DIR]`

use std::error::Error;
use std::sync::Arc;

use fogline::engine::barrier::{DoorStatus, Purpose};
use fogline::engine::exploration::{ExplorationGrid, GridKey, GridRegistry, lock};
use fogline::persistence::{ExplorationStore, JsonFileStore, PersistWriter};
use fogline::{Actor, EngineSettings, Scene, SceneSnapshot, demo};

#[derive(Debug, Default)]
struct Args {
    scene: Option<String>,
    seed: u64,
    settings: Option<String>,
    store: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--seed" => {
                let value = iter.next().ok_or("--seed needs a value")?;
                args.seed = value.parse().map_err(|_| format!("bad seed: {value}"))?;
            }
            "--settings" => args.settings = Some(iter.next().ok_or("--settings needs a path")?),
            "--store" => args.store = Some(iter.next().ok_or("--store needs a directory")?),
            other if other.starts_with("--") => return Err(format!("unknown option {other}")),
            other => args.scene = Some(other.to_string()),
        }
    }
    Ok(args)
}

fn main() {
    #[cfg(not(target_arch = "wasm32"))]
    env_logger::init();
    log::info!("Fogline starting...");

    if let Err(e) = run() {
        log::error!("{e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let args = parse_args()?;
    let settings = match &args.settings {
        Some(path) => EngineSettings::load_or_default(path),
        None => EngineSettings::default(),
    };

    let (scene_id, snapshot) = match &args.scene {
        Some(path) => (path.clone(), SceneSnapshot::from_json(&std::fs::read_to_string(path)?)?),
        None => (format!("demo-{}", args.seed), demo::demo_scene(args.seed)),
    };
    let mut scene = Scene::from_snapshot(&snapshot, &settings);
    println!(
        "Scene {scene_id}: {} barriers, {} viewers ({} quality)",
        scene.barrier_count(),
        snapshot.viewers.len(),
        settings.quality.as_str()
    );

    let polygons = scene.visibility_all(&snapshot.viewers);
    for (viewer, polygon) in snapshot.viewers.iter().zip(&polygons) {
        println!(
            "  viewer {:>3} at ({:>7.1}, {:>7.1}) r={:>6.1}{}: {:>4} vertices, area {:>10.1}",
            viewer.id,
            viewer.position.x,
            viewer.position.y,
            viewer.radius,
            if viewer.incorporeal { " (incorporeal)" } else { "" },
            polygon.len(),
            polygon.area()
        );
    }

    // Fog of war for a single player who sees through every viewer
    let extent = scene
        .barriers()
        .flat_map(|b| [b.p1, b.p2])
        .chain(snapshot.viewers.iter().map(|v| v.position))
        .fold(glam::Vec2::ZERO, |acc, p| acc.max(p));
    let key = GridKey::new(scene_id.clone(), "player");
    let registry = GridRegistry::new();
    registry.insert(ExplorationGrid::for_scene_size(
        scene_id.clone(),
        "player",
        extent.x,
        extent.y,
        settings.fog_cell_size,
    ));
    registry.update_many(&[(key.clone(), polygons.iter().map(|p| (**p).clone()).collect())]);
    let grid = registry
        .handle(&key)
        .map(|handle| lock(&handle).clone())
        .ok_or("exploration grid vanished")?;
    let (cols, rows) = grid.dims();
    println!(
        "Explored {} of {} cells ({}x{}, cell size {})",
        grid.explored_count(),
        cols * rows,
        cols,
        rows,
        grid.cell_size()
    );

    if let Some(dir) = &args.store {
        let store: Arc<dyn ExplorationStore> = Arc::new(JsonFileStore::open(dir)?);
        let writer = PersistWriter::spawn(Arc::clone(&store), settings.persist_debounce());
        writer.submit(&grid);
        writer.flush();
        println!("Saved exploration to {dir}");
    }

    door_demo(&mut scene, &snapshot)
}

/// Open the first closed door and report how the nearest viewer's sight changes
fn door_demo(scene: &mut Scene, snapshot: &SceneSnapshot) -> Result<(), Box<dyn Error>> {
    let Some(door) = scene
        .barriers()
        .find(|b| b.door_status() == Some(DoorStatus::Closed))
        .cloned()
    else {
        println!("No closed doors to open");
        return Ok(());
    };
    let middle = (door.p1 + door.p2) * 0.5;
    let Some(viewer) = snapshot
        .viewers
        .iter()
        .filter(|v| !v.incorporeal)
        .min_by(|a, b| {
            a.position
                .distance_squared(middle)
                .total_cmp(&b.position.distance_squared(middle))
        })
    else {
        return Ok(());
    };

    let before = scene.visibility(viewer).area();
    let blocked_before = scene.effective_segments(Purpose::Movement, false).len();
    scene.set_door_status(door.id, DoorStatus::Open, Actor::Gm)?;
    let after = scene.visibility(viewer).area();
    let blocked_after = scene.effective_segments(Purpose::Movement, false).len();
    println!(
        "Opened door {}{}: viewer {} area {:.1} -> {:.1}, movement segments {} -> {}",
        door.id,
        if door.is_locked() { " (locked, GM override)" } else { "" },
        viewer.id,
        before,
        after,
        blocked_before,
        blocked_after
    );
    Ok(())
}

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel Terrain
//!
//! Streamed, editable smooth voxel terrain: height-map driven density generation,
//! marching cubes meshing and a viewer-centered chunk streaming scheduler.
//!
//! The crate produces geometry and leaves drawing to the caller, so it runs the same in a
//! game loop, a server or a headless tool.
//!
//! ## Key Modules
//!
//! * `terrain_state::settings` - Terrain configuration, loadable from JSON
//! * `terrain_state::voxels` - Chunk storage, the pooled world and density generation
//! * `terrain_state::meshing` - The two-phase marching cubes mesher and mesh producers
//! * `terrain_state::streaming` - The streaming window and per-tick scheduler
//! * `terrain_state::task_management` - Bounded worker pools polled without blocking
//!
//! ## Architecture
//!
//! A [`TerrainContext`] owns everything. Each call to [`TerrainContext::update`]:
//! * Recenters the streaming window on the viewer and recycles columns that left it
//! * Requests density for new columns, nearest first, and adds finished ones to the world
//! * Requests meshes once a column's neighbors are resident and hands finished meshes
//!   back as [`RenderCommand`]s
//!
//! ## Usage
//!
//! ```no_run
//! use cgmath::Point3;
//! use voxel_terrain::{TerrainContext, TerrainSettings};
//!
//! let mut terrain = TerrainContext::new(TerrainSettings::default()).unwrap();
//! for command in terrain.update(Point3::new(0.0, 200.0, 0.0)) {
//!     println!("{command:?}");
//! }
//! ```
//!
//! ## Performance Considerations
//!
//! * Density and meshing run on worker threads; the update thread only polls
//! * Chunks and density buffers are allocated once for the whole window
//! * Phase 1 of the mesher evaluates lattice points in parallel with rayon

use std::time::Duration;

use cgmath::Point3;
use log::{error, info};

pub mod terrain_state;

pub use terrain_state::meshing::{ChunkMesh, MeshVertex};
pub use terrain_state::settings::{SettingsError, TerrainSettings};
pub use terrain_state::voxels::chunk::{ChunkCoord, ColumnCoord};
pub use terrain_state::{EditError, RenderCommand, TerrainContext, TerrainError};

/// Number of ticks the headless run simulates.
const DEMO_TICKS: u32 = 600;
/// Viewer speed of the headless run, in voxels per tick.
const DEMO_SPEED: f32 = 0.5;
/// Interval between statistics reports of the headless run.
const REPORT_INTERVAL: u32 = 60;

/// Streams terrain around a viewer flying along +x, logging progress.
///
/// The first command line argument, if any, is a path to a JSON settings file. Logging
/// is configured through `RUST_LOG`.
pub fn run() {
    let mut log_builder = env_logger::Builder::new();
    log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .init();
    info!("Logger initialized");

    let settings = match std::env::args().nth(1) {
        Some(path) => match TerrainSettings::from_json_file(&path) {
            Ok(settings) => settings,
            Err(err) => {
                error!("Failed to load settings from {path}: {err}");
                return;
            }
        },
        None => TerrainSettings::default(),
    };

    let mut terrain = match TerrainContext::new(settings) {
        Ok(terrain) => terrain,
        Err(err) => {
            error!("Failed to create terrain: {err}");
            return;
        }
    };

    let height = terrain.settings().height_map.elevation_boundary.max as f32;
    let mut uploads = 0usize;
    let mut triangles = 0usize;
    for tick in 0..DEMO_TICKS {
        let viewer = Point3::new(tick as f32 * DEMO_SPEED, height, 0.0);
        for command in terrain.update(viewer) {
            if let RenderCommand::UploadMesh { mesh, .. } = command {
                uploads += 1;
                triangles += mesh.triangle_count();
            }
        }

        if tick % REPORT_INTERVAL == 0 {
            let stats = terrain.stats();
            info!(
                "Tick {tick}: viewer in {:?}, {} columns resident, {} density queued, {} meshes queued, {uploads} uploads, {triangles} triangles",
                terrain.viewer_coord(),
                stats.resident_columns,
                stats.pending_density + stats.density_in_flight,
                stats.pending_meshes + stats.meshes_in_flight,
            );
        }
        std::thread::sleep(Duration::from_millis(16));
    }

    let stats = terrain.stats();
    info!(
        "Density jobs: {} completed, {} panicked, {:?} total, {:?} longest",
        stats.density_jobs.completed,
        stats.density_jobs.panicked,
        stats.density_jobs.total_time,
        stats.density_jobs.max_time
    );
    info!(
        "Mesh jobs: {} completed, {} panicked, {:?} total, {:?} longest",
        stats.mesh_jobs.completed,
        stats.mesh_jobs.panicked,
        stats.mesh_jobs.total_time,
        stats.mesh_jobs.max_time
    );
    terrain.destroy();
}

//! # Terrain State Module
//!
//! Owns the streamed voxel terrain and everything that produces it.
//!
//! ## Key Components
//!
//! * `TerrainContext` - The caller-owned entry point: one per terrain, no global state
//! * `settings` - Configuration and JSON loading
//! * `voxels` - Chunks, columns, the pooled world and density generation
//! * `meshing` - Marching cubes and the mesh producers
//! * `streaming` - Window tracking, request ordering and the per-tick scheduler
//! * `task_management` - Bounded worker pools polled from the update loop
//!
//! ## Architecture
//!
//! The caller drives the terrain by calling [`TerrainContext::update`] once per frame with
//! the viewer position. Everything a renderer needs comes back as [`RenderCommand`]s; the
//! terrain never calls into rendering code. Chunks are addressed only by coordinate and
//! resolved through the world's coordinate map, so no chunk holds a reference to another.
//!
//! ## Performance Considerations
//!
//! * The update thread never blocks on a worker
//! * Columns and density buffers are allocated once and recycled
//! * Meshes are shared with the renderer through `Arc` without copying

use std::sync::Arc;

use cgmath::Point3;
use log::info;
use thiserror::Error;

pub mod meshing;
pub mod settings;
pub mod streaming;
pub mod task_management;
pub mod voxels;

use meshing::ChunkMesh;
use settings::{SettingsError, TerrainSettings};
use streaming::{ChunkStreamingScheduler, SchedulerStats};
use voxels::chunk::{
    column_of, world_pos_to_chunk_coord, world_to_chunk_coord, world_to_local, Chunk,
    ChunkCoord, ColumnCoord,
};
use voxels::world::ChunkWorld;

/// Work for the renderer, produced by [`TerrainContext::update`].
#[derive(Debug, Clone)]
pub enum RenderCommand {
    /// Replace the mesh shown for a chunk. Empty meshes clear it.
    UploadMesh {
        /// Chunk the mesh belongs to.
        coord: ChunkCoord,
        /// Chunk-local geometry.
        mesh: Arc<ChunkMesh>,
        /// Whether a collision shape should be built from the mesh.
        collider: bool,
    },
    /// Show or hide every chunk of a column.
    SetVisibility {
        /// Affected column.
        column: ColumnCoord,
        /// New visibility.
        visible: bool,
    },
    /// The column left the streaming window; drop everything uploaded for it.
    RemoveColumn {
        /// Recycled column.
        column: ColumnCoord,
    },
}

/// Errors returned by terrain edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EditError {
    /// The chunk is not resident.
    #[error("chunk ({}, {}, {}) is not loaded", .0.x, .0.y, .0.z)]
    ChunkNotLoaded(ChunkCoord),
    /// The local position lies outside the chunk.
    #[error("local position ({}, {}, {}) is outside the chunk", .0.x, .0.y, .0.z)]
    OutOfBounds(Point3<i32>),
}

/// Errors returned while creating a [`TerrainContext`].
#[derive(Debug, Error)]
pub enum TerrainError {
    /// The settings failed validation.
    #[error(transparent)]
    Settings(#[from] SettingsError),
    /// A worker thread could not be started.
    #[error("failed to start worker threads: {0}")]
    Spawn(#[from] std::io::Error),
}

/// A streamed voxel terrain.
///
/// # Examples
///
/// ```ignore
/// let mut terrain = TerrainContext::new(TerrainSettings::default())?;
/// loop {
///     for command in terrain.update(player_position) {
///         renderer.apply(command);
///     }
/// }
/// ```
pub struct TerrainContext {
    settings: TerrainSettings,
    scheduler: ChunkStreamingScheduler,
    viewer: ChunkCoord,
}

impl TerrainContext {
    /// Validates `settings` and starts the worker pools.
    ///
    /// Nothing is generated until the first [`update`](Self::update).
    ///
    /// # Errors
    /// - [`TerrainError::Settings`] if a setting is out of range
    /// - [`TerrainError::Spawn`] if a worker thread cannot be started
    pub fn new(settings: TerrainSettings) -> Result<Self, TerrainError> {
        settings.validate()?;
        let scheduler = ChunkStreamingScheduler::new(&settings)?;
        info!("Terrain context created");
        Ok(TerrainContext {
            settings,
            scheduler,
            viewer: ChunkCoord::new(0, 0, 0),
        })
    }

    /// Settings the terrain was created with.
    pub fn settings(&self) -> &TerrainSettings {
        &self.settings
    }

    /// Advances streaming by one tick.
    ///
    /// # Arguments
    /// * `viewer` - World position of the viewer, in voxels
    ///
    /// # Returns
    /// Renderer commands in the order they were produced.
    pub fn update(&mut self, viewer: Point3<f32>) -> Vec<RenderCommand> {
        self.viewer = world_pos_to_chunk_coord(viewer, self.settings.chunk_size);
        self.scheduler.update(column_of(self.viewer))
    }

    /// Chunk containing the viewer at the last update.
    pub fn viewer_coord(&self) -> ChunkCoord {
        self.viewer
    }

    /// Resident terrain.
    pub fn world(&self) -> &ChunkWorld {
        self.scheduler.world()
    }

    /// Looks up a resident chunk.
    pub fn chunk(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.scheduler.world().chunk(coord)
    }

    /// The scheduler driving this terrain.
    pub fn scheduler(&self) -> &ChunkStreamingScheduler {
        &self.scheduler
    }

    /// Queue and pool statistics.
    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    /// Whether all requested work has been delivered.
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    /// Adds `delta` to the density of one voxel, clamped to `0..=255`, and re-meshes
    /// every chunk that reads it.
    ///
    /// # Returns
    /// `Ok(true)` if the density changed, `Ok(false)` if it was already at the limit.
    ///
    /// # Errors
    /// See [`EditError`].
    pub fn modify_block(
        &mut self,
        coord: ChunkCoord,
        local: Point3<i32>,
        delta: i32,
    ) -> Result<bool, EditError> {
        self.scheduler.modify_block(coord, local, delta)
    }

    /// [`modify_block`](Self::modify_block) addressed by world voxel position.
    pub fn modify_block_at(&mut self, position: Point3<i32>, delta: i32) -> Result<bool, EditError> {
        let size = self.settings.chunk_size;
        self.modify_block(
            world_to_chunk_coord(position, size),
            world_to_local(position, size),
            delta,
        )
    }

    /// Density of the voxel at a world position, `None` if its chunk is not resident.
    pub fn block_at(&self, position: Point3<i32>) -> Option<u8> {
        let size = self.settings.chunk_size;
        let chunk = self.chunk(world_to_chunk_coord(position, size))?;
        let local = world_to_local(position, size);
        Some(
            chunk
                .density
                .get(local.x as usize, local.y as usize, local.z as usize),
        )
    }

    /// Requests a new mesh for a resident chunk.
    ///
    /// # Returns
    /// `false` if the chunk is not resident.
    pub fn mark_for_mesh_generation(&mut self, coord: ChunkCoord) -> bool {
        self.scheduler.mark_for_mesh_generation(coord)
    }

    /// Stops every worker and releases all chunks. Called automatically on drop.
    pub fn destroy(&mut self) {
        self.scheduler.destroy();
    }
}

impl Drop for TerrainContext {
    fn drop(&mut self) {
        self.destroy();
    }
}

//! # Chunk Streaming Scheduler
//!
//! Keeps the columns around the viewer resident and meshed.
//!
//! ## Update Order
//! Every tick runs three steps, in this order:
//! 1. **Request chunks**: when the viewer changed column, recycle the columns that left
//!    the window, queue density for every missing column, re-sort both request queues by
//!    spiral rank and refresh visibility
//! 2. **Density**: deliver finished columns to the world and trigger column meshes around
//!    them, then dispatch more density jobs
//! 3. **Meshes**: deliver finished meshes to their chunks, then dispatch more mesh jobs
//!
//! ## Chunk Lifecycle
//! A coordinate is `NotRequested` until it enters the window, `DensityPending` while its
//! column is queued or generating, and becomes a resident [`Chunk`] in `DensityReady`.
//! Mesh requests move it to `MeshPending` and deliveries to `Meshed`. An edit that lands
//! while a job for the chunk is running sets the dirty flag, and the delivery of that job
//! immediately queues another one.
//!
//! Results are never cancelled in flight. A delivery is matched against the epoch of its
//! column and dropped when the column was recycled in the meantime.
//!
//! [`Chunk`]: crate::terrain_state::voxels::chunk::Chunk

use std::sync::Arc;

use cgmath::{Point3, Vector3};
use log::{debug, info, warn};

use crate::terrain_state::meshing::{
    ChunkMesh, CpuMeshProducer, InlineMeshProducer, MeshDelivery, MeshProducer, MeshRequest,
};
use crate::terrain_state::settings::{MeshProducerKind, TerrainSettings};
use crate::terrain_state::task_management::PoolStats;
use crate::terrain_state::voxels::chunk::{ChunkCoord, ChunkState, ColumnCoord};
use crate::terrain_state::voxels::generation::HeightMapGenerator;
use crate::terrain_state::voxels::tasks::ColumnDensity;
use crate::terrain_state::voxels::world::ChunkWorld;
use crate::terrain_state::{EditError, RenderCommand};

use super::{DensityProducer, StreamingWindow};

/// Snapshot of the scheduler's queues and pools.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SchedulerStats {
    /// Columns holding density.
    pub resident_columns: usize,
    /// Columns waiting for a density worker.
    pub pending_density: usize,
    /// Columns being generated.
    pub density_in_flight: usize,
    /// Mesh requests waiting for dispatch.
    pub pending_meshes: usize,
    /// Mesh jobs running.
    pub meshes_in_flight: usize,
    /// Density job statistics.
    pub density_jobs: PoolStats,
    /// Mesh job statistics.
    pub mesh_jobs: PoolStats,
}

/// Drives density generation and meshing around a moving viewer.
pub struct ChunkStreamingScheduler {
    world: ChunkWorld,
    window: StreamingWindow,
    density: DensityProducer,
    mesher: Box<dyn MeshProducer>,
    generate_colliders: bool,
    started: bool,
    commands: Vec<RenderCommand>,
}

impl ChunkStreamingScheduler {
    /// Allocates the column pool and starts the worker pools.
    ///
    /// # Errors
    /// Returns the OS error if a worker thread cannot be spawned.
    pub fn new(settings: &TerrainSettings) -> std::io::Result<Self> {
        let size = settings.chunk_size;
        let world_height = settings.world_height as usize;
        let window = StreamingWindow::new(
            ColumnCoord::new(0, 0),
            settings.effective_generation_distance(),
            settings.effective_view_distance(),
        );
        let world = ChunkWorld::new(world_height, size, window.area());
        let generator = Arc::new(HeightMapGenerator::new(&settings.height_map, size.width));
        let density =
            DensityProducer::new(generator, size, world_height, settings.density_workers)?;

        let mesher: Box<dyn MeshProducer> = match settings.mesh_producer {
            MeshProducerKind::Threaded => Box::new(CpuMeshProducer::new(
                size,
                world_height,
                settings.max_jobs_per_update,
            )?),
            MeshProducerKind::Inline => Box::new(InlineMeshProducer::new(
                size,
                world_height,
                settings.max_jobs_per_update,
            )),
        };

        info!(
            "Streaming {} columns of {} chunks ({}x{}x{} voxels), view radius {}",
            window.area(),
            world_height,
            size.width,
            size.height,
            size.width,
            window.view_radius()
        );

        Ok(ChunkStreamingScheduler {
            world,
            window,
            density,
            mesher,
            generate_colliders: settings.generate_colliders,
            started: false,
            commands: Vec::new(),
        })
    }

    /// Resident terrain.
    pub fn world(&self) -> &ChunkWorld {
        &self.world
    }

    /// Current streaming window.
    pub fn window(&self) -> &StreamingWindow {
        &self.window
    }

    /// Column the window is centered on.
    pub fn viewer_column(&self) -> ColumnCoord {
        self.window.center()
    }

    /// Whether a running mesh job covers `coord`.
    pub fn is_mesh_in_flight(&self, coord: ChunkCoord) -> bool {
        self.mesher.is_in_flight(coord)
    }

    /// Whether density for `column` is queued or being generated.
    pub fn is_density_requested(&self, column: ColumnCoord) -> bool {
        self.density.is_requested(column)
    }

    /// Whether nothing is queued and no job is running.
    pub fn is_idle(&self) -> bool {
        self.density.pending_requests() == 0
            && self.density.jobs_in_flight() == 0
            && self.mesher.pending_requests() == 0
            && self.mesher.jobs_in_flight() == 0
    }

    /// Current queue and pool statistics.
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            resident_columns: self.world.len(),
            pending_density: self.density.pending_requests(),
            density_in_flight: self.density.jobs_in_flight(),
            pending_meshes: self.mesher.pending_requests(),
            meshes_in_flight: self.mesher.jobs_in_flight(),
            density_jobs: self.density.stats(),
            mesh_jobs: self.mesher.job_stats(),
        }
    }

    /// Runs one tick with the viewer in `viewer`.
    ///
    /// # Returns
    /// The renderer commands produced during the tick, in order.
    pub fn update(&mut self, viewer: ColumnCoord) -> Vec<RenderCommand> {
        self.request_chunks(viewer);

        for column in self.density.manage_requests(&self.window) {
            self.on_density_received(column);
        }

        let deliveries = self.mesher.manage_requests(&self.world, &self.window);
        for delivery in deliveries {
            self.on_mesh_received(delivery);
        }

        std::mem::take(&mut self.commands)
    }

    fn request_chunks(&mut self, viewer: ColumnCoord) {
        if self.started {
            let shift = self.window.recenter(viewer);
            if shift.is_empty() {
                return;
            }
            info!(
                "Viewer moved to column ({}, {}): {} columns entered, {} left",
                viewer.x,
                viewer.y,
                shift.entered.len(),
                shift.exited.len()
            );
            for column in shift.exited {
                if self.world.recycle_column(column) {
                    self.commands.push(RenderCommand::RemoveColumn { column });
                }
            }
        } else {
            self.started = true;
            self.window.recenter(viewer);
            info!(
                "Initial generation around column ({}, {})",
                viewer.x, viewer.y
            );
        }

        for column in self.window.columns_by_rank() {
            if !self.world.contains_column(column) {
                self.density.request(column);
            }
        }
        self.density.reorder(&self.window);
        self.mesher.reorder_requests(&self.window);
        self.refresh_visibility();
    }

    fn refresh_visibility(&mut self) {
        let coords: Vec<ColumnCoord> = self.world.column_coords().collect();
        for column in coords {
            self.apply_visibility(column);
        }
    }

    fn apply_visibility(&mut self, coord: ColumnCoord) {
        let visible = self.window.is_visible(coord);
        let Some(column) = self.world.column_mut(coord) else {
            return;
        };
        if column.visible != visible {
            column.visible = visible;
            self.commands.push(RenderCommand::SetVisibility {
                column: coord,
                visible,
            });
        }
    }

    fn on_density_received(&mut self, density: ColumnDensity) {
        let ColumnDensity { coord, grids } = density;
        if self.window.contains(coord) && !self.world.contains_column(coord) {
            if self.world.add_column(coord, &grids).is_none() {
                warn!(
                    "No free column for ({}, {}), dropping its density",
                    coord.x, coord.y
                );
            } else {
                self.apply_visibility(coord);
                for dz in -1..=1 {
                    for dx in -1..=1 {
                        self.request_column_mesh(ColumnCoord::new(coord.x + dx, coord.y + dz));
                    }
                }
            }
        }
        self.density.recycle(grids);
    }

    /// Queues a whole-column mesh if the column has unmeshed chunks and all 8 neighbors.
    fn request_column_mesh(&mut self, coord: ColumnCoord) {
        if !self.world.column_neighbors_ready(coord) {
            return;
        }
        let Some(column) = self.world.column_mut(coord) else {
            return;
        };
        if column
            .chunks
            .iter()
            .all(|chunk| chunk.state != ChunkState::DensityReady)
        {
            return;
        }
        column.mark_mesh_pending();
        self.mesher.request_data(MeshRequest::Column(coord));
    }

    /// Requests a new mesh for a resident chunk after its density changed.
    ///
    /// If a job for the chunk is already running its result is outdated, so the chunk is
    /// flagged dirty and re-queued when that job delivers. A queued request reads the
    /// density at dispatch and needs no flag.
    ///
    /// # Returns
    /// `false` if the chunk is not resident.
    pub fn mark_for_mesh_generation(&mut self, coord: ChunkCoord) -> bool {
        let in_flight = self.mesher.is_in_flight(coord);
        let Some(chunk) = self.world.chunk_mut(coord) else {
            return false;
        };
        if chunk.is_waiting_mesh() {
            if in_flight {
                chunk.dirty = true;
            }
        } else {
            chunk.state = ChunkState::MeshPending;
            self.mesher.request_data(MeshRequest::Chunk(coord));
        }
        true
    }

    fn on_mesh_received(&mut self, delivery: MeshDelivery) {
        let MeshDelivery {
            request,
            epoch,
            result,
        } = delivery;
        let column = request.column();
        if self.world.column(column).map(|column| column.epoch) != Some(epoch) {
            debug!("Discarding mesh of recycled column ({}, {})", column.x, column.y);
            return;
        }

        match result {
            Ok(meshes) => {
                for (coord, mesh) in meshes {
                    self.assign_mesh(coord, Arc::new(mesh));
                }
            }
            Err(message) => {
                warn!("Mesh job for {request:?} failed: {message}");
                let world_height = self.world.world_height();
                for coord in request.chunk_coords(world_height) {
                    self.recover_failed(coord);
                }
            }
        }
    }

    fn assign_mesh(&mut self, coord: ChunkCoord, mesh: Arc<ChunkMesh>) {
        let Some(chunk) = self.world.chunk_mut(coord) else {
            return;
        };
        chunk.mesh = Some(Arc::clone(&mesh));
        let remesh = chunk.dirty;
        if remesh {
            chunk.dirty = false;
            chunk.state = ChunkState::MeshPending;
        } else {
            chunk.state = ChunkState::Meshed;
        }

        self.commands.push(RenderCommand::UploadMesh {
            coord,
            mesh,
            collider: self.generate_colliders,
        });
        if remesh {
            self.mesher.request_data(MeshRequest::Chunk(coord));
        }
    }

    fn recover_failed(&mut self, coord: ChunkCoord) {
        let Some(chunk) = self.world.chunk_mut(coord) else {
            return;
        };
        if chunk.state != ChunkState::MeshPending {
            return;
        }
        if chunk.dirty {
            chunk.dirty = false;
            self.mesher.request_data(MeshRequest::Chunk(coord));
        } else {
            chunk.state = ChunkState::DensityReady;
        }
    }

    /// Adds `delta` to one voxel and re-meshes every chunk whose mesh reads it.
    ///
    /// Besides the owning chunk, a voxel on the low face, edge or corner of a chunk is
    /// also meshed by the up to 7 neighbors below it on those axes.
    ///
    /// # Returns
    /// `Ok(true)` if the density changed, `Ok(false)` if it was already clamped.
    ///
    /// # Errors
    /// - [`EditError::OutOfBounds`] if `local` is outside the chunk
    /// - [`EditError::ChunkNotLoaded`] if the chunk is not resident
    pub fn modify_block(
        &mut self,
        coord: ChunkCoord,
        local: Point3<i32>,
        delta: i32,
    ) -> Result<bool, EditError> {
        if !self.world.chunk_size().contains(local) {
            return Err(EditError::OutOfBounds(local));
        }
        let chunk = self
            .world
            .chunk_mut(coord)
            .ok_or(EditError::ChunkNotLoaded(coord))?;
        let voxel = Point3::new(local.x as usize, local.y as usize, local.z as usize);
        if !chunk.modify_density(voxel, delta) {
            return Ok(false);
        }

        self.mark_for_mesh_generation(coord);
        for bits in 1..8 {
            let offset = Vector3::new(bits & 1, (bits >> 1) & 1, (bits >> 2) & 1);
            let on_low_faces = (offset.x == 0 || local.x == 0)
                && (offset.y == 0 || local.y == 0)
                && (offset.z == 0 || local.z == 0);
            if on_low_faces {
                self.mark_for_mesh_generation(coord - offset);
            }
        }
        Ok(true)
    }

    /// Stops all workers and returns every column to the pool.
    pub fn destroy(&mut self) {
        self.density.destroy();
        self.mesher.destroy();
        let coords: Vec<ColumnCoord> = self.world.column_coords().collect();
        for column in coords {
            self.world.recycle_column(column);
        }
        self.commands.clear();
        self.started = false;
        info!("Streaming stopped");
    }
}

//! # CPU Mesh Producer
//!
//! Runs mesh jobs on two bounded [`WorkerPool`]s: one for whole-column jobs and one for
//! single-chunk jobs. Each slot tracks the request it is working on so a finished or
//! failed job can be matched back to its chunks.
//!
//! ## Update Cycle
//! 1. Poll both pools. Every finished slot is freed, its chunks leave the in-flight set
//!    and its buffers go back to the scratch list
//! 2. Walk the request queue front to back and fill free slots with requests whose
//!    neighbors are resident and whose chunks are not already being meshed
//!
//! ## Performance Considerations
//! - Density snapshots are copied on the update thread; a column job copies
//!   `world_height` chunks plus their borders
//! - Scratch buffers are recycled, so steady-state meshing allocates only the output

use std::collections::HashSet;

use log::{debug, error, info, warn};

use crate::terrain_state::streaming::StreamingWindow;
use crate::terrain_state::task_management::{
    BoxedTask, JobOutcome, PoolStats, WorkerPool,
};
use crate::terrain_state::voxels::chunk::{ChunkCoord, ChunkSize};
use crate::terrain_state::voxels::world::ChunkWorld;

use super::tasks::{ChunkMeshTask, ColumnMeshTask, MeshJobOutput, MeshScratch};
use super::{snapshot_halo, MeshDelivery, MeshProducer, MeshRequest, MeshRequestQueue};

#[derive(Debug, Clone)]
struct Assignment {
    request: MeshRequest,
    epoch: u64,
    coords: Vec<ChunkCoord>,
}

struct MeshPool {
    pool: WorkerPool<MeshJobOutput>,
    assignments: Vec<Option<Assignment>>,
}

impl MeshPool {
    fn new(name: &str, slots: usize) -> std::io::Result<Self> {
        Ok(MeshPool {
            pool: WorkerPool::new(name, slots)?,
            assignments: vec![None; slots],
        })
    }

    fn free_slots(&self) -> usize {
        self.pool.capacity().saturating_sub(self.pool.in_flight())
    }
}

/// Mesh producer backed by worker threads.
pub struct CpuMeshProducer {
    size: ChunkSize,
    world_height: usize,
    queue: MeshRequestQueue,
    columns: MeshPool,
    chunks: MeshPool,
    in_flight: HashSet<ChunkCoord>,
    scratch: Vec<MeshScratch>,
}

impl CpuMeshProducer {
    /// Starts both pools with `slots` workers each.
    ///
    /// # Errors
    /// Returns the OS error if a worker thread cannot be spawned.
    pub fn new(size: ChunkSize, world_height: usize, slots: usize) -> std::io::Result<Self> {
        let producer = CpuMeshProducer {
            size,
            world_height,
            queue: MeshRequestQueue::new(),
            columns: MeshPool::new("column-mesh", slots)?,
            chunks: MeshPool::new("chunk-mesh", slots)?,
            in_flight: HashSet::new(),
            scratch: Vec::new(),
        };
        info!("CPU mesh producer ready with {slots} column and {slots} chunk slots");
        Ok(producer)
    }

    /// Statistics of the column pool and the chunk pool.
    pub fn pool_stats(&self) -> (PoolStats, PoolStats) {
        (self.columns.pool.stats(), self.chunks.pool.stats())
    }

    fn collect_finished(&mut self, deliveries: &mut Vec<MeshDelivery>) {
        for mesh_pool in [&mut self.columns, &mut self.chunks] {
            for completion in mesh_pool.pool.poll_completed() {
                let Some(assignment) = mesh_pool.assignments[completion.slot].take() else {
                    warn!(
                        "{} slot {} finished without an assignment",
                        mesh_pool.pool.name(),
                        completion.slot
                    );
                    continue;
                };
                for coord in &assignment.coords {
                    self.in_flight.remove(coord);
                }

                let result = match completion.outcome {
                    JobOutcome::Finished(output) => {
                        self.scratch.push(output.scratch);
                        Ok(output.meshes)
                    }
                    JobOutcome::Panicked(message) => {
                        error!(
                            "{} job for {:?} panicked: {message}",
                            mesh_pool.pool.name(),
                            assignment.request
                        );
                        Err(message)
                    }
                };
                deliveries.push(MeshDelivery {
                    request: assignment.request,
                    epoch: assignment.epoch,
                    result,
                });
            }
        }
    }

    fn build_task(
        &mut self,
        world: &ChunkWorld,
        request: MeshRequest,
        coords: &[ChunkCoord],
    ) -> BoxedTask<MeshJobOutput> {
        let size = self.size;
        let mut scratch = self
            .scratch
            .pop()
            .unwrap_or_else(|| MeshScratch::new(size));
        scratch.reserve_halos(coords.len());
        for (coord, halo) in coords.iter().zip(scratch.halos.iter_mut()) {
            snapshot_halo(world, *coord, halo);
        }

        match request {
            MeshRequest::Column(column) => {
                Box::new(ColumnMeshTask::new(column, coords.to_vec(), scratch))
            }
            MeshRequest::Chunk(coord) => Box::new(ChunkMeshTask::new(coord, scratch)),
        }
    }

    fn dispatch(&mut self, world: &ChunkWorld, window: &StreamingWindow) -> usize {
        let mut free_columns = self.columns.free_slots();
        let mut free_chunks = self.chunks.free_slots();
        if free_columns == 0 && free_chunks == 0 {
            return 0;
        }

        let world_height = self.world_height;
        let in_flight = &self.in_flight;
        let mut reserved: HashSet<ChunkCoord> = HashSet::new();
        let ready = self.queue.take_ready(world, window, |request| {
            let free = match request {
                MeshRequest::Column(_) => &mut free_columns,
                MeshRequest::Chunk(_) => &mut free_chunks,
            };
            if *free == 0 {
                return false;
            }
            let coords = request.chunk_coords(world_height);
            if coords
                .iter()
                .any(|coord| in_flight.contains(coord) || reserved.contains(coord))
            {
                return false;
            }
            *free -= 1;
            reserved.extend(coords);
            true
        });

        let mut dispatched = 0;
        let mut rejected = Vec::new();
        for request in ready {
            let Some(epoch) = world.column(request.column()).map(|column| column.epoch) else {
                continue;
            };
            let coords = request.chunk_coords(world_height);
            let task = self.build_task(world, request, &coords);
            let mesh_pool = match request {
                MeshRequest::Column(_) => &mut self.columns,
                MeshRequest::Chunk(_) => &mut self.chunks,
            };

            match mesh_pool.pool.try_publish(task) {
                Ok(slot) => {
                    self.in_flight.extend(coords.iter().copied());
                    mesh_pool.assignments[slot] = Some(Assignment {
                        request,
                        epoch,
                        coords,
                    });
                    dispatched += 1;
                }
                Err(_) => rejected.push(request),
            }
        }

        if !rejected.is_empty() {
            warn!("{} mesh requests could not be published", rejected.len());
            self.queue.push_front(rejected);
        }
        dispatched
    }
}

impl MeshProducer for CpuMeshProducer {
    fn request_data(&mut self, request: MeshRequest) {
        self.queue.push(request);
    }

    fn manage_requests(
        &mut self,
        world: &ChunkWorld,
        window: &StreamingWindow,
    ) -> Vec<MeshDelivery> {
        let mut deliveries = Vec::new();
        self.collect_finished(&mut deliveries);
        let dispatched = self.dispatch(world, window);

        if dispatched > 0 || !deliveries.is_empty() {
            debug!(
                "Mesh jobs: {} delivered, {dispatched} dispatched, {} queued, {} running",
                deliveries.len(),
                self.queue.len(),
                self.jobs_in_flight()
            );
        }
        deliveries
    }

    fn reorder_requests(&mut self, window: &StreamingWindow) {
        self.queue.reorder(window);
    }

    fn pending_requests(&self) -> usize {
        self.queue.len()
    }

    fn jobs_in_flight(&self) -> usize {
        self.columns.pool.in_flight() + self.chunks.pool.in_flight()
    }

    fn is_in_flight(&self, coord: ChunkCoord) -> bool {
        self.in_flight.contains(&coord)
    }

    fn job_stats(&self) -> PoolStats {
        self.columns.pool.stats().merged(self.chunks.pool.stats())
    }

    fn destroy(&mut self) {
        self.columns.pool.shutdown();
        self.chunks.pool.shutdown();
        self.columns.assignments.fill(None);
        self.chunks.assignments.fill(None);
        self.queue.clear();
        self.in_flight.clear();
        self.scratch.clear();
        info!("CPU mesh producer stopped");
    }
}

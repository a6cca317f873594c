//! Mesh producer that runs jobs on the update thread.
//!
//! Serves the same queue and gating rules as [`CpuMeshProducer`](super::CpuMeshProducer)
//! without worker threads, bounded to a fixed number of jobs per tick. Useful on
//! targets without threads and for deterministic tests.

use log::debug;
use web_time::Instant;

use crate::terrain_state::streaming::StreamingWindow;
use crate::terrain_state::task_management::PoolStats;
use crate::terrain_state::voxels::chunk::{ChunkCoord, ChunkSize};
use crate::terrain_state::voxels::world::ChunkWorld;

use super::tasks::MeshScratch;
use super::{
    snapshot_halo, HaloDensity, MeshDelivery, MeshProducer, MeshRequest, MeshRequestQueue,
};

/// Synchronous mesh producer.
pub struct InlineMeshProducer {
    world_height: usize,
    jobs_per_update: usize,
    queue: MeshRequestQueue,
    scratch: MeshScratch,
    stats: PoolStats,
}

impl InlineMeshProducer {
    /// Creates a producer that runs at most `jobs_per_update` jobs per call to
    /// [`manage_requests`](MeshProducer::manage_requests).
    pub fn new(size: ChunkSize, world_height: usize, jobs_per_update: usize) -> Self {
        InlineMeshProducer {
            world_height,
            jobs_per_update: jobs_per_update.max(1),
            queue: MeshRequestQueue::new(),
            scratch: MeshScratch::new(size),
            stats: PoolStats::default(),
        }
    }

    fn run(&mut self, world: &ChunkWorld, request: MeshRequest) -> Option<MeshDelivery> {
        let epoch = world.column(request.column())?.epoch;
        let start = Instant::now();

        let coords = request.chunk_coords(self.world_height);
        let MeshScratch { mesher, halos } = &mut self.scratch;
        if halos.is_empty() {
            halos.push(HaloDensity::new(mesher.size()));
        }
        let halo = &mut halos[0];
        let meshes = coords
            .into_iter()
            .map(|coord| {
                snapshot_halo(world, coord, halo);
                (coord, mesher.mesh(halo))
            })
            .collect();

        self.stats.record_job(true, start.elapsed());
        Some(MeshDelivery {
            request,
            epoch,
            result: Ok(meshes),
        })
    }
}

impl MeshProducer for InlineMeshProducer {
    fn request_data(&mut self, request: MeshRequest) {
        self.queue.push(request);
    }

    fn manage_requests(
        &mut self,
        world: &ChunkWorld,
        window: &StreamingWindow,
    ) -> Vec<MeshDelivery> {
        let mut budget = self.jobs_per_update;
        let ready = self.queue.take_ready(world, window, |_| {
            if budget == 0 {
                return false;
            }
            budget -= 1;
            true
        });

        let deliveries: Vec<MeshDelivery> = ready
            .into_iter()
            .filter_map(|request| self.run(world, request))
            .collect();
        if !deliveries.is_empty() {
            debug!(
                "Meshed {} requests inline, {} queued",
                deliveries.len(),
                self.queue.len()
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
        0
    }

    fn is_in_flight(&self, _coord: ChunkCoord) -> bool {
        false
    }

    fn job_stats(&self) -> PoolStats {
        self.stats
    }

    fn destroy(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain_state::voxels::chunk::{ChunkState, ColumnCoord, DensityGrid};

    #[test]
    fn budget_limits_jobs_per_update() {
        let size = ChunkSize::new(4, 4);
        let mut world = ChunkWorld::new(1, size, 25);
        let mut grid = DensityGrid::empty(size);
        grid.set(1, 1, 1, 200);
        for z in -2..=2 {
            for x in -2..=2 {
                world.add_column(ColumnCoord::new(x, z), std::slice::from_ref(&grid));
                if let Some(column) = world.column_mut(ColumnCoord::new(x, z)) {
                    column.mark_mesh_pending();
                }
            }
        }
        let window = StreamingWindow::new(ColumnCoord::new(0, 0), 2, 2);

        let mut producer = InlineMeshProducer::new(size, 1, 2);
        for z in -1..=1 {
            for x in -1..=1 {
                producer.request_data(MeshRequest::Column(ColumnCoord::new(x, z)));
            }
        }
        producer.reorder_requests(&window);

        let deliveries = producer.manage_requests(&world, &window);
        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[0].request, MeshRequest::Column(ColumnCoord::new(0, 0)));
        assert_eq!(producer.pending_requests(), 7);

        let meshes = deliveries[0].result.as_ref().unwrap();
        assert_eq!(meshes.len(), 1);
        assert!(!meshes[0].1.is_empty());
        assert_eq!(producer.job_stats().completed, 2);
        assert_eq!(world.chunk(ChunkCoord::new(0, 0, 0)).unwrap().state, ChunkState::MeshPending);
    }
}

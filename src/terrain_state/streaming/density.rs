//! Density request queue and worker pool.
//!
//! Density jobs have no dependencies, so every queued column is dispatched as soon as a
//! worker slot frees up, nearest first.

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, error, info};

use crate::terrain_state::task_management::{JobOutcome, PoolStats, WorkerPool};
use crate::terrain_state::voxels::chunk::{ChunkSize, ColumnCoord, DensityGrid};
use crate::terrain_state::voxels::generation::HeightMapGenerator;
use crate::terrain_state::voxels::tasks::{ColumnDensity, ColumnGenerationTask};

use super::StreamingWindow;

/// Schedules column density generation.
pub struct DensityProducer {
    generator: Arc<HeightMapGenerator>,
    size: ChunkSize,
    world_height: usize,
    pool: WorkerPool<ColumnDensity>,
    slots: Vec<Option<ColumnCoord>>,
    queue: Vec<ColumnCoord>,
    queued: HashSet<ColumnCoord>,
    in_flight: HashSet<ColumnCoord>,
    buffers: Vec<Vec<DensityGrid>>,
}

impl DensityProducer {
    /// Starts `workers` density threads.
    ///
    /// # Errors
    /// Returns the OS error if a worker thread cannot be spawned.
    pub fn new(
        generator: Arc<HeightMapGenerator>,
        size: ChunkSize,
        world_height: usize,
        workers: usize,
    ) -> std::io::Result<Self> {
        Ok(DensityProducer {
            generator,
            size,
            world_height,
            pool: WorkerPool::new("density", workers)?,
            slots: vec![None; workers],
            queue: Vec::new(),
            queued: HashSet::new(),
            in_flight: HashSet::new(),
            buffers: Vec::new(),
        })
    }

    /// Queues `column` unless it is already queued or being generated.
    pub fn request(&mut self, column: ColumnCoord) {
        if self.in_flight.contains(&column) || !self.queued.insert(column) {
            return;
        }
        self.queue.push(column);
    }

    /// Whether `column` is queued or being generated.
    pub fn is_requested(&self, column: ColumnCoord) -> bool {
        self.queued.contains(&column) || self.in_flight.contains(&column)
    }

    /// Drops queued columns outside `window` and sorts the rest by spiral rank.
    pub fn reorder(&mut self, window: &StreamingWindow) {
        let queued = &mut self.queued;
        self.queue.retain(|column| {
            let keep = window.contains(*column);
            if !keep {
                queued.remove(column);
            }
            keep
        });
        self.queue.sort_by_key(|&column| window.rank(column));
    }

    /// Hands density buffers back for reuse by later jobs.
    pub fn recycle(&mut self, grids: Vec<DensityGrid>) {
        if self.buffers.len() < self.pool.capacity() * 2 {
            self.buffers.push(grids);
        }
    }

    /// Number of queued columns.
    pub fn pending_requests(&self) -> usize {
        self.queue.len()
    }

    /// Number of columns being generated.
    pub fn jobs_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Job statistics of the density pool.
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Collects finished columns, then fills free slots from the front of the queue.
    ///
    /// Columns that panicked are queued again if they are still inside `window`.
    pub fn manage_requests(&mut self, window: &StreamingWindow) -> Vec<ColumnDensity> {
        let mut finished = Vec::new();
        for completion in self.pool.poll_completed() {
            let column = self.slots[completion.slot].take();
            if let Some(column) = column {
                self.in_flight.remove(&column);
            }
            match completion.outcome {
                JobOutcome::Finished(density) => finished.push(density),
                JobOutcome::Panicked(message) => {
                    error!("Density job for {column:?} panicked: {message}");
                    if let Some(column) = column.filter(|&column| window.contains(column)) {
                        self.request(column);
                    }
                }
            }
        }

        let mut dispatched = 0;
        while self.pool.has_available_slot() {
            let Some(index) = self.queue.iter().position(|&column| window.contains(column)) else {
                for column in self.queue.drain(..) {
                    self.queued.remove(&column);
                }
                break;
            };
            for column in self.queue.drain(..index) {
                self.queued.remove(&column);
            }
            let column = self.queue.remove(0);

            let task = ColumnGenerationTask::new(
                column,
                Arc::clone(&self.generator),
                self.world_height,
                self.size,
                self.buffers.pop().unwrap_or_default(),
            );
            match self.pool.try_publish(Box::new(task)) {
                Ok(slot) => {
                    self.queued.remove(&column);
                    self.in_flight.insert(column);
                    self.slots[slot] = Some(column);
                    dispatched += 1;
                }
                Err(_) => {
                    self.queue.insert(0, column);
                    break;
                }
            }
        }

        if dispatched > 0 || !finished.is_empty() {
            debug!(
                "Density jobs: {} delivered, {dispatched} dispatched, {} queued",
                finished.len(),
                self.queue.len()
            );
        }
        finished
    }

    /// Stops the workers and forgets every request.
    pub fn destroy(&mut self) {
        self.pool.shutdown();
        self.slots.fill(None);
        self.queue.clear();
        self.queued.clear();
        self.in_flight.clear();
        self.buffers.clear();
        info!("Density producer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain_state::settings::HeightMapSettings;
    use std::thread;
    use std::time::Duration;
    use web_time::Instant;

    fn producer(workers: usize) -> DensityProducer {
        let generator = Arc::new(HeightMapGenerator::new(&HeightMapSettings::default(), 4));
        DensityProducer::new(generator, ChunkSize::new(4, 4), 2, workers).unwrap()
    }

    #[test]
    fn serves_nearest_columns_first() {
        let window = StreamingWindow::new(ColumnCoord::new(0, 0), 2, 2);
        let mut density = producer(1);
        density.request(ColumnCoord::new(2, 2));
        density.request(ColumnCoord::new(0, 0));
        density.request(ColumnCoord::new(0, 0));
        density.request(ColumnCoord::new(9, 9));
        density.reorder(&window);
        assert_eq!(density.pending_requests(), 2);

        density.manage_requests(&window);
        assert_eq!(density.jobs_in_flight(), 1);
        assert!(density.is_requested(ColumnCoord::new(0, 0)));
        assert!(!density.is_requested(ColumnCoord::new(9, 9)));

        let mut delivered = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(10);
        while delivered.len() < 2 && Instant::now() < deadline {
            delivered.extend(density.manage_requests(&window));
            thread::sleep(Duration::from_millis(1));
        }
        let order: Vec<ColumnCoord> = delivered.iter().map(|column| column.coord).collect();
        assert_eq!(order, vec![ColumnCoord::new(0, 0), ColumnCoord::new(2, 2)]);
        assert!(delivered.iter().all(|column| column.grids.len() == 2));
        assert_eq!(density.stats().completed, 2);
    }

    #[test]
    fn columns_that_left_the_window_are_not_dispatched() {
        let mut window = StreamingWindow::new(ColumnCoord::new(0, 0), 1, 1);
        let mut density = producer(1);
        density.request(ColumnCoord::new(-1, 0));
        window.recenter(ColumnCoord::new(5, 0));
        assert!(density.manage_requests(&window).is_empty());
        assert_eq!(density.jobs_in_flight(), 0);
        assert_eq!(density.pending_requests(), 0);
        assert!(!density.is_requested(ColumnCoord::new(-1, 0)));
    }
}

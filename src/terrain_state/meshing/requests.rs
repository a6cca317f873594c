//! Pending mesh requests, ordered by distance from the viewer.

use std::collections::HashSet;

use crate::terrain_state::streaming::StreamingWindow;
use crate::terrain_state::voxels::world::ChunkWorld;

use super::MeshRequest;

/// A deduplicated queue of mesh requests served front to back.
#[derive(Debug, Default)]
pub struct MeshRequestQueue {
    entries: Vec<MeshRequest>,
    queued: HashSet<MeshRequest>,
}

impl MeshRequestQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `request` unless an identical request is already queued.
    ///
    /// # Returns
    /// `true` if the request was added.
    pub fn push(&mut self, request: MeshRequest) -> bool {
        if !self.queued.insert(request) {
            return false;
        }
        self.entries.push(request);
        true
    }

    /// Puts requests that could not be dispatched back at the front, keeping their order.
    pub fn push_front(&mut self, requests: Vec<MeshRequest>) {
        let requests: Vec<MeshRequest> = requests
            .into_iter()
            .filter(|request| self.queued.insert(*request))
            .collect();
        self.entries.splice(0..0, requests);
    }

    /// Number of queued requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `request` is queued.
    pub fn contains(&self, request: &MeshRequest) -> bool {
        self.queued.contains(request)
    }

    /// Drops requests outside `window` and sorts the rest nearest first.
    pub fn reorder(&mut self, window: &StreamingWindow) {
        let queued = &mut self.queued;
        self.entries.retain(|request| {
            let keep = window.contains(request.column());
            if !keep {
                queued.remove(request);
            }
            keep
        });
        self.entries.sort_by_key(|request| request.priority(window));
    }

    /// Removes and returns the requests that can be dispatched now, front first.
    ///
    /// A request is dropped when its column left the window or was recycled, or when no
    /// chunk it covers still waits for a mesh. It stays queued while a neighbor it reads
    /// is missing or while `admit` refuses it. Otherwise it is taken.
    ///
    /// # Arguments
    /// * `admit` - Reserves a job for the request. Returns `false` when an overlapping job
    ///   is running or no capacity is left
    pub fn take_ready(
        &mut self,
        world: &ChunkWorld,
        window: &StreamingWindow,
        mut admit: impl FnMut(&MeshRequest) -> bool,
    ) -> Vec<MeshRequest> {
        let mut taken = Vec::new();
        let queued = &mut self.queued;
        self.entries.retain(|request| {
            let stale = !window.contains(request.column())
                || !world.contains_column(request.column())
                || !request.still_pending(world);
            if stale {
                queued.remove(request);
                return false;
            }
            if !request.neighbors_ready(world) || !admit(request) {
                return true;
            }
            queued.remove(request);
            taken.push(*request);
            false
        });
        taken
    }

    /// Removes every request.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.queued.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain_state::voxels::chunk::{
        ChunkCoord, ChunkSize, ChunkState, ColumnCoord, DensityGrid,
    };

    fn world_with(columns: &[(i32, i32)]) -> ChunkWorld {
        let size = ChunkSize::new(4, 4);
        let mut world = ChunkWorld::new(1, size, 32);
        for &(x, z) in columns {
            world.add_column(ColumnCoord::new(x, z), &[DensityGrid::empty(size)]);
        }
        world
    }

    fn mark_pending(world: &mut ChunkWorld, coord: ChunkCoord) {
        if let Some(chunk) = world.chunk_mut(coord) {
            chunk.state = ChunkState::MeshPending;
        }
    }

    #[test]
    fn duplicates_are_ignored() {
        let mut queue = MeshRequestQueue::new();
        assert!(queue.push(MeshRequest::Chunk(ChunkCoord::new(0, 0, 0))));
        assert!(!queue.push(MeshRequest::Chunk(ChunkCoord::new(0, 0, 0))));
        assert!(queue.push(MeshRequest::Column(ColumnCoord::new(0, 0))));
        assert_eq!(queue.len(), 2);

        queue.push_front(vec![
            MeshRequest::Column(ColumnCoord::new(0, 0)),
            MeshRequest::Column(ColumnCoord::new(1, 0)),
        ]);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.entries[0], MeshRequest::Column(ColumnCoord::new(1, 0)));
    }

    #[test]
    fn reorder_sorts_by_spiral_and_drops_outside() {
        let window = StreamingWindow::new(ColumnCoord::new(0, 0), 1, 1);
        let mut queue = MeshRequestQueue::new();
        queue.push(MeshRequest::Column(ColumnCoord::new(1, 1)));
        queue.push(MeshRequest::Column(ColumnCoord::new(5, 0)));
        queue.push(MeshRequest::Chunk(ChunkCoord::new(0, 0, 0)));
        queue.push(MeshRequest::Column(ColumnCoord::new(1, 0)));
        queue.reorder(&window);

        assert_eq!(queue.len(), 3);
        assert!(!queue.contains(&MeshRequest::Column(ColumnCoord::new(5, 0))));
        assert_eq!(
            queue.entries,
            vec![
                MeshRequest::Chunk(ChunkCoord::new(0, 0, 0)),
                MeshRequest::Column(ColumnCoord::new(1, 0)),
                MeshRequest::Column(ColumnCoord::new(1, 1)),
            ]
        );
    }

    #[test]
    fn take_ready_gates_on_neighbors_and_admission() {
        let all: Vec<(i32, i32)> = (-2..=2)
            .flat_map(|z| (-2..=2).map(move |x| (x, z)))
            .collect();
        let mut world = world_with(&all);
        let window = StreamingWindow::new(ColumnCoord::new(0, 0), 2, 2);
        for (x, z) in [(0, 0), (1, 0), (2, 0)] {
            mark_pending(&mut world, ChunkCoord::new(x, 0, z));
        }

        let mut queue = MeshRequestQueue::new();
        queue.push(MeshRequest::Chunk(ChunkCoord::new(0, 0, 0)));
        queue.push(MeshRequest::Chunk(ChunkCoord::new(1, 0, 0)));
        queue.push(MeshRequest::Chunk(ChunkCoord::new(2, 0, 0)));
        queue.push(MeshRequest::Chunk(ChunkCoord::new(-1, 0, 0)));

        let mut budget = 1;
        let taken = queue.take_ready(&world, &window, |_| {
            if budget == 0 {
                return false;
            }
            budget -= 1;
            true
        });

        // (2, 0, 0) is on the window edge and waits for neighbors; (-1, 0, 0) is not
        // pending and is dropped.
        assert_eq!(taken, vec![MeshRequest::Chunk(ChunkCoord::new(0, 0, 0))]);
        assert_eq!(queue.len(), 2);
        assert!(queue.contains(&MeshRequest::Chunk(ChunkCoord::new(1, 0, 0))));
        assert!(queue.contains(&MeshRequest::Chunk(ChunkCoord::new(2, 0, 0))));

        let taken = queue.take_ready(&world, &window, |request| {
            *request != MeshRequest::Chunk(ChunkCoord::new(1, 0, 0))
        });
        assert!(taken.is_empty());
        assert_eq!(queue.len(), 2);
    }
}

//! Whole-column mesh job, used when a column first becomes meshable.

use log::trace;

use crate::terrain_state::task_management::Task;
use crate::terrain_state::voxels::chunk::{ChunkCoord, ColumnCoord};

use super::{MeshJobOutput, MeshScratch};

/// Meshes every chunk of a column, bottom to top, in one job.
#[derive(Debug)]
pub struct ColumnMeshTask {
    column: ColumnCoord,
    coords: Vec<ChunkCoord>,
    scratch: MeshScratch,
}

impl ColumnMeshTask {
    /// Creates the job. `scratch.halos[i]` holds the snapshot of `coords[i]`.
    ///
    /// # Panics
    /// Panics if there are fewer snapshots than chunks.
    pub fn new(column: ColumnCoord, coords: Vec<ChunkCoord>, scratch: MeshScratch) -> Self {
        assert!(
            scratch.halos.len() >= coords.len(),
            "column mesh job with {} snapshots for {} chunks",
            scratch.halos.len(),
            coords.len()
        );
        ColumnMeshTask {
            column,
            coords,
            scratch,
        }
    }
}

impl Task for ColumnMeshTask {
    type Output = MeshJobOutput;

    fn process(self: Box<Self>) -> MeshJobOutput {
        let ColumnMeshTask {
            column,
            coords,
            mut scratch,
        } = *self;
        let MeshScratch { mesher, halos } = &mut scratch;

        let meshes: Vec<_> = coords
            .into_iter()
            .zip(halos.iter())
            .map(|(coord, halo)| (coord, mesher.mesh(halo)))
            .collect();

        trace!(
            "Meshed column ({}, {}): {} triangles",
            column.x,
            column.y,
            meshes.iter().map(|(_, mesh)| mesh.triangle_count()).sum::<usize>()
        );
        MeshJobOutput { meshes, scratch }
    }
}

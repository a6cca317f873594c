//! # Mesh Tasks
//!
//! Worker jobs that run the mesher. A job owns copies of the density it reads, taken on
//! the update thread at dispatch, so workers never touch the world. The snapshots and
//! the mesher's buffers travel back with the result and are reused by later jobs.

pub mod chunk_mesh_task;
pub mod column_mesh_task;

use crate::terrain_state::voxels::chunk::{ChunkCoord, ChunkSize};

use super::{ChunkMesh, HaloDensity, MarchingCubesMesher};

pub use chunk_mesh_task::ChunkMeshTask;
pub use column_mesh_task::ColumnMeshTask;

/// Reusable buffers of one mesh job.
#[derive(Debug)]
pub struct MeshScratch {
    /// Mesher with its lattice and mapping tables.
    pub mesher: MarchingCubesMesher,
    /// One density snapshot per chunk of the job.
    pub halos: Vec<HaloDensity>,
}

impl MeshScratch {
    /// Allocates buffers for chunks of `size`.
    pub fn new(size: ChunkSize) -> Self {
        MeshScratch {
            mesher: MarchingCubesMesher::new(size),
            halos: Vec::new(),
        }
    }

    /// Makes sure at least `count` snapshots are allocated.
    pub fn reserve_halos(&mut self, count: usize) {
        let size = self.mesher.size();
        while self.halos.len() < count {
            self.halos.push(HaloDensity::new(size));
        }
    }
}

/// Output of a mesh job.
#[derive(Debug)]
pub struct MeshJobOutput {
    /// One mesh per chunk, in request order.
    pub meshes: Vec<(ChunkCoord, ChunkMesh)>,
    /// Buffers handed back for reuse.
    pub scratch: MeshScratch,
}

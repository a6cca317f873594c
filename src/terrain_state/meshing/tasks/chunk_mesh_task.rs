//! Single-chunk mesh job, used for edits and dirty re-meshes.

use log::trace;

use crate::terrain_state::task_management::Task;
use crate::terrain_state::voxels::chunk::ChunkCoord;

use super::{MeshJobOutput, MeshScratch};

/// Meshes one chunk from the snapshot in `scratch.halos[0]`.
#[derive(Debug)]
pub struct ChunkMeshTask {
    coord: ChunkCoord,
    scratch: MeshScratch,
}

impl ChunkMeshTask {
    /// Creates the job.
    ///
    /// # Panics
    /// Panics if `scratch` holds no density snapshot.
    pub fn new(coord: ChunkCoord, scratch: MeshScratch) -> Self {
        assert!(!scratch.halos.is_empty(), "chunk mesh job without a snapshot");
        ChunkMeshTask { coord, scratch }
    }
}

impl Task for ChunkMeshTask {
    type Output = MeshJobOutput;

    fn process(self: Box<Self>) -> MeshJobOutput {
        let ChunkMeshTask { coord, mut scratch } = *self;
        let MeshScratch { mesher, halos } = &mut scratch;
        let mesh = mesher.mesh(&halos[0]);
        trace!(
            "Meshed chunk ({}, {}, {}): {} triangles",
            coord.x,
            coord.y,
            coord.z,
            mesh.triangle_count()
        );
        MeshJobOutput {
            meshes: vec![(coord, mesh)],
            scratch,
        }
    }
}

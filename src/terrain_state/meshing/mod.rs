//! # Meshing
//!
//! Converts chunk density into indexed triangle meshes and schedules that work.
//!
//! ## Architecture
//! - [`marching_cubes`]: the two-phase mesher
//! - [`halo`]: padded density snapshots handed to mesh jobs
//! - [`MeshProducer`]: the interface the scheduler drives. [`CpuMeshProducer`] runs jobs
//!   on bounded worker pools and [`InlineMeshProducer`] meshes on the calling thread
//! - [`MeshRequestQueue`]: spiral-ordered pending requests shared by both producers
//!
//! ## Dependency Gating
//!
//! A request is only dispatched once every neighbor the mesher reads is resident: the 8
//! surrounding columns for a column request, the 26 surrounding chunks (clipped to the
//! world height) for a chunk request. No two jobs covering the same chunk are ever in
//! flight together.

pub mod halo;
pub mod march_tables;
pub mod marching_cubes;
mod inline;
mod producer;
mod requests;
pub mod tasks;

use crate::terrain_state::streaming::StreamingWindow;
use crate::terrain_state::task_management::PoolStats;
use crate::terrain_state::voxels::chunk::{column_of, ChunkCoord, ChunkState, ColumnCoord};
use crate::terrain_state::voxels::world::ChunkWorld;

pub use halo::HaloDensity;
pub use inline::InlineMeshProducer;
pub use marching_cubes::MarchingCubesMesher;
pub use producer::CpuMeshProducer;
pub use requests::MeshRequestQueue;

/// A mesh vertex. Positions are relative to the chunk origin.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    /// Chunk-local position in voxels.
    pub position: [f32; 3],
}

/// Indexed triangle mesh of one chunk. Empty when the chunk has no surface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkMesh {
    /// Deduplicated vertices.
    pub vertices: Vec<MeshVertex>,
    /// Triangle corner indices into `vertices`, three per triangle.
    pub indices: Vec<u32>,
}

impl ChunkMesh {
    /// Whether the mesh has no triangles.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Vertex data as raw bytes, ready for a GPU upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Index data as raw bytes, ready for a GPU upload.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Smooth per-vertex normals, weighted by the area of the adjacent triangles.
    ///
    /// Vertices not referenced by a non-degenerate triangle get a zero normal.
    pub fn compute_normals(&self) -> Vec<[f32; 3]> {
        let mut normals = vec![[0.0f32; 3]; self.vertices.len()];
        for triangle in self.indices.chunks_exact(3) {
            let [a, b, c] = [triangle[0], triangle[1], triangle[2]]
                .map(|index| self.vertices[index as usize].position);
            let ab = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
            let ac = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
            let cross = [
                ab[1] * ac[2] - ab[2] * ac[1],
                ab[2] * ac[0] - ab[0] * ac[2],
                ab[0] * ac[1] - ab[1] * ac[0],
            ];
            for &index in triangle {
                let normal = &mut normals[index as usize];
                for axis in 0..3 {
                    normal[axis] += cross[axis];
                }
            }
        }

        for normal in &mut normals {
            let length = normal.iter().map(|c| c * c).sum::<f32>().sqrt();
            if length > f32::EPSILON {
                for component in normal.iter_mut() {
                    *component /= length;
                }
            } else {
                *normal = [0.0; 3];
            }
        }
        normals
    }
}

/// A unit of mesh work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshRequest {
    /// Mesh every chunk of a column in one job.
    Column(ColumnCoord),
    /// Mesh a single chunk.
    Chunk(ChunkCoord),
}

impl MeshRequest {
    /// Column the request belongs to.
    pub fn column(&self) -> ColumnCoord {
        match *self {
            MeshRequest::Column(column) => column,
            MeshRequest::Chunk(coord) => column_of(coord),
        }
    }

    /// Chunks the request produces meshes for.
    pub fn chunk_coords(&self, world_height: usize) -> Vec<ChunkCoord> {
        match *self {
            MeshRequest::Column(column) => (0..world_height as i32)
                .map(|y| ChunkCoord::new(column.x, y, column.y))
                .collect(),
            MeshRequest::Chunk(coord) => vec![coord],
        }
    }

    /// Whether every neighbor the mesher reads is resident.
    pub fn neighbors_ready(&self, world: &ChunkWorld) -> bool {
        match *self {
            MeshRequest::Column(column) => world.column_neighbors_ready(column),
            MeshRequest::Chunk(coord) => world.chunk_neighbors_ready(coord),
        }
    }

    /// Whether the target still waits for a mesh. Requests superseded by another job
    /// are dropped when this turns false.
    pub fn still_pending(&self, world: &ChunkWorld) -> bool {
        match *self {
            MeshRequest::Column(column) => world.column(column).is_some_and(|column| {
                column
                    .chunks
                    .iter()
                    .any(|chunk| chunk.state == ChunkState::MeshPending)
            }),
            MeshRequest::Chunk(coord) => world
                .chunk(coord)
                .is_some_and(|chunk| chunk.state == ChunkState::MeshPending),
        }
    }

    /// Priority key: spiral rank of the column, then height. Columns sort before the
    /// chunks of the same column.
    pub fn priority(&self, window: &StreamingWindow) -> (usize, i32) {
        let rank = window.rank(self.column()).unwrap_or(usize::MAX);
        match *self {
            MeshRequest::Column(_) => (rank, -1),
            MeshRequest::Chunk(coord) => (rank, coord.y),
        }
    }
}

/// Meshes produced by one job, or the reason the job failed.
#[derive(Debug)]
pub struct MeshDelivery {
    /// The request the job served.
    pub request: MeshRequest,
    /// Epoch of the target column when the job was dispatched.
    pub epoch: u64,
    /// One mesh per chunk of the request, or the panic message of the job.
    pub result: Result<Vec<(ChunkCoord, ChunkMesh)>, String>,
}

/// Copies the density the mesher reads around `coord` into `halo`.
pub fn snapshot_halo(world: &ChunkWorld, coord: ChunkCoord, halo: &mut HaloDensity) {
    halo.fill(coord, |neighbor| world.chunk(neighbor).map(|chunk| &chunk.density));
}

/// A source of chunk meshes driven by the streaming scheduler.
///
/// Implementations own their pending request queue. The scheduler enqueues work with
/// [`request_data`](MeshProducer::request_data) and calls
/// [`manage_requests`](MeshProducer::manage_requests) once per tick to collect finished
/// meshes and start new jobs.
pub trait MeshProducer {
    /// Queues a request. Identical requests already queued are ignored.
    fn request_data(&mut self, request: MeshRequest);

    /// Collects finished jobs, then dispatches ready requests in priority order.
    fn manage_requests(
        &mut self,
        world: &ChunkWorld,
        window: &StreamingWindow,
    ) -> Vec<MeshDelivery>;

    /// Drops queued requests outside `window` and re-sorts the rest by priority.
    fn reorder_requests(&mut self, window: &StreamingWindow);

    /// Number of queued requests.
    fn pending_requests(&self) -> usize;

    /// Number of jobs running.
    fn jobs_in_flight(&self) -> usize;

    /// Whether a running job covers `coord`.
    fn is_in_flight(&self, coord: ChunkCoord) -> bool;

    /// Timing and outcome counts of every job run so far.
    fn job_stats(&self) -> PoolStats;

    /// Stops all work and releases worker resources.
    fn destroy(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normals_of_a_flat_quad_point_up() {
        let mesh = ChunkMesh {
            vertices: vec![
                MeshVertex { position: [0.0, 1.0, 0.0] },
                MeshVertex { position: [0.0, 1.0, 1.0] },
                MeshVertex { position: [1.0, 1.0, 0.0] },
                MeshVertex { position: [1.0, 1.0, 1.0] },
            ],
            indices: vec![0, 1, 2, 2, 1, 3],
        };
        for normal in mesh.compute_normals() {
            assert!((normal[1] - 1.0).abs() < 1e-6);
        }
        assert_eq!(mesh.vertex_bytes().len(), 4 * 12);
        assert_eq!(mesh.index_bytes().len(), 6 * 4);
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn column_requests_cover_the_whole_stack() {
        let request = MeshRequest::Column(ColumnCoord::new(2, -1));
        assert_eq!(
            request.chunk_coords(3),
            vec![
                ChunkCoord::new(2, 0, -1),
                ChunkCoord::new(2, 1, -1),
                ChunkCoord::new(2, 2, -1)
            ]
        );
        assert_eq!(
            MeshRequest::Chunk(ChunkCoord::new(4, 1, 5)).column(),
            ColumnCoord::new(4, 5)
        );
    }
}

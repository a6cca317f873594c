//! # Marching Cubes Mesher
//!
//! Extracts an indexed triangle mesh from a padded density snapshot in two phases.
//!
//! ## Phase 1: edge evaluation
//!
//! Every lattice point of the chunk (`(W+1)·(H+1)·(W+1)` of them) has three candidate
//! vertices, one per positive axis edge. A vertex exists when exactly one end of the edge
//! is solid. Its offset along the edge starts as the solid corner's density and is then
//! raised by the incline correction, which looks at the voxels beside the edge along the
//! two perpendicular axes. On a slope the neighbor density pulls the vertex outward so
//! that adjacent cubes agree on where the surface runs. Points are evaluated in parallel
//! with rayon since each one only reads density.
//!
//! ## Phase 2: triangulation
//!
//! Each cube looks up its corner configuration in the triangulation table. Six
//! configurations form a single quad whose diagonal is picked from the vertex positions
//! instead of the table. Triangle corners are identified by `(lattice id, axis)` and
//! deduplicated through a dense mapping table, producing an indexed mesh.
//!
//! ## Performance Considerations
//!
//! - The edge and mapping buffers live in the mesher and are reused between jobs
//! - Phase 2 is sequential because the mapping table is shared by the whole job

use rayon::prelude::*;
use web_time::Instant;

use crate::terrain_state::voxels::chunk::ChunkSize;

use super::halo::HaloDensity;
use super::march_tables::{AMBIGUOUS, CORNERS, EDGES, END, TRIANGULATION};
use super::{ChunkMesh, MeshVertex};

/// Divisor mapping an edge value of 255 to just short of the far corner.
const EDGE_SCALE: f32 = 4081.0 / 16.0;

/// Whether the voxels beside an edge describe an incline: exactly one of the ±1
/// neighbors is populated, the far neighbor on the empty side is empty and the far
/// neighbor on the populated side is not.
///
/// # Arguments
/// * `n`, `p` - Densities one step along the negative and positive perpendicular
/// * `n2`, `p2` - Densities two steps along the negative and positive perpendicular
#[inline]
fn incline_condition(n: u8, p: u8, n2: u8, p2: u8) -> bool {
    let positive_side = p != 0 && n == 0;
    let negative_side = n != 0 && p == 0;
    (positive_side || negative_side)
        && (n2 == 0 || negative_side)
        && (p2 == 0 || positive_side)
}

/// Edge value implied by an incline with neighbor densities `n` and `p`.
#[inline]
fn incline_value(n: u8, p: u8, corner: u8) -> u8 {
    let neighbor = f32::from(if n > 0 { n } else { p });
    let corner = f32::from(corner);
    (255.0 * corner / (255.0 - neighbor + corner)) as u8
}

/// Lattice geometry of one chunk.
#[derive(Debug, Clone, Copy)]
struct Lattice {
    width: usize,
    height: usize,
}

impl Lattice {
    fn new(size: ChunkSize) -> Self {
        Lattice {
            width: size.width + 1,
            height: size.height + 1,
        }
    }

    fn len(&self) -> usize {
        self.width * self.height * self.width
    }

    #[inline]
    fn id(&self, x: usize, y: usize, z: usize) -> usize {
        x + y * self.width + z * self.width * self.height
    }

    #[inline]
    fn coord(&self, id: usize) -> [i32; 3] {
        [
            (id % self.width) as i32,
            ((id / self.width) % self.height) as i32,
            (id / (self.width * self.height)) as i32,
        ]
    }
}

#[inline]
fn shifted(point: [i32; 3], axis: usize, amount: i32) -> [i32; 3] {
    let mut result = point;
    result[axis] += amount;
    result
}

#[inline]
fn sample(halo: &HaloDensity, point: [i32; 3]) -> u8 {
    halo.get(point[0], point[1], point[2])
}

/// Correction of an edge vertex from the voxels beside it along `perpendicular`.
///
/// `direction` is the signed edge axis pointing from the solid corner to the empty one.
fn inclined_vertex(
    halo: &HaloDensity,
    point: [i32; 3],
    axis: usize,
    direction: i32,
    perpendicular: usize,
    corner: u8,
) -> u8 {
    if perpendicular == axis {
        return 0;
    }
    let base = if direction > 0 {
        shifted(point, axis, 1)
    } else {
        point
    };
    let p = sample(halo, shifted(base, perpendicular, 1));
    let n = sample(halo, shifted(base, perpendicular, -1));
    let p2 = sample(halo, shifted(base, perpendicular, 2));
    let n2 = sample(halo, shifted(base, perpendicular, -2));
    if incline_condition(n, p, n2, p2) {
        incline_value(n, p, corner)
    } else {
        0
    }
}

/// Edge value of the vertex on the positive `axis` edge of a lattice point, or 0 when the
/// edge does not cross the surface.
fn edge_vertex(halo: &HaloDensity, point: [i32; 3], axis: usize) -> u8 {
    let a = sample(halo, point);
    let b = sample(halo, shifted(point, axis, 1));
    if (a > 0) == (b > 0) {
        return 0;
    }

    let (corner, direction) = if a > 0 { (a, 1) } else { (b, -1) };
    let vertex = (0..3)
        .map(|perpendicular| inclined_vertex(halo, point, axis, direction, perpendicular, corner))
        .fold(corner, u8::max);

    if a > 0 {
        vertex
    } else {
        255 - vertex
    }
}

/// Marching cubes mesher with reusable scratch buffers.
#[derive(Debug)]
pub struct MarchingCubesMesher {
    size: ChunkSize,
    lattice: Lattice,
    edges: Vec<[u8; 3]>,
    mapping: Vec<u32>,
}

impl MarchingCubesMesher {
    /// Allocates the edge and mapping buffers for chunks of `size`.
    pub fn new(size: ChunkSize) -> Self {
        let lattice = Lattice::new(size);
        MarchingCubesMesher {
            size,
            lattice,
            edges: vec![[0; 3]; lattice.len()],
            mapping: vec![0; lattice.len() * 3],
        }
    }

    /// Chunk dimensions this mesher was sized for.
    pub fn size(&self) -> ChunkSize {
        self.size
    }

    /// Meshes the chunk at the center of `halo`.
    ///
    /// Vertex positions are chunk-local: `(0, 0, 0)` is the chunk origin.
    ///
    /// # Panics
    /// Panics if `halo` was sized for a different chunk size.
    pub fn mesh(&mut self, halo: &HaloDensity) -> ChunkMesh {
        assert_eq!(halo.size(), self.size, "halo size mismatch");
        let start = Instant::now();

        self.evaluate_edges(halo);
        let mesh = self.triangulate(halo);

        log::trace!(
            "Meshed {} triangles in {:?}",
            mesh.triangle_count(),
            start.elapsed()
        );
        mesh
    }

    /// Phase 1: evaluates the three candidate vertices of every lattice point.
    fn evaluate_edges(&mut self, halo: &HaloDensity) {
        let lattice = self.lattice;
        self.edges.par_iter_mut().enumerate().for_each(|(id, edge)| {
            let point = lattice.coord(id);
            *edge = [
                edge_vertex(halo, point, 0),
                edge_vertex(halo, point, 1),
                edge_vertex(halo, point, 2),
            ];
        });
    }

    fn configuration(halo: &HaloDensity, cube: [usize; 3]) -> u8 {
        CORNERS
            .iter()
            .enumerate()
            .fold(0u8, |config, (bit, corner)| {
                let solid = halo.is_solid(
                    (cube[0] + corner[0]) as i32,
                    (cube[1] + corner[1]) as i32,
                    (cube[2] + corner[2]) as i32,
                );
                if solid {
                    config | (1 << bit)
                } else {
                    config
                }
            })
    }

    /// `(lattice id, axis)` of a cube edge.
    fn vertex_id(&self, edge: u8, cube: [usize; 3]) -> (usize, usize) {
        let (offset, axis) = EDGES[edge as usize];
        let id = self.lattice.id(
            cube[0] + offset[0],
            cube[1] + offset[1],
            cube[2] + offset[2],
        );
        (id, axis)
    }

    fn vertex_position(&self, (id, axis): (usize, usize)) -> [f32; 3] {
        let coord = self.lattice.coord(id);
        let mut position = [coord[0] as f32, coord[1] as f32, coord[2] as f32];
        position[axis] += self.edges[id][axis] as f32 / EDGE_SCALE;
        position
    }

    /// Phase 2: triangulates every cube of the chunk into an indexed mesh.
    fn triangulate(&mut self, halo: &HaloDensity) -> ChunkMesh {
        self.mapping.fill(0);
        let mut mesh = ChunkMesh::default();

        for z in 0..self.size.width {
            for y in 0..self.size.height {
                for x in 0..self.size.width {
                    let cube = [x, y, z];
                    let config = Self::configuration(halo, cube);
                    let entry = &TRIANGULATION[config as usize];

                    if AMBIGUOUS.contains(&config) {
                        let v1 = self.vertex_id(entry[0], cube);
                        let v2 = self.vertex_id(entry[1], cube);
                        let v3 = self.vertex_id(entry[2], cube);
                        let v4 = self.vertex_id(entry[5], cube);
                        let (p1, p2, p3, p4) = (
                            self.vertex_position(v1),
                            self.vertex_position(v2),
                            self.vertex_position(v3),
                            self.vertex_position(v4),
                        );
                        let median_a = |axis: usize| (p2[axis] + p3[axis]) / 2.0;
                        let median_b = |axis: usize| (p1[axis] + p4[axis]) / 2.0;

                        let split_on_first_diagonal = match config {
                            153 => median_a(0) >= median_b(0),
                            102 => median_a(0) < median_b(0),
                            15 => median_a(1) >= median_b(1),
                            240 => median_a(1) < median_b(1),
                            51 => median_a(2) >= median_b(2),
                            _ => median_a(2) < median_b(2),
                        };

                        let corners = if split_on_first_diagonal {
                            [v1, v2, v3, v3, v2, v4]
                        } else {
                            [v1, v2, v4, v1, v4, v3]
                        };
                        for vertex in corners {
                            self.push_vertex(&mut mesh, vertex);
                        }
                    } else {
                        for &edge in entry.iter().take_while(|&&edge| edge != END) {
                            let vertex = self.vertex_id(edge, cube);
                            self.push_vertex(&mut mesh, vertex);
                        }
                    }
                }
            }
        }
        mesh
    }

    fn push_vertex(&mut self, mesh: &mut ChunkMesh, vertex: (usize, usize)) {
        let slot = vertex.0 * 3 + vertex.1;
        if self.mapping[slot] == 0 {
            mesh.vertices.push(MeshVertex {
                position: self.vertex_position(vertex),
            });
            self.mapping[slot] = mesh.vertices.len() as u32;
        }
        mesh.indices.push(self.mapping[slot] - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain_state::voxels::chunk::{ChunkCoord, DensityGrid};
    use crate::terrain_state::voxels::generation::{density::build_density, height_map::HeightMap};
    use std::collections::{HashMap, HashSet};

    const SIZE: ChunkSize = ChunkSize::new(8, 8);

    fn mesh_isolated(grid: &DensityGrid) -> ChunkMesh {
        let mut halo = HaloDensity::new(grid.size());
        halo.fill(ChunkCoord::new(0, 0, 0), |coord| {
            (coord == ChunkCoord::new(0, 0, 0)).then_some(grid)
        });
        MarchingCubesMesher::new(grid.size()).mesh(&halo)
    }

    #[test]
    fn incline_predicate() {
        assert!(incline_condition(0, 10, 0, 0));
        assert!(incline_condition(0, 10, 0, 255));
        assert!(!incline_condition(0, 10, 5, 0));
        assert!(incline_condition(10, 0, 0, 0));
        assert!(!incline_condition(10, 0, 0, 7));
        assert!(!incline_condition(10, 10, 0, 0));
        assert!(!incline_condition(0, 0, 0, 0));
    }

    #[test]
    fn incline_value_never_exceeds_255() {
        for neighbor in [1u8, 100, 255] {
            for corner in [1u8, 128, 255] {
                let value = incline_value(0, neighbor, corner);
                assert!(value >= 1 || neighbor < 255);
                assert!(incline_value(neighbor, 0, corner) == value);
            }
        }
        assert_eq!(incline_value(255, 0, 7), 255);
    }

    #[test]
    fn uniform_grids_produce_no_triangles() {
        let empty = DensityGrid::empty(SIZE);
        assert!(mesh_isolated(&empty).is_empty());

        let full = DensityGrid::filled(SIZE, 255);
        let mut halo = HaloDensity::new(SIZE);
        halo.fill(ChunkCoord::new(0, 0, 0), |_| Some(&full));
        let mesh = MarchingCubesMesher::new(SIZE).mesh(&halo);
        assert!(mesh.is_empty());
        assert!(mesh.vertices.is_empty());
    }

    #[test]
    fn closed_blob_is_watertight() {
        let mut grid = DensityGrid::empty(SIZE);
        for x in 2..6 {
            for y in 2..6 {
                for z in 2..6 {
                    grid.set(x, y, z, 255);
                }
            }
        }

        let mesh = mesh_isolated(&grid);
        assert!(!mesh.is_empty());
        assert_eq!(mesh.indices.len() % 3, 0);

        let mut edge_use: HashMap<(u32, u32), usize> = HashMap::new();
        for triangle in mesh.indices.chunks_exact(3) {
            for (a, b) in [
                (triangle[0], triangle[1]),
                (triangle[1], triangle[2]),
                (triangle[2], triangle[0]),
            ] {
                *edge_use.entry((a.min(b), a.max(b))).or_default() += 1;
            }
        }
        assert!(edge_use.values().all(|&count| count == 2));
    }

    #[test]
    fn vertices_are_deduplicated() {
        let map = HeightMap::from_samples(
            8,
            (0..100).map(|i| 3.0 + (i % 7) as f64 * 0.4).collect(),
        );
        let grid = build_density(&map, 0, SIZE);
        let mesh = mesh_isolated(&grid);

        let referenced: HashSet<u32> = mesh.indices.iter().copied().collect();
        assert_eq!(referenced.len(), mesh.vertices.len());
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
        assert!(mesh.vertices.len() < mesh.indices.len());
    }

    #[test]
    fn meshing_is_idempotent() {
        let mut rng = fastrand::Rng::with_seed(42);
        let mut grid = DensityGrid::empty(SIZE);
        for value in grid.as_mut_slice() {
            *value = if rng.bool() { rng.u8(..) } else { 0 };
        }

        let mut halo = HaloDensity::new(SIZE);
        halo.fill(ChunkCoord::new(0, 0, 0), |coord| {
            (coord == ChunkCoord::new(0, 0, 0)).then_some(&grid)
        });

        let mut mesher = MarchingCubesMesher::new(SIZE);
        let first = mesher.mesh(&halo);
        let second = mesher.mesh(&halo);
        let fresh = MarchingCubesMesher::new(SIZE).mesh(&halo);
        assert_eq!(first, second);
        assert_eq!(first, fresh);
    }

    #[test]
    fn adjacent_chunks_share_boundary_vertices() {
        let map = HeightMap::flat(8, 4.5);
        let grids: HashMap<ChunkCoord, DensityGrid> = [ChunkCoord::new(0, 0, 0), ChunkCoord::new(1, 0, 0)]
            .into_iter()
            .map(|coord| (coord, build_density(&map, 0, SIZE)))
            .collect();

        let mesh_at = |coord: ChunkCoord| {
            let mut halo = HaloDensity::new(SIZE);
            halo.fill(coord, |c| grids.get(&c));
            MarchingCubesMesher::new(SIZE).mesh(&halo)
        };
        let key = |p: [f32; 3]| {
            (
                (p[0] * 1000.0).round() as i64,
                (p[1] * 1000.0).round() as i64,
                (p[2] * 1000.0).round() as i64,
            )
        };

        let left: HashSet<_> = mesh_at(ChunkCoord::new(0, 0, 0))
            .vertices
            .iter()
            .filter(|v| v.position[0] == 8.0)
            .map(|v| key(v.position))
            .collect();
        let right: HashSet<_> = mesh_at(ChunkCoord::new(1, 0, 0))
            .vertices
            .iter()
            .filter(|v| v.position[0] == 0.0)
            .map(|v| key([v.position[0] + 8.0, v.position[1], v.position[2]]))
            .collect();

        assert!(!left.is_empty());
        assert_eq!(left, right);
    }
}

//! # Chunk Module
//!
//! This module provides the [`Chunk`] struct and the coordinate helpers used to map
//! between world space, chunk coordinates and chunk-local voxel positions.
//!
//! ## Density Storage
//!
//! A chunk stores one byte per voxel in a [`DensityGrid`]:
//! - `0` is a fully empty voxel
//! - `255` is a fully solid voxel
//! - anything in between is the fractional height of the surface inside that voxel
//!
//! Values are laid out as `x + z * width + y * width * width`, so a horizontal slice is
//! contiguous. Chunks never reallocate their grid: when a column is recycled the new
//! density is copied into the existing buffer.
//!
//! ## Coordinates
//!
//! Chunk coordinates are integer lattice points ([`ChunkCoord`]). World positions are
//! converted with floor division, so negative positions land in negative chunks and
//! local positions are always in `0..width` / `0..height`.

use std::sync::Arc;

use cgmath::{Point2, Point3};
use serde::{Deserialize, Serialize};

use crate::terrain_state::meshing::ChunkMesh;

/// Lattice coordinate of a chunk. Equality and hashing are by value.
pub type ChunkCoord = Point3<i32>;

/// Horizontal coordinate shared by every chunk of a column.
pub type ColumnCoord = Point2<i32>;

/// Returns the column a chunk belongs to.
pub fn column_of(coord: ChunkCoord) -> ColumnCoord {
    Point2::new(coord.x, coord.z)
}

/// Voxel dimensions of a chunk: `width × height × width`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkSize {
    /// Extent along x and z.
    pub width: usize,
    /// Extent along y.
    pub height: usize,
}

impl Default for ChunkSize {
    fn default() -> Self {
        ChunkSize {
            width: 32,
            height: 32,
        }
    }
}

impl ChunkSize {
    /// Creates a chunk size.
    pub const fn new(width: usize, height: usize) -> Self {
        ChunkSize { width, height }
    }

    /// Number of voxels in one horizontal slice.
    pub const fn plane(&self) -> usize {
        self.width * self.width
    }

    /// Number of voxels in a chunk.
    pub const fn volume(&self) -> usize {
        self.plane() * self.height
    }

    /// Whether a chunk-local position lies inside the chunk.
    pub fn contains(&self, local: Point3<i32>) -> bool {
        local.x >= 0
            && local.y >= 0
            && local.z >= 0
            && (local.x as usize) < self.width
            && (local.y as usize) < self.height
            && (local.z as usize) < self.width
    }
}

/// Converts an integer world position to the coordinate of the chunk containing it.
pub fn world_to_chunk_coord(position: Point3<i32>, size: ChunkSize) -> ChunkCoord {
    let (w, h) = (size.width as i32, size.height as i32);
    Point3::new(
        position.x.div_euclid(w),
        position.y.div_euclid(h),
        position.z.div_euclid(w),
    )
}

/// Converts a continuous world position to the coordinate of the chunk containing it.
pub fn world_pos_to_chunk_coord(position: Point3<f32>, size: ChunkSize) -> ChunkCoord {
    world_to_chunk_coord(
        Point3::new(
            position.x.floor() as i32,
            position.y.floor() as i32,
            position.z.floor() as i32,
        ),
        size,
    )
}

/// Converts an integer world position to its position inside the owning chunk.
pub fn world_to_local(position: Point3<i32>, size: ChunkSize) -> Point3<i32> {
    let (w, h) = (size.width as i32, size.height as i32);
    Point3::new(
        position.x.rem_euclid(w),
        position.y.rem_euclid(h),
        position.z.rem_euclid(w),
    )
}

/// World position of a chunk's `(0, 0, 0)` voxel.
pub fn chunk_origin(coord: ChunkCoord, size: ChunkSize) -> Point3<i32> {
    let (w, h) = (size.width as i32, size.height as i32);
    Point3::new(coord.x * w, coord.y * h, coord.z * w)
}

/// Contiguous `width × height × width` buffer of 8-bit density values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DensityGrid {
    size: ChunkSize,
    values: Box<[u8]>,
}

impl DensityGrid {
    /// A grid where every voxel is empty.
    pub fn empty(size: ChunkSize) -> Self {
        Self::filled(size, 0)
    }

    /// A grid where every voxel has the same value.
    pub fn filled(size: ChunkSize, value: u8) -> Self {
        DensityGrid {
            size,
            values: vec![value; size.volume()].into_boxed_slice(),
        }
    }

    /// Dimensions of the grid.
    pub fn size(&self) -> ChunkSize {
        self.size
    }

    /// Linear index of a voxel.
    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        x + z * self.size.width + y * self.size.plane()
    }

    /// Density at a voxel.
    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> u8 {
        self.values[self.index(x, y, z)]
    }

    /// Overwrites the density at a voxel.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, z: usize, value: u8) {
        let index = self.index(x, y, z);
        self.values[index] = value;
    }

    /// Raw values in `x + z*W + y*W*W` order.
    pub fn as_slice(&self) -> &[u8] {
        &self.values
    }

    /// Mutable raw values in `x + z*W + y*W*W` order.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.values
    }

    /// Sets every voxel to `value`.
    pub fn fill(&mut self, value: u8) {
        self.values.fill(value);
    }

    /// Copies another grid of the same size into this one without reallocating.
    ///
    /// # Panics
    /// Panics if the sizes differ.
    pub fn copy_from(&mut self, other: &DensityGrid) {
        assert_eq!(self.size, other.size, "density grid size mismatch");
        self.values.copy_from_slice(&other.values);
    }

    /// Whether every voxel is empty.
    pub fn is_all_empty(&self) -> bool {
        self.values.iter().all(|&value| value == 0)
    }

    /// Whether every voxel is fully solid.
    pub fn is_all_solid(&self) -> bool {
        self.values.iter().all(|&value| value == 255)
    }
}

/// Mesh lifecycle of a resident chunk.
///
/// A chunk only exists once its density arrived, so the earlier states of a
/// coordinate (not requested, density pending) are tracked by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// Density is present, no mesh has been requested.
    DensityReady,
    /// A mesh request is queued or in flight.
    MeshPending,
    /// The current mesh matches the density.
    Meshed,
}

/// A `width × height × width` region of the terrain.
///
/// Chunks are created once per pool slot and recycled: [`Chunk::reset`] reassigns the
/// coordinate and drops the mesh while keeping the density allocation.
#[derive(Debug)]
pub struct Chunk {
    /// Lattice coordinate of this chunk.
    pub coord: ChunkCoord,
    /// Voxel densities.
    pub density: DensityGrid,
    /// Last mesh received for this chunk. `None` until the first mesh arrives.
    pub mesh: Option<Arc<ChunkMesh>>,
    /// Mesh lifecycle state.
    pub state: ChunkState,
    /// The density changed while a mesh job was pending.
    pub dirty: bool,
}

impl Chunk {
    /// Creates an empty chunk for a pool slot.
    pub fn new(coord: ChunkCoord, size: ChunkSize) -> Self {
        Chunk {
            coord,
            density: DensityGrid::empty(size),
            mesh: None,
            state: ChunkState::DensityReady,
            dirty: false,
        }
    }

    /// Reassigns the chunk to a new coordinate and clears its mesh and flags.
    pub fn reset(&mut self, coord: ChunkCoord) {
        self.coord = coord;
        self.mesh = None;
        self.state = ChunkState::DensityReady;
        self.dirty = false;
    }

    /// Whether a mesh job is queued or running for this chunk.
    pub fn is_waiting_mesh(&self) -> bool {
        self.state == ChunkState::MeshPending
    }

    /// Whether a mesh has been assigned since the last reset.
    pub fn has_mesh(&self) -> bool {
        self.mesh.is_some()
    }

    /// Adds `delta` to a voxel's density, clamped to `0..=255`.
    ///
    /// # Returns
    /// `true` if the stored value changed.
    pub fn modify_density(&mut self, local: Point3<usize>, delta: i32) -> bool {
        let old = self.density.get(local.x, local.y, local.z);
        let new = (old as i32 + delta).clamp(0, 255) as u8;
        if new == old {
            return false;
        }
        self.density.set(local.x, local.y, local.z, new);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_positions_floor_into_chunks() {
        let size = ChunkSize::new(16, 32);
        assert_eq!(
            world_to_chunk_coord(Point3::new(0, 0, 0), size),
            Point3::new(0, 0, 0)
        );
        assert_eq!(
            world_to_chunk_coord(Point3::new(-1, 31, 16), size),
            Point3::new(-1, 0, 1)
        );
        assert_eq!(
            world_to_local(Point3::new(-1, 33, -17), size),
            Point3::new(15, 1, 15)
        );
        assert_eq!(
            world_pos_to_chunk_coord(Point3::new(-0.5, 64.2, 15.9), size),
            Point3::new(-1, 2, 0)
        );
    }

    #[test]
    fn origin_and_local_rebuild_the_world_position() {
        let size = ChunkSize::new(8, 8);
        let position = Point3::new(-13, 21, 7);
        let coord = world_to_chunk_coord(position, size);
        let origin = chunk_origin(coord, size);
        let local = world_to_local(position, size);
        assert_eq!(
            Point3::new(origin.x + local.x, origin.y + local.y, origin.z + local.z),
            position
        );
    }

    #[test]
    fn density_layout_is_x_then_z_then_y() {
        let size = ChunkSize::new(4, 3);
        let mut grid = DensityGrid::empty(size);
        grid.set(1, 2, 3, 9);
        assert_eq!(grid.as_slice()[1 + 3 * 4 + 2 * 16], 9);
        assert_eq!(grid.get(1, 2, 3), 9);
        assert!(!grid.is_all_empty());
    }

    #[test]
    fn modify_density_clamps_and_reports_change() {
        let mut chunk = Chunk::new(Point3::new(0, 0, 0), ChunkSize::new(4, 4));
        let local = Point3::new(1, 1, 1);
        assert!(!chunk.modify_density(local, -20));
        assert!(chunk.modify_density(local, 300));
        assert_eq!(chunk.density.get(1, 1, 1), 255);
        assert!(!chunk.modify_density(local, 1));
        assert!(chunk.modify_density(local, -55));
        assert_eq!(chunk.density.get(1, 1, 1), 200);
    }

    #[test]
    fn reset_clears_mesh_state() {
        let mut chunk = Chunk::new(Point3::new(0, 0, 0), ChunkSize::new(4, 4));
        chunk.mesh = Some(Arc::new(ChunkMesh::default()));
        chunk.state = ChunkState::MeshPending;
        chunk.dirty = true;
        chunk.reset(Point3::new(3, 1, -2));
        assert_eq!(chunk.coord, Point3::new(3, 1, -2));
        assert!(!chunk.has_mesh());
        assert!(!chunk.dirty);
        assert_eq!(chunk.state, ChunkState::DensityReady);
    }
}

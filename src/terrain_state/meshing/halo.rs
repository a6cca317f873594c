//! Padded density snapshot read by the mesher.
//!
//! The mesher samples up to two voxels beyond every face of a chunk, so a mesh job works
//! on a copy of the chunk's density surrounded by a two-voxel border taken from the 26
//! neighboring chunks. Neighbors that are not resident read as empty.

use bitvec::prelude::BitVec;

use crate::terrain_state::voxels::chunk::{ChunkCoord, ChunkSize, DensityGrid};

/// Number of border voxels on each side of the chunk.
pub const HALO: usize = 2;

/// A chunk's density plus a [`HALO`]-voxel border, indexed from `-HALO`.
#[derive(Debug, Clone)]
pub struct HaloDensity {
    size: ChunkSize,
    dims: [usize; 3],
    values: Vec<u8>,
    /// One bit per voxel, set where the density is non-zero.
    solid: BitVec,
}

/// Range of one axis that a neighbor contributes: local start, padded start, length.
///
/// The positive side is one voxel deeper than the negative side because lattice points
/// run to `extent` inclusive. Requires `extent > HALO`.
fn axis_span(offset: i32, extent: usize) -> (usize, usize, usize) {
    match offset {
        -1 => (extent - HALO, 0, HALO),
        0 => (0, HALO, extent),
        _ => (0, HALO + extent, HALO + 1),
    }
}

impl HaloDensity {
    /// Allocates a zeroed snapshot for chunks of `size`.
    pub fn new(size: ChunkSize) -> Self {
        let dims = [
            size.width + 2 * HALO + 1,
            size.height + 2 * HALO + 1,
            size.width + 2 * HALO + 1,
        ];
        let len = dims[0] * dims[1] * dims[2];
        HaloDensity {
            size,
            dims,
            values: vec![0; len],
            solid: BitVec::repeat(false, len),
        }
    }

    /// Chunk dimensions this snapshot was sized for.
    pub fn size(&self) -> ChunkSize {
        self.size
    }

    /// Copies the density of `center` and its neighbors into the snapshot.
    ///
    /// # Arguments
    /// * `center` - The chunk being meshed
    /// * `lookup` - Returns the density of a resident chunk, `None` for missing ones
    pub fn fill<'a>(
        &mut self,
        center: ChunkCoord,
        lookup: impl Fn(ChunkCoord) -> Option<&'a DensityGrid>,
    ) {
        self.values.fill(0);

        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let coord = ChunkCoord::new(center.x + dx, center.y + dy, center.z + dz);
                    let Some(grid) = lookup(coord) else {
                        continue;
                    };
                    self.copy_neighbor(grid, [dx, dy, dz]);
                }
            }
        }

        for (index, &value) in self.values.iter().enumerate() {
            self.solid.set(index, value > 0);
        }
    }

    fn copy_neighbor(&mut self, grid: &DensityGrid, offset: [i32; 3]) {
        let (lx, px, nx) = axis_span(offset[0], self.size.width);
        let (ly, py, ny) = axis_span(offset[1], self.size.height);
        let (lz, pz, nz) = axis_span(offset[2], self.size.width);

        let source = grid.as_slice();
        for y in 0..ny {
            for z in 0..nz {
                let src = grid.index(lx, ly + y, lz + z);
                let dst = self.padded_index(px, py + y, pz + z);
                self.values[dst..dst + nx].copy_from_slice(&source[src..src + nx]);
            }
        }
    }

    #[inline]
    fn padded_index(&self, x: usize, y: usize, z: usize) -> usize {
        x + z * self.dims[0] + y * self.dims[0] * self.dims[2]
    }

    #[inline]
    fn index(&self, x: i32, y: i32, z: i32) -> usize {
        let h = HALO as i32;
        self.padded_index((x + h) as usize, (y + h) as usize, (z + h) as usize)
    }

    /// Density at a chunk-local position, `-HALO..=extent + HALO` on every axis.
    #[inline]
    pub fn get(&self, x: i32, y: i32, z: i32) -> u8 {
        self.values[self.index(x, y, z)]
    }

    /// Whether the density at a chunk-local position is non-zero.
    #[inline]
    pub fn is_solid(&self, x: i32, y: i32, z: i32) -> bool {
        self.solid[self.index(x, y, z)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn border_comes_from_neighbors() {
        let size = ChunkSize::new(4, 4);
        let mut grids = HashMap::new();
        for (coord, value) in [
            (ChunkCoord::new(0, 0, 0), 10u8),
            (ChunkCoord::new(1, 0, 0), 20),
            (ChunkCoord::new(-1, 0, 0), 30),
            (ChunkCoord::new(0, 1, 0), 40),
            (ChunkCoord::new(1, 1, 1), 50),
        ] {
            grids.insert(coord, DensityGrid::filled(size, value));
        }

        let mut halo = HaloDensity::new(size);
        halo.fill(ChunkCoord::new(0, 0, 0), |coord| grids.get(&coord));

        assert_eq!(halo.get(0, 0, 0), 10);
        assert_eq!(halo.get(3, 3, 3), 10);
        assert_eq!(halo.get(4, 0, 0), 20);
        assert_eq!(halo.get(6, 3, 3), 20);
        assert_eq!(halo.get(-1, 2, 2), 30);
        assert_eq!(halo.get(-2, 2, 2), 30);
        assert_eq!(halo.get(1, 6, 1), 40);
        assert_eq!(halo.get(6, 6, 6), 50);
        assert_eq!(halo.get(0, -1, 0), 0);
        assert_eq!(halo.get(-2, -2, -2), 0);
        assert!(halo.is_solid(5, 1, 1));
        assert!(!halo.is_solid(1, -2, 1));
    }

    #[test]
    fn refill_clears_previous_snapshot() {
        let size = ChunkSize::new(4, 4);
        let full = DensityGrid::filled(size, 255);
        let mut halo = HaloDensity::new(size);
        halo.fill(ChunkCoord::new(0, 0, 0), |_| Some(&full));
        assert_eq!(halo.get(-2, 6, 6), 255);

        halo.fill(ChunkCoord::new(0, 0, 0), |coord| {
            (coord == ChunkCoord::new(0, 0, 0)).then_some(&full)
        });
        assert_eq!(halo.get(-2, 6, 6), 0);
        assert!(!halo.is_solid(4, 0, 0));
        assert!(halo.is_solid(3, 0, 0));
    }

    #[test]
    fn local_values_follow_grid_layout() {
        let size = ChunkSize::new(4, 6);
        let mut grid = DensityGrid::empty(size);
        grid.set(1, 5, 2, 77);
        let mut halo = HaloDensity::new(size);
        halo.fill(ChunkCoord::new(3, 0, 3), |coord| {
            (coord == ChunkCoord::new(3, 0, 3)).then_some(&grid)
        });
        assert_eq!(halo.get(1, 5, 2), 77);
        assert_eq!(halo.get(2, 5, 1), 0);
    }
}

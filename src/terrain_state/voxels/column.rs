//! # Chunk Column
//!
//! A vertical stack of `world_height` chunks sharing an `(x, z)` coordinate. Columns
//! are the unit of density generation, recycling and visibility.

use cgmath::Point3;

use super::chunk::{Chunk, ChunkSize, ChunkState, ColumnCoord, DensityGrid};

/// A stack of chunks owned and recycled as a unit.
#[derive(Debug)]
pub struct ChunkColumn {
    /// Horizontal coordinate of the column.
    pub coord: ColumnCoord,
    /// Chunks indexed by their `y` coordinate.
    pub chunks: Vec<Chunk>,
    /// Whether the renderer should show this column.
    pub visible: bool,
    /// Incremented every time the column is assigned a new coordinate. Results of jobs
    /// dispatched against an older epoch are discarded.
    pub epoch: u64,
}

impl ChunkColumn {
    /// Creates a pooled column with empty chunks.
    pub fn new(world_height: usize, size: ChunkSize) -> Self {
        let chunks = (0..world_height)
            .map(|y| Chunk::new(Point3::new(0, y as i32, 0), size))
            .collect();
        ChunkColumn {
            coord: ColumnCoord::new(0, 0),
            chunks,
            visible: false,
            epoch: 0,
        }
    }

    /// Assigns the column to `coord` and copies in freshly generated density.
    ///
    /// `density` must hold one grid per chunk, bottom to top.
    pub fn assign(&mut self, coord: ColumnCoord, density: &[DensityGrid]) {
        self.coord = coord;
        self.visible = false;
        self.epoch += 1;
        for (y, (chunk, grid)) in self.chunks.iter_mut().zip(density).enumerate() {
            chunk.reset(Point3::new(coord.x, y as i32, coord.y));
            chunk.density.copy_from(grid);
        }
    }

    /// Whether any chunk of the column has received a mesh.
    pub fn has_mesh(&self) -> bool {
        self.chunks.iter().any(Chunk::has_mesh)
    }

    /// Whether any chunk of the column has a mesh job queued or running.
    pub fn is_waiting_mesh(&self) -> bool {
        self.chunks.iter().any(Chunk::is_waiting_mesh)
    }

    /// Marks every chunk as waiting on a column mesh job.
    pub fn mark_mesh_pending(&mut self) {
        for chunk in &mut self.chunks {
            chunk.state = ChunkState::MeshPending;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_recoords_chunks_and_bumps_epoch() {
        let size = ChunkSize::new(4, 4);
        let mut column = ChunkColumn::new(3, size);
        let grids = vec![DensityGrid::filled(size, 255), DensityGrid::empty(size), DensityGrid::empty(size)];

        column.assign(ColumnCoord::new(5, -2), &grids);
        assert_eq!(column.epoch, 1);
        assert_eq!(column.chunks[2].coord, Point3::new(5, 2, -2));
        assert!(column.chunks[0].density.is_all_solid());
        assert!(column.chunks[1].density.is_all_empty());

        column.mark_mesh_pending();
        assert!(column.is_waiting_mesh());

        column.assign(ColumnCoord::new(0, 0), &grids);
        assert_eq!(column.epoch, 2);
        assert!(!column.is_waiting_mesh());
        assert!(!column.has_mesh());
    }
}

//! # World Module
//!
//! This module provides [`ChunkWorld`], the central coordinate → column map of the
//! resident terrain.
//!
//! ## Architecture
//!
//! Columns live in a fixed arena allocated at startup, sized for the whole streaming
//! window (`(2G+1)²` columns for a generation radius `G`). A hash map resolves column
//! coordinates to arena slots and a free list holds slots available for reassignment.
//! Chunks never hold references to each other; neighbor lookups always go through the
//! map by coordinate.
//!
//! ## Performance Considerations
//!
//! - No chunk or density allocation happens after construction
//! - Chunk lookup is one hash lookup plus an index into the column
//! - Recycling a column is O(1) and does not touch its density

use std::collections::{HashMap, VecDeque};

use cgmath::Point3;
use log::debug;

use super::chunk::{column_of, Chunk, ChunkCoord, ChunkSize, ColumnCoord, DensityGrid};
use super::column::ChunkColumn;

/// Arena of pooled columns addressed by coordinate.
pub struct ChunkWorld {
    size: ChunkSize,
    world_height: usize,
    slots: Vec<ChunkColumn>,
    columns: HashMap<ColumnCoord, usize>,
    free: VecDeque<usize>,
}

impl ChunkWorld {
    /// Allocates `capacity` columns of `world_height` chunks each.
    pub fn new(world_height: usize, size: ChunkSize, capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| ChunkColumn::new(world_height, size))
            .collect();
        ChunkWorld {
            size,
            world_height,
            slots,
            columns: HashMap::with_capacity(capacity),
            free: (0..capacity).collect(),
        }
    }

    /// Voxel dimensions of every chunk.
    pub fn chunk_size(&self) -> ChunkSize {
        self.size
    }

    /// Number of chunks per column.
    pub fn world_height(&self) -> usize {
        self.world_height
    }

    /// Number of resident columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether no column is resident.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Number of pooled columns available for assignment.
    pub fn free_slots(&self) -> usize {
        self.free.len()
    }

    /// Takes a column from the pool, assigns it to `coord` and fills its density.
    ///
    /// # Returns
    /// The new epoch of the column, or `None` if the coordinate is already resident or
    /// the pool is exhausted.
    pub fn add_column(&mut self, coord: ColumnCoord, density: &[DensityGrid]) -> Option<u64> {
        if self.columns.contains_key(&coord) {
            return None;
        }
        let slot = self.free.pop_front()?;
        let column = &mut self.slots[slot];
        column.assign(coord, density);
        self.columns.insert(coord, slot);
        Some(column.epoch)
    }

    /// Returns a resident column to the pool.
    ///
    /// # Returns
    /// `true` if the column was resident.
    pub fn recycle_column(&mut self, coord: ColumnCoord) -> bool {
        match self.columns.remove(&coord) {
            Some(slot) => {
                self.slots[slot].visible = false;
                self.free.push_back(slot);
                debug!("Recycled column ({}, {})", coord.x, coord.y);
                true
            }
            None => false,
        }
    }

    /// Whether the column is resident.
    pub fn contains_column(&self, coord: ColumnCoord) -> bool {
        self.columns.contains_key(&coord)
    }

    /// Whether the chunk is resident. Chunks outside `0..world_height` never are.
    pub fn contains_chunk(&self, coord: ChunkCoord) -> bool {
        self.in_height(coord.y) && self.contains_column(column_of(coord))
    }

    /// Looks up a resident column.
    pub fn column(&self, coord: ColumnCoord) -> Option<&ChunkColumn> {
        self.columns.get(&coord).map(|&slot| &self.slots[slot])
    }

    /// Looks up a resident column mutably.
    pub fn column_mut(&mut self, coord: ColumnCoord) -> Option<&mut ChunkColumn> {
        self.columns
            .get(&coord)
            .copied()
            .map(move |slot| &mut self.slots[slot])
    }

    /// Coordinates of all resident columns, in no particular order.
    pub fn column_coords(&self) -> impl Iterator<Item = ColumnCoord> + '_ {
        self.columns.keys().copied()
    }

    /// Resident columns, in no particular order.
    pub fn columns(&self) -> impl Iterator<Item = &ChunkColumn> + '_ {
        self.columns.values().map(|&slot| &self.slots[slot])
    }

    /// Looks up a resident chunk.
    pub fn chunk(&self, coord: ChunkCoord) -> Option<&Chunk> {
        if !self.in_height(coord.y) {
            return None;
        }
        self.column(column_of(coord))
            .map(|column| &column.chunks[coord.y as usize])
    }

    /// Looks up a resident chunk mutably.
    pub fn chunk_mut(&mut self, coord: ChunkCoord) -> Option<&mut Chunk> {
        if !self.in_height(coord.y) {
            return None;
        }
        self.column_mut(column_of(coord))
            .map(|column| &mut column.chunks[coord.y as usize])
    }

    /// Whether all 8 horizontal neighbors of a column are resident.
    pub fn column_neighbors_ready(&self, coord: ColumnCoord) -> bool {
        (-1..=1).all(|dx| {
            (-1..=1).all(|dz| {
                (dx == 0 && dz == 0)
                    || self.contains_column(ColumnCoord::new(coord.x + dx, coord.y + dz))
            })
        })
    }

    /// Whether every lattice neighbor of a chunk inside the world height is resident.
    ///
    /// Neighbors above the top or below the bottom of the world are not required; the
    /// mesher reads them as empty.
    pub fn chunk_neighbors_ready(&self, coord: ChunkCoord) -> bool {
        (-1..=1).all(|dx| {
            (-1..=1).all(|dz| {
                (-1..=1).all(|dy| {
                    let y = coord.y + dy;
                    !self.in_height(y)
                        || self.contains_chunk(Point3::new(coord.x + dx, y, coord.z + dz))
                })
            })
        })
    }

    fn in_height(&self, y: i32) -> bool {
        y >= 0 && (y as usize) < self.world_height
    }
}

//! # Column Generation Task
//!
//! Builds the height map of one column and fills the density grid of every chunk in the
//! stack. Grids are recycled: the scheduler hands back buffers from earlier jobs so a
//! steady-state stream allocates nothing.

use std::sync::Arc;

use log::trace;

use crate::terrain_state::task_management::Task;
use crate::terrain_state::voxels::chunk::{ChunkSize, ColumnCoord, DensityGrid};
use crate::terrain_state::voxels::generation::density::fill_density;
use crate::terrain_state::voxels::generation::height_map::HeightMapGenerator;

/// Density of every chunk in a column, bottom to top.
#[derive(Debug)]
pub struct ColumnDensity {
    /// Column the density belongs to.
    pub coord: ColumnCoord,
    /// One grid per chunk.
    pub grids: Vec<DensityGrid>,
}

/// Generates the density of one column on a worker thread.
pub struct ColumnGenerationTask {
    coord: ColumnCoord,
    generator: Arc<HeightMapGenerator>,
    world_height: usize,
    size: ChunkSize,
    grids: Vec<DensityGrid>,
}

impl ColumnGenerationTask {
    /// Creates a task for `coord`.
    ///
    /// # Arguments
    /// * `generator` - Shared, read-only height map generator
    /// * `grids` - Recycled buffers; missing or mis-sized ones are reallocated
    pub fn new(
        coord: ColumnCoord,
        generator: Arc<HeightMapGenerator>,
        world_height: usize,
        size: ChunkSize,
        mut grids: Vec<DensityGrid>,
    ) -> Self {
        grids.retain(|grid| grid.size() == size);
        grids.truncate(world_height);
        ColumnGenerationTask {
            coord,
            generator,
            world_height,
            size,
            grids,
        }
    }
}

impl Task for ColumnGenerationTask {
    type Output = ColumnDensity;

    fn process(self: Box<Self>) -> ColumnDensity {
        let ColumnGenerationTask {
            coord,
            generator,
            world_height,
            size,
            mut grids,
        } = *self;

        let height_map = generator.create_height_map(coord);
        grids.resize_with(world_height, || DensityGrid::empty(size));
        for (y, grid) in grids.iter_mut().enumerate() {
            fill_density(grid, &height_map, (y * size.height) as i32);
        }

        trace!(
            "Generated column ({}, {}), heights {:.1}..{:.1}",
            coord.x,
            coord.y,
            height_map.min,
            height_map.max
        );
        ColumnDensity { coord, grids }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain_state::settings::{
        HeightFunctionSettings, HeightLayerSettings, HeightMapSettings,
    };

    fn flat_generator(height: f64) -> Arc<HeightMapGenerator> {
        let settings = HeightMapSettings {
            layers: vec![HeightLayerSettings {
                function: HeightFunctionSettings::Flat { height },
                ..Default::default()
            }],
            ..Default::default()
        };
        Arc::new(HeightMapGenerator::new(&settings, 8))
    }

    #[test]
    fn fills_every_chunk_of_the_stack() {
        let size = ChunkSize::new(8, 8);
        let task = ColumnGenerationTask::new(
            ColumnCoord::new(3, -2),
            flat_generator(0.5),
            4,
            size,
            Vec::new(),
        );
        let output = Box::new(task).process();
        assert_eq!(output.coord, ColumnCoord::new(3, -2));
        assert_eq!(output.grids.len(), 4);
        assert!(output.grids.iter().all(|grid| grid.size() == size));
    }

    #[test]
    fn recycled_buffers_are_reused_and_resized() {
        let size = ChunkSize::new(8, 8);
        let recycled = vec![
            DensityGrid::filled(size, 9),
            DensityGrid::filled(ChunkSize::new(4, 4), 9),
            DensityGrid::filled(size, 9),
            DensityGrid::filled(size, 9),
        ];
        let task = ColumnGenerationTask::new(
            ColumnCoord::new(0, 0),
            flat_generator(0.5),
            2,
            size,
            recycled,
        );
        let output = Box::new(task).process();
        assert_eq!(output.grids.len(), 2);
        assert!(output.grids.iter().all(|grid| grid.size() == size));
    }
}

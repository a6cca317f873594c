//! # Density Field Builder
//!
//! Turns a [`HeightMap`] into the 8-bit density of one chunk's vertical slice.
//!
//! Voxels well below the surface are solid (255) and voxels above it are empty (0).
//! The voxels a column's surface passes through get fractional values. On flat ground a
//! single voxel holds the fractional height. On slopes the transition band spans
//! from the column height down to the lowest of its four neighbors, and the voxels in
//! that band get a linear gradient. The mesher turns this into smooth slopes instead of
//! stair steps.

use crate::terrain_state::voxels::chunk::{ChunkSize, DensityGrid};

use super::height_map::HeightMap;

/// Builds the density of the chunk slice starting at world height `y_position`.
pub fn build_density(height_map: &HeightMap, y_position: i32, size: ChunkSize) -> DensityGrid {
    let mut grid = DensityGrid::empty(size);
    fill_density(&mut grid, height_map, y_position);
    grid
}

/// Overwrites `grid` with the density of the chunk slice starting at `y_position`.
pub fn fill_density(grid: &mut DensityGrid, height_map: &HeightMap, y_position: i32) {
    let size = grid.size();
    let (width, height) = (size.width, size.height);
    let bottom = y_position as f64;

    if height_map.max <= bottom {
        grid.fill(0);
        return;
    }
    if height_map.min >= bottom + height as f64 {
        grid.fill(255);
        return;
    }

    grid.fill(0);

    // Everything below the lowest sample is solid in every column.
    let chunk_fill_height = ((height_map.min - bottom).floor() as i32).max(0) as usize;
    grid.as_mut_slice()[..size.plane() * chunk_fill_height.min(height)].fill(255);

    for x in 0..width {
        for z in 0..width {
            let (xi, zi) = (x as i32, z as i32);
            let column_height = height_map.get(xi, zi) - bottom;
            if column_height <= 0.0 {
                continue;
            }

            let min_height = [
                height_map.get(xi + 1, zi),
                height_map.get(xi - 1, zi),
                height_map.get(xi, zi + 1),
                height_map.get(xi, zi - 1),
            ]
            .iter()
            .map(|h| h - bottom)
            .fold(column_height, f64::min);

            let floor_height = column_height.floor() as i32;
            let floor_min = min_height.floor() as i32;

            let fill_max = (height as i32 - 1).min(if floor_height == floor_min {
                floor_min - 1
            } else {
                floor_min
            });
            let mut y = chunk_fill_height as i32;
            while y <= fill_max {
                grid.set(x, y as usize, z, 255);
                y += 1;
            }
            if y >= height as i32 {
                continue;
            }

            if floor_height == floor_min || column_height - min_height <= 1.0 {
                if (floor_height as usize) < height {
                    let fraction = ((column_height - floor_height as f64) * 255.0).floor();
                    grid.set(x, floor_height as usize, z, fraction as u8);
                }
                continue;
            }

            let band = column_height - min_height;
            let max_y = (height as i32 - 1).min(floor_height);
            let low_y = (floor_min + 1).max(0);
            let increment = (255.0 / band).floor() as u8;
            let mut value = (255.0 * (column_height - floor_height as f64) / band).floor() as u8;
            if floor_height > max_y {
                let skipped = (floor_height - max_y).min(255) as u8;
                value = value.saturating_add(increment.saturating_mul(skipped));
            }
            for i in (low_y..=max_y).rev() {
                grid.set(x, i as usize, z, value);
                value = value.saturating_add(increment);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: ChunkSize = ChunkSize::new(8, 8);

    #[test]
    fn fully_below_or_above_the_surface() {
        let map = HeightMap::flat(8, 40.0);
        assert!(build_density(&map, 0, SIZE).is_all_solid());
        assert!(build_density(&map, 32, SIZE).is_all_solid());
        assert!(build_density(&map, 40, SIZE).is_all_empty());
        assert!(build_density(&map, 48, SIZE).is_all_empty());
    }

    #[test]
    fn flat_surface_puts_fraction_in_one_voxel() {
        let map = HeightMap::flat(8, 19.5);
        let grid = build_density(&map, 16, SIZE);
        for x in 0..8 {
            for z in 0..8 {
                for y in 0..3 {
                    assert_eq!(grid.get(x, y, z), 255);
                }
                assert_eq!(grid.get(x, 3, z), 127);
                for y in 4..8 {
                    assert_eq!(grid.get(x, y, z), 0);
                }
            }
        }
    }

    #[test]
    fn surface_on_voxel_boundary_leaves_empty_voxel_above() {
        let map = HeightMap::flat(8, 12.0);
        let grid = build_density(&map, 8, SIZE);
        for x in 0..8 {
            assert_eq!(grid.get(x, 3, 0), 255);
            assert_eq!(grid.get(x, 4, 0), 0);
        }
    }

    #[test]
    fn slopes_get_a_gradient() {
        // Heights rise by 4 voxels per column along x.
        let values = (0..10)
            .flat_map(|_| (0..10).map(|x| (x as f64 - 1.0) * 4.0 + 0.5))
            .collect();
        let map = HeightMap::from_samples(8, values);
        let grid = build_density(&map, 0, ChunkSize::new(8, 32));

        // Column x = 2 has height 8.5 and its lowest neighbor 4.5.
        let column: Vec<u8> = (0..32).map(|y| grid.get(2, y, 3)).collect();
        assert!(column[..4].iter().all(|&v| v == 255));
        assert_eq!(column[4], 255);
        assert!(column[5] > column[6]);
        assert!(column[6] > column[7]);
        assert!(column[7] > column[8]);
        assert!(column[8] > 0);
        assert!(column[9..].iter().all(|&v| v == 0));
    }

    #[test]
    fn random_height_maps_never_overflow() {
        let mut rng = fastrand::Rng::with_seed(7);
        for _ in 0..20 {
            let values = (0..100).map(|_| rng.f64() * 40.0).collect();
            let map = HeightMap::from_samples(8, values);
            for y_position in [0, 8, 16, 24, 32] {
                let grid = build_density(&map, y_position, SIZE);
                for x in 0..8 {
                    for z in 0..8 {
                        let h = map.get(x as i32, z as i32) - y_position as f64;
                        for y in 0..8 {
                            if y as f64 >= h.ceil() && h.ceil() >= 0.0 {
                                assert_eq!(grid.get(x, y, z), 0, "voxel above surface");
                            }
                        }
                    }
                }
            }
        }
    }
}

//! # Height Map Generation
//!
//! Composes the configured noise layers into a continuous height per world column.
//!
//! ## Composition
//!
//! For every sample point, with `f` the clamped output of a layer:
//! 1. Additive layers are summed weighted by their scale. The sum is divided by the
//!    total scale when that exceeds 1.
//! 2. The running value is multiplied by every multiplicative layer (unscaled).
//! 3. Each overlap layer replaces the running value if its scaled output is larger.
//! 4. The result is remapped from `[0, 1]` into the elevation boundary.
//!
//! A height map covers a chunk footprint plus a one-voxel border on each side, which the
//! density builder needs for slope-aware filling.

use cgmath::Point2;

use crate::terrain_state::settings::{BlendMode, ElevationBoundary, HeightMapSettings};
use crate::terrain_state::voxels::chunk::ColumnCoord;

use super::height_functions::{create_function, HeightFunction};

/// Heights over a `(W+2) × (W+2)` footprint with cached bounds.
#[derive(Debug, Clone)]
pub struct HeightMap {
    width: usize,
    values: Vec<f64>,
    /// Lowest sampled height, border included.
    pub min: f64,
    /// Highest sampled height, border included.
    pub max: f64,
}

impl HeightMap {
    /// Builds a height map from raw samples in `(z + 1) * (W + 2) + (x + 1)` order.
    ///
    /// # Panics
    /// Panics if `values` does not hold `(W+2)²` samples.
    pub fn from_samples(width: usize, values: Vec<f64>) -> Self {
        assert_eq!(values.len(), (width + 2) * (width + 2));
        let (min, max) = values
            .iter()
            .fold((f64::MAX, f64::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        HeightMap {
            width,
            values,
            min,
            max,
        }
    }

    /// A height map with the same height everywhere.
    pub fn flat(width: usize, height: f64) -> Self {
        Self::from_samples(width, vec![height; (width + 2) * (width + 2)])
    }

    /// Footprint width, border excluded.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height at a footprint position. Valid range is `-1..=W` on both axes.
    #[inline]
    pub fn get(&self, x: i32, z: i32) -> f64 {
        let stride = self.width + 2;
        self.values[(z + 1) as usize * stride + (x + 1) as usize]
    }
}

struct Layer {
    function: Box<dyn HeightFunction>,
    scale: f64,
    clamping: f64,
}

impl Layer {
    fn evaluate(&self, position: Point2<i32>) -> f64 {
        (self.function.evaluate(position) - self.clamping).max(0.0) / (1.0 - self.clamping)
    }
}

/// Samples the configured layers into height maps.
pub struct HeightMapGenerator {
    width: usize,
    boundary: ElevationBoundary,
    additive: Vec<Layer>,
    multiplicative: Vec<Layer>,
    overlap: Vec<Layer>,
}

impl HeightMapGenerator {
    /// Instantiates every enabled layer.
    pub fn new(settings: &HeightMapSettings, chunk_width: usize) -> Self {
        let mut generator = HeightMapGenerator {
            width: chunk_width,
            boundary: settings.elevation_boundary,
            additive: Vec::new(),
            multiplicative: Vec::new(),
            overlap: Vec::new(),
        };

        for layer in settings.layers.iter().filter(|layer| layer.enabled) {
            let built = Layer {
                function: create_function(&layer.function, chunk_width),
                scale: layer.scale,
                clamping: layer.clamping,
            };
            match layer.blend {
                BlendMode::Additive => generator.additive.push(built),
                BlendMode::Multiplicative => generator.multiplicative.push(built),
                BlendMode::Overlap => generator.overlap.push(built),
            }
        }
        generator
    }

    /// Composed height at one world column.
    pub fn sample(&self, position: Point2<i32>) -> f64 {
        let mut value = 0.0;
        let mut scale_sum = 0.0;
        for layer in &self.additive {
            scale_sum += layer.scale;
            value += layer.evaluate(position) * layer.scale;
        }
        if scale_sum > 1.0 {
            value /= scale_sum;
        }

        for layer in &self.multiplicative {
            value *= layer.evaluate(position);
        }

        for layer in &self.overlap {
            value = f64::max(value, layer.evaluate(position) * layer.scale);
        }

        value * (self.boundary.max - self.boundary.min) + self.boundary.min
    }

    /// Samples the footprint of a column plus its one-voxel border.
    pub fn create_height_map(&self, coord: ColumnCoord) -> HeightMap {
        let stride = self.width + 2;
        let origin_x = coord.x * self.width as i32;
        let origin_z = coord.y * self.width as i32;

        let mut values = Vec::with_capacity(stride * stride);
        for z in 0..stride as i32 {
            for x in 0..stride as i32 {
                values.push(self.sample(Point2::new(origin_x + x - 1, origin_z + z - 1)));
            }
        }
        HeightMap::from_samples(self.width, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain_state::settings::{HeightFunctionSettings, HeightLayerSettings};

    fn flat_layer(height: f64, blend: BlendMode, scale: f64) -> HeightLayerSettings {
        HeightLayerSettings {
            enabled: true,
            blend,
            scale,
            clamping: 0.0,
            function: HeightFunctionSettings::Flat { height },
        }
    }

    fn settings(layers: Vec<HeightLayerSettings>) -> HeightMapSettings {
        HeightMapSettings {
            elevation_boundary: ElevationBoundary {
                min: 100.0,
                max: 200.0,
            },
            layers,
        }
    }

    #[test]
    fn empty_layer_list_yields_boundary_min() {
        let generator = HeightMapGenerator::new(&settings(Vec::new()), 8);
        let map = generator.create_height_map(ColumnCoord::new(2, -3));
        assert_eq!(map.min, 100.0);
        assert_eq!(map.max, 100.0);
        assert_eq!(map.get(-1, 8), 100.0);
    }

    #[test]
    fn additive_layers_are_normalized_above_unit_scale() {
        let generator = HeightMapGenerator::new(
            &settings(vec![
                flat_layer(0.2, BlendMode::Additive, 1.0),
                flat_layer(0.8, BlendMode::Additive, 1.0),
            ]),
            8,
        );
        assert!((generator.sample(Point2::new(0, 0)) - 150.0).abs() < 1e-9);

        let generator = HeightMapGenerator::new(
            &settings(vec![flat_layer(0.8, BlendMode::Additive, 0.5)]),
            8,
        );
        assert!((generator.sample(Point2::new(0, 0)) - 140.0).abs() < 1e-9);
    }

    #[test]
    fn multiplicative_and_overlap_layers() {
        let generator = HeightMapGenerator::new(
            &settings(vec![
                flat_layer(0.5, BlendMode::Additive, 1.0),
                flat_layer(0.5, BlendMode::Multiplicative, 0.1),
            ]),
            8,
        );
        assert!((generator.sample(Point2::new(0, 0)) - 125.0).abs() < 1e-9);

        let generator = HeightMapGenerator::new(
            &settings(vec![
                flat_layer(0.25, BlendMode::Additive, 1.0),
                flat_layer(0.9, BlendMode::Overlap, 0.5),
            ]),
            8,
        );
        assert!((generator.sample(Point2::new(0, 0)) - 145.0).abs() < 1e-9);
    }

    #[test]
    fn disabled_layers_and_clamping() {
        let mut disabled = flat_layer(1.0, BlendMode::Additive, 1.0);
        disabled.enabled = false;
        let mut clamped = flat_layer(0.75, BlendMode::Additive, 1.0);
        clamped.clamping = 0.5;

        let generator = HeightMapGenerator::new(&settings(vec![disabled, clamped]), 8);
        assert!((generator.sample(Point2::new(0, 0)) - 150.0).abs() < 1e-9);
    }

    #[test]
    fn border_samples_neighbor_columns() {
        let tilt = HeightLayerSettings {
            function: HeightFunctionSettings::Sin { frequency: 0.3 },
            ..Default::default()
        };
        let generator = HeightMapGenerator::new(&settings(vec![tilt]), 8);
        let left = generator.create_height_map(ColumnCoord::new(0, 0));
        let right = generator.create_height_map(ColumnCoord::new(1, 0));
        for z in 0..8 {
            assert_eq!(left.get(8, z), right.get(0, z));
            assert_eq!(left.get(7, z), right.get(-1, z));
        }
        assert!(left.min <= left.max);
    }
}

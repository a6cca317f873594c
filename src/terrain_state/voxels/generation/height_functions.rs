//! Height functions sampled by the height map layers.
//!
//! Every function maps an integer world `(x, z)` position to a value in `[0, 1]`.

use cgmath::Point2;
use noise::{NoiseFn, Perlin, Simplex};

use crate::terrain_state::settings::HeightFunctionSettings;

/// A 2D function producing normalized heights.
pub trait HeightFunction: Send + Sync {
    /// Samples the function at a world column position.
    fn evaluate(&self, position: Point2<i32>) -> f64;
}

/// Builds the function described by `settings`.
///
/// # Arguments
/// * `settings` - The function kind and its parameters
/// * `chunk_width` - Horizontal chunk size, used by functions defined per chunk footprint
pub fn create_function(
    settings: &HeightFunctionSettings,
    chunk_width: usize,
) -> Box<dyn HeightFunction> {
    match *settings {
        HeightFunctionSettings::Flat { height } => Box::new(FlatFunction { height }),
        HeightFunctionSettings::Tilt { tilt_x, tilt_z } => Box::new(TiltFunction {
            tilt_x,
            tilt_z,
            width: chunk_width as i32,
        }),
        HeightFunctionSettings::Sin { frequency } => Box::new(SinFunction { frequency }),
        HeightFunctionSettings::Perlin {
            frequency,
            offset,
            seed,
        } => Box::new(PerlinFunction {
            frequency,
            offset,
            noise: Perlin::new(seed),
        }),
        HeightFunctionSettings::LayeredNoise {
            frequency,
            persistence,
            roughness,
            layers,
            seed,
        } => Box::new(LayeredNoiseFunction {
            frequency,
            persistence,
            roughness,
            layers,
            noise: Simplex::new(seed),
        }),
    }
}

/// Maps noise output from `[-1, 1]` into `[0, 1]`.
#[inline]
fn unit(value: f64) -> f64 {
    ((value + 1.0) * 0.5).clamp(0.0, 1.0)
}

/// Constant height.
pub struct FlatFunction {
    height: f64,
}

impl HeightFunction for FlatFunction {
    fn evaluate(&self, _position: Point2<i32>) -> f64 {
        self.height
    }
}

/// Ramp that rises across every chunk footprint and resets at the next chunk.
pub struct TiltFunction {
    tilt_x: f64,
    tilt_z: f64,
    width: i32,
}

impl HeightFunction for TiltFunction {
    fn evaluate(&self, position: Point2<i32>) -> f64 {
        let local_x = position.x.rem_euclid(self.width) as f64;
        let local_z = position.y.rem_euclid(self.width) as f64;
        (self.tilt_x * local_x + self.tilt_z * local_z) / self.width as f64
    }
}

/// Ridges along the x axis.
pub struct SinFunction {
    frequency: f64,
}

impl HeightFunction for SinFunction {
    fn evaluate(&self, position: Point2<i32>) -> f64 {
        (position.x as f64 * self.frequency).sin().powi(2)
    }
}

/// Single octave of Perlin noise.
pub struct PerlinFunction {
    frequency: f64,
    offset: [f64; 2],
    noise: Perlin,
}

impl HeightFunction for PerlinFunction {
    fn evaluate(&self, position: Point2<i32>) -> f64 {
        let x = position.x as f64 * self.frequency + self.offset[0];
        let z = position.y as f64 * self.frequency + self.offset[1];
        unit(self.noise.get([x, z]))
    }
}

/// Octaves of simplex noise, normalized by their summed amplitude.
pub struct LayeredNoiseFunction {
    frequency: f64,
    persistence: f64,
    roughness: f64,
    layers: u32,
    noise: Simplex,
}

impl HeightFunction for LayeredNoiseFunction {
    fn evaluate(&self, position: Point2<i32>) -> f64 {
        if self.layers == 0 {
            return 0.0;
        }

        let (x, z) = (position.x as f64, position.y as f64);
        let mut value = 0.0;
        let mut frequency = self.frequency;
        let mut amplitude = 1.0;
        let mut max_amplitude = 0.0;
        for _ in 0..self.layers {
            value += unit(self.noise.get([x * frequency, z * frequency])) * amplitude;
            frequency /= 1.0 - self.roughness;
            max_amplitude += amplitude;
            amplitude *= self.persistence;
        }
        value / max_amplitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_grid(function: &dyn HeightFunction) -> impl Iterator<Item = f64> + '_ {
        (-40..40).flat_map(move |x| (-40..40).map(move |z| function.evaluate(Point2::new(x * 7, z * 5))))
    }

    #[test]
    fn noise_functions_stay_in_unit_range() {
        let functions = [
            create_function(
                &HeightFunctionSettings::Perlin {
                    frequency: 0.05,
                    offset: [0.3, 0.7],
                    seed: 3,
                },
                16,
            ),
            create_function(
                &HeightFunctionSettings::LayeredNoise {
                    frequency: 0.025,
                    persistence: 0.5,
                    roughness: 0.5,
                    layers: 4,
                    seed: 11,
                },
                16,
            ),
        ];
        for function in &functions {
            for value in sample_grid(function.as_ref()) {
                assert!((0.0..=1.0).contains(&value), "{value} out of range");
            }
        }
    }

    #[test]
    fn tilt_repeats_per_chunk() {
        let tilt = create_function(
            &HeightFunctionSettings::Tilt {
                tilt_x: 1.0,
                tilt_z: 0.0,
            },
            8,
        );
        assert_eq!(tilt.evaluate(Point2::new(0, 0)), 0.0);
        assert_eq!(tilt.evaluate(Point2::new(4, 3)), 0.5);
        assert_eq!(tilt.evaluate(Point2::new(12, 3)), 0.5);
        assert_eq!(tilt.evaluate(Point2::new(-4, 3)), 0.5);
    }

    #[test]
    fn sin_is_squared() {
        let sin = create_function(&HeightFunctionSettings::Sin { frequency: 0.5 }, 8);
        assert_eq!(sin.evaluate(Point2::new(0, 9)), 0.0);
        let expected = (3.0f64 * 0.5).sin().powi(2);
        assert!((sin.evaluate(Point2::new(3, 0)) - expected).abs() < 1e-12);
    }
}

//! # Terrain Settings
//!
//! Configuration inputs for the terrain: world height, streaming radii, chunk
//! dimensions, worker pool sizes and the noise layers used to build height maps.
//!
//! Settings are plain serde structs. Every field has a default so a partial JSON
//! document is enough to override a single value:
//!
//! ```json
//! { "generation_distance": 4, "chunk_size": { "width": 16, "height": 16 } }
//! ```
//!
//! [`TerrainSettings::validate`] is run by both loaders and rejects values outside the
//! ranges the streaming scheduler is sized for.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::voxels::chunk::ChunkSize;

/// Errors produced while loading or validating terrain settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// The settings document is not valid JSON for [`TerrainSettings`].
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
    /// A field is outside its supported range.
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// How a height layer's output is combined with the running value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlendMode {
    /// Weighted sum, normalized by the summed scale when it exceeds 1.
    Additive,
    /// Multiplies the running value by the unscaled layer output.
    Multiplicative,
    /// Keeps the larger of the running value and the scaled layer output.
    Overlap,
}

/// The height function a layer samples. All functions return values in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum HeightFunctionSettings {
    /// Constant height.
    Flat {
        /// Height in `[0, 1]`.
        height: f64,
    },
    /// Linear ramp across each chunk footprint.
    Tilt {
        /// Contribution of the chunk-local x position.
        tilt_x: f64,
        /// Contribution of the chunk-local z position.
        tilt_z: f64,
    },
    /// `sin(x * frequency)^2` along the world x axis.
    Sin {
        /// Angular frequency in radians per voxel.
        frequency: f64,
    },
    /// Single octave of Perlin noise.
    Perlin {
        /// Sampling frequency.
        frequency: f64,
        /// Offset added to the sample position.
        offset: [f64; 2],
        /// Noise seed.
        #[serde(default)]
        seed: u32,
    },
    /// Octave sum of simplex noise.
    LayeredNoise {
        /// Base sampling frequency.
        frequency: f64,
        /// Amplitude multiplier per octave.
        persistence: f64,
        /// Frequency growth per octave is `1 / (1 - roughness)`.
        roughness: f64,
        /// Number of octaves.
        layers: u32,
        /// Noise seed.
        #[serde(default)]
        seed: u32,
    },
}

impl Default for HeightFunctionSettings {
    fn default() -> Self {
        HeightFunctionSettings::LayeredNoise {
            frequency: 0.025,
            persistence: 0.5,
            roughness: 0.5,
            layers: 1,
            seed: 0,
        }
    }
}

/// A single noise layer of the height map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeightLayerSettings {
    /// Disabled layers are skipped entirely.
    pub enabled: bool,
    /// How the layer is composed with the running value.
    pub blend: BlendMode,
    /// Weight of the layer output.
    pub scale: f64,
    /// Outputs below this threshold clamp to 0, the rest is rescaled to `[0, 1]`.
    pub clamping: f64,
    /// The sampled function.
    pub function: HeightFunctionSettings,
}

impl Default for HeightLayerSettings {
    fn default() -> Self {
        HeightLayerSettings {
            enabled: true,
            blend: BlendMode::Additive,
            scale: 1.0,
            clamping: 0.0,
            function: HeightFunctionSettings::default(),
        }
    }
}

/// Range the composed `[0, 1]` height is remapped into, in voxels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElevationBoundary {
    /// Height of a composed value of 0.
    pub min: f64,
    /// Height of a composed value of 1.
    pub max: f64,
}

impl Default for ElevationBoundary {
    fn default() -> Self {
        ElevationBoundary {
            min: 128.0,
            max: 256.0,
        }
    }
}

/// Height map composition settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeightMapSettings {
    /// Output range of the composed height.
    pub elevation_boundary: ElevationBoundary,
    /// Ordered layer list.
    pub layers: Vec<HeightLayerSettings>,
}

impl Default for HeightMapSettings {
    fn default() -> Self {
        HeightMapSettings {
            elevation_boundary: ElevationBoundary::default(),
            layers: vec![HeightLayerSettings::default()],
        }
    }
}

/// Where mesh jobs run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeshProducerKind {
    /// Bounded worker pools, one for column jobs and one for chunk jobs.
    #[default]
    Threaded,
    /// On the update thread, up to `max_jobs_per_update` jobs per tick.
    Inline,
}

/// Top-level terrain configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainSettings {
    /// Number of vertically stacked chunks per column.
    pub world_height: u32,
    /// Radius, in columns, of the resident ring around the viewer.
    pub generation_distance: u32,
    /// Radius, in columns, of the visible subset.
    pub view_distance: u32,
    /// Voxel dimensions of a chunk.
    pub chunk_size: ChunkSize,
    /// Number of density worker threads.
    pub density_workers: usize,
    /// Worker slots per mesh pool.
    pub max_jobs_per_update: usize,
    /// Whether uploaded meshes should also get a collision shape.
    pub generate_colliders: bool,
    /// Mesh job execution strategy.
    pub mesh_producer: MeshProducerKind,
    /// Noise layers.
    pub height_map: HeightMapSettings,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        TerrainSettings {
            world_height: 8,
            generation_distance: 8,
            view_distance: 8,
            chunk_size: ChunkSize::default(),
            density_workers: 2,
            max_jobs_per_update: 4,
            generate_colliders: false,
            mesh_producer: MeshProducerKind::Threaded,
            height_map: HeightMapSettings::default(),
        }
    }
}

impl TerrainSettings {
    /// Parses and validates settings from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let settings: TerrainSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads, parses and validates settings from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Serializes the settings as pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Radius of the resident window. One larger than configured because the
    /// outermost ring can never mesh.
    pub fn effective_generation_distance(&self) -> i32 {
        self.generation_distance as i32 + 1
    }

    /// Radius of the visible window, never larger than the resident one.
    pub fn effective_view_distance(&self) -> i32 {
        (self.view_distance as i32).min(self.effective_generation_distance())
    }

    /// Checks every field against its supported range.
    pub fn validate(&self) -> Result<(), SettingsError> {
        fn check(ok: bool, message: impl FnOnce() -> String) -> Result<(), SettingsError> {
            if ok {
                Ok(())
            } else {
                Err(SettingsError::Invalid(message()))
            }
        }

        check((1..=16).contains(&self.world_height), || {
            format!("world_height {} not in 1..=16", self.world_height)
        })?;
        check((1..=32).contains(&self.generation_distance), || {
            format!(
                "generation_distance {} not in 1..=32",
                self.generation_distance
            )
        })?;
        check((1..=32).contains(&self.view_distance), || {
            format!("view_distance {} not in 1..=32", self.view_distance)
        })?;
        check(
            (4..=64).contains(&self.chunk_size.width) && (4..=64).contains(&self.chunk_size.height),
            || {
                format!(
                    "chunk size {}x{} not in 4..=64",
                    self.chunk_size.width, self.chunk_size.height
                )
            },
        )?;
        check(self.density_workers >= 1, || {
            "density_workers must be at least 1".to_string()
        })?;
        check(self.max_jobs_per_update >= 1, || {
            "max_jobs_per_update must be at least 1".to_string()
        })?;

        let boundary = self.height_map.elevation_boundary;
        check(boundary.min <= boundary.max, || {
            format!(
                "elevation boundary min {} exceeds max {}",
                boundary.min, boundary.max
            )
        })?;
        for (index, layer) in self.height_map.layers.iter().enumerate() {
            check((0.0..=0.999).contains(&layer.clamping), || {
                format!("layer {index}: clamping {} not in 0..=0.999", layer.clamping)
            })?;
            if let HeightFunctionSettings::LayeredNoise { roughness, .. } = layer.function {
                check((0.0..1.0).contains(&roughness), || {
                    format!("layer {index}: roughness {roughness} not in 0..1")
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = TerrainSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.world_height, 8);
        assert_eq!(settings.effective_generation_distance(), 9);
        assert_eq!(settings.effective_view_distance(), 8);
        assert_eq!(settings.chunk_size, ChunkSize::new(32, 32));
    }

    #[test]
    fn json_round_trip() {
        let mut settings = TerrainSettings::default();
        settings.generation_distance = 3;
        settings.height_map.layers.push(HeightLayerSettings {
            blend: BlendMode::Overlap,
            function: HeightFunctionSettings::Sin { frequency: 0.1 },
            ..Default::default()
        });

        let json = settings.to_json_string().unwrap();
        let parsed = TerrainSettings::from_json_str(&json).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let parsed = TerrainSettings::from_json_str(r#"{ "world_height": 2 }"#).unwrap();
        assert_eq!(parsed.world_height, 2);
        assert_eq!(parsed.generation_distance, 8);
        assert_eq!(parsed.mesh_producer, MeshProducerKind::Threaded);

        let parsed = TerrainSettings::from_json_str(r#"{ "mesh_producer": "inline" }"#).unwrap();
        assert_eq!(parsed.mesh_producer, MeshProducerKind::Inline);
    }

    #[test]
    fn view_distance_is_capped_by_generation_distance() {
        let settings = TerrainSettings {
            generation_distance: 2,
            view_distance: 10,
            ..Default::default()
        };
        assert_eq!(settings.effective_view_distance(), 3);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let settings = TerrainSettings {
            world_height: 0,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));

        let mut settings = TerrainSettings::default();
        settings.height_map.layers[0].clamping = 1.0;
        assert!(matches!(settings.validate(), Err(SettingsError::Invalid(_))));

        assert!(matches!(
            TerrainSettings::from_json_str("{ not json"),
            Err(SettingsError::Parse(_))
        ));
    }
}

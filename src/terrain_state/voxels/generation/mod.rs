//! # Terrain Generation
//!
//! Height functions, their composition into per-column height maps, and the conversion
//! of a height map into chunk density.

pub mod density;
pub mod height_functions;
pub mod height_map;

pub use density::{build_density, fill_density};
pub use height_map::{HeightMap, HeightMapGenerator};

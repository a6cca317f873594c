//! # Voxel Storage
//!
//! Chunks, columns and the pooled world that owns them, plus the density generation
//! pipeline.
//!
//! ## Architecture
//! - [`chunk`]: coordinates, [`DensityGrid`](chunk::DensityGrid) and the
//!   [`Chunk`](chunk::Chunk) lifecycle
//! - [`column`]: vertical stacks recycled as a unit
//! - [`world`]: fixed-capacity arena of columns keyed by coordinate
//! - [`generation`]: height maps and density
//! - [`tasks`]: the density worker job
//!
//! ## Performance Considerations
//! - Columns are allocated once when the world is created and reassigned as the viewer
//!   moves; density buffers are copied in place

pub mod chunk;
pub mod column;
pub mod generation;
pub mod tasks;
pub mod world;

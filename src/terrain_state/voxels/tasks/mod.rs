//! Worker jobs that produce voxel data.

pub mod column_generation_task;

pub use column_generation_task::{ColumnDensity, ColumnGenerationTask};

//! # Streaming
//!
//! Decides which columns exist around the viewer and in which order their density and
//! meshes are produced.
//!
//! ## Architecture
//! - [`GenerationOrder`]: spiral rank table shared by every request queue
//! - [`StreamingWindow`]: resident and visible Chebyshev squares around the viewer column
//! - [`DensityProducer`]: density queue and worker pool
//! - [`ChunkStreamingScheduler`]: the per-tick state machine tying them to the world and
//!   a [`MeshProducer`](crate::terrain_state::meshing::MeshProducer)
//!
//! ## Performance Considerations
//! - The window is sized once; its column pool never grows
//! - Queues are re-sorted only when the viewer changes column

mod density;
pub mod generation_order;
mod scheduler;
pub mod window;

pub use density::DensityProducer;
pub use generation_order::GenerationOrder;
pub use scheduler::{ChunkStreamingScheduler, SchedulerStats};
pub use window::{StreamingWindow, WindowShift};

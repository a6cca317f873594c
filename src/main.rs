//! # Voxel Terrain Headless Runner
//!
//! Streams terrain around a moving viewer without rendering and logs what the scheduler
//! does. Useful for profiling and for checking a settings file.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --release -- terrain.json
//! ```

fn main() {
    voxel_terrain::run();
}

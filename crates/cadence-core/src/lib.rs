//! Core types and constants for the Cadence renderer.
//!
//! This crate provides the foundational types shared by every other crate:
//! - The frames-in-flight constant that sizes all per-frame arrays
//! - The coordinate space uploaded to shaders every frame
//! - Colours and transform helpers

pub mod coords;
pub mod math;
pub mod types;

pub use coords::CoordinateSpace;
pub use types::Colour;

/// Engine-wide constants
pub mod constants {
    /// Number of frames the CPU may record ahead of the GPU.
    ///
    /// Every per-frame array (command buffers, sync objects, uniform buffers,
    /// vertex/index rings, reclamation buckets) is sized by this value.
    pub const MAX_FRAMES_IN_FLIGHT: usize = 3;
}

pub use constants::MAX_FRAMES_IN_FLIGHT;

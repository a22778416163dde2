//! Frame engine error types.

use cadence_gpu::GpuError;
use thiserror::Error;

use crate::scheduler::FrameState;

/// Errors surfaced by the frame scheduler.
#[derive(Error, Debug)]
pub enum FrameError {
    /// A native call failed. Fatal for the render loop.
    #[error(transparent)]
    Gpu(#[from] GpuError),

    /// An operation was called out of protocol order.
    #[error("{operation} is not valid while the frame is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: FrameState,
    },

    /// The drawable area is zero-sized (for example a minimized window).
    /// Rendering resumes after a resize to a non-zero extent.
    #[error("drawable extent is zero; waiting for a resize")]
    ZeroExtent,
}

impl FrameError {
    /// Whether the error came from the device being lost.
    pub fn is_device_lost(&self) -> bool {
        matches!(self, Self::Gpu(e) if e.is_device_lost())
    }
}

/// Result type alias.
pub type FrameResult<T> = std::result::Result<T, FrameError>;

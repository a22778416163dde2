//! Frame engine for the Cadence renderer.
//!
//! This crate provides:
//! - The frame scheduler and its per-frame protocol (`start`, `bind`,
//!   `submit_and_present`)
//! - N parallel frame slots of command buffers, sync objects and uniforms
//! - Deferred destruction of retired buffers and textures
//! - Frame observers for telemetry
//! - The [`FrameDevice`] boundary with its Vulkan implementation

pub mod config;
pub mod device;
pub mod error;
pub mod observer;
pub mod params;
pub mod reclaim;
pub mod scheduler;
pub mod slots;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod vulkan;

pub use config::{SchedulerConfig, DEFAULT_RETRY_INTERVAL};
pub use device::{AcquireOutcome, FrameDevice, PresentOutcome};
pub use error::{FrameError, FrameResult};
pub use observer::{FpsStats, FpsSummary, FrameCounters, FrameObserver};
pub use params::RenderParameters;
pub use reclaim::{AutoDeleter, Retired};
pub use scheduler::{FrameScheduler, FrameState};
pub use slots::{FrameSlot, FrameSlots};
pub use vulkan::{VulkanDevice, DESCRIPTOR_SET_BUDGET};

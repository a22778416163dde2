//! Application framework for the Cadence renderer.
//!
//! This crate provides a trait-based application framework that handles
//! common boilerplate like:
//! - Window creation and management
//! - GPU and frame scheduler initialization
//! - Driving each frame's `start()` on a cooperative runtime
//! - Resize forwarding and shutdown
//!
//! # Example
//!
//! ```no_run
//! use cadence_app::{run_app, AppConfig, AppContext, CadenceApp, FrameContext};
//!
//! struct MyApp {
//!     // Application state
//! }
//!
//! impl CadenceApp for MyApp {
//!     fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp {})
//!     }
//!
//!     fn update(&mut self, ctx: &mut AppContext, dt: f32) {
//!         // Update logic
//!     }
//!
//!     fn render(&mut self, frame: &FrameContext<'_>) -> anyhow::Result<()> {
//!         // Draw into renderers and flush them through frame.scheduler()
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::default())
//! }
//! ```

mod app;
mod context;
mod frame;
mod runner;

pub use app::CadenceApp;
pub use context::AppContext;
pub use frame::FrameContext;
pub use runner::{run_app, AppConfig};

// Re-export commonly used types for convenience
pub use cadence_frame::{FrameScheduler, VulkanDevice};
pub use winit::event::WindowEvent;

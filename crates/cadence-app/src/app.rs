//! `CadenceApp` trait definition.

use crate::context::AppContext;
use crate::frame::FrameContext;
use winit::event::WindowEvent;

/// Trait for Cadence applications.
///
/// The framework owns the window, the GPU and the frame scheduler. Every
/// redraw it calls `update`, starts a frame, calls `render` while the frame
/// is recording, then submits and presents it.
pub trait CadenceApp: Sized {
    /// Initialize the application.
    ///
    /// Called once after the window and frame scheduler exist. Create
    /// renderers and upload textures through `ctx.device()`.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Update application state before the frame starts.
    ///
    /// The coordinate space set here through
    /// [`AppContext::set_coordinate_space`] is the one the frame renders with.
    ///
    /// # Arguments
    /// * `ctx` - Application context
    /// * `dt` - Delta time in seconds since last frame
    fn update(&mut self, ctx: &mut AppContext, dt: f32);

    /// Record the frame.
    ///
    /// Draw into renderers and flush them through `frame.scheduler()`.
    /// Returning an error ends the render loop.
    fn render(&mut self, frame: &FrameContext<'_>) -> anyhow::Result<()>;

    /// Handle window resize to a non-zero size.
    ///
    /// The swapchain is rebuilt by the scheduler at the next frame.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle window events.
    ///
    /// Return `true` if the event was handled and should not be processed
    /// further.
    ///
    /// Default implementation does nothing and returns `false`.
    #[allow(unused_variables)]
    fn on_event(&mut self, ctx: &mut AppContext, event: &WindowEvent) -> bool {
        false
    }

    /// Cleanup resources before shutdown.
    ///
    /// Called after the scheduler shut down, with the GPU idle, so every
    /// renderer and texture can be destroyed through `ctx.device()`.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}

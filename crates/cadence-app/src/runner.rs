//! Application runner and event loop.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cadence_core::Colour;
use cadence_frame::{FpsStats, FrameDevice, FrameError, SchedulerConfig, DEFAULT_RETRY_INTERVAL};
use cadence_gpu::GpuContextBuilder;
use tokio::runtime::Runtime;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::CadenceApp;
use crate::context::AppContext;
use crate::frame::FrameContext;

/// Application configuration.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Colour every frame is cleared to.
    pub clear_colour: Colour,
    /// Back-off while waiting for a frame slot or swapchain image.
    pub retry_interval: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Cadence".to_string(),
            width: 1280,
            height: 720,
            target_fps: None,
            vsync: false,
            validation: cfg!(debug_assertions),
            clear_colour: Colour::BLACK,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the target FPS.
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Set the clear colour.
    pub fn with_clear_colour(mut self, colour: Colour) -> Self {
        self.clear_colour = colour;
        self
    }

    /// Scheduler settings derived from this config.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::new()
            .with_clear_colour(self.clear_colour)
            .with_retry_interval(self.retry_interval)
    }

    fn target_frame_time(&self) -> Option<Duration> {
        self.target_fps
            .filter(|&fps| fps > 0)
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)))
    }
}

/// Run a `CadenceApp` with the given configuration.
///
/// This function initializes logging, creates the window, GPU and frame
/// scheduler, and runs the event loop until the application exits. The
/// waiting part of every frame runs on a single-threaded tokio runtime.
pub fn run_app<A: CadenceApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("{} starting...", config.title);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        runtime,
        state: None,
        failed: None,
    };

    event_loop.run_app(&mut runner)?;

    match runner.failed {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Internal application runner that implements winit's ApplicationHandler.
struct AppRunner<A: CadenceApp> {
    config: AppConfig,
    runtime: Runtime,
    state: Option<AppState<A>>,
    /// The error that ended the render loop, if any.
    failed: Option<anyhow::Error>,
}

/// Internal application state.
struct AppState<A: CadenceApp> {
    ctx: AppContext,
    app: A,
    target_frame_time: Option<Duration>,
    fps: FpsStats,
}

impl<A: CadenceApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating application state...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => {
                error!("Failed to initialize application: {e:#}");
                self.failed = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        // Let the app handle the event first
        if let Some(state) = &mut self.state {
            if state.app.on_event(&mut state.ctx, &event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.shutdown(event_loop);
            }
            WindowEvent::RedrawRequested => {
                let Some(state) = &mut self.state else {
                    return;
                };
                if let Err(e) = state.render_frame(&self.runtime) {
                    error!("Render error: {e:#}");
                    self.failed = Some(e);
                    self.shutdown(event_loop);
                    return;
                }
                if state.ctx.quit_requested() {
                    self.shutdown(event_loop);
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.handle_resize(size.width, size.height) {
                        error!("Resize error: {e:#}");
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }
}

impl<A: CadenceApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        // Create window
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let window = Arc::new(event_loop.create_window(window_attrs)?);

        // Create GPU context
        let gpu = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation)
            .build()?;

        info!("GPU: {}", gpu.capabilities().summary());

        // SAFETY: the window was just created and its handles are valid
        let mut ctx = unsafe {
            AppContext::new(window, gpu, self.config.vsync, self.config.scheduler_config())?
        };

        let fps = FpsStats::new();
        ctx.scheduler_mut().add_observer(Box::new(fps.clone()));

        // Initialize the application
        let app = A::init(&mut ctx)?;

        Ok(AppState {
            ctx,
            app,
            target_frame_time: self.config.target_frame_time(),
            fps,
        })
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut state) = self.state.take() {
            state.cleanup();
        }
        event_loop.exit();
    }
}

impl<A: CadenceApp> AppState<A> {
    fn render_frame(&mut self, runtime: &Runtime) -> anyhow::Result<()> {
        let frame_start = Instant::now();

        // Calculate delta time
        let dt = {
            let now = Instant::now();
            let dt = now.duration_since(self.ctx.last_frame_time).as_secs_f32();
            self.ctx.last_frame_time = now;
            dt
        };

        self.app.update(&mut self.ctx, dt);

        if self.ctx.is_minimized() {
            return Ok(());
        }

        let slot = match runtime.block_on(self.ctx.scheduler.start(None)) {
            Ok(slot) => slot,
            Err(FrameError::ZeroExtent) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let frame = FrameContext {
            scheduler: &self.ctx.scheduler,
            window: &self.ctx.window,
            slot,
            frame_number: self.ctx.scheduler.frame_number(),
            dt,
        };
        self.app.render(&frame)?;

        self.ctx.scheduler.submit_and_present()?;

        // Frame pacing
        if let Some(target) = self.target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }

        Ok(())
    }

    fn handle_resize(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        self.ctx.scheduler.resize(width, height);
        if width == 0 || height == 0 {
            return Ok(());
        }

        // Notify the application
        self.app.on_resize(&mut self.ctx, width, height)?;

        info!("Resized to {}x{}", width, height);
        Ok(())
    }

    fn cleanup(&mut self) {
        self.fps.log_summary();

        info!("Starting cleanup...");
        if let Err(e) = self.ctx.scheduler.shutdown() {
            error!("Frame scheduler shutdown failed: {e}");
        }
        if let Err(e) = self.ctx.device().wait_idle() {
            error!("Failed to wait idle: {e}");
        }

        // The GPU is idle; the app releases its resources before the device goes
        self.app.cleanup(&mut self.ctx);

        let stats = self.ctx.gpu().allocator().lock().stats();
        if stats.buffers > 0 || stats.images > 0 {
            warn!(
                buffers = stats.buffers,
                images = stats.images,
                bytes = stats.bytes,
                "GPU allocations still live after cleanup"
            );
        }

        info!("Cleanup complete");
    }
}

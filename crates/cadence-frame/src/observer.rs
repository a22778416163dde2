//! Frame telemetry through injected observers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use parking_lot::Mutex;

/// Callbacks fired by the scheduler at frame boundaries. All methods default
/// to doing nothing.
pub trait FrameObserver {
    /// The slot's fence signaled and its resources are about to be reused.
    fn on_frame_prestart(&mut self, _slot: usize, _frame_number: u64) {}

    /// The slot's fence was still unsignaled; the scheduler backs off.
    fn on_fence_wait(&mut self, _slot: usize) {}

    /// No swapchain image was ready; the scheduler backs off.
    fn on_acquire_retry(&mut self, _slot: usize) {}

    /// A frame was queued for presentation.
    fn on_frame_presented(&mut self, _slot: usize, _frame_number: u64) {}

    /// The swapchain was rebuilt for a new extent.
    fn on_swapchain_recreated(&mut self, _extent: vk::Extent2D) {}
}

#[derive(Debug, Default)]
struct Counters {
    presented: AtomicU64,
    fence_waits: AtomicU64,
    acquire_retries: AtomicU64,
    recreations: AtomicU64,
}

/// Shared event counters. Clones observe the same values, so one clone can be
/// registered with the scheduler while another is read elsewhere.
#[derive(Clone, Debug, Default)]
pub struct FrameCounters {
    inner: Arc<Counters>,
}

impl FrameCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presented(&self) -> u64 {
        self.inner.presented.load(Ordering::Relaxed)
    }

    pub fn fence_waits(&self) -> u64 {
        self.inner.fence_waits.load(Ordering::Relaxed)
    }

    pub fn acquire_retries(&self) -> u64 {
        self.inner.acquire_retries.load(Ordering::Relaxed)
    }

    pub fn recreations(&self) -> u64 {
        self.inner.recreations.load(Ordering::Relaxed)
    }
}

impl FrameObserver for FrameCounters {
    fn on_fence_wait(&mut self, _slot: usize) {
        self.inner.fence_waits.fetch_add(1, Ordering::Relaxed);
    }

    fn on_acquire_retry(&mut self, _slot: usize) {
        self.inner.acquire_retries.fetch_add(1, Ordering::Relaxed);
    }

    fn on_frame_presented(&mut self, _slot: usize, _frame_number: u64) {
        self.inner.presented.fetch_add(1, Ordering::Relaxed);
    }

    fn on_swapchain_recreated(&mut self, _extent: vk::Extent2D) {
        self.inner.recreations.fetch_add(1, Ordering::Relaxed);
    }
}

/// Frame-rate summary.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FpsSummary {
    pub min: f64,
    pub max: f64,
    pub average: f64,
    pub frames: u64,
}

#[derive(Debug)]
struct FpsInner {
    last_present: Option<Instant>,
    min_fps: f64,
    max_fps: f64,
    fps_sum: f64,
    samples: u64,
}

/// Min/max/average frame rate measured between consecutive presents.
#[derive(Clone, Debug)]
pub struct FpsStats {
    inner: Arc<Mutex<FpsInner>>,
}

impl Default for FpsStats {
    fn default() -> Self {
        Self::new()
    }
}

impl FpsStats {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FpsInner {
                last_present: None,
                min_fps: f64::MAX,
                max_fps: 0.0,
                fps_sum: 0.0,
                samples: 0,
            })),
        }
    }

    /// Record a present at `now`.
    pub fn record(&self, now: Instant) {
        let mut inner = self.inner.lock();
        if let Some(last) = inner.last_present.replace(now) {
            let dt = now.duration_since(last).as_secs_f64();
            if dt > 0.0 {
                let fps = 1.0 / dt;
                inner.min_fps = inner.min_fps.min(fps);
                inner.max_fps = inner.max_fps.max(fps);
                inner.fps_sum += fps;
                inner.samples += 1;
            }
        }
    }

    /// Summary so far, or `None` before two presents were recorded.
    pub fn summary(&self) -> Option<FpsSummary> {
        let inner = self.inner.lock();
        (inner.samples > 0).then(|| FpsSummary {
            min: inner.min_fps,
            max: inner.max_fps,
            average: inner.fps_sum / inner.samples as f64,
            frames: inner.samples,
        })
    }

    /// Log the summary at info level.
    pub fn log_summary(&self) {
        if let Some(summary) = self.summary() {
            tracing::info!("FPS Statistics:");
            tracing::info!("  Min: {:.1}", summary.min);
            tracing::info!("  Max: {:.1}", summary.max);
            tracing::info!("  Avg: {:.1}", summary.average);
            tracing::info!("  Total frames: {}", summary.frames);
        }
    }
}

impl FrameObserver for FpsStats {
    fn on_frame_presented(&mut self, _slot: usize, _frame_number: u64) {
        self.record(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn counters_are_shared_between_clones() {
        let counters = FrameCounters::new();
        let mut registered = counters.clone();

        registered.on_fence_wait(0);
        registered.on_fence_wait(1);
        registered.on_frame_presented(0, 0);
        registered.on_swapchain_recreated(vk::Extent2D::default());

        assert_eq!(counters.fence_waits(), 2);
        assert_eq!(counters.presented(), 1);
        assert_eq!(counters.recreations(), 1);
        assert_eq!(counters.acquire_retries(), 0);
    }

    #[test]
    fn fps_needs_two_presents() {
        let stats = FpsStats::new();
        let t0 = Instant::now();
        stats.record(t0);
        assert!(stats.summary().is_none());

        stats.record(t0 + Duration::from_millis(10));
        stats.record(t0 + Duration::from_millis(30));

        let summary = stats.summary().unwrap();
        assert_eq!(summary.frames, 2);
        assert!((summary.max - 100.0).abs() < 1e-6);
        assert!((summary.min - 50.0).abs() < 1e-6);
        assert!((summary.average - 75.0).abs() < 1e-6);
    }
}

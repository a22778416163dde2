//! Scheduler configuration.

use std::time::Duration;

use cadence_core::Colour;

/// Back-off between polls of an unsignaled fence or an unready swapchain.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(2);

/// Frame scheduler configuration.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Sleep between retries in `start()`.
    pub retry_interval: Duration,
    /// Clear colour used when `start()` is given none.
    pub clear_colour: Colour,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            retry_interval: DEFAULT_RETRY_INTERVAL,
            clear_colour: Colour::BLACK,
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retry back-off.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set the default clear colour.
    pub fn with_clear_colour(mut self, colour: Colour) -> Self {
        self.clear_colour = colour;
        self
    }
}

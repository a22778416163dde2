//! Deferred destruction of resources that in-flight frames may still read.
//!
//! Resources handed to [`AutoDeleter::manage`] wait in a pending list. At
//! every frame start the scheduler calls [`AutoDeleter::on_frame_prestart`]
//! once the starting slot's fence has signaled:
//!
//! 1. the bucket of the starting slot is returned for release, and
//! 2. the pending list moves into the bucket of the slot recorded just
//!    before, the last frame that may have referenced those resources.
//!
//! A resource retired while recording slot `i` therefore lands in bucket
//! `i` and is released when slot `i` starts again, after its fence proved
//! the GPU finished that frame and everything submitted before it.

use cadence_core::MAX_FRAMES_IN_FLIGHT;

use crate::device::FrameDevice;

/// The kinds of resource whose destruction can be deferred.
pub enum Retired<D: FrameDevice> {
    Buffer(D::Buffer),
    Texture(D::Texture),
}

impl<D: FrameDevice> Retired<D> {
    /// Destroy the resource through the device.
    pub fn release(self, device: &D) -> cadence_gpu::Result<()> {
        match self {
            Self::Buffer(buffer) => device.destroy_buffer(buffer),
            Self::Texture(texture) => device.destroy_texture(texture),
        }
    }
}

impl<D: FrameDevice> std::fmt::Debug for Retired<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffer(_) => f.write_str("Retired::Buffer"),
            Self::Texture(_) => f.write_str("Retired::Texture"),
        }
    }
}

/// Pending list plus one bucket per frame slot.
///
/// Dropping a non-empty deleter is a programming error and panics: the
/// resources inside would otherwise be leaked or freed under the GPU.
pub struct AutoDeleter<R> {
    pending: Vec<R>,
    buckets: [Vec<R>; MAX_FRAMES_IN_FLIGHT],
}

impl<R> Default for AutoDeleter<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> AutoDeleter<R> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            buckets: std::array::from_fn(|_| Vec::new()),
        }
    }

    /// Take ownership of a resource until it is safe to destroy.
    pub fn manage(&mut self, resource: R) {
        self.pending.push(resource);
    }

    /// Frame boundary for `slot`. Returns the resources that are now safe to
    /// destroy.
    ///
    /// Must be called once per frame start, with slots in rotation order.
    pub fn on_frame_prestart(&mut self, slot: usize) -> Vec<R> {
        let expired = std::mem::take(&mut self.buckets[slot]);

        let previous = (slot + MAX_FRAMES_IN_FLIGHT - 1) % MAX_FRAMES_IN_FLIGHT;
        let bucket = &mut self.buckets[previous];
        assert!(
            bucket.is_empty(),
            "reclamation bucket {previous} reused before it was released"
        );
        *bucket = std::mem::take(&mut self.pending);

        expired
    }

    /// Remove everything, pending and bucketed. Only safe once every frame
    /// fence has been waited on.
    pub fn drain_all(&mut self) -> Vec<R> {
        let mut all = Vec::with_capacity(self.len());
        for bucket in &mut self.buckets {
            all.append(bucket);
        }
        all.append(&mut self.pending);
        all
    }

    /// Resources not yet released.
    pub fn len(&self) -> usize {
        self.pending.len() + self.buckets.iter().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R> Drop for AutoDeleter<R> {
    fn drop(&mut self) {
        if !self.is_empty() && !std::thread::panicking() {
            panic!(
                "AutoDeleter dropped with {} unreleased resources; drain it after waiting all frame fences",
                self.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Slot sequence the scheduler produces: 0, 1, 2, 0, 1, ...
    fn slot(start: usize) -> usize {
        start % MAX_FRAMES_IN_FLIGHT
    }

    #[test]
    fn resource_survives_a_full_rotation() {
        let mut deleter = AutoDeleter::new();

        // Recording slot 0
        assert!(deleter.on_frame_prestart(slot(0)).is_empty());
        deleter.manage("x");

        // Slots 1 and 2 must not release it
        assert!(deleter.on_frame_prestart(slot(1)).is_empty());
        assert!(deleter.on_frame_prestart(slot(2)).is_empty());

        // Slot 0 again: released exactly once
        assert_eq!(deleter.on_frame_prestart(slot(3)), vec!["x"]);
        assert!(deleter.on_frame_prestart(slot(4)).is_empty());
        assert!(deleter.is_empty());
    }

    #[test]
    fn every_retirement_is_released_after_n_starts() {
        let mut deleter = AutoDeleter::new();
        let mut released = Vec::new();

        for start in 0..12 {
            released.extend(deleter.on_frame_prestart(slot(start)));
            deleter.manage(start);
        }

        // Retired during start k, released during start k + N
        let expected: Vec<usize> = (0..12 - MAX_FRAMES_IN_FLIGHT).collect();
        assert_eq!(released, expected);
        assert_eq!(deleter.len(), MAX_FRAMES_IN_FLIGHT);
        deleter.drain_all();
    }

    #[test]
    fn drain_returns_pending_and_buckets() {
        let mut deleter = AutoDeleter::new();
        deleter.on_frame_prestart(0);
        deleter.manage(1);
        deleter.on_frame_prestart(1);
        deleter.manage(2);

        let mut drained = deleter.drain_all();
        drained.sort_unstable();
        assert_eq!(drained, vec![1, 2]);
        assert!(deleter.is_empty());
    }

    #[test]
    #[should_panic(expected = "unreleased resources")]
    fn dropping_non_empty_deleter_panics() {
        let mut deleter = AutoDeleter::new();
        deleter.manage(1);
    }

    #[test]
    #[should_panic(expected = "reused before it was released")]
    fn out_of_order_prestart_panics() {
        let mut deleter = AutoDeleter::new();
        deleter.on_frame_prestart(0);
        deleter.manage(1);
        deleter.on_frame_prestart(1);
        deleter.manage(2);
        // Slot 1 again without passing through 2 and 0
        deleter.on_frame_prestart(1);
    }
}

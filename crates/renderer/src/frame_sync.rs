//! Frame synchronization and swapchain image claim tracking.
//!
//! Implements the in-flight frame protocol: each of
//! [`MAX_FRAMES_IN_FLIGHT`] slots owns an acquire semaphore, a
//! render-finished semaphore, and a fence. On top of that, every
//! swapchain image remembers which slot last submitted work targeting
//! it, so a new frame never writes an image another slot's submission
//! may still be presenting.

use std::sync::Arc;

use deferred_rhi::device::Device;
use deferred_rhi::sync::{FrameSync, MAX_FRAMES_IN_FLIGHT};
use deferred_rhi::RhiResult;

/// Decides whether claiming `image` from `current_slot` requires an
/// extra fence wait, and on which slot.
///
/// A wait is needed exactly when the image was last claimed by a
/// different slot; that slot's fence may not have signaled yet.
/// Waiting on an already-signaled fence is free, so no pending check
/// is made here.
pub fn claim_wait(last_claimant: &[Option<usize>], image: usize, current_slot: usize) -> Option<usize> {
    match last_claimant.get(image).copied().flatten() {
        Some(slot) if slot != current_slot => Some(slot),
        _ => None,
    }
}

/// Per-slot sync objects plus per-image claim tracking.
pub struct FrameSyncController {
    frames: Vec<FrameSync>,
    /// Which slot last claimed each swapchain image.
    last_claimant: Vec<Option<usize>>,
    current_slot: usize,
}

impl FrameSyncController {
    /// Creates sync objects for every in-flight slot and clears the
    /// claim table for `image_count` images.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore or fence creation fails.
    pub fn new(device: Arc<Device>, image_count: usize) -> RhiResult<Self> {
        let mut frames = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            frames.push(FrameSync::new(device.clone())?);
        }

        Ok(Self {
            frames,
            last_claimant: vec![None; image_count],
            current_slot: 0,
        })
    }

    /// The current slot's sync objects.
    #[inline]
    pub fn current(&self) -> &FrameSync {
        &self.frames[self.current_slot]
    }

    /// Index of the current in-flight slot.
    #[inline]
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// Blocks until the current slot's previous submission completed.
    pub fn wait_current(&self) -> RhiResult<()> {
        self.current().in_flight_fence().wait(u64::MAX)
    }

    /// Blocks until the slot that last claimed `image` has completed,
    /// if that slot is not the current one.
    pub fn wait_image_claimant(&self, image: usize) -> RhiResult<()> {
        if let Some(slot) = claim_wait(&self.last_claimant, image, self.current_slot) {
            self.frames[slot].in_flight_fence().wait(u64::MAX)?;
        }
        Ok(())
    }

    /// Records the current slot as the claimant of `image`.
    pub fn claim(&mut self, image: usize) {
        if let Some(entry) = self.last_claimant.get_mut(image) {
            *entry = Some(self.current_slot);
        }
    }

    /// Resets the current slot's fence ahead of submission.
    ///
    /// Deliberately separate from [`wait_current`](Self::wait_current):
    /// a frame aborted during acquire must leave the fence signaled or
    /// the next wait would deadlock.
    pub fn reset_current(&self) -> RhiResult<()> {
        self.current().in_flight_fence().reset()
    }

    /// Advances to the next in-flight slot.
    pub fn advance(&mut self) {
        self.current_slot = (self.current_slot + 1) % MAX_FRAMES_IN_FLIGHT;
    }

    /// Clears claim tracking after a swapchain recreate.
    pub fn reset_images(&mut self, image_count: usize) {
        self.last_claimant = vec![None; image_count];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unclaimed_image_needs_no_wait() {
        let claims = vec![None, None, None];
        assert_eq!(claim_wait(&claims, 0, 0), None);
        assert_eq!(claim_wait(&claims, 2, 1), None);
    }

    #[test]
    fn test_own_claim_needs_no_wait() {
        let claims = vec![Some(1), None];
        assert_eq!(claim_wait(&claims, 0, 1), None);
    }

    #[test]
    fn test_foreign_claim_waits_on_claimant() {
        let claims = vec![Some(0), None];
        assert_eq!(claim_wait(&claims, 0, 1), Some(0));
    }

    #[test]
    fn test_six_frame_round_robin_claims() {
        // Two slots, three images, images acquired round robin.
        let images = 3usize;
        let mut claims: Vec<Option<usize>> = vec![None; images];
        let mut slot = 0usize;

        let mut waits = Vec::new();
        for frame in 0..6usize {
            let image = frame % images;
            waits.push(claim_wait(&claims, image, slot));
            claims[image] = Some(slot);
            slot = (slot + 1) % 2;
        }

        // First lap claims fresh images; second lap always finds the
        // other slot's claim from three frames ago.
        assert_eq!(waits, vec![None, None, None, Some(1), Some(0), Some(1)]);
    }

    #[test]
    fn test_fresh_claim_table_never_waits() {
        // After a recreate the claim table starts empty, so the first
        // lap over the new images must not wait on anything.
        let claims = vec![None; 4];
        for image in 0..4 {
            for slot in 0..MAX_FRAMES_IN_FLIGHT {
                assert_eq!(claim_wait(&claims, image, slot), None);
            }
        }
    }

    #[test]
    fn test_same_image_alternating_slots() {
        // One image bounced between two slots waits every frame after
        // the first.
        let mut claims = vec![None];
        let mut slot = 0usize;

        let mut waits = Vec::new();
        for _ in 0..4 {
            waits.push(claim_wait(&claims, 0, slot));
            claims[0] = Some(slot);
            slot = (slot + 1) % 2;
        }

        assert_eq!(waits, vec![None, Some(0), Some(1), Some(0)]);
    }
}

// SPDX-License-Identifier: CEPL-1.0
//! Frame orchestration: fence wait, acquire, record, submit, present,
//! advance. The sequencing lives here; everything that touches the device
//! sits behind [`FrameBackend`].
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, trace};

pub const FRAMES_IN_FLIGHT: usize = 2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SlotState {
    #[default]
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireResult {
    Acquired { image: u32, suboptimal: bool },
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentResult {
    Presented,
    Suboptimal,
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { image: u32, slot: usize },
    /// Acquire found the swapchain stale; nothing was submitted.
    Recreated,
    /// The surface has zero area; nothing was acquired.
    Skipped,
}

/// Which slot last submitted work that uses a swapchain image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageMarker {
    pub slot: usize,
    pub frame: u64,
}

/// Device-side operations the orchestrator sequences.
pub trait FrameBackend {
    fn image_count(&self) -> usize;
    fn wait_slot(&mut self, slot: usize, timeout: Duration) -> Result<()>;
    fn acquire(&mut self, slot: usize) -> Result<AcquireResult>;
    fn update_uniforms(&mut self, image: u32) -> Result<()>;
    fn record(&mut self, image: u32) -> Result<()>;
    fn reset_slot(&mut self, slot: usize) -> Result<()>;
    fn submit(&mut self, slot: usize, image: u32) -> Result<()>;
    fn present(&mut self, slot: usize, image: u32) -> Result<PresentResult>;
    /// Tears down and rebuilds everything sized by the swapchain.
    /// Returns `false` without touching anything while the surface has zero area.
    fn recreate(&mut self) -> Result<bool>;
}

#[derive(Debug)]
pub struct FrameOrchestrator {
    frames_in_flight: usize,
    slot: usize,
    states: Vec<SlotState>,
    image_markers: Vec<Option<ImageMarker>>,
    resize_pending: bool,
    recreate_deferred: bool,
    frame_number: u64,
    recreations: u64,
    fence_timeout: Duration,
}

impl FrameOrchestrator {
    pub fn new(frames_in_flight: usize, image_count: usize, fence_timeout: Duration) -> Self {
        let frames_in_flight = frames_in_flight.max(1);
        Self {
            frames_in_flight,
            slot: 0,
            states: vec![SlotState::Idle; frames_in_flight],
            image_markers: vec![None; image_count],
            resize_pending: false,
            recreate_deferred: false,
            frame_number: 0,
            recreations: 0,
            fence_timeout,
        }
    }

    pub fn notify_resized(&mut self) {
        self.resize_pending = true;
    }

    pub fn current_slot(&self) -> usize {
        self.slot
    }

    pub fn slot_state(&self, slot: usize) -> SlotState {
        self.states[slot]
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn recreations(&self) -> u64 {
        self.recreations
    }

    pub fn is_waiting_for_surface(&self) -> bool {
        self.recreate_deferred
    }

    pub fn image_marker(&self, image: u32) -> Option<ImageMarker> {
        self.image_markers.get(image as usize).copied().flatten()
    }

    /// On error the slot is left idle and unadvanced, and no image marker
    /// names work that never reached the queue.
    pub fn draw_frame<B: FrameBackend>(&mut self, backend: &mut B) -> Result<FrameOutcome> {
        if self.recreate_deferred && !self.recreate(backend)? {
            return Ok(FrameOutcome::Skipped);
        }

        let slot = self.slot;
        backend.wait_slot(slot, self.fence_timeout)?;

        let outcome = self.run_slot(backend, slot);
        if outcome.is_err() {
            self.states[slot] = SlotState::Idle;
        }
        outcome
    }

    fn run_slot<B: FrameBackend>(&mut self, backend: &mut B, slot: usize) -> Result<FrameOutcome> {
        self.states[slot] = SlotState::Acquiring;
        let (image, acquired_suboptimal) = match backend.acquire(slot)? {
            AcquireResult::Acquired { image, suboptimal } => (image, suboptimal),
            AcquireResult::OutOfDate => {
                self.states[slot] = SlotState::Idle;
                debug!("acquire: swapchain out of date");
                return Ok(if self.recreate(backend)? {
                    FrameOutcome::Recreated
                } else {
                    FrameOutcome::Skipped
                });
            }
        };

        // The image may still be in use by a different slot's submission.
        if let Some(marker) = self.image_marker(image) {
            if marker.slot != slot {
                trace!(
                    "image {} last used by slot {} (frame {})",
                    image,
                    marker.slot,
                    marker.frame
                );
                backend.wait_slot(marker.slot, self.fence_timeout)?;
            }
        }

        self.states[slot] = SlotState::Recording;
        backend.update_uniforms(image)?;
        backend.record(image)?;

        backend.reset_slot(slot)?;
        backend.submit(slot, image)?;
        self.states[slot] = SlotState::Submitted;
        if let Some(entry) = self.image_markers.get_mut(image as usize) {
            *entry = Some(ImageMarker {
                slot,
                frame: self.frame_number,
            });
        }

        self.states[slot] = SlotState::Presenting;
        let presented = backend.present(slot, image)?;
        self.states[slot] = SlotState::Idle;

        self.slot = (self.slot + 1) % self.frames_in_flight;
        self.frame_number += 1;

        if acquired_suboptimal || presented != PresentResult::Presented || self.resize_pending {
            debug!(
                "present: {:?} (acquire suboptimal: {}, resize pending: {})",
                presented, acquired_suboptimal, self.resize_pending
            );
            self.recreate(backend)?;
        }

        Ok(FrameOutcome::Presented { image, slot })
    }

    fn recreate<B: FrameBackend>(&mut self, backend: &mut B) -> Result<bool> {
        self.resize_pending = false;
        if !backend.recreate()? {
            if !self.recreate_deferred {
                info!("surface has zero area; rendering paused");
            }
            self.recreate_deferred = true;
            return Ok(false);
        }
        if self.recreate_deferred {
            info!("surface restored; rendering resumed");
        }
        self.recreate_deferred = false;
        self.recreations += 1;
        // Recreation idles the device, so no image is still in use.
        self.image_markers = vec![None; backend.image_count()];
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        images: usize,
    }

    impl FrameBackend for Fixed {
        fn image_count(&self) -> usize {
            self.images
        }
        fn wait_slot(&mut self, _: usize, _: Duration) -> Result<()> {
            Ok(())
        }
        fn acquire(&mut self, _: usize) -> Result<AcquireResult> {
            Ok(AcquireResult::Acquired {
                image: 0,
                suboptimal: false,
            })
        }
        fn update_uniforms(&mut self, _: u32) -> Result<()> {
            Ok(())
        }
        fn record(&mut self, _: u32) -> Result<()> {
            Ok(())
        }
        fn reset_slot(&mut self, _: usize) -> Result<()> {
            Ok(())
        }
        fn submit(&mut self, _: usize, _: u32) -> Result<()> {
            Ok(())
        }
        fn present(&mut self, _: usize, _: u32) -> Result<PresentResult> {
            Ok(PresentResult::Presented)
        }
        fn recreate(&mut self) -> Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn slots_rotate_modulo_frames_in_flight() {
        let mut o = FrameOrchestrator::new(2, 3, Duration::from_secs(1));
        let mut b = Fixed { images: 3 };
        let slots: Vec<_> = (0..5)
            .map(|_| match o.draw_frame(&mut b).unwrap() {
                FrameOutcome::Presented { slot, .. } => slot,
                other => panic!("{other:?}"),
            })
            .collect();
        assert_eq!(slots, vec![0, 1, 0, 1, 0]);
        assert_eq!(o.frame_number(), 5);
        assert_eq!(o.slot_state(0), SlotState::Idle);
    }

    #[test]
    fn marker_records_last_submitting_slot() {
        let mut o = FrameOrchestrator::new(2, 3, Duration::from_secs(1));
        let mut b = Fixed { images: 3 };
        o.draw_frame(&mut b).unwrap();
        o.draw_frame(&mut b).unwrap();
        assert_eq!(o.image_marker(0), Some(ImageMarker { slot: 1, frame: 1 }));
        assert_eq!(o.image_marker(1), None);
    }

    #[test]
    fn resize_flag_is_cleared_by_recreation() {
        let mut o = FrameOrchestrator::new(2, 3, Duration::from_secs(1));
        let mut b = Fixed { images: 3 };
        o.notify_resized();
        o.draw_frame(&mut b).unwrap();
        assert_eq!(o.recreations(), 1);
        o.draw_frame(&mut b).unwrap();
        assert_eq!(o.recreations(), 1);
    }
}

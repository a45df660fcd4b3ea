// SPDX-License-Identifier: CEPL-1.0
use std::collections::VecDeque;
use std::time::Duration;

use anyhow::Result;
use ash::vk;
use umbra_render_vk::error::RenderError;
use umbra_render_vk::{
    AcquireResult, FrameBackend, FrameOrchestrator, FrameOutcome, ImageMarker, PresentResult,
    SlotState,
};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Event {
    Wait(usize),
    Acquire(usize, Option<u32>),
    Uniforms(u32),
    Shadow(u32),
    Main(u32),
    Reset(usize),
    Submit(usize, u32),
    Present(usize, u32),
    Recreate(bool),
}

/// Scripted device: acquire hands out images round-robin unless a result is queued.
/// The `fail_*` errors are returned once by the matching call.
struct MockGpu {
    images: usize,
    next_image: u32,
    surface: (u32, u32),
    acquire_script: VecDeque<AcquireResult>,
    present_script: VecDeque<PresentResult>,
    fail_acquire: Option<RenderError>,
    fail_submit: Option<RenderError>,
    fail_present: Option<RenderError>,
    hang: bool,
    pending: Vec<bool>,
    events: Vec<Event>,
    builds: usize,
}

impl MockGpu {
    fn new(images: usize) -> Self {
        Self {
            images,
            next_image: 0,
            surface: (1024, 768),
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            fail_acquire: None,
            fail_submit: None,
            fail_present: None,
            hang: false,
            pending: vec![false; 2],
            events: Vec::new(),
            builds: 1,
        }
    }

    fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}

impl FrameBackend for MockGpu {
    fn image_count(&self) -> usize {
        self.images
    }

    fn wait_slot(&mut self, slot: usize, timeout: Duration) -> Result<()> {
        self.events.push(Event::Wait(slot));
        if self.hang && self.pending[slot] {
            return Err(RenderError::DeviceHang(timeout).into());
        }
        self.pending[slot] = false;
        Ok(())
    }

    fn acquire(&mut self, slot: usize) -> Result<AcquireResult> {
        if let Some(e) = self.fail_acquire.take() {
            self.events.push(Event::Acquire(slot, None));
            return Err(e.into());
        }
        let result = self.acquire_script.pop_front().unwrap_or_else(|| {
            let image = self.next_image;
            self.next_image = (self.next_image + 1) % self.images as u32;
            AcquireResult::Acquired {
                image,
                suboptimal: false,
            }
        });
        let image = match result {
            AcquireResult::Acquired { image, .. } => Some(image),
            AcquireResult::OutOfDate => None,
        };
        self.events.push(Event::Acquire(slot, image));
        Ok(result)
    }

    fn update_uniforms(&mut self, image: u32) -> Result<()> {
        self.events.push(Event::Uniforms(image));
        Ok(())
    }

    fn record(&mut self, image: u32) -> Result<()> {
        self.events.push(Event::Shadow(image));
        self.events.push(Event::Main(image));
        Ok(())
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        assert!(!self.pending[slot], "fence reset while slot {slot} is in flight");
        self.events.push(Event::Reset(slot));
        Ok(())
    }

    fn submit(&mut self, slot: usize, image: u32) -> Result<()> {
        if let Some(e) = self.fail_submit.take() {
            return Err(e.into());
        }
        self.pending[slot] = true;
        self.events.push(Event::Submit(slot, image));
        Ok(())
    }

    fn present(&mut self, slot: usize, image: u32) -> Result<PresentResult> {
        self.events.push(Event::Present(slot, image));
        if let Some(e) = self.fail_present.take() {
            return Err(e.into());
        }
        Ok(self
            .present_script
            .pop_front()
            .unwrap_or(PresentResult::Presented))
    }

    fn recreate(&mut self) -> Result<bool> {
        let ok = self.surface.0 > 0 && self.surface.1 > 0;
        if ok {
            self.builds += 1;
            self.next_image = 0;
            self.pending.iter_mut().for_each(|p| *p = false);
        }
        self.events.push(Event::Recreate(ok));
        Ok(ok)
    }
}

fn orchestrator(images: usize) -> FrameOrchestrator {
    FrameOrchestrator::new(2, images, Duration::from_secs(1))
}

#[test]
fn one_frame_runs_shadow_then_main_then_submit_then_present() {
    let mut gpu = MockGpu::new(3);
    let mut o = orchestrator(3);

    let outcome = o.draw_frame(&mut gpu).unwrap();

    assert_eq!(outcome, FrameOutcome::Presented { image: 0, slot: 0 });
    assert_eq!(
        gpu.take_events(),
        vec![
            Event::Wait(0),
            Event::Acquire(0, Some(0)),
            Event::Uniforms(0),
            Event::Shadow(0),
            Event::Main(0),
            Event::Reset(0),
            Event::Submit(0, 0),
            Event::Present(0, 0),
        ]
    );
    assert_eq!(o.current_slot(), 1);
}

#[test]
fn present_uses_the_acquired_index() {
    let mut gpu = MockGpu::new(3);
    gpu.acquire_script.push_back(AcquireResult::Acquired {
        image: 2,
        suboptimal: false,
    });
    let mut o = orchestrator(3);

    o.draw_frame(&mut gpu).unwrap();

    let events = gpu.take_events();
    assert!(events.contains(&Event::Submit(0, 2)));
    assert!(events.contains(&Event::Present(0, 2)));
    assert!(events.contains(&Event::Uniforms(2)));
}

#[test]
fn slot_fence_is_waited_before_reuse() {
    let mut gpu = MockGpu::new(3);
    let mut o = orchestrator(3);

    for _ in 0..3 {
        o.draw_frame(&mut gpu).unwrap();
    }

    // Frame 2 reuses slot 0: its fence wait must precede the next acquire.
    let events = gpu.take_events();
    let submit0 = events.iter().position(|e| *e == Event::Submit(0, 0)).unwrap();
    let third_wait = events
        .iter()
        .enumerate()
        .skip(submit0)
        .find(|(_, e)| **e == Event::Wait(0))
        .map(|(i, _)| i)
        .unwrap();
    assert!(matches!(events[third_wait + 1], Event::Acquire(0, Some(2))));
}

#[test]
fn image_held_by_other_slot_is_waited_on() {
    // Two images, two slots, but the driver hands image 0 out twice in a row.
    let mut gpu = MockGpu::new(2);
    for _ in 0..2 {
        gpu.acquire_script.push_back(AcquireResult::Acquired {
            image: 0,
            suboptimal: false,
        });
    }
    let mut o = orchestrator(2);

    o.draw_frame(&mut gpu).unwrap();
    gpu.take_events();
    o.draw_frame(&mut gpu).unwrap();

    let events = gpu.take_events();
    assert_eq!(events[0], Event::Wait(1));
    assert_eq!(events[1], Event::Acquire(1, Some(0)));
    assert_eq!(events[2], Event::Wait(0));
    assert_eq!(o.image_marker(0).map(|m| m.slot), Some(1));
}

#[test]
fn out_of_date_acquire_rebuilds_without_submitting() {
    let mut gpu = MockGpu::new(3);
    gpu.acquire_script.push_back(AcquireResult::OutOfDate);
    let mut o = orchestrator(3);

    let outcome = o.draw_frame(&mut gpu).unwrap();

    assert_eq!(outcome, FrameOutcome::Recreated);
    let events = gpu.take_events();
    assert!(!events.iter().any(|e| matches!(e, Event::Submit(..))));
    assert_eq!(events.last(), Some(&Event::Recreate(true)));
    assert_eq!(o.current_slot(), 0);
    assert_eq!(o.recreations(), 1);

    assert!(matches!(
        o.draw_frame(&mut gpu).unwrap(),
        FrameOutcome::Presented { slot: 0, .. }
    ));
}

#[test]
fn stale_present_rebuilds_after_advancing() {
    let mut gpu = MockGpu::new(3);
    gpu.present_script.push_back(PresentResult::OutOfDate);
    gpu.present_script.push_back(PresentResult::Suboptimal);
    let mut o = orchestrator(3);

    o.draw_frame(&mut gpu).unwrap();
    assert_eq!(gpu.take_events().last(), Some(&Event::Recreate(true)));
    assert_eq!(o.current_slot(), 1);

    o.draw_frame(&mut gpu).unwrap();
    assert_eq!(o.recreations(), 2);
    assert_eq!(gpu.builds, 3);
}

#[test]
fn suboptimal_acquire_still_presents_then_rebuilds() {
    let mut gpu = MockGpu::new(3);
    gpu.acquire_script.push_back(AcquireResult::Acquired {
        image: 1,
        suboptimal: true,
    });
    let mut o = orchestrator(3);

    let outcome = o.draw_frame(&mut gpu).unwrap();

    assert_eq!(outcome, FrameOutcome::Presented { image: 1, slot: 0 });
    assert_eq!(gpu.take_events().last(), Some(&Event::Recreate(true)));
}

#[test]
fn zero_area_window_pauses_until_restored() {
    let mut gpu = MockGpu::new(3);
    let mut o = orchestrator(3);
    o.draw_frame(&mut gpu).unwrap();

    gpu.surface = (0, 0);
    o.notify_resized();
    o.draw_frame(&mut gpu).unwrap();
    assert!(o.is_waiting_for_surface());
    gpu.take_events();

    for _ in 0..3 {
        assert_eq!(o.draw_frame(&mut gpu).unwrap(), FrameOutcome::Skipped);
    }
    assert_eq!(gpu.take_events(), vec![Event::Recreate(false); 3]);
    assert_eq!(gpu.builds, 1);

    gpu.surface = (800, 600);
    assert!(matches!(
        o.draw_frame(&mut gpu).unwrap(),
        FrameOutcome::Presented { .. }
    ));
    assert!(!o.is_waiting_for_surface());
    assert_eq!(gpu.builds, 2);
}

#[test]
fn fence_timeout_surfaces_as_device_hang() {
    let mut gpu = MockGpu::new(2);
    let mut o = orchestrator(2);
    o.draw_frame(&mut gpu).unwrap();
    o.draw_frame(&mut gpu).unwrap();

    gpu.hang = true;
    let err = o.draw_frame(&mut gpu).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<RenderError>(),
        Some(RenderError::DeviceHang(_))
    ));
}

#[test]
fn lost_device_on_acquire_leaves_slot_in_place() {
    let mut gpu = MockGpu::new(3);
    let mut o = orchestrator(3);
    o.draw_frame(&mut gpu).unwrap();
    gpu.take_events();

    gpu.fail_acquire = Some(RenderError::DeviceLost);
    let err = o.draw_frame(&mut gpu).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<RenderError>(),
        Some(RenderError::DeviceLost)
    ));
    assert_eq!(o.current_slot(), 1);
    assert_eq!(o.frame_number(), 1);
    assert_eq!(o.slot_state(1), SlotState::Idle);
    assert_eq!(gpu.take_events(), vec![Event::Wait(1), Event::Acquire(1, None)]);

    // The same slot is used by the next attempt.
    assert!(matches!(
        o.draw_frame(&mut gpu).unwrap(),
        FrameOutcome::Presented { slot: 1, .. }
    ));
}

#[test]
fn failed_submit_marks_no_image() {
    let mut gpu = MockGpu::new(3);
    gpu.fail_submit = Some(RenderError::vulkan(
        "vkQueueSubmit",
        vk::Result::ERROR_DEVICE_LOST,
    ));
    let mut o = orchestrator(3);

    let err = o.draw_frame(&mut gpu).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<RenderError>(),
        Some(RenderError::DeviceLost)
    ));
    assert_eq!(o.image_marker(0), None);
    assert_eq!(o.current_slot(), 0);
    assert_eq!(o.frame_number(), 0);
    assert_eq!(o.slot_state(0), SlotState::Idle);
    assert!(!gpu
        .take_events()
        .iter()
        .any(|e| matches!(e, Event::Submit(..) | Event::Present(..))));
}

#[test]
fn failed_present_keeps_marker_but_not_slot_advance() {
    let mut gpu = MockGpu::new(3);
    gpu.fail_present = Some(RenderError::vulkan(
        "vkQueuePresentKHR",
        vk::Result::ERROR_SURFACE_LOST_KHR,
    ));
    let mut o = orchestrator(3);

    let err = o.draw_frame(&mut gpu).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<RenderError>(),
        Some(RenderError::Vulkan {
            result: vk::Result::ERROR_SURFACE_LOST_KHR,
            ..
        })
    ));
    // The submission reached the queue, so the marker must still guard image 0.
    assert_eq!(o.image_marker(0), Some(ImageMarker { slot: 0, frame: 0 }));
    assert_eq!(o.current_slot(), 0);
    assert_eq!(o.frame_number(), 0);
    assert_eq!(o.slot_state(0), SlotState::Idle);
    assert!(!gpu
        .take_events()
        .iter()
        .any(|e| matches!(e, Event::Recreate(_))));
}

// SPDX-License-Identifier: CEPL-1.0
use umbra_platform::winit::event_loop::ControlFlow;
use umbra_render::{FrameStatus, RenderSize};

/// Draw continuously while there is something to draw into, otherwise sleep
/// until the window system sends an event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pacing {
    zero_area: bool,
    occluded: bool,
    /// The last frame was skipped because the surface reported no extent.
    starved: bool,
}

impl Pacing {
    pub fn new(size: RenderSize) -> Self {
        Self {
            zero_area: size.is_zero_area(),
            ..Default::default()
        }
    }

    pub fn is_paused(&self) -> bool {
        self.zero_area || self.occluded || self.starved
    }

    /// Returns true when drawing should resume right away.
    pub fn resized(&mut self, size: RenderSize) -> bool {
        self.zero_area = size.is_zero_area();
        self.starved = false;
        !self.is_paused()
    }

    /// Returns true when drawing should resume right away.
    pub fn occluded(&mut self, occluded: bool) -> bool {
        self.occluded = occluded;
        !self.is_paused()
    }

    pub fn frame_finished(&mut self, status: FrameStatus) {
        self.starved = status == FrameStatus::Skipped;
    }

    pub fn control_flow(&self) -> ControlFlow {
        if self.is_paused() {
            ControlFlow::Wait
        } else {
            ControlFlow::Poll
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimized_window_waits_for_events() {
        let mut p = Pacing::new(RenderSize::new(800, 600));
        assert_eq!(p.control_flow(), ControlFlow::Poll);

        assert!(!p.resized(RenderSize::new(0, 0)));
        assert!(p.is_paused());
        assert_eq!(p.control_flow(), ControlFlow::Wait);

        assert!(p.resized(RenderSize::new(800, 600)));
        assert_eq!(p.control_flow(), ControlFlow::Poll);
    }

    #[test]
    fn skipped_frame_sleeps_until_next_resize() {
        let mut p = Pacing::new(RenderSize::new(800, 600));
        p.frame_finished(FrameStatus::Skipped);
        assert_eq!(p.control_flow(), ControlFlow::Wait);

        // More skipped frames do not wake it up.
        p.frame_finished(FrameStatus::Skipped);
        assert!(p.is_paused());

        assert!(p.resized(RenderSize::new(640, 480)));
        assert!(!p.is_paused());
    }

    #[test]
    fn recreated_frame_keeps_drawing() {
        let mut p = Pacing::new(RenderSize::new(800, 600));
        p.frame_finished(FrameStatus::Recreated);
        assert_eq!(p.control_flow(), ControlFlow::Poll);
        p.frame_finished(FrameStatus::Presented);
        assert_eq!(p.control_flow(), ControlFlow::Poll);
    }

    #[test]
    fn occlusion_pauses_independently_of_size() {
        let mut p = Pacing::new(RenderSize::new(800, 600));
        assert!(!p.occluded(true));
        assert!(!p.resized(RenderSize::new(1024, 768)));
        assert!(p.occluded(false));

        p.resized(RenderSize::new(0, 10));
        assert!(!p.occluded(false));
    }

    #[test]
    fn starting_at_zero_area_is_paused() {
        assert!(Pacing::new(RenderSize::new(0, 0)).is_paused());
    }
}

// SPDX-License-Identifier: CEPL-1.0
use bitflags::bitflags;
use glam::Vec2;

bitflags! {
    /// Movement keys currently held.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct MoveKeys: u8 {
        const FORWARD = 1 << 0;
        const BACK    = 1 << 1;
        const LEFT    = 1 << 2;
        const RIGHT   = 1 << 3;
    }
}

/// Polled input snapshot handed to cameras once per frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InputState {
    pub keys: MoveKeys,
    /// Same layout as `keys`, but steering the texture projector.
    pub projector_keys: MoveKeys,
    /// Cursor position in physical pixels.
    pub cursor: Vec2,
    /// Mouse-look is active while this is held.
    pub rotate_held: bool,
}

impl InputState {
    /// Strafe on x, forward/back on y, each in {-1, 0, 1}.
    pub fn movement_axes(&self) -> Vec2 {
        self.keys.axes()
    }

    pub fn projector_axes(&self) -> Vec2 {
        self.projector_keys.axes()
    }
}

impl MoveKeys {
    pub fn axes(self) -> Vec2 {
        let mut axes = Vec2::ZERO;
        if self.contains(MoveKeys::FORWARD) {
            axes.y += 1.0;
        }
        if self.contains(MoveKeys::BACK) {
            axes.y -= 1.0;
        }
        if self.contains(MoveKeys::LEFT) {
            axes.x -= 1.0;
        }
        if self.contains(MoveKeys::RIGHT) {
            axes.x += 1.0;
        }
        axes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_keys_cancel() {
        let input = InputState {
            keys: MoveKeys::FORWARD | MoveKeys::BACK | MoveKeys::RIGHT,
            ..Default::default()
        };
        assert_eq!(input.movement_axes(), Vec2::new(1.0, 0.0));
    }

    #[test]
    fn no_keys_means_no_motion() {
        assert_eq!(InputState::default().movement_axes(), Vec2::ZERO);
    }

    #[test]
    fn projector_axes_are_independent_of_camera_keys() {
        let input = InputState {
            keys: MoveKeys::FORWARD,
            projector_keys: MoveKeys::LEFT,
            ..Default::default()
        };
        assert_eq!(input.movement_axes(), Vec2::new(0.0, 1.0));
        assert_eq!(input.projector_axes(), Vec2::new(-1.0, 0.0));
    }
}

// SPDX-License-Identifier: CEPL-1.0
pub use winit;

use tracing::trace;
use umbra_math::glam::Vec2;
use umbra_math::{InputState, MoveKeys};
use winit::dpi::PhysicalPosition;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Folds window events into the polled `InputState` the cameras read.
#[derive(Debug, Default)]
pub struct InputTracker {
    state: InputState,
}

impl InputTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> InputState {
        self.state
    }

    /// Returns true if the event changed the input state.
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event, .. } => match event.physical_key {
                PhysicalKey::Code(code) => self.key(code, event.state),
                PhysicalKey::Unidentified(_) => false,
            },
            WindowEvent::MouseInput { state, button, .. } => self.mouse_button(*button, *state),
            WindowEvent::CursorMoved { position, .. } => self.cursor_moved(*position),
            // Releasing keys while unfocused never reaches us.
            WindowEvent::Focused(false) => {
                let had_input = !self.state.keys.is_empty()
                    || !self.state.projector_keys.is_empty()
                    || self.state.rotate_held;
                self.state.keys = MoveKeys::empty();
                self.state.projector_keys = MoveKeys::empty();
                self.state.rotate_held = false;
                had_input
            }
            _ => false,
        }
    }

    /// WASD moves the camera, the arrow keys move the projector.
    pub fn key(&mut self, code: KeyCode, state: ElementState) -> bool {
        let (keys, flag) = match code {
            KeyCode::KeyW => (&mut self.state.keys, MoveKeys::FORWARD),
            KeyCode::KeyS => (&mut self.state.keys, MoveKeys::BACK),
            KeyCode::KeyA => (&mut self.state.keys, MoveKeys::LEFT),
            KeyCode::KeyD => (&mut self.state.keys, MoveKeys::RIGHT),
            KeyCode::ArrowUp => (&mut self.state.projector_keys, MoveKeys::FORWARD),
            KeyCode::ArrowDown => (&mut self.state.projector_keys, MoveKeys::BACK),
            KeyCode::ArrowLeft => (&mut self.state.projector_keys, MoveKeys::LEFT),
            KeyCode::ArrowRight => (&mut self.state.projector_keys, MoveKeys::RIGHT),
            _ => return false,
        };
        let before = *keys;
        keys.set(flag, state.is_pressed());
        trace!(?code, ?state, "movement key");
        before != *keys
    }

    pub fn mouse_button(&mut self, button: MouseButton, state: ElementState) -> bool {
        if button != MouseButton::Left {
            return false;
        }
        let held = state.is_pressed();
        let changed = self.state.rotate_held != held;
        self.state.rotate_held = held;
        changed
    }

    pub fn cursor_moved(&mut self, position: PhysicalPosition<f64>) -> bool {
        let cursor = Vec2::new(position.x as f32, position.y as f32);
        let changed = self.state.cursor != cursor;
        self.state.cursor = cursor;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wasd_sets_and_clears_flags() {
        let mut t = InputTracker::new();
        assert!(t.key(KeyCode::KeyW, ElementState::Pressed));
        assert!(t.key(KeyCode::KeyD, ElementState::Pressed));
        assert_eq!(t.state().keys, MoveKeys::FORWARD | MoveKeys::RIGHT);

        assert!(t.key(KeyCode::KeyW, ElementState::Released));
        assert_eq!(t.state().keys, MoveKeys::RIGHT);
    }

    #[test]
    fn arrows_steer_the_projector_only() {
        let mut t = InputTracker::new();
        assert!(t.key(KeyCode::ArrowUp, ElementState::Pressed));
        assert!(t.key(KeyCode::ArrowLeft, ElementState::Pressed));
        assert_eq!(t.state().projector_keys, MoveKeys::FORWARD | MoveKeys::LEFT);
        assert_eq!(t.state().keys, MoveKeys::empty());

        assert!(t.key(KeyCode::ArrowUp, ElementState::Released));
        assert_eq!(t.state().projector_keys, MoveKeys::LEFT);
    }

    #[test]
    fn unrelated_keys_are_ignored() {
        let mut t = InputTracker::new();
        assert!(!t.key(KeyCode::KeyQ, ElementState::Pressed));
        assert_eq!(t.state(), InputState::default());
    }

    #[test]
    fn repeated_press_reports_no_change() {
        let mut t = InputTracker::new();
        assert!(t.key(KeyCode::KeyA, ElementState::Pressed));
        assert!(!t.key(KeyCode::KeyA, ElementState::Pressed));
    }

    #[test]
    fn left_button_drives_rotation() {
        let mut t = InputTracker::new();
        assert!(!t.mouse_button(MouseButton::Right, ElementState::Pressed));
        assert!(t.mouse_button(MouseButton::Left, ElementState::Pressed));
        assert!(t.state().rotate_held);
        assert!(t.mouse_button(MouseButton::Left, ElementState::Released));
        assert!(!t.state().rotate_held);
    }

    #[test]
    fn cursor_tracks_physical_position() {
        let mut t = InputTracker::new();
        assert!(t.cursor_moved(PhysicalPosition::new(12.5, 300.0)));
        assert_eq!(t.state().cursor, Vec2::new(12.5, 300.0));
        assert!(!t.cursor_moved(PhysicalPosition::new(12.5, 300.0)));
    }

    #[test]
    fn losing_focus_releases_everything() {
        let mut t = InputTracker::new();
        t.key(KeyCode::KeyS, ElementState::Pressed);
        t.key(KeyCode::ArrowRight, ElementState::Pressed);
        t.mouse_button(MouseButton::Left, ElementState::Pressed);
        assert!(t.handle_window_event(&WindowEvent::Focused(false)));
        assert_eq!(t.state().keys, MoveKeys::empty());
        assert_eq!(t.state().projector_keys, MoveKeys::empty());
        assert!(!t.state().rotate_held);
    }
}

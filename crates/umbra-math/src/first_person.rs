// SPDX-License-Identifier: CEPL-1.0
use glam::{Mat4, Vec2, Vec3};
use umbra_core::GameTime;

use crate::camera::{Camera, Lens, Pose, WORLD_UP};
use crate::InputState;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FirstPersonRates {
    /// World units per second.
    pub movement: f32,
    /// Radians per second per unit of scaled mouse travel.
    pub rotation: f32,
    /// Multiplier applied to cursor travel in pixels.
    pub mouse_sensitivity: f32,
}

impl Default for FirstPersonRates {
    fn default() -> Self {
        Self {
            movement: 2.0,
            rotation: 30f32.to_radians(),
            mouse_sensitivity: 0.5,
        }
    }
}

/// WASD to move along the view plane, drag with the left button to look.
#[derive(Clone, Debug)]
pub struct FirstPersonCamera {
    pose: Pose,
    lens: Lens,
    rates: FirstPersonRates,
    last_cursor: Option<Vec2>,
}

impl FirstPersonCamera {
    pub const DEFAULT_NEAR: f32 = 0.01;
    pub const DEFAULT_FAR: f32 = 1000.0;

    pub fn new(aspect: f32, rates: FirstPersonRates) -> Self {
        Self {
            pose: Self::home_pose(),
            lens: Lens::new(
                Lens::DEFAULT_FOV_DEGREES,
                aspect,
                Self::DEFAULT_NEAR,
                Self::DEFAULT_FAR,
            ),
            rates,
            last_cursor: None,
        }
    }

    fn home_pose() -> Pose {
        Pose::look_at(Vec3::splat(2.0), Vec3::ZERO, WORLD_UP)
    }

    pub fn reset(&mut self) {
        self.pose = Self::home_pose();
        self.last_cursor = None;
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.pose.position = position;
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn rates_mut(&mut self) -> &mut FirstPersonRates {
        &mut self.rates
    }
}

impl Camera for FirstPersonCamera {
    fn position(&self) -> Vec3 {
        self.pose.position
    }

    fn direction(&self) -> Vec3 {
        self.pose.direction
    }

    fn up(&self) -> Vec3 {
        self.pose.up
    }

    fn view_matrix(&self) -> Mat4 {
        self.pose.view_matrix()
    }

    fn projection_matrix(&self) -> Mat4 {
        self.lens.projection_matrix()
    }

    fn set_aspect_ratio(&mut self, aspect: f32) {
        self.lens.set_aspect_ratio(aspect);
    }

    fn update(&mut self, time: &GameTime, input: &InputState) {
        let dt = time.elapsed_seconds();

        let last = self.last_cursor.replace(input.cursor).unwrap_or(input.cursor);
        if input.rotate_held {
            let look = (last - input.cursor) * self.rates.mouse_sensitivity;
            let angles = look * self.rates.rotation * dt;
            if angles != Vec2::ZERO {
                // Pitch about the camera's right axis, yaw about world up.
                let rotation = Mat4::from_axis_angle(self.pose.right, angles.y)
                    * Mat4::from_axis_angle(WORLD_UP, angles.x);
                self.apply_rotation(rotation);
            }
        }

        let travel = input.movement_axes() * self.rates.movement * dt;
        self.pose.position += self.pose.right * travel.x;
        self.pose.position += self.pose.direction * travel.y;
    }

    fn apply_rotation(&mut self, transform: Mat4) {
        self.pose.apply_rotation(transform);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MoveKeys;
    use approx::assert_relative_eq;
    use std::time::Duration;
    use umbra_core::GameClock;

    fn ticked_time() -> GameTime {
        let mut clock = GameClock::new();
        let mut time = GameTime::default();
        std::thread::sleep(Duration::from_millis(5));
        clock.update_game_time(&mut time);
        time
    }

    #[test]
    fn forward_key_moves_along_direction() {
        let mut cam = FirstPersonCamera::new(1.0, FirstPersonRates::default());
        let start = cam.position();
        let dir = cam.direction();
        let time = ticked_time();
        let input = InputState {
            keys: MoveKeys::FORWARD,
            ..Default::default()
        };

        cam.update(&time, &input);
        let moved = cam.position() - start;
        assert!(moved.length() > 0.0);
        assert_relative_eq!(moved.normalize().dot(dir), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn cursor_motion_without_button_does_not_rotate() {
        let mut cam = FirstPersonCamera::new(1.0, FirstPersonRates::default());
        let dir = cam.direction();
        let time = ticked_time();

        cam.update(&time, &InputState::default());
        cam.update(
            &time,
            &InputState {
                cursor: Vec2::new(300.0, 40.0),
                ..Default::default()
            },
        );
        assert_eq!(cam.direction(), dir);
    }

    #[test]
    fn dragging_rotates_and_stays_orthonormal() {
        let mut cam = FirstPersonCamera::new(1.0, FirstPersonRates::default());
        let dir = cam.direction();
        let time = ticked_time();

        cam.update(
            &time,
            &InputState {
                rotate_held: true,
                ..Default::default()
            },
        );
        cam.update(
            &time,
            &InputState {
                cursor: Vec2::new(-200.0, 50.0),
                rotate_held: true,
                ..Default::default()
            },
        );

        assert_ne!(cam.direction(), dir);
        assert_relative_eq!(cam.direction().length(), 1.0, epsilon = 1e-4);
        assert_relative_eq!(cam.direction().dot(cam.up()), 0.0, epsilon = 1e-4);
    }

    #[test]
    fn reset_returns_home() {
        let mut cam = FirstPersonCamera::new(1.0, FirstPersonRates::default());
        cam.set_position(Vec3::new(9.0, 9.0, 9.0));
        cam.reset();
        assert_eq!(cam.position(), Vec3::splat(2.0));
    }
}

// SPDX-License-Identifier: CEPL-1.0
use glam::{Mat4, Vec2, Vec3};
use umbra_core::GameTime;

use crate::camera::{Camera, Lens, Pose};
use crate::InputState;

/// Throws a texture onto the scene from its own frustum.
#[derive(Clone, Debug)]
pub struct Projector {
    pose: Pose,
    lens: Lens,
    /// World units per second for the projector keys.
    movement_rate: f32,
}

impl Projector {
    pub const DEFAULT_NEAR: f32 = 0.1;
    pub const DEFAULT_FAR: f32 = 10.0;

    pub const HOME_POSITION: Vec3 = Vec3::new(0.1306, 2.3667, 2.1383);
    pub const HOME_DIRECTION: Vec3 = Vec3::new(-0.0292, -0.8150, -0.5786);
    pub const DEFAULT_MOVEMENT_RATE: f32 = 1.0;

    pub fn new(aspect: f32) -> Self {
        Self {
            pose: Self::home_pose(),
            lens: Lens::new(
                Lens::DEFAULT_FOV_DEGREES,
                aspect,
                Self::DEFAULT_NEAR,
                Self::DEFAULT_FAR,
            ),
            movement_rate: Self::DEFAULT_MOVEMENT_RATE,
        }
    }

    fn home_pose() -> Pose {
        Pose {
            position: Self::HOME_POSITION,
            direction: Self::HOME_DIRECTION,
            up: Vec3::Z,
            right: Vec3::X,
        }
    }

    pub fn reset(&mut self) {
        self.pose = Self::home_pose();
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.pose.position = position;
    }

    /// Direction is stored as given; the view matrix only needs it non-zero.
    pub fn set_direction(&mut self, direction: Vec3) {
        if direction != Vec3::ZERO {
            self.pose.direction = direction;
        }
    }

    pub fn set_movement_rate(&mut self, rate: f32) {
        self.movement_rate = rate.max(0.0);
    }
}

impl Camera for Projector {
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

    /// Slides along its own right and direction axes; orientation is untouched.
    fn update(&mut self, time: &GameTime, input: &InputState) {
        let travel = input.projector_axes() * self.movement_rate * time.elapsed_seconds();
        if travel == Vec2::ZERO {
            return;
        }
        self.pose.position += self.pose.right * travel.x;
        self.pose.position += self.pose.direction.normalize_or_zero() * travel.y;
    }

    fn apply_rotation(&mut self, transform: Mat4) {
        self.pose.apply_rotation(transform);
    }
}

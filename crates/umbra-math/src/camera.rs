// SPDX-License-Identifier: CEPL-1.0
use glam::{Mat4, Vec3};
use umbra_core::GameTime;

use crate::InputState;

/// Scenes are Z-up.
pub const WORLD_UP: Vec3 = Vec3::Z;

/// Anything that can stand in for the viewer: the renderer only sees this.
pub trait Camera {
    fn position(&self) -> Vec3;
    fn direction(&self) -> Vec3;
    fn up(&self) -> Vec3;

    fn view_matrix(&self) -> Mat4;
    /// Right-handed, depth in [0, 1], Y up in clip space.
    fn projection_matrix(&self) -> Mat4;

    fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    fn set_aspect_ratio(&mut self, aspect: f32);

    /// Called once per frame before uniforms are rebuilt.
    fn update(&mut self, time: &GameTime, input: &InputState);

    fn apply_rotation(&mut self, transform: Mat4);
}

/// Orthonormal frame: position plus direction/up/right.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub direction: Vec3,
    pub up: Vec3,
    pub right: Vec3,
}

impl Pose {
    pub fn look_at(position: Vec3, target: Vec3, world_up: Vec3) -> Self {
        let direction = (target - position).normalize_or(Vec3::NEG_Y);
        Self::facing(position, direction, world_up)
    }

    pub fn facing(position: Vec3, direction: Vec3, world_up: Vec3) -> Self {
        let direction = direction.normalize_or(Vec3::NEG_Y);
        // Looking straight along the up axis leaves right undefined; fall back to +X.
        let right = direction.cross(world_up).normalize_or(Vec3::X);
        let up = right.cross(direction);
        Self {
            position,
            direction,
            up,
            right,
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.direction, self.up)
    }

    /// Rotates direction and up by `transform`, then re-derives right and up.
    pub fn apply_rotation(&mut self, transform: Mat4) {
        let direction = (transform * self.direction.extend(0.0))
            .truncate()
            .normalize_or(self.direction);
        let up = (transform * self.up.extend(0.0))
            .truncate()
            .normalize_or(self.up);

        self.right = direction.cross(up).normalize_or(self.right);
        self.up = self.right.cross(direction);
        self.direction = direction;
    }
}

/// Perspective parameters shared by cameras and the projector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Lens {
    pub fov_y_radians: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Lens {
    pub const DEFAULT_FOV_DEGREES: f32 = 45.0;

    pub fn new(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            fov_y_radians: fov_y_degrees.to_radians(),
            aspect: sanitize_aspect(aspect),
            near,
            far,
        }
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_radians, self.aspect, self.near, self.far)
    }

    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        self.aspect = sanitize_aspect(aspect);
    }
}

fn sanitize_aspect(aspect: f32) -> f32 {
    if aspect.is_finite() && aspect > 0.0 {
        aspect
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn look_at_builds_orthonormal_frame() {
        let pose = Pose::look_at(Vec3::splat(2.0), Vec3::ZERO, WORLD_UP);
        assert_relative_eq!(pose.direction.length(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(pose.right.length(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(pose.up.length(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(pose.direction.dot(pose.right), 0.0, epsilon = 1e-5);
        assert_relative_eq!(pose.direction.dot(pose.up), 0.0, epsilon = 1e-5);
        assert!(pose.up.z > 0.0);
    }

    #[test]
    fn rotation_keeps_frame_orthonormal() {
        let mut pose = Pose::look_at(Vec3::new(0.0, -3.0, 1.0), Vec3::ZERO, WORLD_UP);
        pose.apply_rotation(Mat4::from_axis_angle(WORLD_UP, 0.7));
        pose.apply_rotation(Mat4::from_axis_angle(pose.right, -0.3));

        assert_relative_eq!(pose.direction.length(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(pose.direction.dot(pose.up), 0.0, epsilon = 1e-5);
        assert_relative_eq!(pose.right.dot(pose.up), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn degenerate_aspect_falls_back_to_square() {
        let mut lens = Lens::new(45.0, 0.0, 0.1, 10.0);
        assert_eq!(lens.aspect, 1.0);
        lens.set_aspect_ratio(f32::NAN);
        assert_eq!(lens.aspect, 1.0);
        lens.set_aspect_ratio(1024.0 / 768.0);
        assert_relative_eq!(lens.aspect, 1.333_333, epsilon = 1e-5);
    }
}

// SPDX-License-Identifier: CEPL-1.0
use glam::{Mat4, Vec3};

use crate::clip::vulkan_projection;

/// Sun-style light; only its direction reaches the shaders.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub up: Vec3,
    pub right: Vec3,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::splat(-2.0),
            up: Vec3::Z,
            right: Vec3::X,
        }
    }
}

impl DirectionalLight {
    pub fn apply_rotation(&mut self, transform: Mat4) {
        self.direction = transform.transform_vector3(self.direction);
        self.up = transform.transform_vector3(self.up);
        self.right = transform.transform_vector3(self.right);
    }
}

/// Frustum the shadow map is rendered from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowProjection {
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
}

impl Default for ShadowProjection {
    fn default() -> Self {
        Self {
            fov_y_degrees: 45.0,
            near: 1.0,
            far: 96.0,
            position: Vec3::splat(3.0),
            target: Vec3::ONE,
            up: Vec3::new(-1.0, 0.0, 1.0),
        }
    }
}

impl ShadowProjection {
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        let aspect = if aspect.is_finite() && aspect > 0.0 {
            aspect
        } else {
            1.0
        };
        vulkan_projection(Mat4::perspective_rh(
            self.fov_y_degrees.to_radians(),
            aspect,
            self.near,
            self.far,
        ))
    }

    /// Light-space transform used by both the shadow pass and the lookup.
    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn target_lands_in_the_middle_of_the_depth_range() {
        let shadow = ShadowProjection::default();
        let clip = shadow.view_projection(1.0) * shadow.target.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert_relative_eq!(ndc.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(ndc.y, 0.0, epsilon = 1e-4);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn points_past_far_plane_are_clipped() {
        let shadow = ShadowProjection::default();
        let dir = (shadow.target - shadow.position).normalize();
        let beyond = shadow.position + dir * (shadow.far + 1.0);
        let clip = shadow.view_projection(1.0) * beyond.extend(1.0);
        assert!(clip.z / clip.w > 1.0);
    }

    #[test]
    fn light_rotation_preserves_length() {
        let mut light = DirectionalLight::default();
        let len = light.direction.length();
        light.apply_rotation(Mat4::from_axis_angle(Vec3::Z, 1.1));
        assert_relative_eq!(light.direction.length(), len, epsilon = 1e-5);
    }
}

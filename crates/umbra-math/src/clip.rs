// SPDX-License-Identifier: CEPL-1.0
use glam::{Mat4, Vec4};

/// Flips clip-space Y so a Y-up projection renders upright in Vulkan.
pub fn vulkan_projection(mut projection: Mat4) -> Mat4 {
    projection.y_axis.y *= -1.0;
    projection
}

/// Maps clip space [-1, 1] onto texture space [0, 1] with V pointing down,
/// offset by half a texel of a `width` x `height` texture.
pub fn projective_texture_scaling(width: u32, height: u32) -> Mat4 {
    let bias_x = 0.5 + 0.5 / width.max(1) as f32;
    let bias_y = 0.5 + 0.5 / height.max(1) as f32;
    Mat4::from_cols(
        Vec4::new(0.5, 0.0, 0.0, 0.0),
        Vec4::new(0.0, -0.5, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0, 0.0),
        Vec4::new(bias_x, bias_y, 0.0, 1.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn flip_only_touches_y_scale() {
        let p = Mat4::perspective_rh(1.0, 1.5, 0.1, 100.0);
        let f = vulkan_projection(p);
        assert_eq!(f.y_axis.y, -p.y_axis.y);
        assert_eq!(f.x_axis, p.x_axis);
        assert_eq!(f.z_axis, p.z_axis);
        assert_eq!(f.w_axis, p.w_axis);
    }

    #[test]
    fn scaling_maps_clip_corners_to_texture_corners() {
        let s = projective_texture_scaling(256, 128);
        let top_left = s * Vec4::new(-1.0, 1.0, 0.5, 1.0);
        assert_relative_eq!(top_left.x, 0.5 / 256.0, epsilon = 1e-6);
        assert_relative_eq!(top_left.y, 0.5 / 128.0, epsilon = 1e-6);
        assert_relative_eq!(top_left.z, 0.5, epsilon = 1e-6);

        let bottom_right = s * Vec4::new(1.0, -1.0, 0.0, 1.0);
        assert_relative_eq!(bottom_right.x, 1.0 + 0.5 / 256.0, epsilon = 1e-6);
        assert_relative_eq!(bottom_right.y, 1.0 + 0.5 / 128.0, epsilon = 1e-6);
    }
}

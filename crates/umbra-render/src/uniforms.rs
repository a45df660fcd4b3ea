// SPDX-License-Identifier: CEPL-1.0
//! std140 uniform payloads and the pure math that fills them each frame.
//!
//! Every struct here is mirrored by a GLSL block in the backend's build
//! script; vec3 values travel in the xyz of a vec4.
use bytemuck::{Pod, Zeroable};
use umbra_math::glam::{Mat4, Vec3, Vec4};
use umbra_math::{projective_texture_scaling, vulkan_projection, Camera};

use crate::{RenderSize, ShadowSettings};

/// Vertex-stage block for the main pipeline (set 0, binding 0).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SceneUniforms {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub projective_texture: [[f32; 4]; 4],
    pub light_view_projection: [[f32; 4]; 4],
    pub light_direction: [f32; 4],
    /// xyz = position, w = radius.
    pub point_light: [f32; 4],
    pub light_position: [f32; 4],
}

/// Fragment-stage block for the main pipeline (set 0, binding 2).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MaterialUniforms {
    pub ambient_color: [f32; 4],
    pub light_color: [f32; 4],
    pub point_light_color: [f32; 4],
    pub point_light_position: [f32; 4],
    pub camera_position: [f32; 4],
    pub specular_color: [f32; 4],
    /// x = specular power.
    pub specular: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ProxyUniforms {
    pub mvp: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ShadowUniforms {
    pub light_view_projection: [[f32; 4]; 4],
}

/// One frame's worth of uniform data for a single swapchain image.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameUniforms {
    pub scene: SceneUniforms,
    pub material: MaterialUniforms,
    pub proxy: ProxyUniforms,
    pub shadow: ShadowUniforms,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Lighting {
    pub direction: Vec3,
    pub point_light_position: Vec3,
    pub point_light_radius: f32,
    pub ambient_color: Vec4,
    pub light_color: Vec4,
    pub point_light_color: Vec4,
    pub specular_color: Vec4,
    pub specular_power: f32,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            direction: Vec3::splat(-2.0),
            point_light_position: Vec3::new(0.0569, -1.078, 0.4015),
            point_light_radius: 2.0,
            ambient_color: Vec4::new(0.53, 0.80, 0.91, 1.0),
            light_color: Vec4::new(0.94, 0.35, 0.11, 1.0),
            point_light_color: Vec4::new(1.0, 0.0, 0.0, 0.0),
            specular_color: Vec4::new(1.0, 0.0, 0.0, 1.0),
            specular_power: 10.0,
        }
    }
}

/// Inputs that change from frame to frame.
pub struct FrameView<'a> {
    pub camera: &'a dyn Camera,
    pub projector: &'a dyn Camera,
    pub extent: RenderSize,
    pub projected_texture_size: (u32, u32),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UniformBuilder {
    pub lighting: Lighting,
    pub proxy_model: Mat4,
    pub shadow: ShadowSettings,
}

impl UniformBuilder {
    pub fn new(shadow: ShadowSettings) -> Self {
        Self {
            lighting: Lighting::default(),
            proxy_model: Mat4::from_translation(Vec3::splat(0.8))
                * Mat4::from_scale(Vec3::splat(0.2)),
            shadow,
        }
    }

    /// Light-space transform, sized to the swapchain aspect.
    pub fn shadow(&self, extent: RenderSize) -> ShadowUniforms {
        ShadowUniforms {
            light_view_projection: self
                .shadow
                .projection
                .view_projection(extent.aspect())
                .to_cols_array_2d(),
        }
    }

    pub fn scene(&self, view: &FrameView<'_>, shadow: &ShadowUniforms) -> SceneUniforms {
        let (tex_w, tex_h) = view.projected_texture_size;
        let projective = projective_texture_scaling(tex_w, tex_h)
            * view.projector.projection_matrix()
            * view.projector.view_matrix();
        let l = &self.lighting;
        SceneUniforms {
            model: Mat4::IDENTITY.to_cols_array_2d(),
            view: view.camera.view_matrix().to_cols_array_2d(),
            proj: vulkan_projection(view.camera.projection_matrix()).to_cols_array_2d(),
            projective_texture: projective.to_cols_array_2d(),
            light_view_projection: shadow.light_view_projection,
            light_direction: l.direction.extend(0.0).to_array(),
            point_light: l.point_light_position.extend(l.point_light_radius).to_array(),
            light_position: self.shadow.projection.position.extend(1.0).to_array(),
        }
    }

    pub fn material(&self, camera: &dyn Camera) -> MaterialUniforms {
        let l = &self.lighting;
        MaterialUniforms {
            ambient_color: l.ambient_color.to_array(),
            light_color: l.light_color.to_array(),
            point_light_color: l.point_light_color.to_array(),
            point_light_position: l.point_light_position.extend(1.0).to_array(),
            camera_position: camera.position().extend(1.0).to_array(),
            specular_color: l.specular_color.to_array(),
            specular: [l.specular_power, 0.0, 0.0, 0.0],
        }
    }

    pub fn proxy(&self, camera: &dyn Camera) -> ProxyUniforms {
        let mvp =
            vulkan_projection(camera.projection_matrix()) * camera.view_matrix() * self.proxy_model;
        ProxyUniforms {
            mvp: mvp.to_cols_array_2d(),
        }
    }

    pub fn build(&self, view: &FrameView<'_>) -> FrameUniforms {
        let shadow = self.shadow(view.extent);
        FrameUniforms {
            scene: self.scene(view, &shadow),
            material: self.material(view.camera),
            proxy: self.proxy(view.camera),
            shadow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use umbra_math::{FirstPersonCamera, FirstPersonRates, Projector};

    fn view<'a>(cam: &'a dyn Camera, projector: &'a dyn Camera) -> FrameView<'a> {
        FrameView {
            camera: cam,
            projector,
            extent: RenderSize::new(1024, 768),
            projected_texture_size: (256, 256),
        }
    }

    #[test]
    fn std140_sizes_are_multiples_of_16() {
        assert_eq!(std::mem::size_of::<SceneUniforms>(), 5 * 64 + 3 * 16);
        assert_eq!(std::mem::size_of::<MaterialUniforms>(), 7 * 16);
        assert_eq!(std::mem::size_of::<ProxyUniforms>(), 64);
        assert_eq!(std::mem::size_of::<ShadowUniforms>(), 64);
    }

    #[test]
    fn main_projection_is_y_flipped() {
        let cam = FirstPersonCamera::new(4.0 / 3.0, FirstPersonRates::default());
        let projector = Projector::new(1.0);
        let u = UniformBuilder::new(ShadowSettings::default()).build(&view(&cam, &projector));
        let unflipped = cam.projection_matrix();
        assert_relative_eq!(u.scene.proj[1][1], -unflipped.y_axis.y);
    }

    #[test]
    fn proxy_sits_at_its_model_transform() {
        let cam = FirstPersonCamera::new(1.0, FirstPersonRates::default());
        let projector = Projector::new(1.0);
        let b = UniformBuilder::new(ShadowSettings::default());
        let u = b.build(&view(&cam, &projector));

        let expected = vulkan_projection(cam.projection_matrix())
            * cam.view_matrix()
            * Vec3::splat(0.8).extend(1.0);
        let got = Mat4::from_cols_array_2d(&u.proxy.mvp) * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(got.x, expected.x, epsilon = 1e-5);
        assert_relative_eq!(got.w, expected.w, epsilon = 1e-5);
    }

    #[test]
    fn projector_axis_lands_at_texture_centre() {
        let cam = FirstPersonCamera::new(1.0, FirstPersonRates::default());
        let projector = Projector::new(1.0);
        let u = UniformBuilder::new(ShadowSettings::default()).build(&view(&cam, &projector));

        let on_axis = projector.position() + projector.direction() * 3.0;
        let t = Mat4::from_cols_array_2d(&u.scene.projective_texture) * on_axis.extend(1.0);
        assert_relative_eq!(t.x / t.w, 0.5 + 0.5 / 256.0, epsilon = 1e-4);
        assert_relative_eq!(t.y / t.w, 0.5 + 0.5 / 256.0, epsilon = 1e-4);
    }

    #[test]
    fn shadow_block_is_shared_with_scene() {
        let cam = FirstPersonCamera::new(1.0, FirstPersonRates::default());
        let projector = Projector::new(1.0);
        let u = UniformBuilder::new(ShadowSettings::default()).build(&view(&cam, &projector));
        assert_eq!(u.scene.light_view_projection, u.shadow.light_view_projection);
        assert_eq!(u.scene.light_position, [3.0, 3.0, 3.0, 1.0]);
        assert_eq!(u.material.specular[0], 10.0);
    }
}

// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use umbra_render::RenderSize;

use crate::passes::RenderPass;
use crate::pipelines::{build_pipeline, Pipeline, PipelineDesc, ShaderCode};

/// Per-frame state handed to the overlay before recording.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayFrame {
    /// Smoothed frames per second.
    pub fps: f32,
    pub extent: RenderSize,
}

/// Draw calls injected at the end of the main pass.
pub trait Overlay {
    /// Only a ready overlay is recorded.
    fn is_ready(&self) -> bool;

    fn prepare(&mut self, frame: &OverlayFrame);

    /// # Safety
    /// `cmd` must be recording inside the main render pass with viewport and scissor set.
    unsafe fn record(&self, device: &ash::Device, cmd: vk::CommandBuffer, extent: vk::Extent2D);

    /// Called after every swapchain recreation with the new main pass.
    fn rebuild(
        &mut self,
        device: &ash::Device,
        cache: vk::PipelineCache,
        render_pass: &RenderPass,
    ) -> Result<()>;
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CrosshairPush {
    /// NDC half-length of each arm.
    pub scale: [f32; 2],
    pub _pad: [f32; 2],
    pub color: [f32; 4],
}

pub fn crosshair_push(extent: RenderSize, arm_px: f32, color: [f32; 4]) -> CrosshairPush {
    let w = extent.width.max(1) as f32;
    let h = extent.height.max(1) as f32;
    CrosshairPush {
        scale: [2.0 * arm_px / w, 2.0 * arm_px / h],
        _pad: [0.0; 2],
        color,
    }
}

/// Green at 60 fps and above, fading to red at 20 and below.
pub fn fps_color(fps: f32) -> [f32; 4] {
    let t = ((fps - 20.0) / 40.0).clamp(0.0, 1.0);
    [1.0 - t, t, 0.0, 1.0]
}

/// Screen-centred crosshair tinted by frame rate.
pub struct CrosshairOverlay {
    pipeline: Option<Pipeline>,
    vertex_shader: Vec<u32>,
    fragment_shader: Vec<u32>,
    arm_px: f32,
    push: Option<CrosshairPush>,
}

impl CrosshairOverlay {
    pub const ARM_PX: f32 = 8.0;

    pub fn new(shaders: &ShaderCode) -> Self {
        Self {
            pipeline: None,
            vertex_shader: shaders.overlay_vert.clone(),
            fragment_shader: shaders.overlay_frag.clone(),
            arm_px: Self::ARM_PX,
            push: None,
        }
    }
}

impl Overlay for CrosshairOverlay {
    fn is_ready(&self) -> bool {
        self.push.is_some() && self.pipeline.is_some()
    }

    fn prepare(&mut self, frame: &OverlayFrame) {
        self.push = Some(crosshair_push(
            frame.extent,
            self.arm_px,
            fps_color(frame.fps),
        ));
    }

    unsafe fn record(&self, device: &ash::Device, cmd: vk::CommandBuffer, _extent: vk::Extent2D) {
        let (Some(pipeline), Some(push)) = (&self.pipeline, &self.push) else {
            return;
        };
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.handle);
        device.cmd_push_constants(
            cmd,
            pipeline.layout,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            0,
            bytemuck::bytes_of(push),
        );
        device.cmd_draw(cmd, 4, 1, 0, 0);
    }

    fn rebuild(
        &mut self,
        device: &ash::Device,
        cache: vk::PipelineCache,
        render_pass: &RenderPass,
    ) -> Result<()> {
        // Old pipeline goes first; it references the old render pass.
        self.pipeline = None;
        let push = vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            offset: 0,
            size: std::mem::size_of::<CrosshairPush>() as u32,
        };
        self.pipeline = Some(build_pipeline(
            device,
            cache,
            render_pass.handle,
            &PipelineDesc {
                name: "overlay",
                vertex_shader: &self.vertex_shader,
                fragment_shader: Some(&self.fragment_shader),
                vertex_attributes: &[],
                topology: vk::PrimitiveTopology::LINE_LIST,
                cull_mode: vk::CullModeFlags::NONE,
                depth_test: false,
                blend: true,
                samples: render_pass.samples,
                min_sample_shading: None,
                depth_bias: false,
                set_layouts: &[],
                push_constants: std::slice::from_ref(&push),
            },
        )?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn push_block_is_two_vec4s() {
        assert_eq!(std::mem::size_of::<CrosshairPush>(), 32);
    }

    #[test]
    fn arms_keep_constant_pixel_length() {
        let p = crosshair_push(RenderSize::new(1024, 768), 8.0, [1.0; 4]);
        assert_relative_eq!(p.scale[0] * 1024.0 / 2.0, 8.0);
        assert_relative_eq!(p.scale[1] * 768.0 / 2.0, 8.0);
        let zero = crosshair_push(RenderSize::new(0, 0), 8.0, [1.0; 4]);
        assert!(zero.scale.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn color_tracks_frame_rate() {
        assert_eq!(fps_color(120.0), [0.0, 1.0, 0.0, 1.0]);
        assert_eq!(fps_color(5.0), [1.0, 0.0, 0.0, 1.0]);
        assert_relative_eq!(fps_color(40.0)[1], 0.5);
    }

    #[test]
    fn not_ready_before_prepare_and_pipeline() {
        let shaders = ShaderCode::load().unwrap();
        let mut overlay = CrosshairOverlay::new(&shaders);
        assert!(!overlay.is_ready());
        overlay.prepare(&OverlayFrame {
            fps: 60.0,
            extent: RenderSize::new(800, 600),
        });
        // Still missing the pipeline, which needs a device.
        assert!(!overlay.is_ready());
    }

    #[test]
    fn prepare_follows_latest_frame() {
        let shaders = ShaderCode::load().unwrap();
        let mut overlay = CrosshairOverlay::new(&shaders);
        overlay.prepare(&OverlayFrame {
            fps: 120.0,
            extent: RenderSize::new(800, 600),
        });
        overlay.prepare(&OverlayFrame {
            fps: 10.0,
            extent: RenderSize::new(400, 400),
        });
        let push = overlay.push.unwrap();
        assert_eq!(push.color, fps_color(10.0));
        assert_eq!(
            push,
            crosshair_push(RenderSize::new(400, 400), CrosshairOverlay::ARM_PX, fps_color(10.0))
        );
    }
}

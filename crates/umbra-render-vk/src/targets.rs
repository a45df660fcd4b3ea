// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;

use crate::context::DeviceCaps;
use crate::error::VkResultExt;
use crate::memory::{GpuImage, ImageDesc};
use crate::passes::RenderPass;
use crate::upload::{depth_aspect, Uploader};

/// Attachments sized by the swapchain.
pub struct RenderTargets {
    /// `None` when rendering single-sampled straight into the swapchain image.
    pub color: Option<GpuImage>,
    pub depth: GpuImage,
    pub shadow: GpuImage,
}

impl RenderTargets {
    pub fn new(
        device: &ash::Device,
        caps: &DeviceCaps,
        uploader: &Uploader,
        color_format: vk::Format,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let samples = caps.msaa_samples;
        let color = if samples != vk::SampleCountFlags::TYPE_1 {
            Some(
                GpuImage::new(
                    device,
                    &caps.memory_properties,
                    ImageDesc {
                        extent,
                        format: color_format,
                        samples,
                        usage: vk::ImageUsageFlags::TRANSIENT_ATTACHMENT
                            | vk::ImageUsageFlags::COLOR_ATTACHMENT,
                        aspect: vk::ImageAspectFlags::COLOR,
                    },
                )
                .context("msaa color target")?,
            )
        } else {
            None
        };

        let depth = GpuImage::new(
            device,
            &caps.memory_properties,
            ImageDesc {
                extent,
                format: caps.depth_format,
                samples,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                aspect: depth_aspect(caps.depth_format),
            },
        )
        .context("depth target")?;
        uploader.prepare_depth(&depth)?;

        let shadow = GpuImage::new(
            device,
            &caps.memory_properties,
            shadow_map_desc(caps.shadow_format, extent),
        )
        .context("shadow map")?;

        Ok(Self {
            color,
            depth,
            shadow,
        })
    }

    /// Attachments for one main-pass framebuffer, in render pass order.
    pub fn main_attachments(&self, swapchain_view: vk::ImageView) -> Vec<vk::ImageView> {
        match &self.color {
            Some(color) => vec![color.view, self.depth.view, swapchain_view],
            None => vec![swapchain_view, self.depth.view],
        }
    }
}

/// One view serves as both the shadow pass attachment and the sampled
/// texture, so it must cover every aspect of a depth-only format.
pub fn shadow_map_desc(format: vk::Format, extent: vk::Extent2D) -> ImageDesc {
    ImageDesc {
        extent,
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
        aspect: depth_aspect(format),
    }
}

pub struct Framebuffers {
    device: ash::Device,
    pub main: Vec<vk::Framebuffer>,
    pub shadow: vk::Framebuffer,
}

impl Framebuffers {
    pub fn new(
        device: &ash::Device,
        main_pass: &RenderPass,
        shadow_pass: &RenderPass,
        targets: &RenderTargets,
        swapchain_views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let mut fbs = Self {
            device: device.clone(),
            main: Vec::with_capacity(swapchain_views.len()),
            shadow: vk::Framebuffer::null(),
        };
        for &view in swapchain_views {
            let attachments = targets.main_attachments(view);
            fbs.main
                .push(create_framebuffer(device, main_pass.handle, &attachments, extent)?);
        }
        fbs.shadow = create_framebuffer(
            device,
            shadow_pass.handle,
            &[targets.shadow.view],
            targets.shadow.extent,
        )?;
        Ok(fbs)
    }
}

impl Drop for Framebuffers {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.shadow, None);
            for &fb in &self.main {
                self.device.destroy_framebuffer(fb, None);
            }
        }
    }
}

fn create_framebuffer(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    attachments: &[vk::ImageView],
    extent: vk::Extent2D,
) -> Result<vk::Framebuffer> {
    let info = vk::FramebufferCreateInfo {
        s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
        render_pass,
        attachment_count: attachments.len() as u32,
        p_attachments: attachments.as_ptr(),
        width: extent.width,
        height: extent.height,
        layers: 1,
        ..Default::default()
    };
    Ok(unsafe { device.create_framebuffer(&info, None) }.vk("vkCreateFramebuffer")?)
}

pub fn texture_sampler_info(max_anisotropy: f32) -> vk::SamplerCreateInfo<'static> {
    vk::SamplerCreateInfo {
        s_type: vk::StructureType::SAMPLER_CREATE_INFO,
        mag_filter: vk::Filter::LINEAR,
        min_filter: vk::Filter::LINEAR,
        mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        address_mode_u: vk::SamplerAddressMode::REPEAT,
        address_mode_v: vk::SamplerAddressMode::REPEAT,
        address_mode_w: vk::SamplerAddressMode::REPEAT,
        anisotropy_enable: vk::TRUE,
        max_anisotropy: max_anisotropy.min(16.0),
        border_color: vk::BorderColor::INT_OPAQUE_BLACK,
        compare_op: vk::CompareOp::ALWAYS,
        ..Default::default()
    }
}

/// Past the projector's side planes lookups clamp to the image's edge texels;
/// only W, which 2D lookups never vary, uses the white border.
pub fn projected_sampler_info() -> vk::SamplerCreateInfo<'static> {
    vk::SamplerCreateInfo {
        s_type: vk::StructureType::SAMPLER_CREATE_INFO,
        mag_filter: vk::Filter::LINEAR,
        min_filter: vk::Filter::LINEAR,
        mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        address_mode_u: vk::SamplerAddressMode::CLAMP_TO_EDGE,
        address_mode_v: vk::SamplerAddressMode::CLAMP_TO_EDGE,
        address_mode_w: vk::SamplerAddressMode::CLAMP_TO_BORDER,
        border_color: vk::BorderColor::FLOAT_OPAQUE_WHITE,
        compare_op: vk::CompareOp::ALWAYS,
        ..Default::default()
    }
}

pub fn shadow_sampler_info(filter: vk::Filter) -> vk::SamplerCreateInfo<'static> {
    vk::SamplerCreateInfo {
        s_type: vk::StructureType::SAMPLER_CREATE_INFO,
        mag_filter: filter,
        min_filter: filter,
        mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        address_mode_u: vk::SamplerAddressMode::CLAMP_TO_EDGE,
        address_mode_v: vk::SamplerAddressMode::CLAMP_TO_EDGE,
        address_mode_w: vk::SamplerAddressMode::CLAMP_TO_EDGE,
        max_lod: 1.0,
        border_color: vk::BorderColor::FLOAT_OPAQUE_WHITE,
        compare_op: vk::CompareOp::ALWAYS,
        ..Default::default()
    }
}

pub struct Samplers {
    device: ash::Device,
    pub texture: vk::Sampler,
    pub projected: vk::Sampler,
    pub shadow: vk::Sampler,
}

impl Samplers {
    pub fn new(device: &ash::Device, caps: &DeviceCaps) -> Result<Self> {
        let mut s = Self {
            device: device.clone(),
            texture: vk::Sampler::null(),
            projected: vk::Sampler::null(),
            shadow: vk::Sampler::null(),
        };
        unsafe {
            s.texture = device
                .create_sampler(&texture_sampler_info(caps.max_anisotropy), None)
                .vk("vkCreateSampler")?;
            s.projected = device
                .create_sampler(&projected_sampler_info(), None)
                .vk("vkCreateSampler")?;
            s.shadow = device
                .create_sampler(&shadow_sampler_info(caps.shadow_filter), None)
                .vk("vkCreateSampler")?;
        }
        Ok(s)
    }
}

impl Drop for Samplers {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.shadow, None);
            self.device.destroy_sampler(self.projected, None);
            self.device.destroy_sampler(self.texture, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anisotropy_is_capped_at_16() {
        assert_eq!(texture_sampler_info(64.0).max_anisotropy, 16.0);
        assert_eq!(texture_sampler_info(4.0).max_anisotropy, 4.0);
        assert_eq!(
            texture_sampler_info(16.0).address_mode_u,
            vk::SamplerAddressMode::REPEAT
        );
    }

    #[test]
    fn projected_texture_clamps_to_edge_texels() {
        let info = projected_sampler_info();
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::CLAMP_TO_EDGE);
        assert_eq!(info.address_mode_v, vk::SamplerAddressMode::CLAMP_TO_EDGE);
        assert_eq!(info.address_mode_w, vk::SamplerAddressMode::CLAMP_TO_BORDER);
        assert_eq!(info.border_color, vk::BorderColor::FLOAT_OPAQUE_WHITE);
    }

    #[test]
    fn shadow_map_view_is_depth_only_for_every_candidate() {
        let extent = vk::Extent2D {
            width: 1024,
            height: 768,
        };
        for format in crate::context::SHADOW_FORMAT_CANDIDATES {
            let desc = shadow_map_desc(format, extent);
            assert_eq!(desc.aspect, vk::ImageAspectFlags::DEPTH);
            assert!(desc.usage.contains(vk::ImageUsageFlags::SAMPLED));
            assert_eq!(desc.samples, vk::SampleCountFlags::TYPE_1);
        }
    }

    #[test]
    fn shadow_sampler_uses_device_filter() {
        assert_eq!(shadow_sampler_info(vk::Filter::NEAREST).mag_filter, vk::Filter::NEAREST);
        assert_eq!(
            shadow_sampler_info(vk::Filter::LINEAR).address_mode_v,
            vk::SamplerAddressMode::CLAMP_TO_EDGE
        );
    }
}

// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use ash::vk;

use crate::error::VkResultExt;

/// Attachment order: MSAA color, depth, then the swapchain resolve target.
/// Single-sample passes render straight into the swapchain image and have no resolve.
pub fn main_pass_attachments(
    color_format: vk::Format,
    depth_format: vk::Format,
    samples: vk::SampleCountFlags,
) -> Vec<vk::AttachmentDescription> {
    let msaa = samples != vk::SampleCountFlags::TYPE_1;
    let color = vk::AttachmentDescription {
        format: color_format,
        samples,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: if msaa {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        } else {
            vk::ImageLayout::PRESENT_SRC_KHR
        },
        ..Default::default()
    };
    let depth = vk::AttachmentDescription {
        format: depth_format,
        samples,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ..Default::default()
    };
    let mut attachments = vec![color, depth];
    if msaa {
        attachments.push(vk::AttachmentDescription {
            format: color_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::DONT_CARE,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        });
    }
    attachments
}

pub fn main_pass_dependency() -> vk::SubpassDependency {
    let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: stages,
        dst_stage_mask: stages,
        src_access_mask: vk::AccessFlags::empty(),
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        dependency_flags: vk::DependencyFlags::empty(),
    }
}

/// Brackets the depth write between last frame's shadow lookups and this
/// frame's.
pub fn shadow_pass_dependencies() -> [vk::SubpassDependency; 2] {
    [
        vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER,
            dst_stage_mask: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            src_access_mask: vk::AccessFlags::SHADER_READ,
            dst_access_mask: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            dependency_flags: vk::DependencyFlags::BY_REGION,
        },
        vk::SubpassDependency {
            src_subpass: 0,
            dst_subpass: vk::SUBPASS_EXTERNAL,
            src_stage_mask: vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            dst_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER,
            src_access_mask: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            dst_access_mask: vk::AccessFlags::SHADER_READ,
            dependency_flags: vk::DependencyFlags::BY_REGION,
        },
    ]
}

pub fn shadow_pass_attachment(depth_format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription {
        format: depth_format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        ..Default::default()
    }
}

pub struct RenderPass {
    device: ash::Device,
    pub handle: vk::RenderPass,
    pub samples: vk::SampleCountFlags,
}

impl RenderPass {
    pub fn main(
        device: &ash::Device,
        color_format: vk::Format,
        depth_format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> Result<Self> {
        let attachments = main_pass_attachments(color_format, depth_format, samples);
        let color_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let resolve_ref = vk::AttachmentReference {
            attachment: 2,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: 1,
            p_color_attachments: &color_ref,
            p_resolve_attachments: if attachments.len() == 3 {
                &resolve_ref
            } else {
                std::ptr::null()
            },
            p_depth_stencil_attachment: &depth_ref,
            ..Default::default()
        };
        let dependency = main_pass_dependency();
        Self::build(device, &attachments, &subpass, &[dependency], samples)
    }

    pub fn shadow(device: &ash::Device, depth_format: vk::Format) -> Result<Self> {
        let attachment = shadow_pass_attachment(depth_format);
        let depth_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: 0,
            p_depth_stencil_attachment: &depth_ref,
            ..Default::default()
        };
        let dependencies = shadow_pass_dependencies();
        Self::build(
            device,
            std::slice::from_ref(&attachment),
            &subpass,
            &dependencies,
            vk::SampleCountFlags::TYPE_1,
        )
    }

    fn build(
        device: &ash::Device,
        attachments: &[vk::AttachmentDescription],
        subpass: &vk::SubpassDescription<'_>,
        dependencies: &[vk::SubpassDependency],
        samples: vk::SampleCountFlags,
    ) -> Result<Self> {
        let info = vk::RenderPassCreateInfo {
            s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
            attachment_count: attachments.len() as u32,
            p_attachments: attachments.as_ptr(),
            subpass_count: 1,
            p_subpasses: subpass,
            dependency_count: dependencies.len() as u32,
            p_dependencies: dependencies.as_ptr(),
            ..Default::default()
        };
        let handle =
            unsafe { device.create_render_pass(&info, None) }.vk("vkCreateRenderPass")?;
        Ok(Self {
            device: device.clone(),
            handle,
            samples,
        })
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe { self.device.destroy_render_pass(self.handle, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLOR: vk::Format = vk::Format::B8G8R8A8_SRGB;
    const DEPTH: vk::Format = vk::Format::D32_SFLOAT;

    #[test]
    fn msaa_pass_resolves_into_presentable_image() {
        let a = main_pass_attachments(COLOR, DEPTH, vk::SampleCountFlags::TYPE_8);
        assert_eq!(a.len(), 3);
        assert_eq!(a[0].samples, vk::SampleCountFlags::TYPE_8);
        assert_eq!(a[0].final_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(a[1].samples, vk::SampleCountFlags::TYPE_8);
        assert_eq!(a[2].samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(a[2].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn single_sample_pass_has_no_resolve() {
        let a = main_pass_attachments(COLOR, DEPTH, vk::SampleCountFlags::TYPE_1);
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn color_and_depth_are_cleared_and_stored() {
        for a in &main_pass_attachments(COLOR, DEPTH, vk::SampleCountFlags::TYPE_4)[..2] {
            assert_eq!(a.load_op, vk::AttachmentLoadOp::CLEAR);
            assert_eq!(a.store_op, vk::AttachmentStoreOp::STORE);
        }
    }

    #[test]
    fn shadow_dependencies_bracket_depth_write_by_region() {
        let [before, after] = shadow_pass_dependencies();
        assert_eq!(before.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(before.src_access_mask, vk::AccessFlags::SHADER_READ);
        assert_eq!(
            before.dst_access_mask,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        );
        assert_eq!(after.dst_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(after.dst_stage_mask, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert!(before.dependency_flags.contains(vk::DependencyFlags::BY_REGION));
        assert!(after.dependency_flags.contains(vk::DependencyFlags::BY_REGION));
    }

    #[test]
    fn shadow_map_ends_readable() {
        let a = shadow_pass_attachment(DEPTH);
        assert_eq!(a.final_layout, vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL);
        assert_eq!(a.samples, vk::SampleCountFlags::TYPE_1);
    }
}

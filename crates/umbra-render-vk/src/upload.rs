// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use ash::vk;
use tracing::debug;
use umbra_render::TextureData;

use crate::context::DeviceContext;
use crate::error::{RenderError, VkResultExt};
use crate::memory::{GpuBuffer, GpuImage, ImageDesc};

/// Access masks and stages for a layout transition. Only the three
/// transitions the renderer performs are known.
pub fn transition_masks(
    from: vk::ImageLayout,
    to: vk::ImageLayout,
) -> Result<
    (
        vk::AccessFlags,
        vk::AccessFlags,
        vk::PipelineStageFlags,
        vk::PipelineStageFlags,
    ),
    RenderError,
> {
    use vk::ImageLayout as L;
    match (from, to) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => Ok((
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        )),
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => Ok((
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        )),
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => Ok((
            vk::AccessFlags::empty(),
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )),
        (from, to) => Err(RenderError::UnsupportedLayoutTransition { from, to }),
    }
}

pub fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}

pub fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    if has_stencil(format) {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::DEPTH
    }
}

/// # Safety
/// `cmd` must be recording and `image` must be in layout `from`.
pub unsafe fn record_transition(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    format: vk::Format,
    from: vk::ImageLayout,
    to: vk::ImageLayout,
) -> Result<(), RenderError> {
    let (src_access_mask, dst_access_mask, src_stage, dst_stage) = transition_masks(from, to)?;
    let aspect_mask = if to == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
        depth_aspect(format)
    } else {
        vk::ImageAspectFlags::COLOR
    };
    let barrier = vk::ImageMemoryBarrier {
        s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
        src_access_mask,
        dst_access_mask,
        old_layout: from,
        new_layout: to,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        image,
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    };
    device.cmd_pipeline_barrier(
        cmd,
        src_stage,
        dst_stage,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        std::slice::from_ref(&barrier),
    );
    Ok(())
}

/// Synchronous one-shot submissions for startup and resize-time uploads.
pub struct Uploader {
    device: ash::Device,
    queue: vk::Queue,
    pool: vk::CommandPool,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl Uploader {
    pub fn new(ctx: &DeviceContext) -> Result<Self> {
        let info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            flags: vk::CommandPoolCreateFlags::TRANSIENT,
            queue_family_index: ctx.graphics_family,
            ..Default::default()
        };
        let pool = unsafe { ctx.device.create_command_pool(&info, None) }
            .vk("vkCreateCommandPool")?;
        Ok(Self {
            device: ctx.device.clone(),
            queue: ctx.graphics_queue,
            pool,
            memory_properties: ctx.caps.memory_properties,
        })
    }

    /// Records `f` into a fresh command buffer, submits it and waits for the queue.
    pub fn one_shot<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()>,
    {
        unsafe {
            let alloc = vk::CommandBufferAllocateInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
                command_pool: self.pool,
                level: vk::CommandBufferLevel::PRIMARY,
                command_buffer_count: 1,
                ..Default::default()
            };
            let cmds = self
                .device
                .allocate_command_buffers(&alloc)
                .vk("vkAllocateCommandBuffers")?;
            let result = self.submit_and_wait(cmds[0], f);
            self.device.free_command_buffers(self.pool, &cmds);
            result
        }
    }

    unsafe fn submit_and_wait<F>(&self, cmd: vk::CommandBuffer, f: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()>,
    {
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        self.device
            .begin_command_buffer(cmd, &begin)
            .vk("vkBeginCommandBuffer")?;
        f(&self.device, cmd)?;
        self.device
            .end_command_buffer(cmd)
            .vk("vkEndCommandBuffer")?;

        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            ..Default::default()
        };
        self.device
            .queue_submit(self.queue, std::slice::from_ref(&submit), vk::Fence::null())
            .vk("vkQueueSubmit")?;
        self.device
            .queue_wait_idle(self.queue)
            .vk("vkQueueWaitIdle")?;
        Ok(())
    }

    fn staging(&self, bytes: &[u8]) -> Result<GpuBuffer> {
        let staging = GpuBuffer::host_visible(
            &self.device,
            &self.memory_properties,
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
        )?;
        staging.write(bytes)?;
        Ok(staging)
    }

    /// Device-local buffer filled through a staging copy.
    pub fn device_local_buffer(&self, bytes: &[u8], usage: vk::BufferUsageFlags) -> Result<GpuBuffer> {
        let staging = self.staging(bytes)?;
        let buffer = GpuBuffer::new(
            &self.device,
            &self.memory_properties,
            staging.size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        self.one_shot(|device, cmd| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: staging.size,
            };
            unsafe { device.cmd_copy_buffer(cmd, staging.buffer, buffer.buffer, &[region]) };
            Ok(())
        })?;
        debug!("uploaded {} bytes ({:?})", staging.size, usage);
        Ok(buffer)
    }

    /// Sampled sRGB texture, left in SHADER_READ_ONLY_OPTIMAL.
    pub fn texture(&self, data: &TextureData) -> Result<GpuImage> {
        let staging = self.staging(&data.pixels)?;
        let format = vk::Format::R8G8B8A8_SRGB;
        let extent = vk::Extent2D {
            width: data.width,
            height: data.height,
        };
        let image = GpuImage::new(
            &self.device,
            &self.memory_properties,
            ImageDesc {
                extent,
                format,
                samples: vk::SampleCountFlags::TYPE_1,
                usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
                aspect: vk::ImageAspectFlags::COLOR,
            },
        )?;
        self.one_shot(|device, cmd| unsafe {
            record_transition(
                device,
                cmd,
                image.image,
                format,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;
            let region = vk::BufferImageCopy {
                buffer_offset: 0,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
                image_extent: vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                },
            };
            device.cmd_copy_buffer_to_image(
                cmd,
                staging.buffer,
                image.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
            record_transition(
                device,
                cmd,
                image.image,
                format,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )?;
            Ok(())
        })?;
        debug!("uploaded {}x{} texture", data.width, data.height);
        Ok(image)
    }

    /// Moves a fresh depth image into DEPTH_STENCIL_ATTACHMENT_OPTIMAL.
    pub fn prepare_depth(&self, image: &GpuImage) -> Result<()> {
        self.one_shot(|device, cmd| unsafe {
            record_transition(
                device,
                cmd,
                image.image,
                image.format,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            )?;
            Ok(())
        })
    }
}

impl Drop for Uploader {
    fn drop(&mut self) {
        unsafe { self.device.destroy_command_pool(self.pool, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vk::ImageLayout as L;

    #[test]
    fn upload_transitions_are_ordered_through_transfer() {
        let (src, dst, src_stage, dst_stage) =
            transition_masks(L::UNDEFINED, L::TRANSFER_DST_OPTIMAL).unwrap();
        assert!(src.is_empty());
        assert_eq!(dst, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(dst_stage, vk::PipelineStageFlags::TRANSFER);

        let (src, dst, _, dst_stage) =
            transition_masks(L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL).unwrap();
        assert_eq!(src, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(dst, vk::AccessFlags::SHADER_READ);
        assert_eq!(dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn depth_transition_targets_early_fragment_tests() {
        let (_, dst, _, dst_stage) =
            transition_masks(L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL).unwrap();
        assert!(dst.contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
        assert_eq!(dst_stage, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS);
    }

    #[test]
    fn unknown_transition_is_rejected() {
        let err = transition_masks(L::SHADER_READ_ONLY_OPTIMAL, L::GENERAL).unwrap_err();
        assert!(matches!(
            err,
            RenderError::UnsupportedLayoutTransition {
                from: L::SHADER_READ_ONLY_OPTIMAL,
                to: L::GENERAL
            }
        ));
    }

    #[test]
    fn stencil_formats_get_both_aspects() {
        assert_eq!(depth_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert!(depth_aspect(vk::Format::D24_UNORM_S8_UINT).contains(vk::ImageAspectFlags::STENCIL));
    }
}

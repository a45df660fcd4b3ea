// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use ash::vk;

use crate::error::VkResultExt;
use crate::memory::GpuBuffer;

/// Pool for the per-image command buffers; buffers are re-recorded every frame.
pub struct CommandPool {
    device: ash::Device,
    pub handle: vk::CommandPool,
}

impl CommandPool {
    pub fn new(device: &ash::Device, queue_family: u32) -> Result<Self> {
        let info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: queue_family,
            ..Default::default()
        };
        let handle = unsafe { device.create_command_pool(&info, None) }
            .vk("vkCreateCommandPool")?;
        Ok(Self {
            device: device.clone(),
            handle,
        })
    }

    pub fn allocate(&self, count: usize) -> Result<CommandBuffers> {
        let info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.handle,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count as u32,
            ..Default::default()
        };
        let buffers = unsafe { self.device.allocate_command_buffers(&info) }
            .vk("vkAllocateCommandBuffers")?;
        Ok(CommandBuffers {
            device: self.device.clone(),
            pool: self.handle,
            buffers,
        })
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.destroy_command_pool(self.handle, None) };
    }
}

/// Must be dropped before the pool they came from.
pub struct CommandBuffers {
    device: ash::Device,
    pool: vk::CommandPool,
    pub buffers: Vec<vk::CommandBuffer>,
}

impl Drop for CommandBuffers {
    fn drop(&mut self) {
        unsafe { self.device.free_command_buffers(self.pool, &self.buffers) };
    }
}

/// Device-local vertex and index buffers for one mesh.
pub struct MeshBuffers {
    pub vertices: GpuBuffer,
    pub indices: GpuBuffer,
    pub index_count: u32,
}

impl MeshBuffers {
    /// # Safety
    /// `cmd` must be recording inside a render pass with a compatible pipeline bound.
    pub unsafe fn draw(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertices.buffer], &[0]);
        device.cmd_bind_index_buffer(cmd, self.indices.buffer, 0, vk::IndexType::UINT32);
        device.cmd_draw_indexed(cmd, self.index_count, 1, 0, 0, 0);
    }
}

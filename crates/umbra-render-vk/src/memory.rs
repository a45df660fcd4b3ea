// SPDX-License-Identifier: CEPL-1.0
//! Buffers and images that own their memory and free it on drop.
use anyhow::Result;
use ash::vk;

use crate::error::{RenderError, VkResultExt};

/// First memory type allowed by `type_bits` that has every flag in `flags`.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Result<u32, RenderError> {
    (0..props.memory_type_count)
        .find(|&i| {
            type_bits & (1 << i) != 0
                && props.memory_types[i as usize]
                    .property_flags
                    .contains(flags)
        })
        .ok_or(RenderError::NoSuitableMemoryType { type_bits, flags })
}

pub fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let info = vk::ImageViewCreateInfo {
        s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
        image,
        view_type: vk::ImageViewType::TYPE_2D,
        format,
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    };
    Ok(unsafe { device.create_image_view(&info, None) }.vk("vkCreateImageView")?)
}

pub struct GpuBuffer {
    device: ash::Device,
    pub buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

impl GpuBuffer {
    pub fn new(
        device: &ash::Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        unsafe {
            let info = vk::BufferCreateInfo {
                s_type: vk::StructureType::BUFFER_CREATE_INFO,
                size,
                usage,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                ..Default::default()
            };
            let buffer = device.create_buffer(&info, None).vk("vkCreateBuffer")?;
            let req = device.get_buffer_memory_requirements(buffer);
            let memory = match allocate(device, memory_properties, req, flags) {
                Ok(m) => m,
                Err(e) => {
                    device.destroy_buffer(buffer, None);
                    return Err(e);
                }
            };
            let built = Self {
                device: device.clone(),
                buffer,
                memory,
                size,
            };
            device
                .bind_buffer_memory(buffer, memory, 0)
                .vk("vkBindBufferMemory")?;
            Ok(built)
        }
    }

    /// Host-visible, coherent; written with [`GpuBuffer::write`].
    pub fn host_visible(
        device: &ash::Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<Self> {
        Self::new(
            device,
            memory_properties,
            size,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
    }

    /// Copies `bytes` to the start of the buffer. Only valid for host-visible memory.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        let len = (bytes.len() as vk::DeviceSize).min(self.size);
        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, 0, len, vk::MemoryMapFlags::empty())
                .vk("vkMapMemory")?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), len as usize);
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
}

pub struct GpuImage {
    device: ash::Device,
    pub image: vk::Image,
    memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl GpuImage {
    pub fn new(
        device: &ash::Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        desc: ImageDesc,
    ) -> Result<Self> {
        unsafe {
            let info = vk::ImageCreateInfo {
                s_type: vk::StructureType::IMAGE_CREATE_INFO,
                image_type: vk::ImageType::TYPE_2D,
                format: desc.format,
                extent: vk::Extent3D {
                    width: desc.extent.width,
                    height: desc.extent.height,
                    depth: 1,
                },
                mip_levels: 1,
                array_layers: 1,
                samples: desc.samples,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: desc.usage,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                ..Default::default()
            };
            let image = device.create_image(&info, None).vk("vkCreateImage")?;
            let req = device.get_image_memory_requirements(image);
            let memory = match allocate(
                device,
                memory_properties,
                req,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            ) {
                Ok(m) => m,
                Err(e) => {
                    device.destroy_image(image, None);
                    return Err(e);
                }
            };
            // From here on the partially built image frees itself.
            let mut built = Self {
                device: device.clone(),
                image,
                memory,
                view: vk::ImageView::null(),
                format: desc.format,
                extent: desc.extent,
            };
            device
                .bind_image_memory(image, memory, 0)
                .vk("vkBindImageMemory")?;
            built.view = create_image_view(device, image, desc.format, desc.aspect)?;
            Ok(built)
        }
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.destroy_image_view(self.view, None);
            }
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

unsafe fn allocate(
    device: &ash::Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    req: vk::MemoryRequirements,
    flags: vk::MemoryPropertyFlags,
) -> Result<vk::DeviceMemory> {
    let memory_type_index = find_memory_type(memory_properties, req.memory_type_bits, flags)?;
    let info = vk::MemoryAllocateInfo {
        s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
        allocation_size: req.size,
        memory_type_index,
        ..Default::default()
    };
    Ok(device
        .allocate_memory(&info, None)
        .vk("vkAllocateMemory")?)
}

// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use ash::vk;

use crate::error::VkResultExt;
use crate::memory::GpuBuffer;

pub const UNIFORMS_PER_IMAGE: u32 = 5;
pub const SAMPLERS_PER_IMAGE: u32 = 3;
pub const SETS_PER_IMAGE: u32 = 3;
/// Held back for the overlay.
pub const RESERVED_SETS: u32 = 1;

fn binding(
    binding: u32,
    descriptor_type: vk::DescriptorType,
    stage_flags: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding {
        binding,
        descriptor_type,
        descriptor_count: 1,
        stage_flags,
        ..Default::default()
    }
}

/// Main pipeline set: vertex UBO, texture, fragment UBO, projected texture, shadow map.
pub fn scene_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 5] {
    let ubo = vk::DescriptorType::UNIFORM_BUFFER;
    let sampler = vk::DescriptorType::COMBINED_IMAGE_SAMPLER;
    let fragment = vk::ShaderStageFlags::FRAGMENT;
    [
        binding(0, ubo, vk::ShaderStageFlags::VERTEX),
        binding(1, sampler, fragment),
        binding(2, ubo, fragment),
        binding(3, sampler, fragment),
        binding(4, sampler, fragment),
    ]
}

pub fn single_uniform_binding() -> [vk::DescriptorSetLayoutBinding<'static>; 1] {
    [binding(
        0,
        vk::DescriptorType::UNIFORM_BUFFER,
        vk::ShaderStageFlags::VERTEX,
    )]
}

pub fn pool_sizes(image_count: u32) -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: UNIFORMS_PER_IMAGE * image_count,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: SAMPLERS_PER_IMAGE * image_count,
        },
    ]
}

pub fn max_sets(image_count: u32) -> u32 {
    SETS_PER_IMAGE * image_count + RESERVED_SETS
}

pub struct DescriptorLayouts {
    device: ash::Device,
    pub scene: vk::DescriptorSetLayout,
    pub proxy: vk::DescriptorSetLayout,
    pub shadow: vk::DescriptorSetLayout,
}

impl DescriptorLayouts {
    pub fn new(device: &ash::Device) -> Result<Self> {
        let mut layouts = Self {
            device: device.clone(),
            scene: vk::DescriptorSetLayout::null(),
            proxy: vk::DescriptorSetLayout::null(),
            shadow: vk::DescriptorSetLayout::null(),
        };
        layouts.scene = create_layout(device, &scene_bindings())?;
        layouts.proxy = create_layout(device, &single_uniform_binding())?;
        layouts.shadow = create_layout(device, &single_uniform_binding())?;
        Ok(layouts)
    }
}

impl Drop for DescriptorLayouts {
    fn drop(&mut self) {
        unsafe {
            // Destroying a null handle is a no-op.
            self.device.destroy_descriptor_set_layout(self.shadow, None);
            self.device.destroy_descriptor_set_layout(self.proxy, None);
            self.device.destroy_descriptor_set_layout(self.scene, None);
        }
    }
}

fn create_layout(
    device: &ash::Device,
    bindings: &[vk::DescriptorSetLayoutBinding<'_>],
) -> Result<vk::DescriptorSetLayout> {
    let info = vk::DescriptorSetLayoutCreateInfo {
        s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
        binding_count: bindings.len() as u32,
        p_bindings: bindings.as_ptr(),
        ..Default::default()
    };
    Ok(unsafe { device.create_descriptor_set_layout(&info, None) }
        .vk("vkCreateDescriptorSetLayout")?)
}

/// A sampled image as the shaders see it.
#[derive(Clone, Copy, Debug)]
pub struct SampledImage {
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
    pub layout: vk::ImageLayout,
}

/// What one swapchain image's sets point at.
pub struct SetResources<'a> {
    pub scene_uniforms: &'a GpuBuffer,
    pub material_uniforms: &'a GpuBuffer,
    pub proxy_uniforms: &'a GpuBuffer,
    pub shadow_uniforms: &'a GpuBuffer,
    pub texture: SampledImage,
    pub projected_texture: SampledImage,
    pub shadow_map: SampledImage,
}

#[derive(Clone, Copy, Debug)]
pub struct ImageSets {
    pub scene: vk::DescriptorSet,
    pub proxy: vk::DescriptorSet,
    pub shadow: vk::DescriptorSet,
}

/// Pool plus the per-image sets allocated from it. Dropping the pool frees the sets.
pub struct DescriptorBinder {
    device: ash::Device,
    pool: vk::DescriptorPool,
    pub sets: Vec<ImageSets>,
}

impl DescriptorBinder {
    pub fn new(device: &ash::Device, layouts: &DescriptorLayouts, image_count: usize) -> Result<Self> {
        let n = image_count as u32;
        let sizes = pool_sizes(n);
        let info = vk::DescriptorPoolCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
            max_sets: max_sets(n),
            pool_size_count: sizes.len() as u32,
            p_pool_sizes: sizes.as_ptr(),
            ..Default::default()
        };
        let pool = unsafe { device.create_descriptor_pool(&info, None) }
            .vk("vkCreateDescriptorPool")?;
        let mut binder = Self {
            device: device.clone(),
            pool,
            sets: Vec::with_capacity(image_count),
        };

        let set_layouts: Vec<vk::DescriptorSetLayout> = (0..image_count)
            .flat_map(|_| [layouts.scene, layouts.proxy, layouts.shadow])
            .collect();
        let alloc = vk::DescriptorSetAllocateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
            descriptor_pool: pool,
            descriptor_set_count: set_layouts.len() as u32,
            p_set_layouts: set_layouts.as_ptr(),
            ..Default::default()
        };
        let sets = unsafe { device.allocate_descriptor_sets(&alloc) }
            .vk("vkAllocateDescriptorSets")?;
        binder.sets = sets
            .chunks_exact(3)
            .map(|c| ImageSets {
                scene: c[0],
                proxy: c[1],
                shadow: c[2],
            })
            .collect();
        Ok(binder)
    }

    pub fn write(&self, image: usize, res: &SetResources<'_>) {
        let sets = self.sets[image];
        let whole = |buffer: &GpuBuffer| vk::DescriptorBufferInfo {
            buffer: buffer.buffer,
            offset: 0,
            range: buffer.size,
        };
        let sampled = |s: &SampledImage| vk::DescriptorImageInfo {
            sampler: s.sampler,
            image_view: s.view,
            image_layout: s.layout,
        };
        let buffers = [
            whole(res.scene_uniforms),
            whole(res.material_uniforms),
            whole(res.proxy_uniforms),
            whole(res.shadow_uniforms),
        ];
        let images = [
            sampled(&res.texture),
            sampled(&res.projected_texture),
            sampled(&res.shadow_map),
        ];

        let writes = [
            buffer_write(sets.scene, 0, &buffers[0]),
            image_write(sets.scene, 1, &images[0]),
            buffer_write(sets.scene, 2, &buffers[1]),
            image_write(sets.scene, 3, &images[1]),
            image_write(sets.scene, 4, &images[2]),
            buffer_write(sets.proxy, 0, &buffers[2]),
            buffer_write(sets.shadow, 0, &buffers[3]),
        ];
        unsafe { self.device.update_descriptor_sets(&writes, &[]) };
    }
}

fn buffer_write(
    set: vk::DescriptorSet,
    binding: u32,
    info: &vk::DescriptorBufferInfo,
) -> vk::WriteDescriptorSet<'_> {
    vk::WriteDescriptorSet {
        s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
        dst_set: set,
        dst_binding: binding,
        descriptor_count: 1,
        descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
        p_buffer_info: info,
        ..Default::default()
    }
}

fn image_write(
    set: vk::DescriptorSet,
    binding: u32,
    info: &vk::DescriptorImageInfo,
) -> vk::WriteDescriptorSet<'_> {
    vk::WriteDescriptorSet {
        s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
        dst_set: set,
        dst_binding: binding,
        descriptor_count: 1,
        descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        p_image_info: info,
        ..Default::default()
    }
}

impl Drop for DescriptorBinder {
    fn drop(&mut self) {
        unsafe { self.device.destroy_descriptor_pool(self.pool, None) };
    }
}

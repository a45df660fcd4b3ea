// SPDX-License-Identifier: CEPL-1.0
use std::ffi::CStr;
use std::io::Cursor;
use std::mem::{offset_of, size_of};

use anyhow::{Context, Result};
use ash::util::read_spv;
use ash::vk;
use tracing::debug;
use umbra_render::Vertex;

use crate::descriptors::DescriptorLayouts;
use crate::error::{RenderError, VkResultExt};
use crate::passes::RenderPass;

const ENTRY: &CStr = c"main";

/// Bytes of the shadow pass push constant: one column-major mat4 model matrix.
pub const SHADOW_PUSH_SIZE: u32 = 64;

macro_rules! spirv {
    ($name:literal) => {
        ($name, include_bytes!(concat!(env!("OUT_DIR"), "/", $name, ".spv")).as_slice())
    };
}

fn decode(name: &'static str, bytes: &[u8]) -> Result<Vec<u32>, RenderError> {
    read_spv(&mut Cursor::new(bytes)).map_err(|source| RenderError::ShaderLoad { name, source })
}

/// SPIR-V words for every shader the renderer uses, decoded once.
pub struct ShaderCode {
    pub scene_vert: Vec<u32>,
    pub scene_frag: Vec<u32>,
    pub proxy_vert: Vec<u32>,
    pub proxy_frag: Vec<u32>,
    pub shadow_vert: Vec<u32>,
    pub overlay_vert: Vec<u32>,
    pub overlay_frag: Vec<u32>,
}

impl ShaderCode {
    pub fn load() -> Result<Self, RenderError> {
        let get = |(name, bytes): (&'static str, &[u8])| decode(name, bytes);
        Ok(Self {
            scene_vert: get(spirv!("scene.vert"))?,
            scene_frag: get(spirv!("scene.frag"))?,
            proxy_vert: get(spirv!("proxy.vert"))?,
            proxy_frag: get(spirv!("proxy.frag"))?,
            shadow_vert: get(spirv!("shadow.vert"))?,
            overlay_vert: get(spirv!("overlay.vert"))?,
            overlay_frag: get(spirv!("overlay.frag"))?,
        })
    }
}

pub fn vertex_binding() -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription {
        binding: 0,
        stride: size_of::<Vertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    }
}

fn attribute(location: u32, format: vk::Format, offset: usize) -> vk::VertexInputAttributeDescription {
    vk::VertexInputAttributeDescription {
        location,
        binding: 0,
        format,
        offset: offset as u32,
    }
}

pub fn scene_vertex_attributes() -> [vk::VertexInputAttributeDescription; 4] {
    [
        attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, pos)),
        attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, color)),
        attribute(2, vk::Format::R32G32_SFLOAT, offset_of!(Vertex, uv)),
        attribute(3, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, normal)),
    ]
}

/// Depth-only rendering reads positions out of the full vertex stride.
pub fn shadow_vertex_attributes() -> [vk::VertexInputAttributeDescription; 1] {
    [attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, pos))]
}

pub fn blend_attachment(blend: bool) -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState {
        blend_enable: if blend { vk::TRUE } else { vk::FALSE },
        src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
        dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        color_blend_op: vk::BlendOp::ADD,
        src_alpha_blend_factor: vk::BlendFactor::ONE,
        dst_alpha_blend_factor: vk::BlendFactor::ZERO,
        alpha_blend_op: vk::BlendOp::ADD,
        color_write_mask: vk::ColorComponentFlags::R
            | vk::ColorComponentFlags::G
            | vk::ColorComponentFlags::B
            | vk::ColorComponentFlags::A,
    }
}

pub fn dynamic_states(depth_bias: bool) -> Vec<vk::DynamicState> {
    let mut states = vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    if depth_bias {
        states.push(vk::DynamicState::DEPTH_BIAS);
    }
    states
}

/// Everything that differs between the renderer's pipelines.
pub struct PipelineDesc<'a> {
    pub name: &'static str,
    pub vertex_shader: &'a [u32],
    /// `None` builds a depth-only pipeline with no color attachment.
    pub fragment_shader: Option<&'a [u32]>,
    pub vertex_attributes: &'a [vk::VertexInputAttributeDescription],
    pub topology: vk::PrimitiveTopology,
    pub cull_mode: vk::CullModeFlags,
    pub depth_test: bool,
    pub blend: bool,
    pub samples: vk::SampleCountFlags,
    pub min_sample_shading: Option<f32>,
    pub depth_bias: bool,
    pub set_layouts: &'a [vk::DescriptorSetLayout],
    pub push_constants: &'a [vk::PushConstantRange],
}

pub struct Pipeline {
    device: ash::Device,
    pub layout: vk::PipelineLayout,
    pub handle: vk::Pipeline,
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.handle, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

struct ShaderModule<'d> {
    device: &'d ash::Device,
    handle: vk::ShaderModule,
}

impl<'d> ShaderModule<'d> {
    fn new(device: &'d ash::Device, code: &[u32]) -> Result<Self> {
        let info = vk::ShaderModuleCreateInfo {
            s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
            code_size: code.len() * 4,
            p_code: code.as_ptr(),
            ..Default::default()
        };
        let handle = unsafe { device.create_shader_module(&info, None) }
            .vk("vkCreateShaderModule")?;
        Ok(Self { device, handle })
    }
}

impl Drop for ShaderModule<'_> {
    fn drop(&mut self) {
        unsafe { self.device.destroy_shader_module(self.handle, None) };
    }
}

pub fn build_pipeline(
    device: &ash::Device,
    cache: vk::PipelineCache,
    render_pass: vk::RenderPass,
    desc: &PipelineDesc<'_>,
) -> Result<Pipeline> {
    // Modules only need to outlive pipeline creation.
    let vertex = ShaderModule::new(device, desc.vertex_shader)?;
    let fragment = desc
        .fragment_shader
        .map(|code| ShaderModule::new(device, code))
        .transpose()?;

    let mut stages = vec![vk::PipelineShaderStageCreateInfo {
        s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
        stage: vk::ShaderStageFlags::VERTEX,
        module: vertex.handle,
        p_name: ENTRY.as_ptr(),
        ..Default::default()
    }];
    if let Some(fragment) = &fragment {
        stages.push(vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: fragment.handle,
            p_name: ENTRY.as_ptr(),
            ..Default::default()
        });
    }

    let binding = vertex_binding();
    let has_vertices = !desc.vertex_attributes.is_empty();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        vertex_binding_description_count: u32::from(has_vertices),
        p_vertex_binding_descriptions: if has_vertices {
            &binding
        } else {
            std::ptr::null()
        },
        vertex_attribute_description_count: desc.vertex_attributes.len() as u32,
        p_vertex_attribute_descriptions: desc.vertex_attributes.as_ptr(),
        ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: desc.topology,
        ..Default::default()
    };
    let dyn_states = dynamic_states(desc.depth_bias);
    let dynamic_state = vk::PipelineDynamicStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
        dynamic_state_count: dyn_states.len() as u32,
        p_dynamic_states: dyn_states.as_ptr(),
        ..Default::default()
    };
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        scissor_count: 1,
        ..Default::default()
    };
    let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: desc.cull_mode,
        front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        depth_bias_enable: if desc.depth_bias { vk::TRUE } else { vk::FALSE },
        line_width: 1.0,
        ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: desc.samples,
        sample_shading_enable: if desc.min_sample_shading.is_some() {
            vk::TRUE
        } else {
            vk::FALSE
        },
        min_sample_shading: desc.min_sample_shading.unwrap_or(0.0),
        ..Default::default()
    };
    let depth_enable = if desc.depth_test { vk::TRUE } else { vk::FALSE };
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
        depth_test_enable: depth_enable,
        depth_write_enable: depth_enable,
        depth_compare_op: vk::CompareOp::LESS_OR_EQUAL,
        ..Default::default()
    };
    let blend = blend_attachment(desc.blend);
    let color_blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        attachment_count: u32::from(fragment.is_some()),
        p_attachments: &blend,
        ..Default::default()
    };

    let layout_info = vk::PipelineLayoutCreateInfo {
        s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
        set_layout_count: desc.set_layouts.len() as u32,
        p_set_layouts: desc.set_layouts.as_ptr(),
        push_constant_range_count: desc.push_constants.len() as u32,
        p_push_constant_ranges: desc.push_constants.as_ptr(),
        ..Default::default()
    };
    let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
        .vk("vkCreatePipelineLayout")?;

    let info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_depth_stencil_state: &depth_stencil,
        p_color_blend_state: &color_blend,
        p_dynamic_state: &dynamic_state,
        layout,
        render_pass,
        subpass: 0,
        ..Default::default()
    };
    let handle = match unsafe {
        device.create_graphics_pipelines(cache, std::slice::from_ref(&info), None)
    } {
        Ok(pipelines) => pipelines[0],
        Err((_, err)) => {
            unsafe { device.destroy_pipeline_layout(layout, None) };
            return Err(RenderError::vulkan("vkCreateGraphicsPipelines", err))
                .with_context(|| format!("building {} pipeline", desc.name));
        }
    };
    debug!("built {} pipeline", desc.name);
    Ok(Pipeline {
        device: device.clone(),
        layout,
        handle,
    })
}

/// The three scene pipelines, rebuilt with the swapchain.
pub struct Pipelines {
    pub proxy: Pipeline,
    pub main: Pipeline,
    pub shadow: Pipeline,
}

impl Pipelines {
    pub fn new(
        device: &ash::Device,
        cache: vk::PipelineCache,
        main_pass: &RenderPass,
        shadow_pass: &RenderPass,
        layouts: &DescriptorLayouts,
        shaders: &ShaderCode,
    ) -> Result<Self> {
        let scene_attributes = scene_vertex_attributes();
        let shadow_attributes = shadow_vertex_attributes();

        let main = build_pipeline(
            device,
            cache,
            main_pass.handle,
            &PipelineDesc {
                name: "main",
                vertex_shader: &shaders.scene_vert,
                fragment_shader: Some(&shaders.scene_frag),
                vertex_attributes: &scene_attributes,
                topology: vk::PrimitiveTopology::TRIANGLE_LIST,
                cull_mode: vk::CullModeFlags::BACK,
                depth_test: true,
                blend: true,
                samples: main_pass.samples,
                min_sample_shading: Some(0.2),
                depth_bias: false,
                set_layouts: &[layouts.scene],
                push_constants: &[],
            },
        )?;
        let proxy = build_pipeline(
            device,
            cache,
            main_pass.handle,
            &PipelineDesc {
                name: "proxy",
                vertex_shader: &shaders.proxy_vert,
                fragment_shader: Some(&shaders.proxy_frag),
                vertex_attributes: &scene_attributes,
                topology: vk::PrimitiveTopology::TRIANGLE_LIST,
                cull_mode: vk::CullModeFlags::BACK,
                depth_test: true,
                blend: true,
                samples: main_pass.samples,
                min_sample_shading: Some(0.2),
                depth_bias: false,
                set_layouts: &[layouts.proxy],
                push_constants: &[],
            },
        )?;
        let shadow_push = vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            size: SHADOW_PUSH_SIZE,
        };
        let shadow = build_pipeline(
            device,
            cache,
            shadow_pass.handle,
            &PipelineDesc {
                name: "shadow",
                vertex_shader: &shaders.shadow_vert,
                fragment_shader: None,
                vertex_attributes: &shadow_attributes,
                topology: vk::PrimitiveTopology::TRIANGLE_LIST,
                cull_mode: vk::CullModeFlags::NONE,
                depth_test: true,
                blend: false,
                samples: vk::SampleCountFlags::TYPE_1,
                min_sample_shading: None,
                depth_bias: true,
                set_layouts: &[layouts.shadow],
                push_constants: std::slice::from_ref(&shadow_push),
            },
        )?;
        Ok(Self {
            proxy,
            main,
            shadow,
        })
    }
}

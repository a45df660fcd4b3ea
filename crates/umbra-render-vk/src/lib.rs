// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend.
//!
//! [`VkRenderer`] owns a [`FrameOrchestrator`] and a `Gpu`, which implements
//! [`FrameBackend`] against the device. Every GPU object is an RAII handle;
//! struct fields are declared in reverse creation order so that dropping a
//! struct tears its contents down dependents-first.
use std::path::Path;

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info};
use umbra_core::GameTime;
use umbra_math::glam::Mat4;
use umbra_math::{Camera, InputState, Projector};
use umbra_render::uniforms::FrameView;
use umbra_render::{
    FrameStatus, Mesh, RenderSettings, RenderSize, Renderer, Scene, UniformBuilder, VsyncMode,
};

pub mod commands;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod frame;
pub mod memory;
pub mod overlay;
pub mod passes;
pub mod pipeline_cache;
pub mod pipelines;
pub mod swapchain;
pub mod sync;
pub mod targets;
pub mod upload;

use commands::{CommandBuffers, CommandPool, MeshBuffers};
use context::DeviceContext;
use descriptors::{DescriptorBinder, DescriptorLayouts, SampledImage, SetResources};
use error::{RenderError, VkResultExt};
use memory::{GpuBuffer, GpuImage};
use overlay::{CrosshairOverlay, Overlay, OverlayFrame};
use passes::RenderPass;
use pipeline_cache::{pipeline_cache_path, PipelineCache};
use pipelines::{Pipelines, ShaderCode};
use swapchain::Swapchain;
use sync::{wait_fence, FrameSync};
use targets::{Framebuffers, RenderTargets, Samplers};
use upload::Uploader;

pub use error::RenderError as Error;
pub use frame::{
    AcquireResult, FrameBackend, FrameOrchestrator, FrameOutcome, ImageMarker, PresentResult,
    SlotState, FRAMES_IN_FLIGHT,
};

/// Host-visible uniform buffers for one swapchain image.
struct ImageUniforms {
    scene: GpuBuffer,
    material: GpuBuffer,
    proxy: GpuBuffer,
    shadow: GpuBuffer,
}

impl ImageUniforms {
    fn new(device: &ash::Device, props: &vk::PhysicalDeviceMemoryProperties) -> Result<Self> {
        use umbra_render::uniforms::{
            MaterialUniforms, ProxyUniforms, SceneUniforms, ShadowUniforms,
        };
        let ubo = |size: usize| {
            GpuBuffer::host_visible(
                device,
                props,
                size as vk::DeviceSize,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
            )
        };
        Ok(Self {
            scene: ubo(std::mem::size_of::<SceneUniforms>())?,
            material: ubo(std::mem::size_of::<MaterialUniforms>())?,
            proxy: ubo(std::mem::size_of::<ProxyUniforms>())?,
            shadow: ubo(std::mem::size_of::<ShadowUniforms>())?,
        })
    }
}

/// Everything sized by, or bound to, the current swapchain.
struct SwapchainResources {
    commands: CommandBuffers,
    descriptors: DescriptorBinder,
    uniforms: Vec<ImageUniforms>,
    framebuffers: Framebuffers,
    pipelines: Pipelines,
    targets: RenderTargets,
    shadow_pass: RenderPass,
    main_pass: RenderPass,
}

/// Geometry and textures uploaded once at startup.
struct SceneGpu {
    model: MeshBuffers,
    proxy: MeshBuffers,
    texture: GpuImage,
    projected_texture: GpuImage,
}

struct Gpu {
    overlay: Box<dyn Overlay>,
    resources: Option<SwapchainResources>,
    swapchain: Swapchain,
    sync: FrameSync,
    command_pool: CommandPool,
    scene: SceneGpu,
    samplers: Samplers,
    layouts: DescriptorLayouts,
    pipeline_cache: PipelineCache,
    uploader: Uploader,
    shaders: ShaderCode,

    camera: Box<dyn Camera>,
    projector: Projector,
    builder: UniformBuilder,
    settings: RenderSettings,
    window_size: RenderSize,
    fps: f32,

    ctx: DeviceContext,
}

impl Drop for Gpu {
    fn drop(&mut self) {
        // Nothing may be destroyed while the GPU still uses it.
        self.ctx.wait_idle().ok();
    }
}

fn upload_mesh(uploader: &Uploader, mesh: &Mesh) -> Result<MeshBuffers> {
    Ok(MeshBuffers {
        vertices: uploader.device_local_buffer(mesh.vertex_bytes(), vk::BufferUsageFlags::VERTEX_BUFFER)?,
        indices: uploader.device_local_buffer(mesh.index_bytes(), vk::BufferUsageFlags::INDEX_BUFFER)?,
        index_count: mesh.index_count(),
    })
}

fn full_viewport(extent: vk::Extent2D) -> (vk::Viewport, vk::Rect2D) {
    (
        vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        },
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        },
    )
}

fn to_render_size(extent: vk::Extent2D) -> RenderSize {
    RenderSize::new(extent.width, extent.height)
}

impl Gpu {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
        scene: Scene,
    ) -> Result<Self> {
        let ctx = DeviceContext::new(window, display, settings).context("device bootstrap")?;
        let device = ctx.device.clone();

        let shaders = ShaderCode::load()?;
        let uploader = Uploader::new(&ctx)?;
        let pipeline_cache = PipelineCache::new(
            &device,
            pipeline_cache_path(Path::new("."), &ctx.caps.properties),
        )?;
        let layouts = DescriptorLayouts::new(&device)?;
        let samplers = Samplers::new(&device, &ctx.caps)?;

        let assets = &scene.assets;
        let scene_gpu = SceneGpu {
            model: upload_mesh(&uploader, &assets.model).context("model upload")?,
            proxy: upload_mesh(&uploader, &assets.proxy).context("proxy upload")?,
            texture: uploader.texture(&assets.texture).context("texture upload")?,
            projected_texture: uploader
                .texture(&assets.projected_texture)
                .context("projected texture upload")?,
        };

        let command_pool = CommandPool::new(&device, ctx.graphics_family)?;
        let sync = FrameSync::new(&device, FRAMES_IN_FLIGHT)?;
        let swapchain = Swapchain::create(&ctx, size, settings.vsync_mode, None)?;

        let Scene {
            mut camera,
            projector,
            ..
        } = scene;
        camera.set_aspect_ratio(to_render_size(swapchain.extent).aspect());

        let mut gpu = Self {
            overlay: Box::new(CrosshairOverlay::new(&shaders)),
            resources: None,
            swapchain,
            sync,
            command_pool,
            scene: scene_gpu,
            samplers,
            layouts,
            pipeline_cache,
            uploader,
            shaders,
            camera,
            projector,
            builder: UniformBuilder::new(settings.shadow),
            settings: settings.clone(),
            window_size: size,
            fps: 0.0,
            ctx,
        };
        gpu.build_swapchain_resources()?;
        Ok(gpu)
    }

    fn device(&self) -> &ash::Device {
        &self.ctx.device
    }

    fn build_swapchain_resources(&mut self) -> Result<()> {
        let device = self.ctx.device.clone();
        let caps = &self.ctx.caps;
        let chain = &self.swapchain;

        let main_pass = RenderPass::main(&device, chain.format, caps.depth_format, caps.msaa_samples)
            .context("main render pass")?;
        let shadow_pass =
            RenderPass::shadow(&device, caps.shadow_format).context("shadow render pass")?;
        let targets = RenderTargets::new(&device, caps, &self.uploader, chain.format, chain.extent)?;
        let pipelines = Pipelines::new(
            &device,
            self.pipeline_cache.handle,
            &main_pass,
            &shadow_pass,
            &self.layouts,
            &self.shaders,
        )?;
        let framebuffers = Framebuffers::new(
            &device,
            &main_pass,
            &shadow_pass,
            &targets,
            &chain.views,
            chain.extent,
        )?;
        let uniforms = (0..chain.image_count())
            .map(|_| ImageUniforms::new(&device, &caps.memory_properties))
            .collect::<Result<Vec<_>>>()?;

        let descriptors = DescriptorBinder::new(&device, &self.layouts, chain.image_count())?;
        for (image, u) in uniforms.iter().enumerate() {
            descriptors.write(
                image,
                &SetResources {
                    scene_uniforms: &u.scene,
                    material_uniforms: &u.material,
                    proxy_uniforms: &u.proxy,
                    shadow_uniforms: &u.shadow,
                    texture: SampledImage {
                        view: self.scene.texture.view,
                        sampler: self.samplers.texture,
                        layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    },
                    projected_texture: SampledImage {
                        view: self.scene.projected_texture.view,
                        sampler: self.samplers.projected,
                        layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    },
                    shadow_map: SampledImage {
                        view: targets.shadow.view,
                        sampler: self.samplers.shadow,
                        layout: vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
                    },
                },
            );
        }
        let commands = self.command_pool.allocate(chain.image_count())?;

        self.overlay
            .rebuild(&device, self.pipeline_cache.handle, &main_pass)
            .context("overlay pipeline")?;

        self.resources = Some(SwapchainResources {
            commands,
            descriptors,
            uniforms,
            framebuffers,
            pipelines,
            targets,
            shadow_pass,
            main_pass,
        });
        Ok(())
    }

    fn resources(&self) -> Result<&SwapchainResources> {
        self.resources
            .as_ref()
            .context("swapchain resources missing")
    }

    unsafe fn record_shadow_pass(&self, cmd: vk::CommandBuffer, image: usize) -> Result<()> {
        let device = self.device();
        let res = self.resources()?;
        let extent = res.targets.shadow.extent;
        let clears = [vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        }];
        let begin = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass: res.shadow_pass.handle,
            framebuffer: res.framebuffers.shadow,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            clear_value_count: clears.len() as u32,
            p_clear_values: clears.as_ptr(),
            ..Default::default()
        };
        device.cmd_begin_render_pass(cmd, &begin, vk::SubpassContents::INLINE);

        let (viewport, scissor) = full_viewport(extent);
        device.cmd_set_viewport(cmd, 0, &[viewport]);
        device.cmd_set_scissor(cmd, 0, &[scissor]);
        let shadow = &self.settings.shadow;
        device.cmd_set_depth_bias(cmd, shadow.depth_bias_constant, 0.0, shadow.depth_bias_slope);

        let pipeline = &res.pipelines.shadow;
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.handle);
        device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::GRAPHICS,
            pipeline.layout,
            0,
            &[res.descriptors.sets[image].shadow],
            &[],
        );
        for (mesh, model) in [
            (&self.scene.proxy, self.builder.proxy_model),
            (&self.scene.model, Mat4::IDENTITY),
        ] {
            let cols = model.to_cols_array();
            device.cmd_push_constants(
                cmd,
                pipeline.layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(&cols),
            );
            mesh.draw(device, cmd);
        }
        device.cmd_end_render_pass(cmd);
        Ok(())
    }

    unsafe fn record_main_pass(&self, cmd: vk::CommandBuffer, image: usize) -> Result<()> {
        let device = self.device();
        let res = self.resources()?;
        let extent = self.swapchain.extent;
        let clears = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.settings.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];
        let begin = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass: res.main_pass.handle,
            framebuffer: res.framebuffers.main[image],
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            clear_value_count: clears.len() as u32,
            p_clear_values: clears.as_ptr(),
            ..Default::default()
        };
        device.cmd_begin_render_pass(cmd, &begin, vk::SubpassContents::INLINE);

        let (viewport, scissor) = full_viewport(extent);
        device.cmd_set_viewport(cmd, 0, &[viewport]);
        device.cmd_set_scissor(cmd, 0, &[scissor]);

        let sets = res.descriptors.sets[image];
        for (pipeline, set, mesh) in [
            (&res.pipelines.proxy, sets.proxy, &self.scene.proxy),
            (&res.pipelines.main, sets.scene, &self.scene.model),
        ] {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.handle);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.layout,
                0,
                &[set],
                &[],
            );
            mesh.draw(device, cmd);
        }

        if self.overlay.is_ready() {
            self.overlay.record(device, cmd, extent);
        }
        device.cmd_end_render_pass(cmd);
        Ok(())
    }
}

impl FrameBackend for Gpu {
    fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    fn wait_slot(&mut self, slot: usize, timeout: std::time::Duration) -> Result<()> {
        wait_fence(self.device(), self.sync.slot(slot).in_flight, timeout)?;
        Ok(())
    }

    fn acquire(&mut self, slot: usize) -> Result<AcquireResult> {
        let timeout = self.settings.fence_timeout;
        let nanos = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        let result = unsafe {
            self.swapchain.loader().acquire_next_image(
                self.swapchain.handle,
                nanos,
                self.sync.slot(slot).image_available,
                vk::Fence::null(),
            )
        };
        match result {
            Ok((image, suboptimal)) => Ok(AcquireResult::Acquired { image, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireResult::OutOfDate),
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => {
                Err(RenderError::DeviceHang(timeout).into())
            }
            Err(e) => Err(RenderError::vulkan("vkAcquireNextImageKHR", e).into()),
        }
    }

    fn update_uniforms(&mut self, image: u32) -> Result<()> {
        let view = FrameView {
            camera: self.camera.as_ref(),
            projector: &self.projector,
            extent: to_render_size(self.swapchain.extent),
            projected_texture_size: (
                self.scene.projected_texture.extent.width,
                self.scene.projected_texture.extent.height,
            ),
        };
        let frame = self.builder.build(&view);
        let u = self
            .resources()?
            .uniforms
            .get(image as usize)
            .context("no uniforms for image")?;
        u.scene.write(bytemuck::bytes_of(&frame.scene))?;
        u.material.write(bytemuck::bytes_of(&frame.material))?;
        u.proxy.write(bytemuck::bytes_of(&frame.proxy))?;
        u.shadow.write(bytemuck::bytes_of(&frame.shadow))?;
        Ok(())
    }

    fn record(&mut self, image: u32) -> Result<()> {
        let image = image as usize;
        let cmd = self.resources()?.commands.buffers[image];
        let device = self.device();
        unsafe {
            device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .vk("vkResetCommandBuffer")?;
            let begin = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
                ..Default::default()
            };
            device
                .begin_command_buffer(cmd, &begin)
                .vk("vkBeginCommandBuffer")?;
            self.record_shadow_pass(cmd, image)?;
            self.record_main_pass(cmd, image)?;
            device.end_command_buffer(cmd).vk("vkEndCommandBuffer")?;
        }
        Ok(())
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        let fence = self.sync.slot(slot).in_flight;
        unsafe { self.device().reset_fences(&[fence]) }.vk("vkResetFences")?;
        Ok(())
    }

    fn submit(&mut self, slot: usize, image: u32) -> Result<()> {
        let frame = *self.sync.slot(slot);
        let cmd = self.resources()?.commands.buffers[image as usize];
        let wait_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &frame.image_available,
            p_wait_dst_stage_mask: &wait_stage,
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &frame.render_finished,
            ..Default::default()
        };
        unsafe {
            self.device().queue_submit(
                self.ctx.graphics_queue,
                std::slice::from_ref(&submit),
                frame.in_flight,
            )
        }
        .vk("vkQueueSubmit")?;
        Ok(())
    }

    fn present(&mut self, slot: usize, image: u32) -> Result<PresentResult> {
        let render_finished = self.sync.slot(slot).render_finished;
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &render_finished,
            swapchain_count: 1,
            p_swapchains: &self.swapchain.handle,
            p_image_indices: &image,
            ..Default::default()
        };
        match unsafe {
            self.swapchain
                .loader()
                .queue_present(self.ctx.present_queue, &present)
        } {
            Ok(false) => Ok(PresentResult::Presented),
            Ok(true) => Ok(PresentResult::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentResult::OutOfDate),
            Err(e) => Err(RenderError::vulkan("vkQueuePresentKHR", e).into()),
        }
    }

    fn recreate(&mut self) -> Result<bool> {
        if self.window_size.is_zero_area() {
            return Ok(false);
        }
        let Some(extent) = swapchain::surface_extent(&self.ctx, self.window_size)? else {
            return Ok(false);
        };
        self.ctx.wait_idle()?;

        // Dependents first; the old chain stays alive to seed the new one.
        self.resources = None;
        let size = to_render_size(extent);
        let chain = Swapchain::create(&self.ctx, size, self.settings.vsync_mode, Some(&self.swapchain))
            .context("recreate swapchain")?;
        self.swapchain = chain;
        self.build_swapchain_resources()?;
        self.camera
            .set_aspect_ratio(to_render_size(self.swapchain.extent).aspect());
        info!(
            "swapchain recreated at {}x{}",
            self.swapchain.extent.width, self.swapchain.extent.height
        );
        Ok(true)
    }
}

pub struct VkRenderer {
    orchestrator: FrameOrchestrator,
    gpu: Gpu,
}

impl VkRenderer {
    pub fn device_name(&self) -> &str {
        &self.gpu.ctx.caps.device_name
    }

    pub fn frame_number(&self) -> u64 {
        self.orchestrator.frame_number()
    }

    pub fn projector_mut(&mut self) -> &mut Projector {
        &mut self.gpu.projector
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
        scene: Scene,
    ) -> Result<Self> {
        let gpu = Gpu::new(window, display, size, settings, scene)?;
        let orchestrator = FrameOrchestrator::new(
            FRAMES_IN_FLIGHT,
            gpu.swapchain.image_count(),
            settings.fence_timeout,
        );
        info!(
            "Vulkan renderer ready on {} ({}x{}, {} images, {} frames in flight)",
            gpu.ctx.caps.device_name,
            gpu.swapchain.extent.width,
            gpu.swapchain.extent.height,
            gpu.swapchain.image_count(),
            FRAMES_IN_FLIGHT
        );
        Ok(Self { orchestrator, gpu })
    }

    fn resize(&mut self, size: RenderSize) -> Result<()> {
        debug!("resize to {}x{}", size.width, size.height);
        self.gpu.window_size = size;
        self.orchestrator.notify_resized();
        Ok(())
    }

    fn render(&mut self, time: &GameTime, input: &InputState) -> Result<FrameStatus> {
        let gpu = &mut self.gpu;
        gpu.camera.update(time, input);
        gpu.projector.update(time, input);

        let dt = time.elapsed_seconds();
        if dt > 0.0 {
            let instant = 1.0 / dt;
            gpu.fps = if gpu.fps == 0.0 {
                instant
            } else {
                gpu.fps * 0.9 + instant * 0.1
            };
        }
        let overlay_frame = OverlayFrame {
            fps: gpu.fps,
            extent: to_render_size(gpu.swapchain.extent),
        };
        gpu.overlay.prepare(&overlay_frame);

        let status = match self.orchestrator.draw_frame(gpu)? {
            FrameOutcome::Presented { .. } => FrameStatus::Presented,
            FrameOutcome::Recreated => FrameStatus::Recreated,
            FrameOutcome::Skipped => FrameStatus::Skipped,
        };
        Ok(status)
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.gpu.settings.clear_color = rgba;
    }

    fn set_vsync_mode(&mut self, mode: VsyncMode) {
        if self.gpu.settings.vsync_mode != mode {
            self.gpu.settings.vsync_mode = mode;
            self.orchestrator.notify_resized();
        }
    }
}

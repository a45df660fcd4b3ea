// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_char, c_void, CStr, CString};

use anyhow::{Context, Result};
use ash::ext::debug_utils;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};
use umbra_render::RenderSettings;

use crate::error::{RenderError, VkResultExt};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Depth formats tried in order for the main depth buffer.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// The shadow map is sampled through its attachment view, so no stencil.
pub const SHADOW_FORMAT_CANDIDATES: [vk::Format; 2] =
    [vk::Format::D32_SFLOAT, vk::Format::D16_UNORM];

/// Everything about a physical device that decides whether we can use it.
#[derive(Clone, Debug)]
pub struct DeviceReport {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
    pub has_swapchain_extension: bool,
    pub sampler_anisotropy: bool,
    pub sample_rate_shading: bool,
    pub surface_format_count: usize,
    pub present_mode_count: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum Unsuitable {
    #[error("not a discrete GPU ({0:?})")]
    NotDiscrete(vk::PhysicalDeviceType),
    #[error("no graphics queue family")]
    NoGraphicsQueue,
    #[error("no queue family can present to the surface")]
    NoPresentQueue,
    #[error("VK_KHR_swapchain not supported")]
    MissingSwapchainExtension,
    #[error("feature {0} not supported")]
    MissingFeature(&'static str),
    #[error("surface reports no formats")]
    NoSurfaceFormats,
    #[error("surface reports no present modes")]
    NoPresentModes,
}

pub fn is_device_suitable(report: &DeviceReport, require_discrete: bool) -> Result<(), Unsuitable> {
    if require_discrete && report.device_type != vk::PhysicalDeviceType::DISCRETE_GPU {
        return Err(Unsuitable::NotDiscrete(report.device_type));
    }
    if report.graphics_family.is_none() {
        return Err(Unsuitable::NoGraphicsQueue);
    }
    if report.present_family.is_none() {
        return Err(Unsuitable::NoPresentQueue);
    }
    if !report.has_swapchain_extension {
        return Err(Unsuitable::MissingSwapchainExtension);
    }
    if !report.sampler_anisotropy {
        return Err(Unsuitable::MissingFeature("samplerAnisotropy"));
    }
    if !report.sample_rate_shading {
        return Err(Unsuitable::MissingFeature("sampleRateShading"));
    }
    if report.surface_format_count == 0 {
        return Err(Unsuitable::NoSurfaceFormats);
    }
    if report.present_mode_count == 0 {
        return Err(Unsuitable::NoPresentModes);
    }
    Ok(())
}

/// Picks graphics and present families, preferring one family that does both.
pub fn choose_queue_families(graphics: &[bool], present: &[bool]) -> (Option<u32>, Option<u32>) {
    let both = graphics
        .iter()
        .zip(present)
        .position(|(&g, &p)| g && p)
        .map(|i| i as u32);
    if both.is_some() {
        return (both, both);
    }
    (
        graphics.iter().position(|&g| g).map(|i| i as u32),
        present.iter().position(|&p| p).map(|i| i as u32),
    )
}

/// Highest sample count supported for both color and depth, capped at `max`.
pub fn max_usable_samples(
    color: vk::SampleCountFlags,
    depth: vk::SampleCountFlags,
    max: u32,
) -> vk::SampleCountFlags {
    let common = color & depth;
    [
        (64, vk::SampleCountFlags::TYPE_64),
        (32, vk::SampleCountFlags::TYPE_32),
        (16, vk::SampleCountFlags::TYPE_16),
        (8, vk::SampleCountFlags::TYPE_8),
        (4, vk::SampleCountFlags::TYPE_4),
        (2, vk::SampleCountFlags::TYPE_2),
    ]
    .into_iter()
    .find(|&(n, flag)| n <= max && common.contains(flag))
    .map(|(_, flag)| flag)
    .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

/// First candidate whose optimal-tiling features include `needed`.
pub fn choose_depth_format(
    candidates: &[vk::Format],
    needed: vk::FormatFeatureFlags,
    optimal_features: impl Fn(vk::Format) -> vk::FormatFeatureFlags,
) -> Option<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|&f| optimal_features(f).contains(needed))
}

/// Capability table read once at device creation and passed by reference.
#[derive(Clone, Debug)]
pub struct DeviceCaps {
    pub device_name: String,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub msaa_samples: vk::SampleCountFlags,
    pub depth_format: vk::Format,
    pub shadow_format: vk::Format,
    /// LINEAR when the shadow format can be filtered, else NEAREST.
    pub shadow_filter: vk::Filter,
    pub max_anisotropy: f32,
}

/// Instance, surface and logical device. Dropped after everything built on it.
pub struct DeviceContext {
    pub device: ash::Device,
    pub swapchain_loader: swapchain::Device,
    pub physical: vk::PhysicalDevice,
    pub graphics_family: u32,
    pub present_family: u32,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub caps: DeviceCaps,
    // Field order: the surface goes before the instance it was made from.
    pub surface: SurfaceGuard,
    instance: InstanceGuard,
}

impl DeviceContext {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        settings: &RenderSettings,
    ) -> Result<Self> {
        let display_raw = display
            .display_handle()
            .map_err(|e| anyhow::anyhow!("{e}"))?
            .as_raw();
        let window_raw = window
            .window_handle()
            .map_err(|e| anyhow::anyhow!("{e}"))?
            .as_raw();

        // STRICT ORDER: instance -> surface -> physical device (needs surface) -> device.
        // Each guard owns its handle, so an early return tears down what exists.
        let extensions = ash_window::enumerate_required_extensions(display_raw)
            .vk("enumerate_required_extensions")?;
        let instance = InstanceGuard::new(extensions, settings.validation)?;
        let surface = SurfaceGuard::new(&instance, display_raw, window_raw)?;

        unsafe {
            let (physical, graphics_family, present_family) = pick_physical_device(
                &instance.instance,
                &surface.loader,
                surface.handle,
                settings.require_discrete_gpu,
            )?;
            let caps = read_caps(&instance.instance, physical, settings.msaa_samples)?;
            info!(
                "gpu = {} (msaa {:?}, depth {:?}, shadow {:?})",
                caps.device_name, caps.msaa_samples, caps.depth_format, caps.shadow_format
            );

            let device = create_device(&instance.instance, physical, graphics_family, present_family)
                .context("create_device")?;
            let graphics_queue = device.get_device_queue(graphics_family, 0);
            let present_queue = device.get_device_queue(present_family, 0);
            let swapchain_loader = swapchain::Device::new(&instance.instance, &device);

            Ok(Self {
                device,
                swapchain_loader,
                physical,
                graphics_family,
                present_family,
                graphics_queue,
                present_queue,
                caps,
                surface,
                instance,
            })
        }
    }

    /// Families the swapchain images are shared between; empty when they coincide.
    pub fn sharing_families(&self) -> Vec<u32> {
        if self.graphics_family == self.present_family {
            Vec::new()
        } else {
            vec![self.graphics_family, self.present_family]
        }
    }

    pub fn wait_idle(&self) -> Result<(), RenderError> {
        unsafe { self.device.device_wait_idle() }.vk("vkDeviceWaitIdle")
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_device(None);
        }
    }
}

/// Vulkan instance plus the optional validation messenger attached to it.
pub struct InstanceGuard {
    debug: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    pub instance: ash::Instance,
    entry: Entry,
}

impl InstanceGuard {
    /// `extensions` are the window system's; the debug-utils one is added
    /// when validation is on.
    pub fn new(extensions: &[*const c_char], validation: bool) -> Result<Self> {
        let entry = Entry::linked();
        unsafe {
            let instance =
                create_instance(&entry, extensions, validation).context("create_instance")?;
            let mut guard = Self {
                debug: None,
                instance,
                entry,
            };
            if validation {
                guard.debug = Some(create_debug_messenger(&guard.entry, &guard.instance)?);
            }
            Ok(guard)
        }
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Presentation surface; must not outlive the `InstanceGuard` it came from.
pub struct SurfaceGuard {
    pub loader: surface::Instance,
    pub handle: vk::SurfaceKHR,
}

impl SurfaceGuard {
    fn new(
        instance: &InstanceGuard,
        display_raw: raw_window_handle::RawDisplayHandle,
        window_raw: raw_window_handle::RawWindowHandle,
    ) -> Result<Self> {
        let loader = surface::Instance::new(&instance.entry, &instance.instance);
        let handle = unsafe {
            ash_window::create_surface(
                &instance.entry,
                &instance.instance,
                display_raw,
                window_raw,
                None,
            )
        }
        .context("ash_window::create_surface")?;
        Ok(Self { loader, handle })
    }
}

impl Drop for SurfaceGuard {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.handle, None) };
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", "{:?}: {}", types, msg);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", "{:?}: {}", types, msg);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!(target: "vulkan", "{:?}: {}", types, msg);
    } else {
        trace!(target: "vulkan", "{:?}: {}", types, msg);
    }
    vk::FALSE
}

unsafe fn create_debug_messenger(
    entry: &Entry,
    instance: &ash::Instance,
) -> Result<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    let loader = debug_utils::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    let messenger = loader
        .create_debug_utils_messenger(&ci, None)
        .vk("vkCreateDebugUtilsMessengerEXT")?;
    Ok((loader, messenger))
}

unsafe fn create_instance(
    entry: &Entry,
    window_extensions: &[*const c_char],
    validation: bool,
) -> Result<ash::Instance> {
    let app = CString::new("umbra")?;
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app.as_ptr(),
        application_version: 0,
        p_engine_name: app.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let mut extensions = window_extensions.to_vec();

    let mut layers: Vec<*const c_char> = Vec::new();
    if validation {
        let available = entry
            .enumerate_instance_layer_properties()
            .vk("vkEnumerateInstanceLayerProperties")?;
        let found = available
            .iter()
            .any(|l| CStr::from_ptr(l.layer_name.as_ptr()) == VALIDATION_LAYER);
        if !found {
            return Err(RenderError::MissingValidationLayers.into());
        }
        layers.push(VALIDATION_LAYER.as_ptr());
        extensions.push(debug_utils::NAME.as_ptr());
    }

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };
    Ok(entry
        .create_instance(&create_info, None)
        .vk("vkCreateInstance")?)
}

unsafe fn report_device(
    instance: &ash::Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
    physical: vk::PhysicalDevice,
) -> Result<DeviceReport> {
    let props = instance.get_physical_device_properties(physical);
    let features = instance.get_physical_device_features(physical);
    let families = instance.get_physical_device_queue_family_properties(physical);

    let graphics: Vec<bool> = families
        .iter()
        .map(|q| q.queue_count > 0 && q.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .collect();
    let present: Vec<bool> = (0..families.len() as u32)
        .map(|i| {
            surface_loader
                .get_physical_device_surface_support(physical, i, surface)
                .unwrap_or(false)
        })
        .collect();
    let (graphics_family, present_family) = choose_queue_families(&graphics, &present);

    let has_swapchain_extension = instance
        .enumerate_device_extension_properties(physical)
        .vk("vkEnumerateDeviceExtensionProperties")?
        .iter()
        .any(|e| CStr::from_ptr(e.extension_name.as_ptr()) == swapchain::NAME);

    // Only meaningful once the extension is known to exist.
    let (surface_format_count, present_mode_count) = if has_swapchain_extension {
        (
            surface_loader
                .get_physical_device_surface_formats(physical, surface)
                .map(|f| f.len())
                .unwrap_or(0),
            surface_loader
                .get_physical_device_surface_present_modes(physical, surface)
                .map(|m| m.len())
                .unwrap_or(0),
        )
    } else {
        (0, 0)
    };

    Ok(DeviceReport {
        name: CStr::from_ptr(props.device_name.as_ptr())
            .to_string_lossy()
            .into_owned(),
        device_type: props.device_type,
        graphics_family,
        present_family,
        has_swapchain_extension,
        sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
        sample_rate_shading: features.sample_rate_shading == vk::TRUE,
        surface_format_count,
        present_mode_count,
    })
}

unsafe fn pick_physical_device(
    instance: &ash::Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
    require_discrete: bool,
) -> Result<(vk::PhysicalDevice, u32, u32)> {
    let mut rejected = Vec::new();
    for physical in instance
        .enumerate_physical_devices()
        .vk("vkEnumeratePhysicalDevices")?
    {
        let report = report_device(instance, surface_loader, surface, physical)?;
        match is_device_suitable(&report, require_discrete) {
            Ok(()) => {
                if let (Some(g), Some(p)) = (report.graphics_family, report.present_family) {
                    debug!("selected {} (graphics {}, present {})", report.name, g, p);
                    return Ok((physical, g, p));
                }
            }
            Err(why) => {
                debug!("rejecting {}: {}", report.name, why);
                rejected.push(format!("{}: {}", report.name, why));
            }
        }
    }
    let detail = if rejected.is_empty() {
        "no Vulkan devices".to_owned()
    } else {
        rejected.join("; ")
    };
    Err(RenderError::NoSuitableDevice(detail).into())
}

unsafe fn read_caps(
    instance: &ash::Instance,
    physical: vk::PhysicalDevice,
    msaa_cap: u32,
) -> Result<DeviceCaps> {
    let properties = instance.get_physical_device_properties(physical);
    let memory_properties = instance.get_physical_device_memory_properties(physical);
    let limits = properties.limits;

    let optimal = |f| {
        instance
            .get_physical_device_format_properties(physical, f)
            .optimal_tiling_features
    };
    let depth_format = choose_depth_format(
        &DEPTH_FORMAT_CANDIDATES,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        optimal,
    )
    .ok_or_else(|| RenderError::NoSuitableDevice("no depth attachment format".into()))?;
    let shadow_format = choose_depth_format(
        &SHADOW_FORMAT_CANDIDATES,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT | vk::FormatFeatureFlags::SAMPLED_IMAGE,
        optimal,
    )
    .ok_or_else(|| RenderError::NoSuitableDevice("no sampled depth-only format".into()))?;

    let shadow_filter = if optimal(shadow_format)
        .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    {
        vk::Filter::LINEAR
    } else {
        vk::Filter::NEAREST
    };

    Ok(DeviceCaps {
        device_name: CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .into_owned(),
        properties,
        memory_properties,
        msaa_samples: max_usable_samples(
            limits.framebuffer_color_sample_counts,
            limits.framebuffer_depth_sample_counts,
            msaa_cap,
        ),
        depth_format,
        shadow_format,
        shadow_filter,
        max_anisotropy: limits.max_sampler_anisotropy,
    })
}

unsafe fn create_device(
    instance: &ash::Instance,
    physical: vk::PhysicalDevice,
    graphics_family: u32,
    present_family: u32,
) -> Result<ash::Device> {
    let priorities = [1.0_f32];
    let mut families = vec![graphics_family];
    if present_family != graphics_family {
        families.push(present_family);
    }
    let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
        .iter()
        .map(|&family| vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        })
        .collect();

    let features = vk::PhysicalDeviceFeatures {
        sampler_anisotropy: vk::TRUE,
        sample_rate_shading: vk::TRUE,
        ..Default::default()
    };
    let extensions = [swapchain::NAME.as_ptr()];

    let info = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: queue_infos.len() as u32,
        p_queue_create_infos: queue_infos.as_ptr(),
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        p_enabled_features: &features,
        ..Default::default()
    };
    Ok(instance
        .create_device(physical, &info, None)
        .vk("vkCreateDevice")?)
}

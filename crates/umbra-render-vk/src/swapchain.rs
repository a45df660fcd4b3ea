// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::khr::swapchain;
use ash::vk;
use tracing::{debug, info};
use umbra_render::{RenderSize, VsyncMode};

use crate::context::DeviceContext;
use crate::error::VkResultExt;
use crate::memory::create_image_view;

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
}

/// MAILBOX when asked for and available; FIFO is always there.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: VsyncMode) -> vk::PresentModeKHR {
    match vsync {
        VsyncMode::Mailbox if modes.contains(&vk::PresentModeKHR::MAILBOX) => {
            vk::PresentModeKHR::MAILBOX
        }
        _ => vk::PresentModeKHR::FIFO,
    }
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, at least two, never above a nonzero maximum.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = (caps.min_image_count + 1).max(2);
    if caps.max_image_count == 0 {
        wanted
    } else {
        wanted.min(caps.max_image_count)
    }
}

/// Current surface extent, or `None` while the window is minimized.
pub fn surface_extent(ctx: &DeviceContext, fallback: RenderSize) -> Result<Option<vk::Extent2D>> {
    let caps = unsafe {
        ctx.surface
            .loader
            .get_physical_device_surface_capabilities(ctx.physical, ctx.surface.handle)
    }
    .vk("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;
    let extent = choose_extent(&caps, fallback);
    Ok((extent.width > 0 && extent.height > 0).then_some(extent))
}

pub struct Swapchain {
    device: ash::Device,
    loader: swapchain::Device,
    pub handle: vk::SwapchainKHR,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
}

impl Swapchain {
    /// `old` is retired by the driver once the new chain exists; the caller
    /// still owns and drops it afterwards.
    pub fn create(
        ctx: &DeviceContext,
        size: RenderSize,
        vsync: VsyncMode,
        old: Option<&Swapchain>,
    ) -> Result<Self> {
        unsafe {
            let caps = ctx
                .surface
                .loader
                .get_physical_device_surface_capabilities(ctx.physical, ctx.surface.handle)
                .vk("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;
            let formats = ctx
                .surface
                .loader
                .get_physical_device_surface_formats(ctx.physical, ctx.surface.handle)
                .vk("vkGetPhysicalDeviceSurfaceFormatsKHR")?;
            let modes = ctx
                .surface
                .loader
                .get_physical_device_surface_present_modes(ctx.physical, ctx.surface.handle)
                .vk("vkGetPhysicalDeviceSurfacePresentModesKHR")?;

            let surface_format =
                choose_surface_format(&formats).context("surface reports no formats")?;
            let present_mode = choose_present_mode(&modes, vsync);
            let extent = choose_extent(&caps, size);
            let min_image_count = choose_image_count(&caps);

            let families = ctx.sharing_families();
            let sharing_mode = if families.is_empty() {
                vk::SharingMode::EXCLUSIVE
            } else {
                vk::SharingMode::CONCURRENT
            };

            let info = vk::SwapchainCreateInfoKHR {
                s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
                surface: ctx.surface.handle,
                min_image_count,
                image_format: surface_format.format,
                image_color_space: surface_format.color_space,
                image_extent: extent,
                image_array_layers: 1,
                image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
                image_sharing_mode: sharing_mode,
                queue_family_index_count: families.len() as u32,
                p_queue_family_indices: families.as_ptr(),
                pre_transform: caps.current_transform,
                composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                present_mode,
                clipped: vk::TRUE,
                old_swapchain: old.map_or(vk::SwapchainKHR::null(), |s| s.handle),
                ..Default::default()
            };

            let handle = ctx
                .swapchain_loader
                .create_swapchain(&info, None)
                .vk("vkCreateSwapchainKHR")?;
            let mut chain = Self {
                device: ctx.device.clone(),
                loader: ctx.swapchain_loader.clone(),
                handle,
                format: surface_format.format,
                extent,
                images: Vec::new(),
                views: Vec::new(),
            };
            chain.images = chain
                .loader
                .get_swapchain_images(handle)
                .vk("vkGetSwapchainImagesKHR")?;
            for &image in &chain.images {
                let view = create_image_view(
                    &chain.device,
                    image,
                    chain.format,
                    vk::ImageAspectFlags::COLOR,
                )?;
                chain.views.push(view);
            }

            info!(
                "swapchain {}x{} ({} images, {:?}, {:?})",
                extent.width,
                extent.height,
                chain.images.len(),
                chain.format,
                present_mode
            );
            debug!("requested {} images, sharing {:?}", min_image_count, sharing_mode);
            Ok(chain)
        }
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn loader(&self) -> &swapchain::Device {
        &self.loader
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.handle, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 16,
                height: 16,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 2048,
            },
            ..Default::default()
        }
    }

    fn fmt(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn srgb_bgra_is_preferred() {
        let formats = [
            fmt(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(
            choose_surface_format(&formats).map(|f| f.format),
            Some(vk::Format::B8G8R8A8_SRGB)
        );
    }

    #[test]
    fn first_format_is_the_fallback() {
        let formats = [fmt(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        assert_eq!(choose_surface_format(&formats), Some(formats[0]));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn mailbox_only_when_requested_and_supported() {
        let both = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        let fifo = [vk::PresentModeKHR::FIFO];
        assert_eq!(
            choose_present_mode(&both, VsyncMode::Mailbox),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&fifo, VsyncMode::Mailbox),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            choose_present_mode(&both, VsyncMode::Fifo),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_is_clamped_when_surface_leaves_it_open() {
        let c = caps(2, 3);
        let e = choose_extent(&c, RenderSize::new(8000, 8));
        assert_eq!((e.width, e.height), (4096, 16));
    }

    #[test]
    fn fixed_surface_extent_wins() {
        let c = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1024,
                height: 768,
            },
            ..caps(2, 3)
        };
        let e = choose_extent(&c, RenderSize::new(1, 1));
        assert_eq!((e.width, e.height), (1024, 768));
    }

    #[test]
    fn image_count_respects_bounds() {
        assert_eq!(choose_image_count(&caps(2, 8)), 3);
        assert_eq!(choose_image_count(&caps(2, 2)), 2);
        assert_eq!(choose_image_count(&caps(1, 0)), 2);
        assert_eq!(choose_image_count(&caps(4, 0)), 5);
    }
}

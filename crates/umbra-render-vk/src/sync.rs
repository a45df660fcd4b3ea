// SPDX-License-Identifier: CEPL-1.0
use std::time::Duration;

use anyhow::Result;
use ash::vk;

use crate::error::{RenderError, VkResultExt};

/// Semaphores and fence owned by one frame-in-flight slot.
#[derive(Clone, Copy, Debug)]
pub struct FrameSlot {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    /// Created signaled so the first wait on an unused slot returns at once.
    pub in_flight: vk::Fence,
}

pub struct FrameSync {
    device: ash::Device,
    pub slots: Vec<FrameSlot>,
}

impl FrameSync {
    pub fn new(device: &ash::Device, frames_in_flight: usize) -> Result<Self> {
        let mut sync = Self {
            device: device.clone(),
            slots: Vec::with_capacity(frames_in_flight),
        };
        let semaphore_info = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            ..Default::default()
        };
        let fence_info = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        for _ in 0..frames_in_flight {
            unsafe {
                let image_available = device
                    .create_semaphore(&semaphore_info, None)
                    .vk("vkCreateSemaphore")?;
                let render_finished = match device.create_semaphore(&semaphore_info, None) {
                    Ok(s) => s,
                    Err(e) => {
                        device.destroy_semaphore(image_available, None);
                        return Err(RenderError::vulkan("vkCreateSemaphore", e).into());
                    }
                };
                let in_flight = match device.create_fence(&fence_info, None) {
                    Ok(f) => f,
                    Err(e) => {
                        device.destroy_semaphore(image_available, None);
                        device.destroy_semaphore(render_finished, None);
                        return Err(RenderError::vulkan("vkCreateFence", e).into());
                    }
                };
                sync.slots.push(FrameSlot {
                    image_available,
                    render_finished,
                    in_flight,
                });
            }
        }
        Ok(sync)
    }

    pub fn slot(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            for slot in &self.slots {
                self.device.destroy_semaphore(slot.image_available, None);
                self.device.destroy_semaphore(slot.render_finished, None);
                self.device.destroy_fence(slot.in_flight, None);
            }
        }
    }
}

/// Maps the outcome of a bounded fence wait. `TIMEOUT` means the GPU stopped
/// making progress; it is never retried.
pub fn fence_wait_result(result: Result<(), vk::Result>, timeout: Duration) -> Result<(), RenderError> {
    match result {
        Ok(()) => Ok(()),
        Err(vk::Result::TIMEOUT) => Err(RenderError::DeviceHang(timeout)),
        Err(e) => Err(RenderError::vulkan("vkWaitForFences", e)),
    }
}

pub fn wait_fence(device: &ash::Device, fence: vk::Fence, timeout: Duration) -> Result<(), RenderError> {
    let nanos = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
    let result = unsafe { device.wait_for_fences(&[fence], true, nanos) };
    fence_wait_result(result, timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_a_hang() {
        let t = Duration::from_millis(250);
        assert!(matches!(
            fence_wait_result(Err(vk::Result::TIMEOUT), t),
            Err(RenderError::DeviceHang(d)) if d == t
        ));
    }

    #[test]
    fn lost_device_is_reported_as_such() {
        assert!(matches!(
            fence_wait_result(Err(vk::Result::ERROR_DEVICE_LOST), Duration::ZERO),
            Err(RenderError::DeviceLost)
        ));
        assert!(fence_wait_result(Ok(()), Duration::ZERO).is_ok());
    }
}

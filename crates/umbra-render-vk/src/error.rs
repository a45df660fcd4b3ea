// SPDX-License-Identifier: CEPL-1.0
use std::time::Duration;

use ash::vk;
use thiserror::Error;
use umbra_render::AssetError;

/// Fatal renderer failures. Swapchain staleness is not in here: it travels
/// as `AcquireResult::OutOfDate` / `PresentResult` and is handled in the loop.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no suitable GPU found: {0}")]
    NoSuitableDevice(String),
    #[error("validation requested but VK_LAYER_KHRONOS_validation is not installed")]
    MissingValidationLayers,
    #[error("no memory type in bits {type_bits:#b} has {flags:?}")]
    NoSuitableMemoryType {
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    },
    #[error("unsupported layout transition {from:?} -> {to:?}")]
    UnsupportedLayoutTransition {
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    },
    #[error("GPU did not signal a fence within {0:?}")]
    DeviceHang(Duration),
    #[error("device lost")]
    DeviceLost,
    #[error("{call} failed: {result}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },
    #[error("shader {name} is not valid SPIR-V: {source}")]
    ShaderLoad {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Asset(#[from] AssetError),
}

impl RenderError {
    pub fn vulkan(call: &'static str, result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => RenderError::DeviceLost,
            result => RenderError::Vulkan { call, result },
        }
    }
}

/// Tags a raw `VkResult` with the call that produced it.
pub(crate) trait VkResultExt<T> {
    fn vk(self, call: &'static str) -> Result<T, RenderError>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    fn vk(self, call: &'static str) -> Result<T, RenderError> {
        self.map_err(|result| RenderError::vulkan(call, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_lost_is_its_own_variant() {
        let err: Result<(), _> = Err(vk::Result::ERROR_DEVICE_LOST);
        assert!(matches!(
            err.vk("vkQueueSubmit"),
            Err(RenderError::DeviceLost)
        ));
    }

    #[test]
    fn other_results_keep_the_call_name() {
        let err: Result<(), _> = Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        let msg = err.vk("vkCreateBuffer").unwrap_err().to_string();
        assert!(msg.starts_with("vkCreateBuffer failed"));
    }
}

// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use ash::vk;
use tracing::{debug, warn};

use crate::error::VkResultExt;

fn hex_bytes(b: &[u8]) -> String {
    use std::fmt::Write as _;
    b.iter().fold(String::with_capacity(b.len() * 2), |mut s, x| {
        let _ = write!(s, "{:02x}", x);
        s
    })
}

/// Driver caches are only valid for the exact device and driver that wrote them.
pub fn pipeline_cache_path(dir: &Path, props: &vk::PhysicalDeviceProperties) -> PathBuf {
    dir.join(format!(
        "umbra_pipeline_cache_{:04x}_{:04x}_{:08x}_{}.bin",
        props.vendor_id,
        props.device_id,
        props.driver_version,
        hex_bytes(&props.pipeline_cache_uuid)
    ))
}

/// Seeded from disk on creation, written back on drop.
pub struct PipelineCache {
    device: ash::Device,
    pub handle: vk::PipelineCache,
    path: PathBuf,
}

impl PipelineCache {
    pub fn new(device: &ash::Device, path: PathBuf) -> Result<Self> {
        let data = fs::read(&path).ok();
        let seeded = |initial: &[u8]| {
            let info = vk::PipelineCacheCreateInfo {
                s_type: vk::StructureType::PIPELINE_CACHE_CREATE_INFO,
                initial_data_size: initial.len(),
                p_initial_data: initial.as_ptr().cast(),
                ..Default::default()
            };
            unsafe { device.create_pipeline_cache(&info, None) }
        };
        let handle = match data.as_deref().map(seeded) {
            Some(Ok(handle)) => {
                debug!("pipeline cache loaded from {:?}", path);
                handle
            }
            Some(Err(e)) => {
                warn!("discarding pipeline cache {:?}: {}", path, e);
                seeded(&[]).vk("vkCreatePipelineCache")?
            }
            None => seeded(&[]).vk("vkCreatePipelineCache")?,
        };
        Ok(Self {
            device: device.clone(),
            handle,
            path,
        })
    }

    fn save(&self) -> Result<()> {
        let bytes = unsafe { self.device.get_pipeline_cache_data(self.handle) }
            .vk("vkGetPipelineCacheData")?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, bytes)?;
        Ok(())
    }
}

impl Drop for PipelineCache {
    fn drop(&mut self) {
        match self.save() {
            Ok(()) => debug!("pipeline cache saved to {:?}", self.path),
            Err(e) => warn!("pipeline cache not saved: {:#}", e),
        }
        unsafe { self.device.destroy_pipeline_cache(self.handle, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_names_vendor_device_driver_and_uuid() {
        let mut props = vk::PhysicalDeviceProperties {
            vendor_id: 0x10de,
            device_id: 0x2484,
            driver_version: 0x1234_5678,
            ..Default::default()
        };
        props.pipeline_cache_uuid[0] = 0xab;
        let path = pipeline_cache_path(Path::new("cache"), &props);
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("umbra_pipeline_cache_10de_2484_12345678_ab00"));
        assert!(name.ends_with(".bin"));
        assert_eq!(path.parent(), Some(Path::new("cache")));
    }

    #[test]
    fn hex_is_lowercase_and_padded() {
        assert_eq!(hex_bytes(&[0x0f, 0xa0]), "0fa0");
    }
}

// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use umbra_core::GameTime;
use umbra_math::InputState;

mod mesh;
mod scene;
mod settings;
mod texture;
pub mod uniforms;

pub use mesh::{Mesh, Vertex};
pub use scene::{AssetError, AssetPaths, Scene, SceneAssets};
pub use settings::{RenderSettings, ShadowSettings, VsyncMode};
pub use texture::TextureData;
pub use uniforms::UniformBuilder;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_zero_area(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(&self) -> f32 {
        if self.is_zero_area() {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// What happened to the frame the app asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    /// The swapchain was rebuilt and nothing was presented.
    Recreated,
    /// The surface has no area; rendering is paused.
    Skipped,
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
        scene: Scene,
    ) -> Result<Self>
    where
        Self: Sized;

    fn resize(&mut self, size: RenderSize) -> Result<()>;
    fn render(&mut self, time: &GameTime, input: &InputState) -> Result<FrameStatus>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);
    fn set_vsync_mode(&mut self, _mode: VsyncMode) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_area_sizes() {
        assert!(RenderSize::new(0, 768).is_zero_area());
        assert!(RenderSize::new(1024, 0).is_zero_area());
        assert!(!RenderSize::new(1, 1).is_zero_area());
        assert_eq!(RenderSize::new(0, 0).aspect(), 1.0);
        assert_eq!(RenderSize::new(1024, 512).aspect(), 2.0);
    }
}

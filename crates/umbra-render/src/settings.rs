// SPDX-License-Identifier: CEPL-1.0
use std::time::Duration;

use umbra_math::ShadowProjection;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VsyncMode {
    /// Always FIFO.
    Fifo,
    /// MAILBOX when the surface offers it, else FIFO.
    #[default]
    Mailbox,
}

/// Runtime knobs the backend reads at startup and on recreation.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderSettings {
    pub clear_color: [f32; 4],
    pub vsync_mode: VsyncMode,
    /// Upper bound on MSAA; the device may support fewer.
    pub msaa_samples: u32,
    pub fence_timeout: Duration,
    pub validation: bool,
    pub require_discrete_gpu: bool,
    pub shadow: ShadowSettings,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vsync_mode: VsyncMode::Mailbox,
            msaa_samples: 8,
            fence_timeout: Duration::from_millis(5000),
            validation: cfg!(debug_assertions),
            require_discrete_gpu: true,
            shadow: ShadowSettings::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowSettings {
    pub depth_bias_constant: f32,
    pub depth_bias_slope: f32,
    pub projection: ShadowProjection,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            depth_bias_constant: 1.25,
            depth_bias_slope: 1.75,
            projection: ShadowProjection::default(),
        }
    }
}

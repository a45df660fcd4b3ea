// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{error, info};
use umbra_math::glam::Vec3;
use umbra_math::{FirstPersonRates, Projector, ShadowProjection};
use umbra_render::{RenderSettings, ShadowSettings, VsyncMode};

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub render: RenderConfig,
    pub shadow: ShadowConfig,
    pub camera: CameraConfig,
    pub projector: ProjectorConfig,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VsyncModeCfg {
    Fifo,
    #[default]
    Mailbox,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    pub clear_color: [f32; 4],
    pub vsync_mode: VsyncModeCfg,
    pub msaa_samples: u32,
    pub fence_timeout_ms: u64,
    /// Unset means on in debug builds.
    pub validation: Option<bool>,
    pub require_discrete_gpu: bool,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vsync_mode: VsyncModeCfg::Mailbox,
            msaa_samples: 8,
            fence_timeout_ms: 5000,
            validation: None,
            require_discrete_gpu: true,
            window_width: 1024,
            window_height: 768,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShadowConfig {
    pub depth_bias_constant: f32,
    pub depth_bias_slope: f32,
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub light_position: [f32; 3],
    pub light_target: [f32; 3],
    pub light_up: [f32; 3],
}

impl Default for ShadowConfig {
    fn default() -> Self {
        let s = ShadowSettings::default();
        let p = s.projection;
        Self {
            depth_bias_constant: s.depth_bias_constant,
            depth_bias_slope: s.depth_bias_slope,
            fov_y_degrees: p.fov_y_degrees,
            near: p.near,
            far: p.far,
            light_position: p.position.to_array(),
            light_target: p.target.to_array(),
            light_up: p.up.to_array(),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    pub movement_rate: f32,
    pub rotation_rate_degrees: f32,
    pub mouse_sensitivity: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        let r = FirstPersonRates::default();
        Self {
            movement_rate: r.movement,
            rotation_rate_degrees: r.rotation.to_degrees(),
            mouse_sensitivity: r.mouse_sensitivity,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProjectorConfig {
    pub position: [f32; 3],
    pub direction: [f32; 3],
    /// World units per second for the arrow keys.
    pub movement_rate: f32,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            position: Projector::HOME_POSITION.to_array(),
            direction: Projector::HOME_DIRECTION.to_array(),
            movement_rate: Projector::DEFAULT_MOVEMENT_RATE,
        }
    }
}

impl AppConfig {
    /// A missing file is not an error; a malformed one is.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("no config at {}; using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            error!("{e:#}; using defaults");
            Self::default()
        })
    }

    pub fn render_settings(&self) -> RenderSettings {
        let r = &self.render;
        let s = &self.shadow;
        RenderSettings {
            clear_color: r.clear_color,
            vsync_mode: match r.vsync_mode {
                VsyncModeCfg::Fifo => VsyncMode::Fifo,
                VsyncModeCfg::Mailbox => VsyncMode::Mailbox,
            },
            msaa_samples: r.msaa_samples.max(1),
            fence_timeout: Duration::from_millis(r.fence_timeout_ms.max(1)),
            validation: r.validation.unwrap_or(cfg!(debug_assertions)),
            require_discrete_gpu: r.require_discrete_gpu,
            shadow: ShadowSettings {
                depth_bias_constant: s.depth_bias_constant,
                depth_bias_slope: s.depth_bias_slope,
                projection: ShadowProjection {
                    fov_y_degrees: s.fov_y_degrees,
                    near: s.near,
                    far: s.far,
                    position: Vec3::from_array(s.light_position),
                    target: Vec3::from_array(s.light_target),
                    up: Vec3::from_array(s.light_up),
                },
            },
        }
    }

    pub fn projector(&self, aspect: f32) -> Projector {
        let p = &self.projector;
        let mut projector = Projector::new(aspect);
        projector.set_position(Vec3::from_array(p.position));
        projector.set_direction(Vec3::from_array(p.direction));
        projector.set_movement_rate(p.movement_rate);
        projector
    }

    pub fn camera_rates(&self) -> FirstPersonRates {
        FirstPersonRates {
            movement: self.camera.movement_rate,
            rotation: self.camera.rotation_rate_degrees.to_radians(),
            mouse_sensitivity: self.camera.mouse_sensitivity,
        }
    }
}

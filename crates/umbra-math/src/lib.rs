// SPDX-License-Identifier: CEPL-1.0
//! Scene collaborators: cameras, the texture projector, lights and the
//! clip-space conventions the Vulkan backend expects.
mod camera;
mod clip;
mod first_person;
mod input;
mod light;
mod projector;

pub use camera::{Camera, Lens, Pose, WORLD_UP};
pub use clip::{projective_texture_scaling, vulkan_projection};
pub use first_person::{FirstPersonCamera, FirstPersonRates};
pub use input::{InputState, MoveKeys};
pub use light::{DirectionalLight, ShadowProjection};
pub use projector::Projector;

pub use glam;

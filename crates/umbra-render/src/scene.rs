// SPDX-License-Identifier: CEPL-1.0
use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;
use umbra_math::{Camera, Projector};

use crate::{Mesh, TextureData};

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to load model {path:?}: {source}")]
    Obj {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },
    #[error("model {0:?} has no triangles")]
    EmptyMesh(PathBuf),
    #[error("failed to load image {path:?}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Where to find the scene's assets. `None` selects the built-in fallback.
#[derive(Clone, Debug, Default)]
pub struct AssetPaths {
    pub model: Option<PathBuf>,
    pub texture: Option<PathBuf>,
    pub projected_texture: Option<PathBuf>,
}

/// CPU-side geometry and pixels, ready for upload.
#[derive(Clone, Debug)]
pub struct SceneAssets {
    pub model: Mesh,
    pub proxy: Mesh,
    pub texture: TextureData,
    pub projected_texture: TextureData,
}

impl SceneAssets {
    pub const FALLBACK_TEXTURE_SIZE: u32 = 256;

    /// An explicitly requested model must load; textures fall back with a warning.
    pub fn load(paths: &AssetPaths) -> Result<Self, AssetError> {
        let model = match &paths.model {
            Some(path) => Mesh::load_obj(path)?,
            None => {
                warn!("no model given, drawing the built-in cube");
                Mesh::unit_cube()
            }
        };
        Ok(Self {
            model,
            proxy: Mesh::unit_cube(),
            texture: load_texture_or_fallback(paths.texture.as_ref(), 8),
            projected_texture: load_texture_or_fallback(paths.projected_texture.as_ref(), 4),
        })
    }

    pub fn builtin() -> Self {
        Self {
            model: Mesh::unit_cube(),
            proxy: Mesh::unit_cube(),
            texture: TextureData::checkerboard(Self::FALLBACK_TEXTURE_SIZE, 8),
            projected_texture: TextureData::checkerboard(Self::FALLBACK_TEXTURE_SIZE, 4),
        }
    }
}

fn load_texture_or_fallback(path: Option<&PathBuf>, cells: u32) -> TextureData {
    let fallback = || TextureData::checkerboard(SceneAssets::FALLBACK_TEXTURE_SIZE, cells);
    match path {
        Some(path) => TextureData::load(path).unwrap_or_else(|e| {
            warn!("{e}; using checkerboard");
            fallback()
        }),
        None => fallback(),
    }
}

/// Everything the renderer draws and looks through.
pub struct Scene {
    pub assets: SceneAssets,
    pub camera: Box<dyn Camera>,
    pub projector: Projector,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_paths_gives_builtins() {
        let assets = SceneAssets::load(&AssetPaths::default()).unwrap();
        assert_eq!(assets.model, Mesh::unit_cube());
        assert_eq!(assets.texture.width, SceneAssets::FALLBACK_TEXTURE_SIZE);
    }

    #[test]
    fn missing_texture_falls_back() {
        let paths = AssetPaths {
            texture: Some(PathBuf::from("/no/such/texture.png")),
            ..Default::default()
        };
        let assets = SceneAssets::load(&paths).unwrap();
        assert_eq!(assets.texture, TextureData::checkerboard(256, 8));
    }

    #[test]
    fn missing_requested_model_is_fatal() {
        let paths = AssetPaths {
            model: Some(PathBuf::from("/no/such/model.obj")),
            ..Default::default()
        };
        assert!(SceneAssets::load(&paths).is_err());
    }
}

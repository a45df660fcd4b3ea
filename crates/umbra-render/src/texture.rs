// SPDX-License-Identifier: CEPL-1.0
use std::path::Path;

use tracing::{debug, info};

use crate::scene::AssetError;

/// Tightly packed RGBA8 pixels, row-major, top row first.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let path = path.as_ref();
        debug!("loading texture from {:?}", path);
        let rgba = image::open(path)
            .map_err(|source| AssetError::Image {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgba8();
        let (width, height) = rgba.dimensions();
        info!("loaded texture {}x{} from {:?}", width, height, path);
        Ok(Self {
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }

    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let count = (width * height) as usize;
        Self {
            width,
            height,
            pixels: rgba.repeat(count),
        }
    }

    /// Two-tone checkerboard used when an optional texture is missing.
    pub fn checkerboard(size: u32, cells: u32) -> Self {
        let cell = (size / cells.max(1)).max(1);
        let mut pixels = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let light = ((x / cell) + (y / cell)) % 2 == 0;
                let texel = if light {
                    [0xE0, 0xE0, 0xE0, 0xFF]
                } else {
                    [0x40, 0x40, 0x40, 0xFF]
                };
                pixels.extend_from_slice(&texel);
            }
        }
        Self {
            width: size,
            height: size,
            pixels,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkerboard_alternates_cells() {
        let tex = TextureData::checkerboard(8, 2);
        assert_eq!(tex.byte_len(), 8 * 8 * 4);
        let at = |x: u32, y: u32| {
            let i = ((y * tex.width + x) * 4) as usize;
            tex.pixels[i]
        };
        assert_eq!(at(0, 0), 0xE0);
        assert_eq!(at(4, 0), 0x40);
        assert_eq!(at(4, 4), 0xE0);
    }

    #[test]
    fn solid_fills_every_texel() {
        let tex = TextureData::solid(3, 2, [1, 2, 3, 4]);
        assert_eq!(tex.pixels.len(), 24);
        assert!(tex.pixels.chunks(4).all(|p| p == [1, 2, 3, 4]));
    }

    #[test]
    fn png_round_trips_through_loader() {
        let dir = std::env::temp_dir().join(format!("umbra-tex-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("red.png");
        image::RgbImage::from_pixel(4, 2, image::Rgb([255, 0, 0]))
            .save(&path)
            .unwrap();

        let tex = TextureData::load(&path).unwrap();
        assert_eq!((tex.width, tex.height), (4, 2));
        assert_eq!(&tex.pixels[..4], &[255, 0, 0, 255]);

        std::fs::remove_dir_all(&dir).ok();
    }
}

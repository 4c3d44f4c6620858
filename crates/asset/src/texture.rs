//! Texture decoding into CPU-side pixel buffers.

use std::path::Path;

use anyhow::{Context, Result};

/// Decoded 8-bit pixels before GPU upload.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    /// Interleaved components per pixel as stored in the source (1..=4).
    pub components: u8,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    pub fn new(width: u32, height: u32, components: u8, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            components,
            pixels,
        }
    }

    /// Check if the pixel buffer matches the declared dimensions.
    pub fn is_valid(&self) -> bool {
        let expected = self.width as usize * self.height as usize * self.components as usize;
        self.pixels.len() == expected && self.width > 0 && self.height > 0
    }

    /// Create a simple RGBA checkerboard, used in place of textures that fail to load.
    pub fn checkerboard(size: u32) -> Self {
        let mut pixels = Vec::with_capacity((size * size * 4) as usize);

        for y in 0..size {
            for x in 0..size {
                let checker = ((x / 8) + (y / 8)) % 2;
                if checker == 0 {
                    // Magenta square
                    pixels.extend_from_slice(&[255, 0, 255, 255]);
                } else {
                    // Black square
                    pixels.extend_from_slice(&[0, 0, 0, 255]);
                }
            }
        }

        Self::new(size, size, 4, pixels)
    }
}

/// Turns an image file into pixels.
pub trait PixelDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedImage>;
}

/// [`PixelDecoder`] backed by the `image` crate.
#[derive(Clone, Copy, Debug)]
pub struct ImageDecoder {
    /// Store rows bottom-up, matching texture coordinates with a lower-left origin.
    pub flip_vertically: bool,
}

impl Default for ImageDecoder {
    fn default() -> Self {
        Self {
            flip_vertically: true,
        }
    }
}

impl PixelDecoder for ImageDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedImage> {
        log::info!("Loading texture from {:?}", path);

        let img = image::open(path)
            .with_context(|| format!("Failed to open image {}", path.display()))?;
        let img = if self.flip_vertically { img.flipv() } else { img };

        let decoded = convert(img);
        log::info!(
            "Loaded texture {}x{} ({} components, {} bytes)",
            decoded.width,
            decoded.height,
            decoded.components,
            decoded.pixels.len()
        );
        Ok(decoded)
    }
}

/// Narrow to 8 bits per channel while keeping the source's channel count.
fn convert(img: image::DynamicImage) -> DecodedImage {
    let (width, height) = (img.width(), img.height());
    let (components, pixels) = match img.color().channel_count() {
        1 => (1, img.into_luma8().into_raw()),
        2 => (2, img.into_luma_alpha8().into_raw()),
        3 => (3, img.into_rgb8().into_raw()),
        _ => (4, img.into_rgba8().into_raw()),
    };
    DecodedImage::new(width, height, components, pixels)
}

//! Shared GPU textures and the per-model path cache.

use std::fmt;
use std::path::Path;
use std::rc::Rc;

use asset::{DecodedImage, PixelDecoder};
use gfx::{PixelFormat, SharedDevice, TextureId, TextureUpload};

use crate::error::TextureError;

/// Path recorded on placeholder textures.
pub const PLACEHOLDER_PATH: &str = "<placeholder>";
const PLACEHOLDER_SIZE: u32 = 64;

/// Sampler family a texture feeds; forms the `texture_<label>N` uniform name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureKind {
    Diffuse,
    Specular,
    Normal,
    Height,
}

impl TextureKind {
    pub const ALL: [TextureKind; 4] = [Self::Diffuse, Self::Specular, Self::Normal, Self::Height];

    pub fn label(self) -> &'static str {
        match self {
            Self::Diffuse => "diffuse",
            Self::Specular => "specular",
            Self::Normal => "normal",
            Self::Height => "height",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for TextureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Uploaded texture. The GPU object is released when the last `Rc` drops.
pub struct Texture {
    id: TextureId,
    kind: TextureKind,
    path: String,
    width: u32,
    height: u32,
    device: SharedDevice,
}

impl Texture {
    fn upload(
        device: &SharedDevice,
        path: &str,
        kind: TextureKind,
        image: &DecodedImage,
    ) -> Result<Self, TextureError> {
        let format = PixelFormat::from_components(image.components).ok_or_else(|| {
            TextureError::UnsupportedFormat {
                path: path.to_owned(),
                components: image.components,
            }
        })?;
        let id = device
            .create_texture(&TextureUpload {
                label: path,
                width: image.width,
                height: image.height,
                format,
                pixels: &image.pixels,
            })
            .map_err(|source| TextureError::Upload {
                path: path.to_owned(),
                source,
            })?;

        Ok(Self {
            id,
            kind,
            path: path.to_owned(),
            width: image.width,
            height: image.height,
            device: Rc::clone(device),
        })
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.device.delete_texture(self.id);
    }
}

/// Textures loaded for one model, keyed by exact path string.
///
/// Lookups scan linearly; a model references tens of textures at most.
/// The cache lives and dies with its model, so the same file loaded by two
/// models is decoded and uploaded twice. Paths that failed are remembered and
/// not retried.
pub struct TextureCache {
    device: SharedDevice,
    loaded: Vec<Rc<Texture>>,
    failed: Vec<String>,
    placeholders: Vec<Rc<Texture>>,
}

impl TextureCache {
    pub fn new(device: SharedDevice) -> Self {
        Self {
            device,
            loaded: Vec::new(),
            failed: Vec::new(),
            placeholders: Vec::new(),
        }
    }

    /// Returns the texture for `path`, decoding and uploading it on first use.
    ///
    /// A cached texture keeps the kind it was first resolved with. A path that
    /// failed before returns [`TextureError::Unavailable`] without decoding.
    pub fn resolve(
        &mut self,
        path: &str,
        kind: TextureKind,
        decoder: &dyn PixelDecoder,
    ) -> Result<Rc<Texture>, TextureError> {
        if let Some(hit) = self.loaded.iter().find(|texture| texture.path == path) {
            return Ok(Rc::clone(hit));
        }
        if self.has_failed(path) {
            return Err(TextureError::Unavailable {
                path: path.to_owned(),
            });
        }

        let uploaded = decoder
            .decode(Path::new(path))
            .map_err(|source| TextureError::Decode {
                path: path.to_owned(),
                source,
            })
            .and_then(|image| Texture::upload(&self.device, path, kind, &image));
        let texture = match uploaded {
            Ok(texture) => Rc::new(texture),
            Err(err) => {
                self.failed.push(path.to_owned());
                return Err(err);
            }
        };
        log::debug!(
            "Cached {} texture {} ({}x{})",
            kind,
            path,
            texture.width,
            texture.height
        );
        self.loaded.push(Rc::clone(&texture));
        Ok(texture)
    }

    /// Checkerboard stand-in for textures that failed to load, one per kind.
    pub fn placeholder(&mut self, kind: TextureKind) -> Result<Rc<Texture>, TextureError> {
        if let Some(hit) = self.placeholders.iter().find(|texture| texture.kind == kind) {
            return Ok(Rc::clone(hit));
        }
        let image = DecodedImage::checkerboard(PLACEHOLDER_SIZE);
        let texture = Rc::new(Texture::upload(&self.device, PLACEHOLDER_PATH, kind, &image)?);
        self.placeholders.push(Rc::clone(&texture));
        Ok(texture)
    }

    pub fn has_failed(&self, path: &str) -> bool {
        self.failed.iter().any(|failed| failed == path)
    }

    /// Textures decoded from files, in load order.
    pub fn textures(&self) -> &[Rc<Texture>] {
        &self.loaded
    }

    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }
}

impl fmt::Debug for TextureCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureCache")
            .field("loaded", &self.loaded)
            .field("failed", &self.failed)
            .field("placeholders", &self.placeholders.len())
            .finish()
    }
}

//! Graphics-context abstraction shared by the model pipeline and its backends.
//!
//! The API mirrors a classic bind-then-draw context: textures and vertex arrays
//! are created from CPU data and addressed by small integer handles, texture
//! units are activated and bound one by one, and a draw consumes whatever state
//! is currently bound.

use std::rc::Rc;

use glam::{Mat4, Vec3};
use thiserror::Error;

pub mod recording;

#[derive(Debug, Error)]
pub enum GfxError {
    #[error("unsupported pixel layout: {0} components per pixel")]
    UnsupportedComponents(u8),
    #[error("texture size {width}x{height} has a zero dimension")]
    EmptyTexture { width: u32, height: u32 },
    #[error("texture size {width}x{height} exceeds the device limit of {max}")]
    TextureTooLarge { width: u32, height: u32, max: u32 },
    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    PixelSize { expected: usize, actual: usize },
    #[error("vertex buffer of {len} bytes is not a multiple of stride {stride}")]
    VertexStride { len: usize, stride: usize },
    #[error("shader program '{label}' failed to build: {message}")]
    Shader { label: String, message: String },
    #[error("no suitable graphics adapter: {0}")]
    Adapter(String),
    #[error("unknown {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: u32 },
}

pub type GfxResult<T> = Result<T, GfxError>;

/// GPU texture handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// GPU vertex array handle (vertex buffer + index buffer + attribute layout).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexArrayId(pub u32);

/// Upload format of decoded pixel data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    R8,
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    /// Maps a decoder's component count to an upload format.
    pub fn from_components(components: u8) -> Option<Self> {
        match components {
            1 => Some(Self::R8),
            3 => Some(Self::Rgb8),
            4 => Some(Self::Rgba8),
            _ => None,
        }
    }

    pub fn components(self) -> usize {
        match self {
            Self::R8 => 1,
            Self::Rgb8 => 3,
            Self::Rgba8 => 4,
        }
    }
}

/// Tightly packed 8-bit pixel rows ready for upload.
#[derive(Clone, Copy, Debug)]
pub struct TextureUpload<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pixels: &'a [u8],
}

impl TextureUpload<'_> {
    pub fn validate(&self) -> GfxResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(GfxError::EmptyTexture {
                width: self.width,
                height: self.height,
            });
        }
        let expected = self.width as usize * self.height as usize * self.format.components();
        if self.pixels.len() != expected {
            return Err(GfxError::PixelSize {
                expected,
                actual: self.pixels.len(),
            });
        }
        Ok(())
    }
}

/// Hint for how often buffer contents change after creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BufferUsage {
    #[default]
    Static,
    Dynamic,
}

/// One float vertex attribute at a fixed shader location.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub components: u32,
    pub offset: usize,
}

/// Interleaved vertex layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexLayout {
    pub stride: usize,
    pub attributes: &'static [VertexAttribute],
}

#[derive(Clone, Copy, Debug)]
pub struct GeometryUpload<'a> {
    pub label: &'a str,
    pub layout: VertexLayout,
    pub vertices: &'a [u8],
    pub indices: &'a [u32],
    pub usage: BufferUsage,
}

impl GeometryUpload<'_> {
    pub fn validate(&self) -> GfxResult<()> {
        if self.layout.stride == 0 || self.vertices.len() % self.layout.stride != 0 {
            return Err(GfxError::VertexStride {
                len: self.vertices.len(),
                stride: self.layout.stride,
            });
        }
        Ok(())
    }
}

/// Graphics context owning GPU objects.
///
/// Implementations are single-threaded and keep their mutable state behind
/// interior mutability so a context can be shared as [`SharedDevice`].
pub trait GraphicsDevice {
    fn create_texture(&self, upload: &TextureUpload<'_>) -> GfxResult<TextureId>;
    fn delete_texture(&self, id: TextureId);

    fn create_vertex_array(&self, upload: &GeometryUpload<'_>) -> GfxResult<VertexArrayId>;
    fn delete_vertex_array(&self, id: VertexArrayId);

    /// Selects the texture unit subsequent [`bind_texture`](Self::bind_texture) calls target.
    fn active_texture(&self, unit: u32);
    fn bind_texture(&self, id: TextureId);
    fn bind_vertex_array(&self, id: Option<VertexArrayId>);

    /// Draws `index_count` indices of the bound vertex array as a triangle list.
    fn draw_elements(&self, index_count: u32);
}

pub type SharedDevice = Rc<dyn GraphicsDevice>;

/// A value written into a named shader uniform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec3(Vec3),
    Mat4(Mat4),
}

/// Linked shader program addressed by uniform name.
pub trait ShaderProgram {
    /// Makes this program current for subsequent draws.
    fn bind(&self);
    fn set_uniform(&self, name: &str, value: UniformValue);

    fn set_bool(&self, name: &str, value: bool) {
        self.set_uniform(name, UniformValue::Bool(value));
    }

    fn set_int(&self, name: &str, value: i32) {
        self.set_uniform(name, UniformValue::Int(value));
    }

    fn set_float(&self, name: &str, value: f32) {
        self.set_uniform(name, UniformValue::Float(value));
    }

    fn set_vec3(&self, name: &str, value: Vec3) {
        self.set_uniform(name, UniformValue::Vec3(value));
    }

    fn set_mat4(&self, name: &str, value: Mat4) {
        self.set_uniform(name, UniformValue::Mat4(value));
    }
}

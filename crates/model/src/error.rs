use gfx::GfxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("failed to decode texture {path}: {source:#}")]
    Decode {
        path: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("texture {path} has {components} components per pixel, expected 1, 3 or 4")]
    UnsupportedFormat { path: String, components: u8 },
    #[error("texture {path} already failed to load")]
    Unavailable { path: String },
    #[error("failed to upload texture {path}")]
    Upload {
        path: String,
        #[source]
        source: GfxError,
    },
}

impl TextureError {
    pub fn path(&self) -> &str {
        match self {
            Self::Decode { path, .. }
            | Self::UnsupportedFormat { path, .. }
            | Self::Unavailable { path }
            | Self::Upload { path, .. } => path,
        }
    }
}

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("index {index} at position {position} is out of range for {vertex_count} vertices")]
    IndexOutOfBounds {
        index: u32,
        position: usize,
        vertex_count: usize,
    },
    #[error(transparent)]
    Gfx(#[from] GfxError),
}

/// Reasons a scene yields no meshes. These never fail a load; the model comes
/// back empty and keeps the reason for inspection.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("scene import failed: {0:#}")]
    Import(anyhow::Error),
    #[error("scene is incomplete")]
    Incomplete,
    #[error("scene has no root node")]
    MissingRoot,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Texture(#[from] TextureError),
    #[error("mesh '{name}' is invalid")]
    Mesh {
        name: String,
        #[source]
        source: MeshError,
    },
}

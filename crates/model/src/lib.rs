//! Turns imported scene graphs into flat lists of GPU-resident meshes.
//!
//! [`ModelLoader`] walks the scene pre-order, converts each mesh into
//! interleaved [`Vertex`] data, resolves material textures through a per-model
//! [`TextureCache`] and uploads everything through a [`gfx::GraphicsDevice`].

pub mod error;
pub mod loader;
pub mod mesh;
pub mod model;
pub mod texture;
pub mod vertex;

#[cfg(test)]
mod testing;

pub use error::{MeshError, ModelError, SceneError, TextureError};
pub use loader::{LoadOptions, MATERIAL_SLOTS, MissingTexturePolicy, ModelLoader};
pub use mesh::Mesh;
pub use model::Model;
pub use texture::{PLACEHOLDER_PATH, Texture, TextureCache, TextureKind};
pub use vertex::Vertex;

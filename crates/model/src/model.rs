use std::path::{Path, PathBuf};

use gfx::ShaderProgram;

use crate::error::SceneError;
use crate::mesh::Mesh;
use crate::texture::TextureCache;

/// A loaded scene: meshes in draw order plus the textures they share.
///
/// Dropping the model releases every vertex array and, once no mesh holds
/// them anymore, every cached texture.
#[derive(Debug)]
pub struct Model {
    meshes: Vec<Mesh>,
    textures: TextureCache,
    directory: PathBuf,
    load_failure: Option<SceneError>,
}

impl Model {
    pub(crate) fn new(meshes: Vec<Mesh>, textures: TextureCache, directory: PathBuf) -> Self {
        Self {
            meshes,
            textures,
            directory,
            load_failure: None,
        }
    }

    pub(crate) fn empty(textures: TextureCache, directory: PathBuf, reason: SceneError) -> Self {
        Self {
            meshes: Vec::new(),
            textures,
            directory,
            load_failure: Some(reason),
        }
    }

    /// Draws every mesh in flattened order with `program`.
    pub fn draw(&self, program: &dyn ShaderProgram) {
        for mesh in &self.meshes {
            mesh.draw(program);
        }
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn textures(&self) -> &TextureCache {
        &self.textures
    }

    /// Directory of the source file; texture paths resolve against it.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Why the scene produced no meshes, if it was rejected.
    pub fn load_failure(&self) -> Option<&SceneError> {
        self.load_failure.as_ref()
    }
}

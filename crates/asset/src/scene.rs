//! Importer-agnostic scene graph handed to the model loader.

use std::collections::BTreeMap;
use std::path::Path;

/// Texture slot on a material, named after the exporter's channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TextureChannel {
    Diffuse,
    Specular,
    Ambient,
    /// Height / bump maps.
    Height,
    Normals,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Material {
    pub name: String,
    /// Relative texture paths per channel, in declaration order.
    pub textures: BTreeMap<TextureChannel, Vec<String>>,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            textures: BTreeMap::new(),
        }
    }

    pub fn add_texture(&mut self, channel: TextureChannel, path: impl Into<String>) {
        self.textures.entry(channel).or_default().push(path.into());
    }

    pub fn texture_count(&self, channel: TextureChannel) -> usize {
        self.textures.get(&channel).map_or(0, Vec::len)
    }

    pub fn textures(&self, channel: TextureChannel) -> &[String] {
        self.textures.get(&channel).map_or(&[], Vec::as_slice)
    }
}

/// Mesh as the importer produced it, attributes as parallel arrays.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawMesh {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    /// Empty when the source carries no normals.
    pub normals: Vec<[f32; 3]>,
    /// First UV channel, if any.
    pub tex_coords: Option<Vec<[f32; 2]>>,
    pub tangents: Option<Vec<[f32; 3]>>,
    pub bitangents: Option<Vec<[f32; 3]>>,
    /// Polygon index lists into the vertex arrays.
    pub faces: Vec<Vec<u32>>,
    pub material_index: Option<usize>,
}

impl RawMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SceneNode {
    pub name: String,
    /// Indices into [`SceneGraph::meshes`].
    pub meshes: Vec<usize>,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SceneGraph {
    pub root: Option<SceneNode>,
    pub meshes: Vec<RawMesh>,
    pub materials: Vec<Material>,
    /// Set when the importer could not produce a complete scene.
    pub incomplete: bool,
}

/// Post-processing applied by importers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImportOptions {
    /// Split polygons into triangles.
    pub triangulate: bool,
    /// Flip V so the texture origin is the upper-left corner.
    pub flip_uvs: bool,
    /// Derive tangents and bitangents from positions and UVs.
    pub calc_tangent_space: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            triangulate: true,
            flip_uvs: true,
            calc_tangent_space: true,
        }
    }
}

/// Parses a scene file into a [`SceneGraph`].
pub trait SceneImporter {
    fn import(&self, path: &Path) -> anyhow::Result<SceneGraph>;
}

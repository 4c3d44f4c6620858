use std::fmt;
use std::rc::Rc;

use gfx::{BufferUsage, GeometryUpload, ShaderProgram, SharedDevice, VertexArrayId};

use crate::error::MeshError;
use crate::texture::{Texture, TextureKind};
use crate::vertex::Vertex;

/// Immutable draw unit owning its GPU vertex array.
pub struct Mesh {
    name: String,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    textures: Vec<Rc<Texture>>,
    vertex_array: VertexArrayId,
    device: SharedDevice,
}

impl Mesh {
    /// Validates indices and uploads vertex/index data once as static buffers.
    pub fn new(
        device: SharedDevice,
        name: impl Into<String>,
        vertices: Vec<Vertex>,
        indices: Vec<u32>,
        textures: Vec<Rc<Texture>>,
    ) -> Result<Self, MeshError> {
        if let Some((position, &index)) = indices
            .iter()
            .enumerate()
            .find(|&(_, &index)| index as usize >= vertices.len())
        {
            return Err(MeshError::IndexOutOfBounds {
                index,
                position,
                vertex_count: vertices.len(),
            });
        }

        let name = name.into();
        let vertex_array = device.create_vertex_array(&GeometryUpload {
            label: &name,
            layout: Vertex::LAYOUT,
            vertices: bytemuck::cast_slice(&vertices),
            indices: &indices,
            usage: BufferUsage::Static,
        })?;

        Ok(Self {
            name,
            vertices,
            indices,
            textures,
            vertex_array,
            device,
        })
    }

    /// Binds every texture to consecutive units, names the samplers
    /// `texture_<kind>N` with a counter per kind, and draws all indices.
    ///
    /// Leaves the vertex array unbound and unit 0 active.
    pub fn draw(&self, program: &dyn ShaderProgram) {
        let mut counters = [0u32; TextureKind::ALL.len()];
        for (unit, texture) in self.textures.iter().enumerate() {
            let unit = unit as u32;
            self.device.active_texture(unit);

            let count = &mut counters[texture.kind().index()];
            *count += 1;
            let name = format!("texture_{}{}", texture.kind().label(), count);
            program.set_int(&name, unit as i32);

            self.device.bind_texture(texture.id());
        }

        self.device.bind_vertex_array(Some(self.vertex_array));
        self.device.draw_elements(self.indices.len() as u32);
        self.device.bind_vertex_array(None);
        self.device.active_texture(0);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn textures(&self) -> &[Rc<Texture>] {
        &self.textures
    }

    pub fn vertex_array(&self) -> VertexArrayId {
        self.vertex_array
    }
}

impl fmt::Debug for Mesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mesh")
            .field("name", &self.name)
            .field("vertices", &self.vertices.len())
            .field("indices", &self.indices.len())
            .field("textures", &self.textures)
            .field("vertex_array", &self.vertex_array)
            .finish()
    }
}

impl Drop for Mesh {
    fn drop(&mut self) {
        self.device.delete_vertex_array(self.vertex_array);
    }
}

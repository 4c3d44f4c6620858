use std::mem::{offset_of, size_of};

use bytemuck::{Pod, Zeroable};
use gfx::{VertexAttribute, VertexLayout};

/// Interleaved mesh vertex as uploaded to the GPU.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub bitangent: [f32; 3],
    pub tex_coords: [f32; 2],
}

impl Vertex {
    /// Shader locations: 0 position, 1 normal, 2 tex coords, 3 tangent, 4 bitangent.
    pub const ATTRIBUTES: &'static [VertexAttribute] = &[
        VertexAttribute {
            location: 0,
            components: 3,
            offset: offset_of!(Vertex, position),
        },
        VertexAttribute {
            location: 1,
            components: 3,
            offset: offset_of!(Vertex, normal),
        },
        VertexAttribute {
            location: 2,
            components: 2,
            offset: offset_of!(Vertex, tex_coords),
        },
        VertexAttribute {
            location: 3,
            components: 3,
            offset: offset_of!(Vertex, tangent),
        },
        VertexAttribute {
            location: 4,
            components: 3,
            offset: offset_of!(Vertex, bitangent),
        },
    ];

    pub const LAYOUT: VertexLayout = VertexLayout {
        stride: size_of::<Vertex>(),
        attributes: Self::ATTRIBUTES,
    };
}

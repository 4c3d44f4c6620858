//! Headless backend that records every call instead of talking to a GPU.
//!
//! Used for tooling that only needs the CPU side of loading, and by tests to
//! assert on the exact sequence of context operations.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;

use crate::{
    GeometryUpload, GfxResult, GraphicsDevice, PixelFormat, ShaderProgram, TextureId,
    TextureUpload, UniformValue, VertexArrayId,
};

#[derive(Clone, Debug, PartialEq)]
pub enum DeviceCall {
    CreateTexture {
        id: TextureId,
        label: String,
        width: u32,
        height: u32,
        format: PixelFormat,
    },
    DeleteTexture(TextureId),
    CreateVertexArray {
        id: VertexArrayId,
        vertex_count: usize,
        index_count: usize,
    },
    DeleteVertexArray(VertexArrayId),
    ActiveTexture(u32),
    BindTexture(TextureId),
    BindVertexArray(Option<VertexArrayId>),
    DrawElements(u32),
}

#[derive(Default)]
pub struct RecordingDevice {
    calls: RefCell<Vec<DeviceCall>>,
    next_id: Cell<u32>,
    live_textures: RefCell<BTreeSet<u32>>,
    live_vertex_arrays: RefCell<BTreeSet<u32>>,
    active_unit: Cell<u32>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn live_textures(&self) -> usize {
        self.live_textures.borrow().len()
    }

    pub fn live_vertex_arrays(&self) -> usize {
        self.live_vertex_arrays.borrow().len()
    }

    pub fn active_unit(&self) -> u32 {
        self.active_unit.get()
    }

    /// Recorded calls that touch draw state, without object creation/deletion.
    pub fn draw_calls(&self) -> Vec<DeviceCall> {
        self.calls
            .borrow()
            .iter()
            .filter(|call| {
                matches!(
                    call,
                    DeviceCall::ActiveTexture(_)
                        | DeviceCall::BindTexture(_)
                        | DeviceCall::BindVertexArray(_)
                        | DeviceCall::DrawElements(_)
                )
            })
            .cloned()
            .collect()
    }

    fn alloc_id(&self) -> u32 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    fn record(&self, call: DeviceCall) {
        log::trace!("gfx call: {call:?}");
        self.calls.borrow_mut().push(call);
    }
}

impl GraphicsDevice for RecordingDevice {
    fn create_texture(&self, upload: &TextureUpload<'_>) -> GfxResult<TextureId> {
        upload.validate()?;
        let id = TextureId(self.alloc_id());
        self.live_textures.borrow_mut().insert(id.0);
        self.record(DeviceCall::CreateTexture {
            id,
            label: upload.label.to_owned(),
            width: upload.width,
            height: upload.height,
            format: upload.format,
        });
        Ok(id)
    }

    fn delete_texture(&self, id: TextureId) {
        self.live_textures.borrow_mut().remove(&id.0);
        self.record(DeviceCall::DeleteTexture(id));
    }

    fn create_vertex_array(&self, upload: &GeometryUpload<'_>) -> GfxResult<VertexArrayId> {
        upload.validate()?;
        let id = VertexArrayId(self.alloc_id());
        self.live_vertex_arrays.borrow_mut().insert(id.0);
        self.record(DeviceCall::CreateVertexArray {
            id,
            vertex_count: upload.vertices.len() / upload.layout.stride,
            index_count: upload.indices.len(),
        });
        Ok(id)
    }

    fn delete_vertex_array(&self, id: VertexArrayId) {
        self.live_vertex_arrays.borrow_mut().remove(&id.0);
        self.record(DeviceCall::DeleteVertexArray(id));
    }

    fn active_texture(&self, unit: u32) {
        self.active_unit.set(unit);
        self.record(DeviceCall::ActiveTexture(unit));
    }

    fn bind_texture(&self, id: TextureId) {
        self.record(DeviceCall::BindTexture(id));
    }

    fn bind_vertex_array(&self, id: Option<VertexArrayId>) {
        self.record(DeviceCall::BindVertexArray(id));
    }

    fn draw_elements(&self, index_count: u32) {
        self.record(DeviceCall::DrawElements(index_count));
    }
}

/// Program that remembers uniform writes in order.
#[derive(Default)]
pub struct RecordingProgram {
    writes: RefCell<Vec<(String, UniformValue)>>,
    binds: Cell<usize>,
}

impl RecordingProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<(String, UniformValue)> {
        self.writes.borrow().clone()
    }

    /// Names of uniforms written, in write order.
    pub fn names(&self) -> Vec<String> {
        self.writes.borrow().iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn bind_count(&self) -> usize {
        self.binds.get()
    }
}

impl ShaderProgram for RecordingProgram {
    fn bind(&self) {
        self.binds.set(self.binds.get() + 1);
    }

    fn set_uniform(&self, name: &str, value: UniformValue) {
        self.writes.borrow_mut().push((name.to_owned(), value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BufferUsage, VertexAttribute, VertexLayout};

    #[test]
    fn tracks_live_objects() {
        let device = RecordingDevice::new();
        let pixels = [255u8; 4];
        let tex = device
            .create_texture(&TextureUpload {
                label: "white",
                width: 1,
                height: 1,
                format: PixelFormat::Rgba8,
                pixels: &pixels,
            })
            .expect("texture");

        const ATTRS: &[VertexAttribute] = &[VertexAttribute {
            location: 0,
            components: 1,
            offset: 0,
        }];
        let vertices = [0u8; 12];
        let vao = device
            .create_vertex_array(&GeometryUpload {
                label: "points",
                layout: VertexLayout {
                    stride: 4,
                    attributes: ATTRS,
                },
                vertices: &vertices,
                indices: &[0, 1, 2],
                usage: BufferUsage::Static,
            })
            .expect("vertex array");

        assert_ne!(tex.0, vao.0);
        assert_eq!(device.live_textures(), 1);
        assert_eq!(device.live_vertex_arrays(), 1);

        device.delete_texture(tex);
        device.delete_vertex_array(vao);
        assert_eq!(device.live_textures(), 0);
        assert_eq!(device.live_vertex_arrays(), 0);
    }

    #[test]
    fn program_records_uniform_writes() {
        let program = RecordingProgram::new();
        program.bind();
        program.set_int("texture_diffuse1", 0);
        program.set_float("shininess", 32.0);
        assert_eq!(program.bind_count(), 1);
        assert_eq!(program.names(), vec!["texture_diffuse1", "shininess"]);
        assert_eq!(program.writes()[0].1, UniformValue::Int(0));
    }
}

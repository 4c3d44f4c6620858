//! [`GraphicsDevice`] on top of wgpu.
//!
//! Bind-then-draw calls are emulated: the device tracks texture units, the
//! bound vertex array and the bound program, and every `draw_elements`
//! snapshots that state into a [`DrawCommand`]. [`WgpuDevice::encode`] later
//! replays the recorded draws into a render pass.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::rc::Rc;

use gfx::{
    BufferUsage, GeometryUpload, GfxError, GfxResult, GraphicsDevice, PixelFormat, TextureId,
    TextureUpload, VertexArrayId, VertexLayout,
};
use wgpu::util::DeviceExt;

use crate::program::ProgramState;

/// Attachment formats pipelines are built against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderTarget {
    pub color: wgpu::TextureFormat,
    pub depth: Option<wgpu::TextureFormat>,
}

impl Default for RenderTarget {
    fn default() -> Self {
        Self {
            color: wgpu::TextureFormat::Rgba8UnormSrgb,
            depth: Some(wgpu::TextureFormat::Depth32Float),
        }
    }
}

struct GpuTexture {
    // Kept alive for the view.
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct GpuGeometry {
    layout: VertexLayout,
    vertex_buf: wgpu::Buffer,
    index_buf: wgpu::Buffer,
    index_count: u32,
}

impl GpuGeometry {
    /// wgpu rejects empty buffer slices, so such geometry is never bound.
    fn is_drawable(&self) -> bool {
        self.vertex_buf.size() > 0 && self.index_buf.size() > 0
    }
}

/// One recorded draw with the state that was bound when it was issued.
pub(crate) struct DrawCommand {
    program: Rc<ProgramState>,
    vertex_array: VertexArrayId,
    index_count: u32,
    uniforms: Vec<u8>,
    /// Texture per sampler slot of the program, `None` when nothing was bound.
    textures: Vec<Option<TextureId>>,
}

pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target: RenderTarget,
    sampler: wgpu::Sampler,
    fallback: GpuTexture,
    next_id: Cell<u32>,
    textures: RefCell<HashMap<u32, GpuTexture>>,
    vertex_arrays: RefCell<HashMap<u32, GpuGeometry>>,
    units: RefCell<Vec<Option<TextureId>>>,
    active_unit: Cell<u32>,
    bound_vertex_array: Cell<Option<VertexArrayId>>,
    bound_program: RefCell<Option<Rc<ProgramState>>>,
    draws: RefCell<Vec<DrawCommand>>,
}

impl WgpuDevice {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, target: RenderTarget) -> Rc<Self> {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Mesh sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let fallback = upload_texture(
            &device,
            &queue,
            "Fallback white",
            1,
            1,
            wgpu::TextureFormat::Rgba8Unorm,
            &[255; 4],
        );

        Rc::new(Self {
            device,
            queue,
            target,
            sampler,
            fallback,
            next_id: Cell::new(1),
            textures: RefCell::new(HashMap::new()),
            vertex_arrays: RefCell::new(HashMap::new()),
            units: RefCell::new(Vec::new()),
            active_unit: Cell::new(0),
            bound_vertex_array: Cell::new(None),
            bound_program: RefCell::new(None),
            draws: RefCell::new(Vec::new()),
        })
    }

    /// Device without a surface, rendering into offscreen targets.
    pub fn headless() -> GfxResult<Rc<Self>> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .map_err(|err| GfxError::Adapter(err.to_string()))?;
            log::info!("Using adapter {:?}", adapter.get_info().name);

            let (device, queue) = adapter
                .request_device(&wgpu::DeviceDescriptor {
                    label: Some("Headless device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_webgl2_defaults()
                        .using_resolution(adapter.limits()),
                    ..Default::default()
                })
                .await
                .map_err(|err| GfxError::Adapter(err.to_string()))?;
            Ok(Self::new(device, queue, RenderTarget::default()))
        })
    }

    pub fn raw(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn target(&self) -> RenderTarget {
        self.target
    }

    pub fn texture_count(&self) -> usize {
        self.textures.borrow().len()
    }

    pub fn vertex_array_count(&self) -> usize {
        self.vertex_arrays.borrow().len()
    }

    /// Draws recorded since the last [`encode`](Self::encode) or [`clear_draws`](Self::clear_draws).
    pub fn pending_draws(&self) -> usize {
        self.draws.borrow().len()
    }

    pub fn clear_draws(&self) {
        self.draws.borrow_mut().clear();
    }

    pub(crate) fn bind_program(&self, program: Rc<ProgramState>) {
        self.bound_program.replace(Some(program));
    }

    /// Replays and drains the recorded draws into `pass`.
    pub fn encode(&self, pass: &mut wgpu::RenderPass<'_>) {
        let draws = std::mem::take(&mut *self.draws.borrow_mut());
        if draws.is_empty() {
            return;
        }

        let align = u64::from(self.device.limits().min_uniform_buffer_offset_alignment);
        let mut bytes = Vec::new();
        let mut offsets = Vec::with_capacity(draws.len());
        for draw in &draws {
            let offset = align_to(bytes.len() as u64, align);
            bytes.resize(offset as usize, 0);
            bytes.extend_from_slice(&draw.uniforms);
            offsets.push(offset);
        }
        let uniform_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Frame uniforms"),
                contents: &bytes,
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let textures = self.textures.borrow();
        let vertex_arrays = self.vertex_arrays.borrow();
        for (draw, offset) in draws.iter().zip(offsets) {
            let Some(geometry) = vertex_arrays.get(&draw.vertex_array.0) else {
                log::warn!("Skipping draw of deleted vertex array {:?}", draw.vertex_array);
                continue;
            };
            if !geometry.is_drawable() || draw.index_count == 0 {
                continue;
            }
            let program = &draw.program;

            let uniform_bg = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Uniform BG"),
                layout: program.uniform_bgl(),
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &uniform_buf,
                        offset,
                        size: NonZeroU64::new(draw.uniforms.len() as u64),
                    }),
                }],
            });

            let mut bind_entries = Vec::with_capacity(draw.textures.len() * 2);
            for (slot, texture) in draw.textures.iter().enumerate() {
                let gpu = texture
                    .and_then(|id| textures.get(&id.0))
                    .unwrap_or(&self.fallback);
                let binding = slot as u32 * 2;
                bind_entries.push(wgpu::BindGroupEntry {
                    binding,
                    resource: wgpu::BindingResource::TextureView(&gpu.view),
                });
                bind_entries.push(wgpu::BindGroupEntry {
                    binding: binding + 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                });
            }
            let texture_bg = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Texture BG"),
                layout: program.texture_bgl(),
                entries: &bind_entries,
            });

            pass.set_pipeline(program.pipeline());
            pass.set_bind_group(0, &uniform_bg, &[]);
            pass.set_bind_group(1, &texture_bg, &[]);
            pass.set_vertex_buffer(0, geometry.vertex_buf.slice(..));
            pass.set_index_buffer(geometry.index_buf.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..draw.index_count, 0, 0..1);
        }
    }

    /// Clears `color` (and `depth`), replays the recorded draws and submits.
    pub fn submit_frame(
        &self,
        color: &wgpu::TextureView,
        depth: Option<&wgpu::TextureView>,
        clear: wgpu::Color,
    ) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Model pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: depth.map(|view| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            self.encode(&mut pass);
        }
        self.queue.submit(Some(encoder.finish()));
    }

    fn alloc_id(&self) -> u32 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

}

impl GraphicsDevice for WgpuDevice {
    fn create_texture(&self, upload: &TextureUpload<'_>) -> GfxResult<TextureId> {
        upload.validate()?;
        let max = self.device.limits().max_texture_dimension_2d;
        if upload.width > max || upload.height > max {
            return Err(GfxError::TextureTooLarge {
                width: upload.width,
                height: upload.height,
                max,
            });
        }
        let (format, pixels) = match upload.format {
            PixelFormat::R8 => (wgpu::TextureFormat::R8Unorm, upload.pixels.to_vec()),
            PixelFormat::Rgb8 => (wgpu::TextureFormat::Rgba8Unorm, expand_rgb(upload.pixels)),
            PixelFormat::Rgba8 => (wgpu::TextureFormat::Rgba8Unorm, upload.pixels.to_vec()),
        };
        let texture = upload_texture(
            &self.device,
            &self.queue,
            upload.label,
            upload.width,
            upload.height,
            format,
            &pixels,
        );

        let id = self.alloc_id();
        self.textures.borrow_mut().insert(id, texture);
        log::debug!(
            "Created texture {} '{}' ({}x{} {:?})",
            id,
            upload.label,
            upload.width,
            upload.height,
            format
        );
        Ok(TextureId(id))
    }

    fn delete_texture(&self, id: TextureId) {
        if self.textures.borrow_mut().remove(&id.0).is_none() {
            log::warn!("delete_texture: unknown texture {}", id.0);
        }
        for unit in self.units.borrow_mut().iter_mut() {
            if *unit == Some(id) {
                *unit = None;
            }
        }
    }

    fn create_vertex_array(&self, upload: &GeometryUpload<'_>) -> GfxResult<VertexArrayId> {
        upload.validate()?;
        let extra = match upload.usage {
            BufferUsage::Static => wgpu::BufferUsages::empty(),
            BufferUsage::Dynamic => wgpu::BufferUsages::COPY_DST,
        };
        let vertex_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(upload.label),
                contents: upload.vertices,
                usage: wgpu::BufferUsages::VERTEX | extra,
            });
        let index_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(upload.label),
                contents: bytemuck::cast_slice(upload.indices),
                usage: wgpu::BufferUsages::INDEX | extra,
            });

        let id = self.alloc_id();
        self.vertex_arrays.borrow_mut().insert(
            id,
            GpuGeometry {
                layout: upload.layout,
                vertex_buf,
                index_buf,
                index_count: upload.indices.len() as u32,
            },
        );
        Ok(VertexArrayId(id))
    }

    fn delete_vertex_array(&self, id: VertexArrayId) {
        if self.vertex_arrays.borrow_mut().remove(&id.0).is_none() {
            log::warn!("delete_vertex_array: unknown vertex array {}", id.0);
        }
        if self.bound_vertex_array.get() == Some(id) {
            self.bound_vertex_array.set(None);
        }
    }

    fn active_texture(&self, unit: u32) {
        self.active_unit.set(unit);
    }

    fn bind_texture(&self, id: TextureId) {
        let unit = self.active_unit.get() as usize;
        let mut units = self.units.borrow_mut();
        if units.len() <= unit {
            units.resize(unit + 1, None);
        }
        units[unit] = Some(id);
    }

    fn bind_vertex_array(&self, id: Option<VertexArrayId>) {
        self.bound_vertex_array.set(id);
    }

    fn draw_elements(&self, index_count: u32) {
        let Some(vertex_array) = self.bound_vertex_array.get() else {
            log::warn!("draw_elements without a bound vertex array");
            return;
        };
        let Some(program) = self.bound_program.borrow().clone() else {
            log::warn!("draw_elements without a bound program");
            return;
        };
        if index_count == 0 {
            log::debug!("Skipping empty draw of vertex array {}", vertex_array.0);
            return;
        }
        {
            let vertex_arrays = self.vertex_arrays.borrow();
            let Some(geometry) = vertex_arrays.get(&vertex_array.0) else {
                log::warn!("draw_elements on unknown vertex array {}", vertex_array.0);
                return;
            };
            if geometry.layout != program.vertex_layout() {
                log::warn!(
                    "Vertex array {} does not match the layout of program '{}'",
                    vertex_array.0,
                    program.label()
                );
                return;
            }
            if !geometry.is_drawable() {
                log::debug!("Skipping draw of empty vertex array {}", vertex_array.0);
                return;
            }
            if index_count > geometry.index_count {
                log::warn!(
                    "draw_elements of {} indices exceeds the {} in vertex array {}",
                    index_count,
                    geometry.index_count,
                    vertex_array.0
                );
                return;
            }
        }

        let units = self.units.borrow();
        let textures = program
            .sampler_units()
            .into_iter()
            .map(|unit| units.get(unit as usize).copied().flatten())
            .collect();
        self.draws.borrow_mut().push(DrawCommand {
            uniforms: program.uniform_bytes(),
            program,
            vertex_array,
            index_count,
            textures,
        });
    }
}

fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    pixels: &[u8],
) -> GpuTexture {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let bytes_per_pixel = format.block_copy_size(None).unwrap_or(4);
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        pixels,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * bytes_per_pixel),
            rows_per_image: Some(height),
        },
        size,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture {
        _texture: texture,
        view,
    }
}

/// RGB rows widened to RGBA with opaque alpha; wgpu has no 24-bit format.
fn expand_rgb(pixels: &[u8]) -> Vec<u8> {
    pixels
        .chunks_exact(3)
        .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], 255])
        .collect()
}

fn align_to(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}

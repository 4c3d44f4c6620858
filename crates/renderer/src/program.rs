//! WGSL programs with GL-style named uniforms.
//!
//! Shader contract: `vs_main`/`fs_main` entry points, a single uniform struct
//! at `@group(0) @binding(0)` whose members follow [`ProgramDesc::uniforms`]
//! in order, and for the n-th name in [`ProgramDesc::samplers`] a
//! `texture_2d<f32>` at `@group(1) @binding(2n)` with its sampler at
//! `@binding(2n + 1)`. Bool uniforms are declared as `u32`.

use std::cell::RefCell;
use std::num::NonZeroU64;
use std::rc::Rc;

use gfx::{GfxError, GfxResult, ShaderProgram, UniformValue, VertexLayout};

use crate::device::WgpuDevice;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformKind {
    Bool,
    Int,
    Float,
    Vec3,
    Mat4,
}

impl UniformKind {
    /// WGSL host-shareable (align, size) in bytes.
    fn layout(self) -> (usize, usize) {
        match self {
            Self::Bool | Self::Int | Self::Float => (4, 4),
            Self::Vec3 => (16, 12),
            Self::Mat4 => (16, 64),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct UniformField<'a> {
    pub name: &'a str,
    pub kind: UniformKind,
}

#[derive(Clone, Copy, Debug)]
pub struct ProgramDesc<'a> {
    pub label: &'a str,
    pub source: &'a str,
    pub uniforms: &'a [UniformField<'a>],
    pub samplers: &'a [&'a str],
    pub layout: VertexLayout,
}

#[derive(Clone, Debug, PartialEq)]
struct UniformSlot {
    name: String,
    kind: UniformKind,
    offset: usize,
}

/// Byte layout of the uniform struct.
#[derive(Clone, Debug, PartialEq)]
struct UniformBlock {
    slots: Vec<UniformSlot>,
    size: usize,
}

impl UniformBlock {
    fn new(fields: &[UniformField<'_>]) -> Self {
        let mut cursor = 0usize;
        let slots = fields
            .iter()
            .map(|field| {
                let (align, size) = field.kind.layout();
                let offset = cursor.next_multiple_of(align);
                cursor = offset + size;
                UniformSlot {
                    name: field.name.to_owned(),
                    kind: field.kind,
                    offset,
                }
            })
            .collect();
        Self {
            slots,
            size: cursor.next_multiple_of(16).max(16),
        }
    }

    fn slot(&self, name: &str) -> Option<&UniformSlot> {
        self.slots.iter().find(|slot| slot.name == name)
    }
}

/// Bytes for `value` if it can be stored in a uniform of `kind`.
fn encode_value(kind: UniformKind, value: UniformValue) -> Option<Vec<u8>> {
    let bytes = match (kind, value) {
        (UniformKind::Bool, UniformValue::Bool(b)) => bytemuck::bytes_of(&u32::from(b)).to_vec(),
        (UniformKind::Int, UniformValue::Int(i)) => bytemuck::bytes_of(&i).to_vec(),
        (UniformKind::Float, UniformValue::Float(f)) => bytemuck::bytes_of(&f).to_vec(),
        (UniformKind::Vec3, UniformValue::Vec3(v)) => bytemuck::cast_slice(&v.to_array()).to_vec(),
        (UniformKind::Mat4, UniformValue::Mat4(m)) => {
            bytemuck::cast_slice(&m.to_cols_array()).to_vec()
        }
        _ => return None,
    };
    Some(bytes)
}

fn vertex_format(components: u32) -> Option<wgpu::VertexFormat> {
    match components {
        1 => Some(wgpu::VertexFormat::Float32),
        2 => Some(wgpu::VertexFormat::Float32x2),
        3 => Some(wgpu::VertexFormat::Float32x3),
        4 => Some(wgpu::VertexFormat::Float32x4),
        _ => None,
    }
}

/// Pipeline plus the CPU copy of its uniform values.
pub(crate) struct ProgramState {
    label: String,
    pipeline: wgpu::RenderPipeline,
    uniform_bgl: wgpu::BindGroupLayout,
    texture_bgl: wgpu::BindGroupLayout,
    vertex_layout: VertexLayout,
    block: UniformBlock,
    bytes: RefCell<Vec<u8>>,
    samplers: Vec<String>,
    /// Texture unit each sampler reads; unset samplers read unit 0.
    sampler_units: RefCell<Vec<u32>>,
}

impl ProgramState {
    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn pipeline(&self) -> &wgpu::RenderPipeline {
        &self.pipeline
    }

    pub(crate) fn uniform_bgl(&self) -> &wgpu::BindGroupLayout {
        &self.uniform_bgl
    }

    pub(crate) fn texture_bgl(&self) -> &wgpu::BindGroupLayout {
        &self.texture_bgl
    }

    pub(crate) fn vertex_layout(&self) -> VertexLayout {
        self.vertex_layout
    }

    pub(crate) fn uniform_bytes(&self) -> Vec<u8> {
        self.bytes.borrow().clone()
    }

    pub(crate) fn sampler_units(&self) -> Vec<u32> {
        self.sampler_units.borrow().clone()
    }

    fn set(&self, name: &str, value: UniformValue) {
        if let Some(index) = self.samplers.iter().position(|s| s == name) {
            match value {
                UniformValue::Int(unit) if unit >= 0 => {
                    self.sampler_units.borrow_mut()[index] = unit as u32;
                }
                other => log::warn!("Program '{}': sampler {} set to {:?}", self.label, name, other),
            }
            return;
        }

        let Some(slot) = self.block.slot(name) else {
            log::trace!("Program '{}' has no uniform {}", self.label, name);
            return;
        };
        match encode_value(slot.kind, value) {
            Some(encoded) => {
                self.bytes.borrow_mut()[slot.offset..slot.offset + encoded.len()]
                    .copy_from_slice(&encoded);
            }
            None => log::warn!(
                "Program '{}': uniform {} is {:?}, got {:?}",
                self.label,
                name,
                slot.kind,
                value
            ),
        }
    }
}

/// [`ShaderProgram`] compiled from WGSL for a [`WgpuDevice`].
pub struct WgslProgram {
    device: Rc<WgpuDevice>,
    state: Rc<ProgramState>,
}

impl WgslProgram {
    /// Compiles `desc.source` and builds its pipeline for the device's render target.
    pub fn new(device: Rc<WgpuDevice>, desc: &ProgramDesc<'_>) -> GfxResult<Self> {
        let shader_error = |message: String| GfxError::Shader {
            label: desc.label.to_owned(),
            message,
        };

        let mut attributes = Vec::with_capacity(desc.layout.attributes.len());
        for attribute in desc.layout.attributes {
            let format = vertex_format(attribute.components).ok_or_else(|| {
                shader_error(format!(
                    "attribute {} has {} components",
                    attribute.location, attribute.components
                ))
            })?;
            attributes.push(wgpu::VertexAttribute {
                format,
                offset: attribute.offset as u64,
                shader_location: attribute.location,
            });
        }

        let block = UniformBlock::new(desc.uniforms);
        let raw = device.raw();
        let target = device.target();

        raw.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = raw.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.label),
            source: wgpu::ShaderSource::Wgsl(desc.source.into()),
        });

        let uniform_bgl = raw.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Uniform BGL"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(block.size as u64),
                },
                count: None,
            }],
        });

        let texture_entries: Vec<_> = (0..desc.samplers.len() as u32)
            .flat_map(|slot| {
                [
                    wgpu::BindGroupLayoutEntry {
                        binding: slot * 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: slot * 2 + 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ]
            })
            .collect();
        let texture_bgl = raw.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Texture BGL"),
            entries: &texture_entries,
        });

        let pipeline_layout = raw.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(desc.label),
            bind_group_layouts: &[&uniform_bgl, &texture_bgl],
            push_constant_ranges: &[],
        });
        let pipeline = raw.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(desc.label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: desc.layout.stride as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &attributes,
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target.color,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: target.depth.map(|format| wgpu::DepthStencilState {
                format,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        if let Some(err) = pollster::block_on(raw.pop_error_scope()) {
            return Err(shader_error(err.to_string()));
        }
        log::debug!(
            "Built program '{}' ({} uniform bytes, {} samplers)",
            desc.label,
            block.size,
            desc.samplers.len()
        );

        let state = ProgramState {
            label: desc.label.to_owned(),
            pipeline,
            uniform_bgl,
            texture_bgl,
            vertex_layout: desc.layout,
            bytes: RefCell::new(vec![0; block.size]),
            block,
            samplers: desc.samplers.iter().map(|s| (*s).to_owned()).collect(),
            sampler_units: RefCell::new(vec![0; desc.samplers.len()]),
        };
        Ok(Self {
            device,
            state: Rc::new(state),
        })
    }

    pub fn label(&self) -> &str {
        &self.state.label
    }
}

impl ShaderProgram for WgslProgram {
    fn bind(&self) {
        self.device.bind_program(Rc::clone(&self.state));
    }

    fn set_uniform(&self, name: &str, value: UniformValue) {
        self.state.set(name, value);
    }
}

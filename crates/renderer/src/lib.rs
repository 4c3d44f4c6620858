//! wgpu backend for the `gfx` device abstraction.
//!
//! [`WgpuDevice`] owns GPU objects and records draws issued through the
//! [`gfx::GraphicsDevice`] calls; [`WgslProgram`] maps named uniforms onto a
//! WGSL uniform struct and sampler bindings.

pub mod device;
pub mod program;

pub use device::{RenderTarget, WgpuDevice};
pub use program::{ProgramDesc, UniformField, UniformKind, WgslProgram};

/// Textured mesh shader for the model crate's vertex layout. Uniforms:
/// `model`, `view`, `projection` (all mat4); samplers: `texture_diffuse1`.
pub const MESH_SHADER: &str = include_str!("shaders/mesh.wgsl");

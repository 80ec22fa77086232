//! Graphics backend seam.
//!
//! The frame renderer talks to the GPU through [`GpuBackend`], a small
//! handle-based API shaped after the calls a textured-quad preview needs:
//! compile a program, create and fill textures, set the viewport, draw and
//! delete. Handles are plain integers so the renderer can hold on to them
//! across surface recreation and compare them in tests.
//!
//! - `context` owns the wgpu instance, device and surface configuration.
//! - `pipeline` turns GLSL into a render pipeline and reflects attribute and
//!   uniform locations out of the sources.
//! - `textures` keeps the per-handle wgpu texture, sampler and bind group.
//! - `backend` implements [`GpuBackend`] on top of the three.

mod backend;
mod context;
mod pipeline;
mod textures;

use std::fmt;

pub use backend::WgpuBackend;
pub(crate) use pipeline::reflect_location;

/// Stage a shader source belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShaderError {
    #[error("{stage} shader failed to compile: {log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("program failed to link: {0}")]
    Link(String),
}

/// Handle to a linked shader program. `0` is never a valid program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(u32);

impl ProgramHandle {
    pub const INVALID: Self = Self(0);

    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// Handle to a backend texture. `0` is never a valid texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(u32);

impl TextureHandle {
    pub const INVALID: Self = Self(0);

    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFilter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureWrap {
    ClampToEdge,
    Repeat,
}

/// Sampling parameters fixed at texture creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureParams {
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    pub wrap_s: TextureWrap,
    pub wrap_t: TextureWrap,
}

impl TextureParams {
    /// Linear filtering with clamp-to-edge wrapping on both axes.
    pub const CAMERA: Self = Self {
        min_filter: TextureFilter::Linear,
        mag_filter: TextureFilter::Linear,
        wrap_s: TextureWrap::ClampToEdge,
        wrap_t: TextureWrap::ClampToEdge,
    };
}

/// Attribute and sampler locations resolved from a linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramLocations {
    pub position: u32,
    pub tex_coord: u32,
    pub texture: u32,
}

/// Four-vertex triangle strip covering the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadGeometry {
    /// `(x, y, z)` per vertex.
    pub positions: [f32; 12],
    /// `(u, v)` per vertex.
    pub tex_coords: [f32; 8],
}

impl QuadGeometry {
    pub const VERTEX_COUNT: u32 = 4;
}

/// A single textured-quad draw.
#[derive(Debug, Clone, Copy)]
pub struct QuadDraw<'a> {
    pub program: ProgramHandle,
    pub locations: ProgramLocations,
    pub texture: TextureHandle,
    pub geometry: &'a QuadGeometry,
}

/// Minimal GPU API used by the frame renderer.
///
/// Every method is called from the render thread only; implementations do
/// not need to be `Send`.
pub trait GpuBackend {
    /// Compiles both stages and links them into a program.
    fn compile_program(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<ProgramHandle, ShaderError>;

    fn attribute_location(&self, program: ProgramHandle, name: &str) -> Option<u32>;

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<u32>;

    fn create_texture(&mut self, params: TextureParams) -> TextureHandle;

    /// Replaces the texture contents with tightly packed RGBA rows.
    fn upload_texture(
        &mut self,
        texture: TextureHandle,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> anyhow::Result<()>;

    fn set_viewport(&mut self, width: u32, height: u32);

    /// Clears the target, draws the quad and presents.
    fn draw_quad(&mut self, draw: &QuadDraw<'_>) -> anyhow::Result<()>;

    fn delete_texture(&mut self, texture: TextureHandle);

    fn delete_program(&mut self, program: ProgramHandle);
}

//! Camera frame pipeline for edgecam.
//!
//! Frames arrive from a [`FrameSource`] on a capture thread, are handed to the
//! render thread through a latest-wins slot, converted to RGBA, optionally run
//! through an edge-detection filter and drawn as a textured quad:
//!
//! ```text
//!   FrameSource ──▶ CaptureThread ──▶ SurfaceViewHost::request_frame_update
//!                        │                      │ FrameSlot + RenderEvent
//!                        │ CaptureSurface       ▼
//!                        └──────────────▶ FrameRenderer (render thread)
//!                                               │ convert ─▶ ProcessingBridge
//!                                               ▼
//!                                         GpuBackend::draw_quad
//! ```
//!
//! All GPU state lives behind [`GpuBackend`] and is only touched from the render
//! thread. [`WgpuBackend`] drives a real window; tests substitute a recording
//! backend.

mod bridge;
mod buffers;
mod capture;
mod compile;
mod convert;
mod frame;
mod gpu;
mod host;
mod state;
mod stats;
mod surface;
#[cfg(test)]
mod testing;
mod types;
mod window;

pub use bridge::{EdgeProcessor, NativeProcessor, ProcessingBridge, ProcessingError, ProcessingToggle};
pub use buffers::{upload_to_gpu, PixelBuffer, PixelBuffers, TextureSet};
pub use capture::{CaptureSummary, CaptureThread};
pub use compile::{
    ShaderProgram, FRAGMENT_SHADER_GLSL, POSITION_ATTRIBUTE, QUAD, TEXTURE_UNIFORM,
    TEX_COORD_ATTRIBUTE, VERTEX_SHADER_GLSL,
};
pub use convert::{to_rgba, validate, yuv_to_rgba, FrameError};
pub use frame::{Frame, FrameSlot, FrameSource, PixelFormat, Plane};
pub use gpu::{
    GpuBackend, ProgramHandle, ProgramLocations, QuadDraw, QuadGeometry, ShaderError,
    ShaderStage, TextureFilter, TextureHandle, TextureParams, TextureWrap, WgpuBackend,
};
pub use host::{RenderStatus, SurfaceViewHost};
pub use state::{DrawOutcome, DropReason, FrameOutcome, FrameRenderer, RenderPhase, SkipReason};
pub use stats::{FrameStats, StatsSnapshot};
pub use surface::{CaptureSurface, ProvisionError, SurfaceOutcome, SurfaceReceiver, SurfaceRequest};
pub use types::{CannyThresholds, PowerPreference, ProcessingFilter, RendererConfig, Resolution};
pub use window::{run_preview, PreviewOptions};

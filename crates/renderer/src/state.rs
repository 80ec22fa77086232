//! Render-thread lifecycle.
//!
//! [`FrameRenderer`] walks through `Uninitialized -> SurfaceReady -> Sized ->
//! Rendering`, with `Destroyed` reachable from anywhere and terminal. Every GPU
//! handle it holds belongs to one surface generation: creating a new surface
//! deletes the old program and textures and builds fresh ones together.

use std::fmt;
use std::mem;

use crate::bridge::{ProcessingBridge, ProcessingError};
use crate::buffers::{upload_to_gpu, PixelBuffers, TextureSet};
use crate::compile::{ShaderProgram, QUAD};
use crate::convert::{self, FrameError};
use crate::frame::Frame;
use crate::gpu::{GpuBackend, QuadDraw};
use crate::surface::{CaptureSurface, SurfaceRequest};
use crate::types::Resolution;

/// Externally visible lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Uninitialized,
    SurfaceReady,
    Sized,
    Rendering,
    Destroyed,
}

impl fmt::Display for RenderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenderPhase::Uninitialized => "uninitialized",
            RenderPhase::SurfaceReady => "surface-ready",
            RenderPhase::Sized => "sized",
            RenderPhase::Rendering => "rendering",
            RenderPhase::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Why a frame was not uploaded.
#[derive(Debug)]
pub enum DropReason {
    /// No surface exists yet, so there are no textures to fill.
    NoSurface,
    InvalidFrame(FrameError),
    Processing(ProcessingError),
    Upload(anyhow::Error),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::NoSurface => f.write_str("no surface"),
            DropReason::InvalidFrame(err) => write!(f, "invalid frame: {err}"),
            DropReason::Processing(err) => write!(f, "processing failed: {err}"),
            DropReason::Upload(err) => write!(f, "upload failed: {err:#}"),
        }
    }
}

#[derive(Debug)]
pub enum FrameOutcome {
    Uploaded { processed: bool },
    Dropped(DropReason),
    /// The renderer was destroyed; the frame was released untouched.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotSized,
    InvalidProgram,
}

#[derive(Debug)]
pub enum DrawOutcome {
    Drawn,
    Skipped(SkipReason),
    Failed(anyhow::Error),
}

#[derive(Debug)]
struct GpuResources {
    program: ShaderProgram,
    textures: TextureSet,
}

#[derive(Debug)]
struct SizedSurface {
    resources: GpuResources,
    capture: CaptureSurface,
    viewport: Resolution,
}

#[derive(Debug)]
enum RenderState {
    Uninitialized,
    SurfaceReady(GpuResources),
    Sized(SizedSurface),
    Rendering(SizedSurface),
    Destroyed,
}

impl RenderState {
    fn resources(&self) -> Option<&GpuResources> {
        match self {
            RenderState::SurfaceReady(resources) => Some(resources),
            RenderState::Sized(sized) | RenderState::Rendering(sized) => Some(&sized.resources),
            RenderState::Uninitialized | RenderState::Destroyed => None,
        }
    }
}

/// Owns the GPU resources and drives frame upload and drawing.
///
/// All methods must be called from the thread that owns the backend.
pub struct FrameRenderer<B: GpuBackend> {
    backend: B,
    bridge: ProcessingBridge,
    buffers: PixelBuffers,
    state: RenderState,
    pending_request: Option<SurfaceRequest>,
    generation: u64,
}

impl<B: GpuBackend> FrameRenderer<B> {
    pub fn new(backend: B, bridge: ProcessingBridge) -> Self {
        Self {
            backend,
            bridge,
            buffers: PixelBuffers::new(),
            state: RenderState::Uninitialized,
            pending_request: None,
            generation: 0,
        }
    }

    pub fn phase(&self) -> RenderPhase {
        match self.state {
            RenderState::Uninitialized => RenderPhase::Uninitialized,
            RenderState::SurfaceReady(_) => RenderPhase::SurfaceReady,
            RenderState::Sized(_) => RenderPhase::Sized,
            RenderState::Rendering(_) => RenderPhase::Rendering,
            RenderState::Destroyed => RenderPhase::Destroyed,
        }
    }

    /// Number of surfaces created so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn textures(&self) -> Option<TextureSet> {
        self.state.resources().map(|resources| resources.textures)
    }

    pub fn program(&self) -> Option<ShaderProgram> {
        self.state.resources().map(|resources| resources.program)
    }

    pub fn viewport(&self) -> Option<Resolution> {
        match &self.state {
            RenderState::Sized(sized) | RenderState::Rendering(sized) => Some(sized.viewport),
            _ => None,
        }
    }

    pub fn capture_surface(&self) -> Option<&CaptureSurface> {
        match &self.state {
            RenderState::Sized(sized) | RenderState::Rendering(sized) => Some(&sized.capture),
            _ => None,
        }
    }

    pub fn buffers(&self) -> &PixelBuffers {
        &self.buffers
    }

    pub fn bridge(&self) -> &ProcessingBridge {
        &self.bridge
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn has_pending_request(&self) -> bool {
        self.pending_request.is_some()
    }

    /// A new drawing surface exists: build the program and textures for it.
    pub fn on_surface_created(&mut self) {
        match mem::replace(&mut self.state, RenderState::Uninitialized) {
            RenderState::Destroyed => {
                self.state = RenderState::Destroyed;
                tracing::warn!("surface created after cleanup; ignoring");
                return;
            }
            RenderState::Uninitialized => {}
            RenderState::SurfaceReady(resources) => self.delete_resources(resources),
            RenderState::Sized(sized) | RenderState::Rendering(sized) => {
                sized.capture.release();
                self.delete_resources(sized.resources);
            }
        }

        self.generation += 1;
        let program = ShaderProgram::compile(&mut self.backend);
        let textures = TextureSet::generate(&mut self.backend);
        tracing::info!(
            generation = self.generation,
            program = program.handle().raw(),
            program_valid = program.is_valid(),
            "surface created"
        );
        self.state = RenderState::SurfaceReady(GpuResources { program, textures });
    }

    /// The drawable size changed: apply the viewport and bind a fresh capture
    /// surface to the raw texture.
    pub fn on_surface_changed(&mut self, width: u32, height: u32) {
        let resources = match mem::replace(&mut self.state, RenderState::Uninitialized) {
            RenderState::SurfaceReady(resources) => resources,
            RenderState::Sized(sized) | RenderState::Rendering(sized) => {
                sized.capture.release();
                sized.resources
            }
            other => {
                tracing::warn!(phase = ?other, width, height, "surface changed without a surface; ignoring");
                self.state = other;
                return;
            }
        };

        let viewport = Resolution::new(width, height);
        self.backend.set_viewport(width, height);
        let capture = CaptureSurface::new(resources.textures.raw, viewport);
        tracing::debug!(%viewport, texture = resources.textures.raw.raw(), "surface sized");

        if let Some(request) = self.pending_request.take() {
            fulfil(request, &capture);
        }
        self.state = RenderState::Sized(SizedSurface {
            resources,
            capture,
            viewport,
        });
    }

    /// Answers a surface request now if a capture surface exists, or keeps it
    /// until the next [`on_surface_changed`](Self::on_surface_changed).
    ///
    /// A newer request replaces an unanswered older one, which is told that
    /// no surface is coming.
    pub fn on_surface_requested(&mut self, request: SurfaceRequest) {
        match &self.state {
            RenderState::Destroyed => {
                tracing::debug!("surface requested after cleanup; declining");
                request.will_not_provide();
            }
            RenderState::Sized(sized) | RenderState::Rendering(sized) => {
                fulfil(request, &sized.capture);
            }
            RenderState::Uninitialized | RenderState::SurfaceReady(_) => {
                if let Some(previous) = self.pending_request.replace(request) {
                    tracing::debug!("surface request superseded");
                    previous.will_not_provide();
                }
            }
        }
    }

    /// Converts, optionally processes, and uploads one frame.
    ///
    /// The frame is released back to its producer before processing starts and
    /// on every early exit.
    pub fn update_texture(&mut self, frame: Frame, processing_enabled: bool) -> FrameOutcome {
        let textures = match &self.state {
            RenderState::Destroyed => {
                frame.release();
                return FrameOutcome::Ignored;
            }
            state => match state.resources() {
                Some(resources) => resources.textures,
                None => {
                    frame.release();
                    return FrameOutcome::Dropped(DropReason::NoSurface);
                }
            },
        };

        if let Err(err) = convert::validate(&frame) {
            frame.release();
            return FrameOutcome::Dropped(DropReason::InvalidFrame(err));
        }

        self.buffers.ensure_capacity(frame.width(), frame.height());
        let Some((input, output)) = self.buffers.pair_mut() else {
            frame.release();
            return FrameOutcome::Dropped(DropReason::NoSurface);
        };
        let converted = convert::to_rgba(&frame, input);
        frame.release();
        if let Err(err) = converted {
            return FrameOutcome::Dropped(DropReason::InvalidFrame(err));
        }

        let source = match self.bridge.apply(processing_enabled, input, output) {
            Ok(source) => source,
            Err(err) => return FrameOutcome::Dropped(DropReason::Processing(err)),
        };
        match upload_to_gpu(&mut self.backend, source, textures.processed) {
            Ok(()) => FrameOutcome::Uploaded {
                processed: processing_enabled,
            },
            Err(err) => FrameOutcome::Dropped(DropReason::Upload(err)),
        }
    }

    /// Latches the capture surface and draws the processed texture.
    pub fn draw_frame(&mut self) -> DrawOutcome {
        let sized = match &self.state {
            RenderState::Sized(sized) | RenderState::Rendering(sized) => sized,
            _ => return DrawOutcome::Skipped(SkipReason::NotSized),
        };
        let program = sized.resources.program;
        let Some(locations) = program.locations().filter(|_| program.is_valid()) else {
            return DrawOutcome::Skipped(SkipReason::InvalidProgram);
        };
        let textures = sized.resources.textures;

        if let Some(image) = sized.capture.latch() {
            if let Err(err) = upload_to_gpu(&mut self.backend, &image, textures.raw) {
                tracing::warn!(error = %err, "failed to latch capture surface");
            }
        }

        let draw = QuadDraw {
            program: program.handle(),
            locations,
            texture: textures.processed,
            geometry: &QUAD,
        };
        if let Err(err) = self.backend.draw_quad(&draw) {
            return DrawOutcome::Failed(err);
        }

        if let RenderState::Sized(_) = self.state {
            if let RenderState::Sized(sized) =
                mem::replace(&mut self.state, RenderState::Uninitialized)
            {
                self.state = RenderState::Rendering(sized);
            }
        }
        DrawOutcome::Drawn
    }

    /// Releases every GPU resource and the capture surface. Safe to call twice.
    pub fn cleanup(&mut self) {
        match mem::replace(&mut self.state, RenderState::Destroyed) {
            RenderState::Destroyed => return,
            RenderState::Uninitialized => {}
            RenderState::SurfaceReady(resources) => self.delete_resources(resources),
            RenderState::Sized(sized) | RenderState::Rendering(sized) => {
                sized.capture.release();
                self.delete_resources(sized.resources);
            }
        }
        self.buffers.release();
        if let Some(request) = self.pending_request.take() {
            request.will_not_provide();
        }
        tracing::info!(generation = self.generation, "renderer cleaned up");
    }

    fn delete_resources(&mut self, resources: GpuResources) {
        resources.program.delete(&mut self.backend);
        resources.textures.delete(&mut self.backend);
    }
}

fn fulfil(request: SurfaceRequest, capture: &CaptureSurface) {
    match request.provide_surface(capture.clone()) {
        Ok(()) => tracing::debug!(texture = capture.texture().raw(), "capture surface provided"),
        Err(error) => tracing::error!(%error, "failed to provide capture surface"),
    }
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use edgeproc::{CannyThresholds, ProcessError};
use image::RgbaImage;

use crate::bridge::NativeProcessor;
use crate::frame::{Frame, PixelFormat, Plane};
use crate::gpu::{
    reflect_location, GpuBackend, ProgramHandle, QuadDraw, ShaderError, ShaderStage,
    TextureHandle, TextureParams,
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum GpuCall {
    CompileProgram(ProgramHandle),
    CreateTexture(TextureHandle, TextureParams),
    Upload {
        texture: TextureHandle,
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
    Viewport(u32, u32),
    Draw {
        program: ProgramHandle,
        texture: TextureHandle,
    },
    DeleteTexture(TextureHandle),
    DeleteProgram(ProgramHandle),
}

/// Shared view of the calls a [`RecordingBackend`] received, usable after the
/// backend moved onto the render thread.
#[derive(Debug, Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<GpuCall>>>);

impl CallLog {
    fn push(&self, call: GpuCall) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<GpuCall> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    pub fn draws(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, GpuCall::Draw { .. }))
            .count()
    }

    pub fn uploads_to(&self, texture: TextureHandle) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GpuCall::Upload {
                    texture: target,
                    pixels,
                    ..
                } if target == texture => Some(pixels),
                _ => None,
            })
            .collect()
    }

    pub fn last_viewport(&self) -> Option<(u32, u32)> {
        self.calls().iter().rev().find_map(|call| match call {
            GpuCall::Viewport(width, height) => Some((*width, *height)),
            _ => None,
        })
    }
}

/// In-memory [`GpuBackend`] that records every call.
#[derive(Debug, Default)]
pub(crate) struct RecordingBackend {
    log: CallLog,
    next_handle: u32,
    fail_compile: bool,
    fail_uploads: bool,
    programs: Vec<(ProgramHandle, String, String)>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn failing_compile(mut self) -> Self {
        self.fail_compile = true;
        self
    }

    pub fn failing_uploads(mut self) -> Self {
        self.fail_uploads = true;
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    fn next(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn sources(&self, program: ProgramHandle) -> Option<(&str, &str)> {
        self.programs
            .iter()
            .find(|(handle, _, _)| *handle == program)
            .map(|(_, vertex, fragment)| (vertex.as_str(), fragment.as_str()))
    }
}

impl GpuBackend for RecordingBackend {
    fn compile_program(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<ProgramHandle, ShaderError> {
        if self.fail_compile {
            return Err(ShaderError::Compile {
                stage: ShaderStage::Fragment,
                log: "0:1: syntax error".into(),
            });
        }
        let handle = ProgramHandle::new(self.next());
        self.programs
            .push((handle, vertex_source.to_owned(), fragment_source.to_owned()));
        self.log.push(GpuCall::CompileProgram(handle));
        Ok(handle)
    }

    fn attribute_location(&self, program: ProgramHandle, name: &str) -> Option<u32> {
        let (vertex, _) = self.sources(program)?;
        reflect_location(vertex, "in", name)
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<u32> {
        let (_, fragment) = self.sources(program)?;
        reflect_location(fragment, "uniform", name)
    }

    fn create_texture(&mut self, params: TextureParams) -> TextureHandle {
        let handle = TextureHandle::new(self.next());
        self.log.push(GpuCall::CreateTexture(handle, params));
        handle
    }

    fn upload_texture(
        &mut self,
        texture: TextureHandle,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<()> {
        if self.fail_uploads {
            bail!("device lost");
        }
        self.log.push(GpuCall::Upload {
            texture,
            width,
            height,
            pixels: rgba.to_vec(),
        });
        Ok(())
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.log.push(GpuCall::Viewport(width, height));
    }

    fn draw_quad(&mut self, draw: &QuadDraw<'_>) -> Result<()> {
        self.log.push(GpuCall::Draw {
            program: draw.program,
            texture: draw.texture,
        });
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.log.push(GpuCall::DeleteTexture(texture));
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.retain(|(handle, _, _)| *handle != program);
        self.log.push(GpuCall::DeleteProgram(program));
    }
}

/// Processor that inverts RGB and counts how often it ran.
#[derive(Debug, Clone, Default)]
pub(crate) struct CountingProcessor {
    pub calls: Arc<AtomicUsize>,
}

impl CountingProcessor {
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn invert(input: &RgbaImage, output: &mut RgbaImage) {
        for (target, source) in output.pixels_mut().zip(input.pixels()) {
            let [r, g, b, _] = source.0;
            target.0 = [255 - r, 255 - g, 255 - b, 255];
        }
    }
}

impl NativeProcessor for CountingProcessor {
    fn process_edge_detect(
        &mut self,
        input: &RgbaImage,
        output: &mut RgbaImage,
        _thresholds: CannyThresholds,
    ) -> Result<(), ProcessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Self::invert(input, output);
        Ok(())
    }

    fn process_grayscale(
        &mut self,
        input: &RgbaImage,
        output: &mut RgbaImage,
    ) -> Result<(), ProcessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Self::invert(input, output);
        Ok(())
    }

    fn library_version(&self) -> String {
        "counting 1.0".into()
    }
}

/// Processor that blocks inside every call until its gate sender is dropped,
/// announcing each call on `entered` first.
pub(crate) struct GatedProcessor {
    gate: Receiver<()>,
    entered: Sender<()>,
}

impl GatedProcessor {
    pub fn new() -> (Self, Sender<()>, Receiver<()>) {
        let (gate_tx, gate) = bounded(0);
        let (entered, entered_rx) = unbounded();
        (Self { gate, entered }, gate_tx, entered_rx)
    }

    fn wait(&self, input: &RgbaImage, output: &mut RgbaImage) {
        let _ = self.entered.send(());
        let _ = self.gate.recv();
        output.copy_from_slice(input);
    }
}

impl NativeProcessor for GatedProcessor {
    fn process_edge_detect(
        &mut self,
        input: &RgbaImage,
        output: &mut RgbaImage,
        _thresholds: CannyThresholds,
    ) -> Result<(), ProcessError> {
        self.wait(input, output);
        Ok(())
    }

    fn process_grayscale(
        &mut self,
        input: &RgbaImage,
        output: &mut RgbaImage,
    ) -> Result<(), ProcessError> {
        self.wait(input, output);
        Ok(())
    }

    fn library_version(&self) -> String {
        "gated 1.0".into()
    }
}

/// Processor that panics on every call.
#[derive(Debug, Default)]
pub(crate) struct PanickingProcessor;

impl NativeProcessor for PanickingProcessor {
    fn process_edge_detect(
        &mut self,
        _input: &RgbaImage,
        _output: &mut RgbaImage,
        _thresholds: CannyThresholds,
    ) -> Result<(), ProcessError> {
        panic!("native filter crashed");
    }

    fn process_grayscale(
        &mut self,
        _input: &RgbaImage,
        _output: &mut RgbaImage,
    ) -> Result<(), ProcessError> {
        panic!("native filter crashed");
    }

    fn library_version(&self) -> String {
        "panicking 0.0".into()
    }
}

/// Solid RGBA frame whose release hook bumps `released`.
pub(crate) fn rgba_frame(width: u32, height: u32, value: u8, released: &Arc<AtomicUsize>) -> Frame {
    let counter = Arc::clone(released);
    let data = [value, value, value, 255].repeat((width * height) as usize);
    Frame::new(
        width,
        height,
        PixelFormat::Rgba8,
        vec![Plane::new(data, width as usize * 4, 4)],
    )
    .with_release(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

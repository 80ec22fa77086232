use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowBuilder;

use crate::bridge::NativeProcessor;
use crate::capture::CaptureThread;
use crate::frame::FrameSource;
use crate::gpu::WgpuBackend;
use crate::host::SurfaceViewHost;
use crate::stats::StatsSnapshot;
use crate::types::{RendererConfig, Resolution};

const TITLE_REFRESH: Duration = Duration::from_millis(500);

/// Knobs for the interactive preview window.
#[derive(Debug, Clone)]
pub struct PreviewOptions {
    pub title: String,
    /// Delay between frames pulled from the source.
    pub capture_interval: Duration,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            title: "edgecam".into(),
            capture_interval: Duration::from_secs_f64(1.0 / 30.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    ToggleProcessing,
    Quit,
}

fn key_action(event: &KeyEvent) -> Option<KeyAction> {
    if event.state != ElementState::Pressed || event.repeat {
        return None;
    }
    match &event.logical_key {
        Key::Named(NamedKey::Space) => Some(KeyAction::ToggleProcessing),
        Key::Named(NamedKey::Escape) => Some(KeyAction::Quit),
        Key::Character(value) => match value.to_ascii_lowercase().as_str() {
            " " | "p" => Some(KeyAction::ToggleProcessing),
            "q" => Some(KeyAction::Quit),
            _ => None,
        },
        _ => None,
    }
}

fn window_title(base: &str, stats: &StatsSnapshot, processing: bool) -> String {
    let resolution = stats
        .resolution
        .map(|resolution| resolution.to_string())
        .unwrap_or_else(|| "no frames".into());
    let mode = if processing { "edges on" } else { "edges off" };
    format!("{base} | {} fps | {resolution} | {mode}", stats.fps)
}

/// Opens a window and runs the camera preview until it is closed.
///
/// The window is shared with the render thread, which creates the wgpu
/// surface for it. The calling thread runs the winit event loop and forwards
/// resizes, redraw requests and key presses (space or `p` toggles processing,
/// `q` or escape quits) to the host.
pub fn run_preview(
    config: RendererConfig,
    processor: Box<dyn NativeProcessor>,
    source: Box<dyn FrameSource>,
    options: PreviewOptions,
) -> Result<()> {
    let event_loop =
        EventLoop::new().map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(options.title.clone())
            .with_inner_size(PhysicalSize::new(
                config.surface_size.width,
                config.surface_size.height,
            ))
            .build(&event_loop)
            .map_err(|err| anyhow!("failed to create preview window: {err}"))?,
    );

    let initial = window.inner_size();
    let surface_size = Resolution::new(initial.width.max(1), initial.height.max(1));
    let power = config.power;
    let backend_window = Arc::clone(&window);
    let host = Arc::new(SurfaceViewHost::spawn(config, processor, move || {
        WgpuBackend::new(backend_window, surface_size, power)
    })?);
    tracing::info!(
        library = host.library_version(),
        size = %surface_size,
        "preview window ready"
    );

    host.surface_created();
    host.surface_changed(surface_size.width, surface_size.height);

    let mut capture = Some(CaptureThread::spawn(
        source,
        Arc::clone(&host),
        options.capture_interval,
    )?);
    let mut next_title = Instant::now();

    let loop_host = Arc::clone(&host);
    event_loop
        .run(move |event, elwt| match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
                WindowEvent::Resized(size) => {
                    if size.width > 0 && size.height > 0 {
                        loop_host.surface_changed(size.width, size.height);
                    }
                }
                WindowEvent::RedrawRequested => loop_host.request_render(),
                WindowEvent::KeyboardInput { event, .. } => match key_action(&event) {
                    Some(KeyAction::ToggleProcessing) => {
                        loop_host.set_processing_enabled(!loop_host.processing_enabled());
                        next_title = Instant::now();
                    }
                    Some(KeyAction::Quit) => elwt.exit(),
                    None => {}
                },
                _ => {}
            },
            Event::AboutToWait => {
                let now = Instant::now();
                if now >= next_title {
                    window.set_title(&window_title(
                        &options.title,
                        &loop_host.stats(),
                        loop_host.processing_enabled(),
                    ));
                    next_title = now + TITLE_REFRESH;
                }
                if capture.as_ref().is_some_and(CaptureThread::is_finished) {
                    tracing::info!("capture finished; closing preview");
                    elwt.exit();
                }
                elwt.set_control_flow(ControlFlow::WaitUntil(next_title));
            }
            Event::LoopExiting => {
                if let Some(capture) = capture.take() {
                    match capture.stop() {
                        Ok(summary) => tracing::info!(
                            frames = summary.frames_delivered,
                            replaced = loop_host.frames_replaced(),
                            "capture summary"
                        ),
                        Err(err) => tracing::error!(error = %err, "capture thread failed"),
                    }
                }
                loop_host.cleanup();
            }
            _ => {}
        })
        .map_err(|err| anyhow!("preview event loop failed: {err}"))?;

    match Arc::try_unwrap(host) {
        Ok(host) => host.shutdown(),
        Err(host) => {
            host.cleanup();
            Ok(())
        }
    }
}

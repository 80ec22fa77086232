use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::bridge::{NativeProcessor, ProcessingBridge, ProcessingToggle};
use crate::frame::{Frame, FrameSlot};
use crate::gpu::GpuBackend;
use crate::state::{DrawOutcome, FrameOutcome, FrameRenderer, RenderPhase};
use crate::stats::{FrameStats, StatsSnapshot};
use crate::surface::SurfaceRequest;
use crate::types::RendererConfig;

enum RenderEvent {
    SurfaceCreated,
    SurfaceChanged { width: u32, height: u32 },
    SurfaceRequested(SurfaceRequest),
    FrameAvailable,
    RenderRequested,
    Flush(Sender<()>),
    Cleanup,
    Shutdown,
}

struct PendingFrame {
    frame: Frame,
    processing_enabled: bool,
}

/// Counters published by the render thread after every batch of events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderStatus {
    pub phase: RenderPhase,
    pub generation: u64,
    pub frames_uploaded: u64,
    pub frames_dropped: u64,
    pub draws: u64,
}

impl Default for RenderStatus {
    fn default() -> Self {
        Self {
            phase: RenderPhase::Uninitialized,
            generation: 0,
            frames_uploaded: 0,
            frames_dropped: 0,
            draws: 0,
        }
    }
}

/// Front door of the pipeline: owns the render thread and the single-slot
/// handoff from the capture thread.
///
/// Every GPU-touching call is turned into an event on the render thread's
/// queue, so the methods here are cheap and callable from any thread. Frames
/// go through a latest-wins slot; a frame that is replaced before the render
/// thread gets to it is released unprocessed.
pub struct SurfaceViewHost {
    events: Sender<RenderEvent>,
    slot: Arc<FrameSlot<PendingFrame>>,
    toggle: ProcessingToggle,
    stats: Mutex<FrameStats>,
    status: Arc<Mutex<RenderStatus>>,
    destroyed: AtomicBool,
    library_version: String,
    join_handle: Option<JoinHandle<Result<()>>>,
}

impl SurfaceViewHost {
    /// Starts the render thread. `make_backend` runs on that thread, so the
    /// backend itself never has to cross threads.
    pub fn spawn<B, F>(
        config: RendererConfig,
        processor: Box<dyn NativeProcessor>,
        make_backend: F,
    ) -> Result<Self>
    where
        B: GpuBackend + 'static,
        F: FnOnce() -> Result<B> + Send + 'static,
    {
        let (events, receiver) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);
        let slot = Arc::new(FrameSlot::new());
        let status = Arc::new(Mutex::new(RenderStatus::default()));
        let library_version = processor.library_version();
        let bridge = ProcessingBridge::new(processor, config.filter);

        let thread_slot = Arc::clone(&slot);
        let thread_status = Arc::clone(&status);
        let handle = thread::Builder::new()
            .name("edgecam-render".into())
            .spawn(move || {
                run_render_thread(
                    make_backend,
                    bridge,
                    receiver,
                    thread_slot,
                    thread_status,
                    ready_tx,
                )
            })
            .map_err(|err| anyhow!("failed to spawn render thread: {err}"))?;

        if let Err(err) = ready_rx
            .recv()
            .map_err(|err| anyhow!("render thread failed to initialise: {err}"))
            .and_then(|ready| ready)
        {
            let _ = handle.join();
            return Err(err);
        }

        tracing::info!(
            filter = %config.filter,
            processing = config.processing_enabled,
            library = %library_version,
            "render thread started"
        );

        Ok(Self {
            events,
            slot,
            toggle: ProcessingToggle::new(config.processing_enabled),
            stats: Mutex::new(FrameStats::new(config.stats_window)),
            status,
            destroyed: AtomicBool::new(false),
            library_version,
            join_handle: Some(handle),
        })
    }

    /// Hands the next camera frame to the render thread.
    ///
    /// Called from the capture thread. The processing flag is sampled here,
    /// and any frame still waiting in the slot is released in favour of this
    /// one. After [`cleanup`](Self::cleanup) frames are released immediately.
    pub fn request_frame_update(&self, frame: Frame) {
        if self.destroyed.load(Ordering::Acquire) {
            tracing::trace!("frame delivered after cleanup; releasing");
            frame.release();
            return;
        }

        let now = Instant::now();
        lock(&self.stats).record(now, frame.width(), frame.height());

        let pending = PendingFrame {
            frame,
            processing_enabled: self.toggle.is_enabled(),
        };
        // Only a frame landing in an empty slot needs a wake-up; a replaced
        // frame's wake-up is still queued.
        if self.slot.publish(pending) {
            tracing::trace!("replaced a frame the render thread had not picked up");
        } else {
            self.send(RenderEvent::FrameAvailable);
        }
    }

    /// Flips processing on or off. Takes effect from the next delivered frame.
    pub fn set_processing_enabled(&self, enabled: bool) {
        self.toggle.set(enabled);
        tracing::info!(enabled, "processing toggled");
    }

    pub fn processing_enabled(&self) -> bool {
        self.toggle.is_enabled()
    }

    /// Shared handle to the processing flag, for UI code.
    pub fn toggle(&self) -> ProcessingToggle {
        self.toggle.clone()
    }

    pub fn surface_created(&self) {
        self.send(RenderEvent::SurfaceCreated);
    }

    pub fn surface_changed(&self, width: u32, height: u32) {
        self.send(RenderEvent::SurfaceChanged { width, height });
    }

    /// Forwards a capture-surface request to the render thread.
    pub fn on_surface_requested(&self, request: SurfaceRequest) {
        if self.destroyed.load(Ordering::Acquire) {
            request.will_not_provide();
            return;
        }
        if let Err(err) = self.events.send(RenderEvent::SurfaceRequested(request)) {
            if let RenderEvent::SurfaceRequested(request) = err.into_inner() {
                request.will_not_provide();
            }
        }
    }

    /// Asks for one redraw. Redraws never happen on their own.
    pub fn request_render(&self) {
        self.send(RenderEvent::RenderRequested);
    }

    /// Releases GPU state on the render thread. Safe to call more than once;
    /// only the first call has an effect.
    pub fn cleanup(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(pending) = self.slot.take() {
            pending.frame.release();
        }
        self.send(RenderEvent::Cleanup);
        tracing::info!("cleanup requested");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Blocks until every event queued so far, including a pending redraw, has
    /// been handled.
    pub fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = bounded(1);
        self.events
            .send(RenderEvent::Flush(ack_tx))
            .map_err(|_| anyhow!("render thread is not running"))?;
        ack_rx
            .recv()
            .map_err(|_| anyhow!("render thread stopped before acknowledging flush"))
    }

    pub fn stats(&self) -> StatsSnapshot {
        lock(&self.stats).snapshot()
    }

    pub fn status(&self) -> RenderStatus {
        *lock(&self.status)
    }

    /// Frames replaced in the slot before the render thread consumed them.
    pub fn frames_replaced(&self) -> u64 {
        self.slot.replaced()
    }

    pub fn library_version(&self) -> &str {
        &self.library_version
    }

    /// Cleans up, stops the render thread and reports how it ended.
    pub fn shutdown(mut self) -> Result<()> {
        self.cleanup();
        if let Some(handle) = self.join_handle.take() {
            let _ = self.events.send(RenderEvent::Shutdown);
            handle
                .join()
                .map_err(|err| anyhow!("render thread panicked: {err:?}"))??;
        }
        Ok(())
    }

    fn send(&self, event: RenderEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("render thread has stopped; event dropped");
        }
    }
}

impl Drop for SurfaceViewHost {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            self.cleanup();
            let _ = self.events.send(RenderEvent::Shutdown);
            let _ = handle.join();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run_render_thread<B, F>(
    make_backend: F,
    bridge: ProcessingBridge,
    events: Receiver<RenderEvent>,
    slot: Arc<FrameSlot<PendingFrame>>,
    status: Arc<Mutex<RenderStatus>>,
    ready_tx: Sender<Result<()>>,
) -> Result<()>
where
    B: GpuBackend,
    F: FnOnce() -> Result<B>,
{
    let backend = match make_backend() {
        Ok(backend) => backend,
        Err(err) => {
            let message = format!("failed to initialise render backend: {err:#}");
            let _ = ready_tx.send(Err(anyhow!(message.clone())));
            return Err(anyhow!(message));
        }
    };
    let _ = ready_tx.send(Ok(()));

    let mut worker = RenderWorker {
        renderer: FrameRenderer::new(backend, bridge),
        slot,
        status,
        counters: RenderStatus::default(),
        redraw_pending: false,
    };

    while let Ok(event) = events.recv() {
        let mut next = Some(event);
        while let Some(event) = next.take() {
            if !worker.handle(event) {
                worker.renderer.cleanup();
                worker.publish();
                tracing::debug!("render thread exiting");
                return Ok(());
            }
            next = events.try_recv().ok();
        }
        // Coalesce every redraw requested in this batch into one draw.
        worker.draw_if_pending();
        worker.publish();
    }

    worker.renderer.cleanup();
    worker.publish();
    Ok(())
}

struct RenderWorker<B: GpuBackend> {
    renderer: FrameRenderer<B>,
    slot: Arc<FrameSlot<PendingFrame>>,
    status: Arc<Mutex<RenderStatus>>,
    counters: RenderStatus,
    redraw_pending: bool,
}

impl<B: GpuBackend> RenderWorker<B> {
    /// Returns `false` once the thread should stop.
    fn handle(&mut self, event: RenderEvent) -> bool {
        match event {
            RenderEvent::SurfaceCreated => self.renderer.on_surface_created(),
            RenderEvent::SurfaceChanged { width, height } => {
                self.renderer.on_surface_changed(width, height);
                self.redraw_pending = true;
            }
            RenderEvent::SurfaceRequested(request) => self.renderer.on_surface_requested(request),
            RenderEvent::FrameAvailable => {
                self.update_texture();
                self.redraw_pending = true;
            }
            RenderEvent::RenderRequested => self.redraw_pending = true,
            RenderEvent::Flush(ack) => {
                self.draw_if_pending();
                self.publish();
                let _ = ack.send(());
            }
            RenderEvent::Cleanup => {
                self.redraw_pending = false;
                self.renderer.cleanup();
            }
            RenderEvent::Shutdown => return false,
        }
        true
    }

    fn update_texture(&mut self) {
        // A wake-up can outlive its frame when cleanup drained the slot.
        let Some(PendingFrame {
            frame,
            processing_enabled,
        }) = self.slot.take()
        else {
            return;
        };

        match self.renderer.update_texture(frame, processing_enabled) {
            FrameOutcome::Uploaded { processed } => {
                self.counters.frames_uploaded += 1;
                tracing::trace!(processed, "frame uploaded");
            }
            FrameOutcome::Dropped(reason) => {
                self.counters.frames_dropped += 1;
                tracing::warn!(%reason, "dropped frame");
            }
            FrameOutcome::Ignored => {}
        }
    }

    fn draw_if_pending(&mut self) {
        if !std::mem::take(&mut self.redraw_pending) {
            return;
        }
        match self.renderer.draw_frame() {
            DrawOutcome::Drawn => self.counters.draws += 1,
            DrawOutcome::Skipped(reason) => tracing::trace!(?reason, "draw skipped"),
            DrawOutcome::Failed(err) => tracing::warn!(error = %format!("{err:#}"), "draw failed"),
        }
    }

    fn publish(&mut self) {
        self.counters.phase = self.renderer.phase();
        self.counters.generation = self.renderer.generation();
        *lock(&self.status) = self.counters;
    }
}

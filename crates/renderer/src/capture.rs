use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::buffers::PixelBuffer;
use crate::convert;
use crate::frame::{Frame, FrameSource};
use crate::host::SurfaceViewHost;
use crate::surface::{CaptureSurface, SurfaceOutcome, SurfaceReceiver, SurfaceRequest};

/// How long the capture thread waits for its first capture surface before it
/// starts delivering frames without a preview.
const SURFACE_WAIT: Duration = Duration::from_secs(1);

/// Totals reported when the capture thread stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureSummary {
    pub frames_delivered: u64,
    pub previews_queued: u64,
    pub surface_requests: u64,
}

/// Background thread that pulls frames from a [`FrameSource`] at a fixed
/// interval and hands them to the host.
///
/// Like a camera binding, it also asks the host for a capture surface and
/// writes each frame's RGBA preview into it. When the surface is replaced
/// after a resize, a new one is requested.
pub struct CaptureThread {
    stop: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<CaptureSummary>>,
}

impl CaptureThread {
    pub fn spawn(
        source: Box<dyn FrameSource>,
        host: Arc<SurfaceViewHost>,
        interval: Duration,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        tracing::info!(source = %source.describe(), ?interval, "starting capture");
        let handle = thread::Builder::new()
            .name("edgecam-capture".into())
            .spawn(move || run_capture(source, host, interval, thread_stop))
            .map_err(|err| anyhow!("failed to spawn capture thread: {err}"))?;
        Ok(Self {
            stop,
            join_handle: Some(handle),
        })
    }

    /// `true` once the source ran dry or a stop was requested.
    pub fn is_finished(&self) -> bool {
        self.join_handle
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    pub fn stop(mut self) -> Result<CaptureSummary> {
        self.stop.store(true, Ordering::Relaxed);
        match self.join_handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|err| anyhow!("capture thread panicked: {err:?}")),
            None => Ok(CaptureSummary::default()),
        }
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

enum Preview {
    Waiting(SurfaceReceiver),
    Active(CaptureSurface),
    Unavailable,
}

struct CaptureLoop {
    host: Arc<SurfaceViewHost>,
    preview: Preview,
    summary: CaptureSummary,
}

impl CaptureLoop {
    fn new(host: Arc<SurfaceViewHost>) -> Self {
        let mut this = Self {
            host,
            preview: Preview::Unavailable,
            summary: CaptureSummary::default(),
        };
        this.request_surface();
        let outcome = match &this.preview {
            Preview::Waiting(receiver) => receiver.receive_timeout(SURFACE_WAIT),
            _ => None,
        };
        if let Some(outcome) = outcome {
            this.preview = this.accept(outcome);
        }
        this
    }

    fn request_surface(&mut self) {
        let (request, receiver) = SurfaceRequest::new();
        self.summary.surface_requests += 1;
        self.host.on_surface_requested(request);
        self.preview = Preview::Waiting(receiver);
    }

    fn accept(&self, outcome: SurfaceOutcome) -> Preview {
        match outcome {
            SurfaceOutcome::Provided(surface) => {
                tracing::debug!(resolution = %surface.resolution(), "capture surface bound");
                Preview::Active(surface)
            }
            SurfaceOutcome::NotProvided => {
                tracing::warn!("no capture surface was provided; continuing without preview");
                Preview::Unavailable
            }
        }
    }

    fn poll_surface(&mut self) {
        let released =
            matches!(&self.preview, Preview::Active(surface) if surface.is_released());
        if released {
            self.request_surface();
            return;
        }
        let outcome = match &self.preview {
            Preview::Waiting(receiver) => receiver.try_receive(),
            _ => None,
        };
        if let Some(outcome) = outcome {
            self.preview = self.accept(outcome);
        }
    }

    fn deliver(&mut self, frame: Frame) {
        self.poll_surface();
        if let Preview::Active(surface) = &self.preview {
            let mut image = PixelBuffer::new(frame.width(), frame.height());
            match convert::to_rgba(&frame, &mut image) {
                Ok(()) => match surface.queue_image(image) {
                    Ok(()) => self.summary.previews_queued += 1,
                    Err(err) => tracing::debug!(error = %err, "preview image not queued"),
                },
                Err(err) => tracing::debug!(error = %err, "preview conversion failed"),
            }
        }
        self.host.request_frame_update(frame);
        self.summary.frames_delivered += 1;
    }
}

fn run_capture(
    mut source: Box<dyn FrameSource>,
    host: Arc<SurfaceViewHost>,
    interval: Duration,
    stop: Arc<AtomicBool>,
) -> CaptureSummary {
    let mut capture = CaptureLoop::new(host);
    let mut next_deadline = Instant::now();

    while !stop.load(Ordering::Relaxed) {
        let Some(frame) = source.next_frame() else {
            tracing::info!("frame source exhausted");
            break;
        };
        capture.deliver(frame);

        if interval.is_zero() {
            continue;
        }
        next_deadline += interval;
        let now = Instant::now();
        if next_deadline > now {
            thread::sleep(next_deadline - now);
        } else {
            // Running behind; do not try to catch up with a burst.
            next_deadline = now;
        }
    }

    tracing::info!(
        frames = capture.summary.frames_delivered,
        previews = capture.summary.previews_queued,
        "capture stopped"
    );
    capture.summary
}

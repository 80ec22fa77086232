use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::buffers::PixelBuffer;
use crate::gpu::TextureHandle;
use crate::types::Resolution;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProvisionError {
    #[error("the surface requester went away before the surface was ready")]
    RequesterGone,
    #[error("the capture surface was released")]
    SurfaceReleased,
}

struct CaptureShared {
    texture: TextureHandle,
    resolution: Resolution,
    latest: Mutex<Option<PixelBuffer>>,
    queued: AtomicU64,
    released: AtomicBool,
}

/// Producer-facing surface bound to the renderer's raw texture.
///
/// The capture pipeline queues images into the surface; the render thread
/// latches the most recent one into the raw texture on its next draw. Queued
/// images that were never latched are simply replaced.
#[derive(Clone)]
pub struct CaptureSurface {
    shared: Arc<CaptureShared>,
}

impl CaptureSurface {
    pub(crate) fn new(texture: TextureHandle, resolution: Resolution) -> Self {
        Self {
            shared: Arc::new(CaptureShared {
                texture,
                resolution,
                latest: Mutex::new(None),
                queued: AtomicU64::new(0),
                released: AtomicBool::new(false),
            }),
        }
    }

    pub fn texture(&self) -> TextureHandle {
        self.shared.texture
    }

    pub fn resolution(&self) -> Resolution {
        self.shared.resolution
    }

    pub fn is_released(&self) -> bool {
        self.shared.released.load(Ordering::Acquire)
    }

    /// Number of images queued over the surface's lifetime.
    pub fn queued(&self) -> u64 {
        self.shared.queued.load(Ordering::Relaxed)
    }

    /// Queues `image` as the surface's newest content.
    pub fn queue_image(&self, image: PixelBuffer) -> Result<(), ProvisionError> {
        if self.is_released() {
            return Err(ProvisionError::SurfaceReleased);
        }
        let previous = self
            .shared
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(image);
        self.shared.queued.fetch_add(1, Ordering::Relaxed);
        drop(previous);
        Ok(())
    }

    /// Takes the newest queued image, if any arrived since the last latch.
    pub(crate) fn latch(&self) -> Option<PixelBuffer> {
        if self.is_released() {
            return None;
        }
        self.shared
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub(crate) fn release(&self) {
        if self.shared.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        tracing::debug!(texture = self.texture().raw(), "capture surface released");
    }

    pub fn same_surface(&self, other: &CaptureSurface) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for CaptureSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSurface")
            .field("texture", &self.shared.texture)
            .field("resolution", &self.shared.resolution)
            .field("released", &self.is_released())
            .finish()
    }
}

/// What the requester of a surface eventually learns.
#[derive(Debug)]
pub enum SurfaceOutcome {
    Provided(CaptureSurface),
    /// The renderer will never provide a surface for this request, either
    /// because a newer request superseded it or because the renderer shut down.
    NotProvided,
}

/// A pending ask for a capture surface.
///
/// Fulfilment consumes the request, so it can be answered at most once.
/// Dropping a request unanswered reads as [`SurfaceOutcome::NotProvided`] on
/// the receiving side.
#[derive(Debug)]
pub struct SurfaceRequest {
    reply: Sender<SurfaceOutcome>,
}

/// Requester half of a [`SurfaceRequest`].
#[derive(Debug)]
pub struct SurfaceReceiver {
    reply: Receiver<SurfaceOutcome>,
}

impl SurfaceRequest {
    pub fn new() -> (Self, SurfaceReceiver) {
        let (reply, receiver) = bounded(1);
        (Self { reply }, SurfaceReceiver { reply: receiver })
    }

    /// Hands `surface` to the requester.
    pub fn provide_surface(self, surface: CaptureSurface) -> Result<(), ProvisionError> {
        if surface.is_released() {
            let _ = self.reply.send(SurfaceOutcome::NotProvided);
            return Err(ProvisionError::SurfaceReleased);
        }
        self.reply
            .send(SurfaceOutcome::Provided(surface))
            .map_err(|_| ProvisionError::RequesterGone)
    }

    /// Tells the requester no surface is coming.
    pub fn will_not_provide(self) {
        let _ = self.reply.send(SurfaceOutcome::NotProvided);
    }
}

impl SurfaceReceiver {
    /// Returns the outcome if it is already known.
    pub fn try_receive(&self) -> Option<SurfaceOutcome> {
        match self.reply.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(SurfaceOutcome::NotProvided),
        }
    }

    /// Waits up to `timeout` for the outcome.
    pub fn receive_timeout(&self, timeout: Duration) -> Option<SurfaceOutcome> {
        match self.reply.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(SurfaceOutcome::NotProvided),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface() -> CaptureSurface {
        CaptureSurface::new(TextureHandle::new(7), Resolution::new(4, 4))
    }

    #[test]
    fn latch_returns_only_the_newest_image() {
        let surface = surface();
        surface.queue_image(PixelBuffer::new(1, 1)).unwrap();
        surface.queue_image(PixelBuffer::new(2, 2)).unwrap();
        let latched = surface.latch().expect("queued image");
        assert_eq!(latched.width(), 2);
        assert!(surface.latch().is_none());
        assert_eq!(surface.queued(), 2);
    }

    #[test]
    fn released_surface_rejects_images() {
        let surface = surface();
        let producer = surface.clone();
        surface.release();
        assert_eq!(
            producer.queue_image(PixelBuffer::new(1, 1)),
            Err(ProvisionError::SurfaceReleased)
        );
        assert!(producer.latch().is_none());
    }

    #[test]
    fn request_is_answered_once_with_the_surface() {
        let (request, receiver) = SurfaceRequest::new();
        let surface = surface();
        request.provide_surface(surface.clone()).unwrap();
        match receiver.try_receive() {
            Some(SurfaceOutcome::Provided(provided)) => assert!(provided.same_surface(&surface)),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn dropped_request_reads_as_not_provided() {
        let (request, receiver) = SurfaceRequest::new();
        assert!(receiver.try_receive().is_none());
        drop(request);
        assert!(matches!(receiver.try_receive(), Some(SurfaceOutcome::NotProvided)));
    }

    #[test]
    fn providing_to_a_gone_requester_fails() {
        let (request, receiver) = SurfaceRequest::new();
        drop(receiver);
        assert_eq!(
            request.provide_surface(surface()),
            Err(ProvisionError::RequesterGone)
        );
    }

    #[test]
    fn released_surface_is_not_provided() {
        let (request, receiver) = SurfaceRequest::new();
        let surface = surface();
        surface.release();
        assert_eq!(request.provide_surface(surface), Err(ProvisionError::SurfaceReleased));
        assert!(matches!(
            receiver.receive_timeout(Duration::from_millis(10)),
            Some(SurfaceOutcome::NotProvided)
        ));
    }
}

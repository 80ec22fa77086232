use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::Resolution;

/// Memory layout of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Three planes: full-resolution luma, then quarter-resolution U and V.
    Yuv420,
    /// Two planes: full-resolution luma, then interleaved UV at quarter resolution.
    Nv12,
    /// A single plane of packed 8-bit RGBA.
    Rgba8,
}

impl PixelFormat {
    pub fn plane_count(self) -> usize {
        match self {
            PixelFormat::Yuv420 => 3,
            PixelFormat::Nv12 => 2,
            PixelFormat::Rgba8 => 1,
        }
    }
}

/// One plane of image data with its row and pixel strides in bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Plane {
    pub data: Vec<u8>,
    pub row_stride: usize,
    pub pixel_stride: usize,
}

impl Plane {
    pub fn new(data: Vec<u8>, row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }
}

impl fmt::Debug for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plane")
            .field("len", &self.data.len())
            .field("row_stride", &self.row_stride)
            .field("pixel_stride", &self.pixel_stride)
            .finish()
    }
}

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// A captured camera frame.
///
/// Frames borrow a buffer from their producer; the producer learns the buffer
/// is free again through the release hook. The hook runs exactly once, either
/// through [`Frame::release`] or when the frame is dropped, so a frame that is
/// displaced from a slot or discarded on an error path still returns its
/// buffer.
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    planes: Vec<Plane>,
    release: Option<ReleaseHook>,
}

impl Frame {
    pub fn new(width: u32, height: u32, format: PixelFormat, planes: Vec<Plane>) -> Self {
        Self {
            width,
            height,
            format,
            planes,
            release: None,
        }
    }

    /// Attaches the callback that hands the buffer back to the producer.
    pub fn with_release<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.release = Some(Box::new(hook));
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn plane(&self, index: usize) -> Option<&Plane> {
        self.planes.get(index)
    }

    /// Returns the buffer to its producer.
    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(hook) = self.release.take() {
            hook();
        }
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("planes", &self.planes)
            .field("releasable", &self.release.is_some())
            .finish()
    }
}

/// Producer of camera frames, polled from the capture thread.
pub trait FrameSource: Send {
    /// Returns the next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Option<Frame>;

    /// Short human-readable description used in logs.
    fn describe(&self) -> String {
        "frame source".to_string()
    }
}

/// Single-slot mailbox between the capture thread and the render thread.
///
/// Publishing replaces whatever is still waiting, so the consumer only ever
/// sees the most recent value. Replaced values are dropped outside the lock.
#[derive(Debug)]
pub struct FrameSlot<T> {
    pending: Mutex<Option<T>>,
    published: AtomicU64,
    replaced: AtomicU64,
}

impl<T> Default for FrameSlot<T> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(None),
            published: AtomicU64::new(0),
            replaced: AtomicU64::new(0),
        }
    }
}

impl<T> FrameSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, dropping any value that was not taken yet.
    ///
    /// Returns `true` when an older value was replaced.
    pub fn publish(&self, value: T) -> bool {
        let displaced = self.lock().replace(value);
        self.published.fetch_add(1, Ordering::Relaxed);
        match displaced {
            Some(old) => {
                self.replaced.fetch_add(1, Ordering::Relaxed);
                drop(old);
                true
            }
            None => false,
        }
    }

    pub fn take(&self) -> Option<T> {
        self.lock().take()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn replaced(&self) -> u64 {
        self.replaced.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

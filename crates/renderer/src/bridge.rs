use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use edgeproc::{CannyThresholds, ProcessError};
use image::RgbaImage;

use crate::buffers::PixelBuffer;
use crate::types::ProcessingFilter;

/// Shared on/off switch read by the capture path and written by the UI.
///
/// The flag is sampled once per frame when the frame is handed to the render
/// thread; a flip takes effect on the next frame.
#[derive(Debug, Clone, Default)]
pub struct ProcessingToggle(Arc<AtomicBool>);

impl ProcessingToggle {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Relaxed);
    }

    /// Flips the flag and returns the new value.
    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true, Ordering::Relaxed)
    }
}

/// RGBA-in, RGBA-out filter implementation behind the bridge.
///
/// Calls are synchronous and happen on the render thread. `output` always has
/// the dimensions of `input`.
pub trait NativeProcessor: Send {
    fn process_edge_detect(
        &mut self,
        input: &RgbaImage,
        output: &mut RgbaImage,
        thresholds: CannyThresholds,
    ) -> Result<(), ProcessError>;

    fn process_grayscale(
        &mut self,
        input: &RgbaImage,
        output: &mut RgbaImage,
    ) -> Result<(), ProcessError>;

    fn library_version(&self) -> String;
}

/// Default processor backed by the `edgeproc` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct EdgeProcessor;

impl NativeProcessor for EdgeProcessor {
    fn process_edge_detect(
        &mut self,
        input: &RgbaImage,
        output: &mut RgbaImage,
        thresholds: CannyThresholds,
    ) -> Result<(), ProcessError> {
        edgeproc::process_edge_detect(input, output, thresholds)
    }

    fn process_grayscale(
        &mut self,
        input: &RgbaImage,
        output: &mut RgbaImage,
    ) -> Result<(), ProcessError> {
        edgeproc::process_grayscale(input, output)
    }

    fn library_version(&self) -> String {
        edgeproc::library_version().to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("output buffer is {output_width}x{output_height} but input is {input_width}x{input_height}")]
    SizeMismatch {
        input_width: u32,
        input_height: u32,
        output_width: u32,
        output_height: u32,
    },
    #[error("processor rejected the frame: {0}")]
    Failed(#[from] ProcessError),
    #[error("processor panicked: {0}")]
    Panicked(String),
}

/// Chooses between passthrough and processing for each frame.
pub struct ProcessingBridge {
    processor: Box<dyn NativeProcessor>,
    filter: ProcessingFilter,
    invocations: u64,
}

impl ProcessingBridge {
    pub fn new(processor: Box<dyn NativeProcessor>, filter: ProcessingFilter) -> Self {
        Self {
            processor,
            filter,
            invocations: 0,
        }
    }

    pub fn with_edge_processor(filter: ProcessingFilter) -> Self {
        Self::new(Box::new(EdgeProcessor), filter)
    }

    pub fn filter(&self) -> ProcessingFilter {
        self.filter
    }

    pub fn set_filter(&mut self, filter: ProcessingFilter) {
        self.filter = filter;
    }

    /// How many times the processor has been called.
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    pub fn library_version(&self) -> String {
        self.processor.library_version()
    }

    /// Returns the buffer that should be uploaded for this frame.
    ///
    /// With processing disabled the processor is not touched and `input` comes
    /// back unchanged. Otherwise the filter writes into `output`, which is
    /// returned. Errors and panics from the processor surface as
    /// [`ProcessingError`] so the caller can drop the frame.
    pub fn apply<'a>(
        &mut self,
        enabled: bool,
        input: &'a PixelBuffer,
        output: &'a mut PixelBuffer,
    ) -> Result<&'a PixelBuffer, ProcessingError> {
        if !enabled {
            return Ok(input);
        }

        if input.resolution() != output.resolution() {
            return Err(ProcessingError::SizeMismatch {
                input_width: input.width(),
                input_height: input.height(),
                output_width: output.width(),
                output_height: output.height(),
            });
        }

        self.invocations += 1;
        let processor = &mut self.processor;
        let filter = self.filter;
        let result = panic::catch_unwind(AssertUnwindSafe(|| match filter {
            ProcessingFilter::EdgeDetect(thresholds) => {
                processor.process_edge_detect(input.as_image(), output.as_image_mut(), thresholds)
            }
            ProcessingFilter::Grayscale => {
                processor.process_grayscale(input.as_image(), output.as_image_mut())
            }
        }));

        match result {
            Ok(Ok(())) => Ok(&*output),
            Ok(Err(error)) => Err(error.into()),
            Err(payload) => Err(ProcessingError::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

impl std::fmt::Debug for ProcessingBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingBridge")
            .field("filter", &self.filter)
            .field("invocations", &self.invocations)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

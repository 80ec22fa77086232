use anyhow::{bail, Result};
use image::RgbaImage;

use crate::gpu::{GpuBackend, TextureHandle, TextureParams};
use crate::types::Resolution;

/// Tightly packed RGBA8 pixels, `width * height * 4` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    image: RgbaImage,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.image.width(), self.image.height())
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn as_image_mut(&mut self) -> &mut RgbaImage {
        &mut self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.image
    }
}

/// The input/output pair the render thread converts into and processes out of.
///
/// Both buffers always share the dimensions of the most recent frame. They are
/// reallocated only when those dimensions change.
#[derive(Debug, Default)]
pub struct PixelBuffers {
    pair: Option<(PixelBuffer, PixelBuffer)>,
    reallocations: u64,
}

impl PixelBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes sure both buffers are exactly `width` x `height`.
    ///
    /// Returns `true` when the buffers had to be (re)allocated.
    pub fn ensure_capacity(&mut self, width: u32, height: u32) -> bool {
        if self.resolution() == Some(Resolution::new(width, height)) {
            return false;
        }

        tracing::debug!(
            width,
            height,
            previous = ?self.resolution(),
            "allocating pixel buffers"
        );
        // Drop the old pair first so a resize never holds both generations.
        self.pair = None;
        self.pair = Some((PixelBuffer::new(width, height), PixelBuffer::new(width, height)));
        self.reallocations += 1;
        true
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.pair.as_ref().map(|(input, _)| input.resolution())
    }

    pub fn input(&self) -> Option<&PixelBuffer> {
        self.pair.as_ref().map(|(input, _)| input)
    }

    pub fn output(&self) -> Option<&PixelBuffer> {
        self.pair.as_ref().map(|(_, output)| output)
    }

    pub fn pair_mut(&mut self) -> Option<(&mut PixelBuffer, &mut PixelBuffer)> {
        self.pair.as_mut().map(|(input, output)| (input, output))
    }

    /// Number of allocations performed since construction.
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    pub fn release(&mut self) {
        self.pair = None;
    }
}

/// The two textures the renderer owns: the raw camera surface and the
/// processed output that is actually drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureSet {
    pub raw: TextureHandle,
    pub processed: TextureHandle,
}

impl TextureSet {
    /// Creates both textures with linear filtering and clamp-to-edge wrapping.
    pub fn generate<B: GpuBackend + ?Sized>(backend: &mut B) -> Self {
        let raw = backend.create_texture(TextureParams::CAMERA);
        let processed = backend.create_texture(TextureParams::CAMERA);
        tracing::debug!(raw = raw.raw(), processed = processed.raw(), "generated textures");
        Self { raw, processed }
    }

    pub fn delete<B: GpuBackend + ?Sized>(self, backend: &mut B) {
        backend.delete_texture(self.raw);
        backend.delete_texture(self.processed);
    }
}

/// Copies `buffer` into `texture`, replacing its previous contents.
pub fn upload_to_gpu<B: GpuBackend + ?Sized>(
    backend: &mut B,
    buffer: &PixelBuffer,
    texture: TextureHandle,
) -> Result<()> {
    if !texture.is_valid() {
        bail!("cannot upload {}x{} pixels to an invalid texture", buffer.width(), buffer.height());
    }
    backend.upload_texture(texture, buffer.width(), buffer.height(), buffer.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{GpuCall, RecordingBackend};

    #[test]
    fn buffers_reallocate_only_on_size_change() {
        let mut buffers = PixelBuffers::new();
        assert!(buffers.ensure_capacity(640, 480));
        assert!(!buffers.ensure_capacity(640, 480));
        assert!(!buffers.ensure_capacity(640, 480));
        assert_eq!(buffers.reallocations(), 1);

        assert!(buffers.ensure_capacity(320, 240));
        assert_eq!(buffers.reallocations(), 2);

        let (input, output) = buffers.pair_mut().expect("allocated");
        assert_eq!(input.as_bytes().len(), 320 * 240 * 4);
        assert_eq!(output.resolution(), Resolution::new(320, 240));
    }

    #[test]
    fn release_drops_both_buffers() {
        let mut buffers = PixelBuffers::new();
        buffers.ensure_capacity(4, 4);
        buffers.release();
        assert!(buffers.input().is_none());
        assert!(buffers.output().is_none());
        assert!(buffers.ensure_capacity(4, 4));
    }

    #[test]
    fn texture_set_uses_camera_params() {
        let mut backend = RecordingBackend::new();
        let set = TextureSet::generate(&mut backend);
        assert_ne!(set.raw, set.processed);
        let calls = backend.log().calls();
        assert_eq!(
            calls,
            vec![
                GpuCall::CreateTexture(set.raw, TextureParams::CAMERA),
                GpuCall::CreateTexture(set.processed, TextureParams::CAMERA),
            ]
        );
    }

    #[test]
    fn upload_refuses_invalid_texture() {
        let mut backend = RecordingBackend::new();
        let buffer = PixelBuffer::new(2, 2);
        assert!(upload_to_gpu(&mut backend, &buffer, TextureHandle::INVALID).is_err());
        assert!(backend.log().calls().is_empty());
    }
}

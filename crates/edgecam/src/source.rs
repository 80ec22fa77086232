use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use image::RgbaImage;
use pipeconfig::CaptureFormat;
use renderer::{Frame, FrameSource, PixelFormat, Plane};

/// SMPTE-style bars: white, yellow, cyan, green, magenta, red, blue, black.
const BARS: [[u8; 3]; 8] = [
    [235, 235, 235],
    [235, 235, 16],
    [16, 235, 235],
    [16, 235, 16],
    [235, 16, 235],
    [235, 16, 16],
    [16, 16, 235],
    [16, 16, 16],
];

/// Pixels the bars move per frame.
const SCROLL_STEP: u32 = 4;

/// Frames handed out and not yet released by the pipeline.
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn track(&self, frame: Frame) -> Frame {
        self.0.fetch_add(1, Ordering::SeqCst);
        let counter = Arc::clone(&self.0);
        frame.with_release(move || {
            counter.fetch_sub(1, Ordering::SeqCst);
        })
    }
}

/// Synthetic camera producing scrolling colour bars.
#[derive(Debug)]
pub struct TestPattern {
    width: u32,
    height: u32,
    format: CaptureFormat,
    limit: Option<u64>,
    produced: u64,
    in_flight: InFlight,
}

impl TestPattern {
    pub fn new(width: u32, height: u32, format: CaptureFormat) -> Self {
        Self {
            width,
            height,
            format,
            limit: None,
            produced: 0,
            in_flight: InFlight::default(),
        }
    }

    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn in_flight(&self) -> InFlight {
        self.in_flight.clone()
    }

    fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
        let offset = (self.produced as u32).wrapping_mul(SCROLL_STEP);
        let bar_width = (self.width / BARS.len() as u32).max(1);
        let column = (x.wrapping_add(offset) / bar_width) as usize % BARS.len();
        // Bottom quarter is a gray ramp so the grayscale filter has a gradient.
        if y >= self.height - self.height / 4 {
            let value = (u64::from(x) * 255 / u64::from(self.width.max(1))) as u8;
            return [value, value, value];
        }
        BARS[column]
    }

    fn rgba_planes(&self) -> (PixelFormat, Vec<Plane>) {
        let (width, height) = (self.width, self.height);
        let mut data = Vec::with_capacity(plane_len(width, height, 4));
        for y in 0..height {
            for x in 0..width {
                let [r, g, b] = self.rgb_at(x, y);
                data.extend_from_slice(&[r, g, b, 255]);
            }
        }
        (
            PixelFormat::Rgba8,
            vec![Plane::new(data, width as usize * 4, 4)],
        )
    }

    fn yuv_planes(&self, interleaved: bool) -> (PixelFormat, Vec<Plane>) {
        let (width, height) = (self.width, self.height);
        let chroma_width = width.div_ceil(2);
        let chroma_height = height.div_ceil(2);

        let mut luma = Vec::with_capacity(plane_len(width, height, 1));
        for y in 0..height {
            for x in 0..width {
                luma.push(rgb_to_yuv(self.rgb_at(x, y))[0]);
            }
        }

        let mut u = Vec::with_capacity(plane_len(chroma_width, chroma_height, 1));
        let mut v = Vec::with_capacity(u.capacity());
        for y in 0..chroma_height {
            for x in 0..chroma_width {
                let [_, cb, cr] = rgb_to_yuv(self.rgb_at(x * 2, y * 2));
                u.push(cb);
                v.push(cr);
            }
        }

        let luma = Plane::new(luma, width as usize, 1);
        if interleaved {
            let uv = u.iter().zip(&v).flat_map(|(cb, cr)| [*cb, *cr]).collect();
            let uv = Plane::new(uv, chroma_width as usize * 2, 2);
            (PixelFormat::Nv12, vec![luma, uv])
        } else {
            let row = chroma_width as usize;
            (
                PixelFormat::Yuv420,
                vec![luma, Plane::new(u, row, 1), Plane::new(v, row, 1)],
            )
        }
    }
}

impl FrameSource for TestPattern {
    fn next_frame(&mut self) -> Option<Frame> {
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            return None;
        }
        let (format, planes) = match self.format {
            CaptureFormat::Yuv420 => self.yuv_planes(false),
            CaptureFormat::Nv12 => self.yuv_planes(true),
            CaptureFormat::Rgba => self.rgba_planes(),
        };
        self.produced += 1;
        let frame = Frame::new(self.width, self.height, format, planes);
        Some(self.in_flight.track(frame))
    }

    fn describe(&self) -> String {
        format!(
            "test pattern {}x{} {:?}",
            self.width, self.height, self.format
        )
    }
}

/// Repeats one image as RGBA frames.
#[derive(Debug)]
pub struct StillImage {
    image: RgbaImage,
    label: String,
    limit: Option<u64>,
    produced: u64,
    in_flight: InFlight,
}

impl StillImage {
    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("failed to read image {}", path.display()))?
            .to_rgba8();
        Ok(Self::from_image(image, path.display().to_string()))
    }

    pub fn from_image(image: RgbaImage, label: String) -> Self {
        Self {
            image,
            label,
            limit: None,
            produced: 0,
            in_flight: InFlight::default(),
        }
    }

    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn in_flight(&self) -> InFlight {
        self.in_flight.clone()
    }
}

impl FrameSource for StillImage {
    fn next_frame(&mut self) -> Option<Frame> {
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            return None;
        }
        self.produced += 1;
        let (width, height) = self.image.dimensions();
        let plane = Plane::new(self.image.as_raw().clone(), width as usize * 4, 4);
        let frame = Frame::new(width, height, PixelFormat::Rgba8, vec![plane]);
        Some(self.in_flight.track(frame))
    }

    fn describe(&self) -> String {
        let (width, height) = self.image.dimensions();
        format!("still image {} ({width}x{height})", self.label)
    }
}

/// Full-range BT.601, the inverse of the pipeline's YUV decode.
/// Byte length of a tightly packed plane, computed in `usize`.
fn plane_len(width: u32, height: u32, bytes_per_sample: usize) -> usize {
    width as usize * height as usize * bytes_per_sample
}

fn rgb_to_yuv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let u = -0.168_736 * r - 0.331_264 * g + 0.5 * b + 128.0;
    let v = 0.5 * r - 0.418_688 * g - 0.081_312 * b + 128.0;
    [y, u, v].map(|value| value.round().clamp(0.0, 255.0) as u8)
}

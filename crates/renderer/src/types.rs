use std::fmt;
use std::time::Duration;

pub use edgeproc::CannyThresholds;

/// Width and height of a frame, surface or buffer in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Filter applied by the processing bridge while processing is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingFilter {
    /// Canny edge detection with the given hysteresis thresholds.
    EdgeDetect(CannyThresholds),
    /// Plain luma conversion.
    Grayscale,
}

impl Default for ProcessingFilter {
    fn default() -> Self {
        Self::EdgeDetect(CannyThresholds::default())
    }
}

impl fmt::Display for ProcessingFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingFilter::EdgeDetect(thresholds) => {
                write!(f, "canny({}/{})", thresholds.low, thresholds.high)
            }
            ProcessingFilter::Grayscale => f.write_str("grayscale"),
        }
    }
}

/// Adapter selection hint forwarded to wgpu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerPreference {
    #[default]
    Low,
    High,
}

/// Immutable configuration passed to the surface view host at start-up.
///
/// `RendererConfig` mirrors the CLI/config file: whether processing starts
/// enabled, which filter runs, and how the statistics window is sized.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Initial value of the processing toggle.
    pub processing_enabled: bool,
    /// Filter used when processing is enabled.
    pub filter: ProcessingFilter,
    /// Window over which the FPS statistic is averaged.
    pub stats_window: Duration,
    /// Initial drawable size in physical pixels.
    pub surface_size: Resolution,
    /// GPU adapter preference for the wgpu backend.
    pub power: PowerPreference,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            processing_enabled: true,
            filter: ProcessingFilter::default(),
            stats_window: Duration::from_secs(1),
            surface_size: Resolution::new(1280, 720),
            power: PowerPreference::default(),
        }
    }
}

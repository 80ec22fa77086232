use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use image::DynamicImage;
use pipeconfig::{FilterKind, PipelineConfig, PowerSetting};
use renderer::{
    CannyThresholds, EdgeProcessor, Frame, FrameSource, PixelBuffer, PixelFormat, Plane,
    PowerPreference, PreviewOptions, ProcessingBridge, ProcessingFilter, RendererConfig,
    Resolution,
};
use tracing_subscriber::EnvFilter;

use crate::cli::{ProcessArgs, RunArgs};
use crate::paths;
use crate::source::{StillImage, TestPattern};

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn run(args: RunArgs) -> Result<()> {
    let (path, config) = load_config(&args)?;
    tracing::debug!(config = %path.display(), "resolved configuration");

    let source = build_source(&args, &config)?;
    let options = PreviewOptions {
        title: "edgecam".into(),
        capture_interval: capture_interval(config.capture.fps)?,
    };
    let renderer_config = renderer_config(&config);
    tracing::info!(
        filter = %renderer_config.filter,
        processing = renderer_config.processing_enabled,
        display = %renderer_config.surface_size,
        "starting edgecam preview"
    );
    renderer::run_preview(renderer_config, Box::new(EdgeProcessor), source, options)
}

/// Runs one image through the same conversion and processing path as the
/// live preview.
pub fn process(args: ProcessArgs) -> Result<()> {
    let image = image::open(&args.input)
        .with_context(|| format!("failed to read image {}", args.input.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    let frame = Frame::new(
        width,
        height,
        PixelFormat::Rgba8,
        vec![Plane::new(image.into_raw(), width as usize * 4, 4)],
    );

    let mut input = PixelBuffer::new(width, height);
    renderer::to_rgba(&frame, &mut input).context("input image is not a valid frame")?;
    frame.release();
    let mut output = PixelBuffer::new(width, height);

    let filter = processing_filter(args.filter, args.low, args.high);
    let mut bridge = ProcessingBridge::with_edge_processor(filter);
    let result = bridge
        .apply(!args.passthrough, &input, &mut output)
        .with_context(|| format!("{filter} failed"))?;
    save_image(result, &args.output)?;

    tracing::info!(
        input = %args.input.display(),
        output = %args.output.display(),
        filter = %filter,
        passthrough = args.passthrough,
        resolution = %Resolution::new(width, height),
        "processed image"
    );
    Ok(())
}

pub fn print_config(args: &RunArgs, path_only: bool) -> Result<()> {
    let (path, config) = load_config(args)?;
    if path_only {
        println!("{}", path.display());
        return Ok(());
    }
    println!("# {}", path.display());
    print!(
        "{}",
        toml::to_string_pretty(&config).context("failed to serialise configuration")?
    );
    Ok(())
}

pub fn print_version() {
    println!("edgecam {}", env!("CARGO_PKG_VERSION"));
    println!("{}", edgeproc::library_version());
}

fn load_config(args: &RunArgs) -> Result<(PathBuf, PipelineConfig)> {
    let (path, mut config) = match &args.config {
        Some(path) => (path.clone(), PipelineConfig::load(path)?),
        None => {
            let path = paths::default_config_path()?;
            let config = PipelineConfig::load_or_default(&path)?;
            (path, config)
        }
    };
    apply_overrides(&mut config, args);
    config
        .validate()
        .context("configuration is invalid after applying command-line overrides")?;
    Ok((path, config))
}

fn apply_overrides(config: &mut PipelineConfig, args: &RunArgs) {
    if let Some((width, height)) = args.size {
        config.display.width = width;
        config.display.height = height;
    }
    if let Some((width, height)) = args.capture_size {
        config.capture.width = width;
        config.capture.height = height;
    }
    if let Some(fps) = args.fps {
        config.capture.fps = fps;
    }
    if let Some(format) = args.format {
        config.capture.format = format;
    }
    if let Some(filter) = args.filter {
        config.processing.filter = filter;
    }
    if let Some(low) = args.low {
        config.processing.low_threshold = low;
    }
    if let Some(high) = args.high {
        config.processing.high_threshold = high;
    }
    if args.no_processing {
        config.processing.enabled = false;
    }
    if let Some(power) = args.power {
        config.display.power = power;
    }
}

fn processing_filter(kind: FilterKind, low: u32, high: u32) -> ProcessingFilter {
    match kind {
        FilterKind::Canny => ProcessingFilter::EdgeDetect(CannyThresholds::new(low, high)),
        FilterKind::Grayscale => ProcessingFilter::Grayscale,
    }
}

fn capture_interval(fps: f32) -> Result<Duration> {
    Duration::try_from_secs_f64(1.0 / f64::from(fps))
        .with_context(|| format!("capture rate of {fps} fps is out of range"))
}

fn renderer_config(config: &PipelineConfig) -> RendererConfig {
    let processing = &config.processing;
    RendererConfig {
        processing_enabled: processing.enabled,
        filter: processing_filter(
            processing.filter,
            processing.low_threshold,
            processing.high_threshold,
        ),
        stats_window: config.stats.window,
        surface_size: Resolution::new(config.display.width, config.display.height),
        power: match config.display.power {
            PowerSetting::Low => PowerPreference::Low,
            PowerSetting::High => PowerPreference::High,
        },
    }
}

fn build_source(args: &RunArgs, config: &PipelineConfig) -> Result<Box<dyn FrameSource>> {
    if let Some(path) = &args.image {
        let source = StillImage::open(path)?.with_limit(args.frames);
        return Ok(Box::new(source));
    }
    let capture = &config.capture;
    let source = TestPattern::new(capture.width, capture.height, capture.format)
        .with_limit(args.frames);
    Ok(Box::new(source))
}

fn save_image(buffer: &PixelBuffer, path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let result = match extension.as_deref() {
        // JPEG has no alpha channel.
        Some("jpg" | "jpeg") => DynamicImage::ImageRgba8(buffer.as_image().clone())
            .to_rgb8()
            .save(path),
        Some("png" | "bmp") => buffer.as_image().save(path),
        Some(other) => bail!("unsupported output format '.{other}'; expected png, jpg or bmp"),
        None => bail!("output path has no extension; expected .png, .jpg or .bmp"),
    };
    result.with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeconfig::CaptureFormat;

    #[test]
    fn overrides_replace_file_values() {
        let mut config = PipelineConfig::default();
        let args = RunArgs {
            size: Some((800, 600)),
            capture_size: Some((320, 240)),
            fps: Some(15.0),
            format: Some(CaptureFormat::Nv12),
            filter: Some(FilterKind::Grayscale),
            no_processing: true,
            power: Some(PowerSetting::High),
            ..RunArgs::default()
        };
        apply_overrides(&mut config, &args);

        assert_eq!((config.display.width, config.display.height), (800, 600));
        assert_eq!((config.capture.width, config.capture.height), (320, 240));
        assert_eq!(config.capture.fps, 15.0);
        assert_eq!(config.capture.format, CaptureFormat::Nv12);
        assert_eq!(config.processing.filter, FilterKind::Grayscale);
        assert!(!config.processing.enabled);
        assert_eq!(config.display.power, PowerSetting::High);
    }

    #[test]
    fn capture_interval_rejects_vanishing_rates() {
        assert_eq!(capture_interval(4.0).unwrap(), Duration::from_millis(250));
        assert!(capture_interval(1e-30).is_err());
    }

    #[test]
    fn renderer_config_follows_pipeline_config() {
        let mut config = PipelineConfig::default();
        config.processing.low_threshold = 20;
        config.processing.high_threshold = 80;
        config.stats.window = Duration::from_millis(250);

        let renderer = renderer_config(&config);
        assert!(renderer.processing_enabled);
        assert_eq!(
            renderer.filter,
            ProcessingFilter::EdgeDetect(CannyThresholds::new(20, 80))
        );
        assert_eq!(renderer.stats_window, Duration::from_millis(250));
        assert_eq!(renderer.surface_size, Resolution::new(1280, 720));
        assert_eq!(renderer.power, PowerPreference::Low);
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let args = RunArgs {
            config: Some(PathBuf::from("/nonexistent/edgecam.toml")),
            ..RunArgs::default()
        };
        assert!(load_config(&args).is_err());
    }

    #[test]
    fn unsupported_output_extension_is_rejected() {
        let buffer = PixelBuffer::new(2, 2);
        let err = save_image(&buffer, Path::new("out.tiff")).unwrap_err();
        assert!(err.to_string().contains("unsupported output format"));
    }
}

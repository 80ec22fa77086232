use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use pipeconfig::{CaptureFormat, FilterKind, PowerSetting};

#[derive(Parser, Debug)]
#[command(
    name = "edgecam",
    author,
    version,
    about = "Live camera preview with optional edge detection",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Configuration file; defaults to `edgecam.toml` in the user config directory.
    #[arg(long, value_name = "FILE", env = "EDGECAM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Preview window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Size of the synthetic camera frames (e.g. `640x480`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub capture_size: Option<(u32, u32)>,

    /// Camera frame rate.
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f32>,

    /// Pixel layout of the synthetic frames: `yuv420`, `nv12` or `rgba`.
    #[arg(long, value_name = "FORMAT", value_parser = parse_capture_format)]
    pub format: Option<CaptureFormat>,

    /// Filter applied while processing is enabled: `canny` or `grayscale`.
    #[arg(long, value_name = "FILTER", value_parser = FilterKind::parse)]
    pub filter: Option<FilterKind>,

    /// Canny low hysteresis threshold.
    #[arg(long, value_name = "N")]
    pub low: Option<u32>,

    /// Canny high hysteresis threshold.
    #[arg(long, value_name = "N")]
    pub high: Option<u32>,

    /// Start with processing disabled (toggle with space or `p`).
    #[arg(long)]
    pub no_processing: bool,

    /// Feed a still image instead of the synthetic test pattern.
    #[arg(long, value_name = "PATH")]
    pub image: Option<PathBuf>,

    /// Stop after this many frames.
    #[arg(long, value_name = "N")]
    pub frames: Option<u64>,

    /// GPU adapter preference: `low` or `high`.
    #[arg(long, value_name = "POWER", value_parser = parse_power)]
    pub power: Option<PowerSetting>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the processing filter over an image file and write the result.
    Process(ProcessArgs),
    /// Print the effective configuration as TOML.
    Config(ConfigArgs),
    /// Print edgecam and processing library versions.
    Version,
}

#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Image to read.
    #[arg(long, short, value_name = "PATH")]
    pub input: PathBuf,

    /// Where to write the processed image; the extension picks the format.
    #[arg(long, short, value_name = "PATH")]
    pub output: PathBuf,

    /// `canny` (default) or `grayscale`.
    #[arg(long, value_name = "FILTER", value_parser = FilterKind::parse, default_value = "canny")]
    pub filter: FilterKind,

    #[arg(long, value_name = "N", default_value_t = 50)]
    pub low: u32,

    #[arg(long, value_name = "N", default_value_t = 150)]
    pub high: u32,

    /// Skip the filter and write the converted input unchanged.
    #[arg(long)]
    pub passthrough: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Only print the resolved config file path.
    #[arg(long)]
    pub path_only: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width '{}'", w.trim()))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height '{}'", h.trim()))?;
    if width == 0 || height == 0 {
        return Err("dimensions must be greater than zero".into());
    }
    Ok((width, height))
}

pub fn parse_capture_format(value: &str) -> Result<CaptureFormat, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yuv420" | "yuv" | "i420" => Ok(CaptureFormat::Yuv420),
        "nv12" => Ok(CaptureFormat::Nv12),
        "rgba" | "rgba8" => Ok(CaptureFormat::Rgba),
        other => Err(format!(
            "unknown format '{other}'; expected yuv420, nv12 or rgba"
        )),
    }
}

pub fn parse_power(value: &str) -> Result<PowerSetting, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "low" | "low-power" => Ok(PowerSetting::Low),
        "high" | "high-performance" => Ok(PowerSetting::High),
        other => Err(format!("unknown power preference '{other}'; expected low or high")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_size("1280x720").unwrap(), (1280, 720));
        assert_eq!(parse_size(" 640 X 480 ").unwrap(), (640, 480));
        assert!(parse_size("0x480").is_err());
        assert!(parse_size("640").is_err());
        assert!(parse_size("widexhigh").is_err());
    }

    #[test]
    fn parses_formats_and_power() {
        assert_eq!(parse_capture_format("NV12").unwrap(), CaptureFormat::Nv12);
        assert_eq!(parse_capture_format("i420").unwrap(), CaptureFormat::Yuv420);
        assert!(parse_capture_format("bayer").is_err());
        assert_eq!(parse_power("high").unwrap(), PowerSetting::High);
        assert!(parse_power("turbo").is_err());
    }

    #[test]
    fn process_subcommand_defaults() {
        let cli = Cli::try_parse_from(["edgecam", "process", "-i", "in.png", "-o", "out.png"])
            .unwrap();
        match cli.command {
            Some(Command::Process(args)) => {
                assert_eq!(args.filter, FilterKind::Canny);
                assert_eq!((args.low, args.high), (50, 150));
                assert!(!args.passthrough);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn run_flags_parse_without_subcommand() {
        let cli = Cli::try_parse_from([
            "edgecam",
            "--size",
            "800x600",
            "--filter",
            "grey",
            "--no-processing",
            "--frames",
            "10",
        ])
        .unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.run.size, Some((800, 600)));
        assert_eq!(cli.run.filter, Some(FilterKind::Grayscale));
        assert!(cli.run.no_processing);
        assert_eq!(cli.run.frames, Some(10));
    }
}

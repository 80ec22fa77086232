use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which processing filter the render thread applies when processing is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Canny,
    Grayscale,
}

impl Default for FilterKind {
    fn default() -> Self {
        Self::Canny
    }
}

impl FilterKind {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "canny" | "edge" | "edges" => Ok(Self::Canny),
            "grayscale" | "greyscale" | "gray" | "grey" => Ok(Self::Grayscale),
            other => Err(format!("invalid filter '{other}'; expected canny or grayscale")),
        }
    }
}

impl<'de> Deserialize<'de> for FilterKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        FilterKind::parse(&raw).map_err(de::Error::custom)
    }
}

/// Pixel layout produced by the synthetic capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureFormat {
    #[default]
    Yuv420,
    Nv12,
    Rgba,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerSetting {
    #[default]
    Low,
    High,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    pub version: u32,
    #[serde(default)]
    pub processing: ProcessingSection,
    #[serde(default)]
    pub capture: CaptureSection,
    #[serde(default)]
    pub display: DisplaySection,
    #[serde(default)]
    pub stats: StatsSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessingSection {
    pub enabled: bool,
    pub filter: FilterKind,
    pub low_threshold: u32,
    pub high_threshold: u32,
}

impl Default for ProcessingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: FilterKind::Canny,
            low_threshold: 50,
            high_threshold: 150,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureSection {
    pub width: u32,
    pub height: u32,
    pub fps: f32,
    pub format: CaptureFormat,
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30.0,
            format: CaptureFormat::Yuv420,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplaySection {
    pub width: u32,
    pub height: u32,
    pub power: PowerSetting,
}

impl Default for DisplaySection {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            power: PowerSetting::Low,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatsSection {
    #[serde(
        default = "default_stats_window",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub window: Duration,
}

impl Default for StatsSection {
    fn default() -> Self {
        Self {
            window: default_stats_window(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            version: 1,
            processing: ProcessingSection::default(),
            capture: CaptureSection::default(),
            display: DisplaySection::default(),
            stats: StatsSection::default(),
        }
    }
}

fn default_stats_window() -> Duration {
    Duration::from_secs(1)
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Duration::try_from_secs_f64(v)
                .map_err(|err| E::custom(format!("invalid duration {v}: {err}")))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl PipelineConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: PipelineConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Loads `path` when it exists, otherwise falls back to the built-in defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        let processing = &self.processing;
        if processing.low_threshold > processing.high_threshold {
            return Err(ConfigError::Invalid(format!(
                "processing.low_threshold ({}) must not exceed processing.high_threshold ({})",
                processing.low_threshold, processing.high_threshold
            )));
        }

        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(ConfigError::Invalid(
                "capture width and height must be greater than zero".into(),
            ));
        }

        // 4:2:0 chroma planes need even luma dimensions.
        if self.capture.format != CaptureFormat::Rgba
            && (self.capture.width % 2 != 0 || self.capture.height % 2 != 0)
        {
            return Err(ConfigError::Invalid(format!(
                "capture size {}x{} must be even for {:?} frames",
                self.capture.width, self.capture.height, self.capture.format
            )));
        }

        if !self.capture.fps.is_finite() || self.capture.fps <= 0.0 {
            return Err(ConfigError::Invalid("capture.fps must be a finite value > 0".into()));
        }

        if self.display.width == 0 || self.display.height == 0 {
            return Err(ConfigError::Invalid(
                "display width and height must be greater than zero".into(),
            ));
        }

        if self.stats.window.is_zero() {
            return Err(ConfigError::Invalid(
                "stats.window must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

//! Configuration types for media-to-MP3 conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The same config drives both the
//! library ([`crate::convert::convert_file`]) and the `tomp3` binary.

use crate::error::ConvertError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default remote server; the endpoint path `/convert` is appended.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";

/// Fixed path of the remote conversion endpoint.
pub const CONVERT_PATH: &str = "/convert";

/// Configuration for a conversion.
///
/// # Example
/// ```rust
/// use tomp3::{ConversionConfig, QualityTier, Strategy};
///
/// let config = ConversionConfig::builder()
///     .strategy(Strategy::Remote)
///     .server_url("http://localhost:5000")
///     .quality(QualityTier::High)
///     .build()
///     .unwrap();
/// assert_eq!(config.convert_url(), "http://localhost:5000/convert");
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Which backend performs the conversion. Default: [`Strategy::Local`].
    pub strategy: Strategy,

    /// Base URL of the remote conversion server. Default: `http://127.0.0.1:5000`.
    pub server_url: String,

    /// Quality tier used when the caller doesn't pick one. Default: medium.
    pub quality: QualityTier,

    /// Use this FFmpeg binary instead of the auto-downloaded one.
    pub ffmpeg_path: Option<PathBuf>,

    /// Base cache directory for the auto-downloaded FFmpeg binary. The
    /// binary lives in its `ffmpeg-{VERSION}` subdirectory, the same layout
    /// `FFMPEG_AUTO_CACHE_DIR` gets.
    /// If None, uses `ffmpeg_auto::ffmpeg_cache_dir()`.
    pub runtime_cache_dir: Option<PathBuf>,

    /// Mirror to download the FFmpeg binary from.
    /// If None, uses `ffmpeg_auto::DEFAULT_BASE_URL`.
    pub runtime_base_url: Option<String>,

    /// Directory results are saved into. Default: current directory.
    pub output_dir: PathBuf,

    /// Whole-request timeout for the remote strategy in seconds.
    /// Default: None (the transport's own behaviour applies).
    pub request_timeout_secs: Option<u64>,

    /// Observer for progress and lifecycle events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            server_url: DEFAULT_SERVER_URL.to_string(),
            quality: QualityTier::default(),
            ffmpeg_path: None,
            runtime_cache_dir: None,
            runtime_base_url: None,
            output_dir: PathBuf::from("."),
            request_timeout_secs: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("strategy", &self.strategy)
            .field("server_url", &self.server_url)
            .field("quality", &self.quality)
            .field("ffmpeg_path", &self.ffmpeg_path)
            .field("runtime_cache_dir", &self.runtime_cache_dir)
            .field("runtime_base_url", &self.runtime_base_url)
            .field("output_dir", &self.output_dir)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn callback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Full URL of the remote endpoint.
    pub fn convert_url(&self) -> String {
        format!("{}{}", self.server_url.trim_end_matches('/'), CONVERT_PATH)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = url.into();
        self
    }

    pub fn quality(mut self, quality: QualityTier) -> Self {
        self.config.quality = quality;
        self
    }

    pub fn ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ffmpeg_path = Some(path.into());
        self
    }

    pub fn runtime_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.runtime_cache_dir = Some(dir.into());
        self
    }

    pub fn runtime_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.runtime_base_url = Some(url.into());
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = Some(secs);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ConvertError> {
        let c = &self.config;
        if c.strategy == Strategy::Remote {
            let url = reqwest::Url::parse(&c.server_url).map_err(|e| {
                ConvertError::InvalidConfig(format!("server URL '{}': {e}", c.server_url))
            })?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ConvertError::InvalidConfig(format!(
                    "server URL must be http or https, got '{}'",
                    c.server_url
                )));
            }
        }
        if c.request_timeout_secs == Some(0) {
            return Err(ConvertError::InvalidConfig(
                "request timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Where the conversion runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// FFmpeg on this machine, downloaded once and cached. (default)
    #[default]
    Local,
    /// Multipart upload to a remote `/convert` endpoint.
    Remote,
}

/// User-facing output bitrate preset.
///
/// | Tier     | Bitrate |
/// |----------|---------|
/// | `low`    | 96k     |
/// | `medium` | 192k (default) |
/// | `high`   | 320k    |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    #[default]
    Medium,
    High,
}

impl QualityTier {
    /// Encoder bitrate argument for this tier.
    pub fn bitrate(self) -> &'static str {
        match self {
            QualityTier::Low => "96k",
            QualityTier::Medium => "192k",
            QualityTier::High => "320k",
        }
    }

    /// Wire value sent in the `quality` form field.
    pub fn as_str(self) -> &'static str {
        match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        }
    }

    /// Parse a tier name, treating anything unrecognised as [`QualityTier::Medium`].
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl FromStr for QualityTier {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(QualityTier::Low),
            "medium" => Ok(QualityTier::Medium),
            "high" => Ok(QualityTier::High),
            other => Err(ConvertError::InvalidConfig(format!(
                "unknown quality tier '{other}' (expected low, medium, or high)"
            ))),
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

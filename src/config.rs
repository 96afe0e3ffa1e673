use serde::Deserialize;
use std::path::PathBuf;
use crate::error::{ClipError, Result};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub transcoder: TranscoderConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Where recordings are read from and where clips and provenance land.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root holding one subdirectory of recordings per camera.
    #[serde(default = "default_clips_dir")]
    pub clips_dir: PathBuf,
    /// Assembled clips are written here.
    #[serde(default = "default_videos_dir")]
    pub videos_dir: PathBuf,
    /// Provenance records (JSON + text) are written here.
    #[serde(default = "default_annotations_dir")]
    pub annotations_dir: PathBuf,
    /// Persisted per-camera segment index.
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            clips_dir: default_clips_dir(),
            videos_dir: default_videos_dir(),
            annotations_dir: default_annotations_dir(),
            index_path: default_index_path(),
        }
    }
}

/// Which segment source backs the live clip path.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Scan `clips_dir` on every request.
    #[default]
    Filesystem,
    /// Use the persisted segment index.
    Index,
}

/// Filesystem scan heuristics.
#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub source: SourceKind,
    /// Media file extensions considered during a scan (without the dot).
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Estimated seconds of footage per megabyte of file.
    #[serde(default = "default_seconds_per_mb")]
    pub seconds_per_mb: f64,
    /// Floor applied to every size-based duration estimate.
    #[serde(default = "default_min_duration")]
    pub min_duration_secs: u64,
    /// Duration assumed for empty files.
    #[serde(default = "default_fallback_duration")]
    pub fallback_duration_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            extensions: default_extensions(),
            seconds_per_mb: default_seconds_per_mb(),
            min_duration_secs: default_min_duration(),
            fallback_duration_secs: default_fallback_duration(),
        }
    }
}

/// Worker pool and clip window parameters.
#[derive(Debug, Deserialize, Clone)]
pub struct JobsConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Seconds of footage before the requested timestamp.
    #[serde(default = "default_lead")]
    pub lead_secs: u64,
    /// Seconds of footage after the requested timestamp.
    #[serde(default = "default_trail")]
    pub trail_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self { workers: default_workers(), lead_secs: default_lead(), trail_secs: default_trail() }
    }
}

impl JobsConfig {
    pub fn lead(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lead_secs as i64)
    }

    pub fn trail(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.trail_secs as i64)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranscoderConfig {
    #[serde(default = "default_binary")]
    pub binary: PathBuf,
    /// Hard wall-clock ceiling for one transcoder run.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self { binary: default_binary(), timeout_secs: default_timeout() }
    }
}

/// HTTP API configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { enabled: default_api_enabled(), port: default_api_port() }
    }
}

fn default_clips_dir() -> PathBuf { PathBuf::from("mediamtx_clips") }
fn default_videos_dir() -> PathBuf { PathBuf::from("videos") }
fn default_annotations_dir() -> PathBuf { PathBuf::from("annotations") }
fn default_index_path() -> PathBuf { PathBuf::from("buffer_index.json") }
fn default_extensions() -> Vec<String> { vec!["mp4".into(), "mkv".into(), "avi".into()] }
fn default_seconds_per_mb() -> f64 { 5.0 }
fn default_min_duration() -> u64 { 5 }
fn default_fallback_duration() -> u64 { 20 }
fn default_workers() -> usize { 3 }
fn default_lead() -> u64 { 15 }
fn default_trail() -> u64 { 5 }
fn default_binary() -> PathBuf { PathBuf::from("ffmpeg") }
fn default_timeout() -> u64 { 300 }
fn default_api_enabled() -> bool { true }
fn default_api_port() -> u16 { 8000 }

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClipError::Config(format!("Cannot read config file: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| ClipError::Config(format!("Invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.jobs.workers == 0 {
            return Err(ClipError::Config("workers must be > 0".into()));
        }
        if self.transcoder.timeout_secs == 0 {
            return Err(ClipError::Config("timeout_secs must be > 0".into()));
        }
        if self.discovery.extensions.is_empty() {
            return Err(ClipError::Config("No media extensions defined".into()));
        }
        let rate = self.discovery.seconds_per_mb;
        if rate.is_nan() || rate <= 0.0 {
            return Err(ClipError::Config("seconds_per_mb must be > 0".into()));
        }
        if self.discovery.min_duration_secs == 0 {
            return Err(ClipError::Config("min_duration_secs must be > 0".into()));
        }
        Ok(())
    }
}

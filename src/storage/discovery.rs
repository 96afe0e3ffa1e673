//! Live segment discovery over a directory tree of recordings:
//!
//! ```text
//! <clips_dir>/
//!   camera1/
//!     2025-08-25_18-00-00-000000.mp4
//!     cam_20250825_180030.mkv
//!   camera2/
//!     ...
//! ```
//!
//! Start times come from the filename when one of the known timestamp
//! patterns parses, otherwise from the file's mtime. End times are an
//! estimate derived from the file size; nothing is demuxed.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::error::{ClipError, Result};
use crate::storage::{add_seconds, overlaps, SegmentSource, SourceClip};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// How a pattern's capture groups are turned into a timestamp.
#[derive(Debug, Clone, Copy)]
enum Layout {
    /// `YYYY-MM-DD_HH-MM-SS`
    Separated,
    /// `YYYYMMDD_HHMMSS`
    CompactPair,
    /// `YYYYMMDDHHMMSS`
    DigitRun,
    /// `YYYY-MM-DDTHH:MM:SS` (dashes accepted in the time part)
    Iso,
}

/// Filesystem-backed [`SegmentSource`].
pub struct SegmentDiscovery {
    base_dir: PathBuf,
    extensions: Vec<String>,
    seconds_per_mb: f64,
    min_duration_secs: u64,
    fallback_duration_secs: u64,
    patterns: Vec<(Regex, Layout)>,
}

impl SegmentDiscovery {
    pub fn new(base_dir: impl Into<PathBuf>, cfg: &DiscoveryConfig) -> Result<Self> {
        let specs = [
            (r"(\d{4}-\d{2}-\d{2})_(\d{2}-\d{2}-\d{2})", Layout::Separated),
            (r"(\d{8})_(\d{6})", Layout::CompactPair),
            (r"(\d{14})", Layout::DigitRun),
            (r"(\d{4}-\d{2}-\d{2}T\d{2}[:\-]\d{2}[:\-]\d{2})", Layout::Iso),
        ];
        let patterns = specs
            .into_iter()
            .map(|(re, layout)| {
                Regex::new(re)
                    .map(|r| (r, layout))
                    .map_err(|e| ClipError::Config(format!("timestamp pattern {re}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            base_dir: base_dir.into(),
            extensions: cfg.extensions.iter().map(|e| e.trim_start_matches('.').to_ascii_lowercase()).collect(),
            seconds_per_mb: cfg.seconds_per_mb,
            min_duration_secs: cfg.min_duration_secs,
            fallback_duration_secs: cfg.fallback_duration_secs,
            patterns,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Whether the recordings root exists and is a directory.
    pub fn base_dir_exists(&self) -> bool {
        self.base_dir.is_dir()
    }

    /// Scan `camera_id`'s directory for media files overlapping `[from, to]`,
    /// sorted by inferred start time.
    ///
    /// Per-file failures are logged and skipped; a missing camera directory
    /// yields an empty list.
    pub fn find_clips(&self, camera_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<SourceClip> {
        if camera_id.is_empty() || camera_id.contains(['/', '\\']) || camera_id == "." || camera_id == ".." {
            warn!(camera = camera_id, "Rejected camera id");
            return Vec::new();
        }

        let camera_dir = self.base_dir.join(camera_id);
        if !camera_dir.is_dir() {
            warn!(camera = camera_id, dir = ?camera_dir, "Camera directory not found");
            return Vec::new();
        }

        let entries = match std::fs::read_dir(&camera_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(camera = camera_id, dir = ?camera_dir, error = %e, "Cannot read camera directory");
                return Vec::new();
            }
        };

        let mut clips = Vec::new();
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    warn!(camera = camera_id, error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            if !self.is_media_file(&path) {
                continue;
            }
            match self.describe(&path) {
                Ok(Some(clip)) if overlaps(clip.start, clip.end, from, to) => clips.push(clip),
                Ok(_) => {}
                Err(e) => warn!(path = ?path, error = %e, "Skipping file"),
            }
        }

        clips.sort_by_key(|c| c.start);
        debug!(camera = camera_id, found = clips.len(), "Discovery scan complete");
        clips
    }

    /// Subdirectory names of the recordings root, sorted.
    pub fn list_cameras(&self) -> Vec<String> {
        let entries = match std::fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut cameras: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        cameras.sort();
        cameras
    }

    /// First timestamp pattern that both matches and parses wins.
    pub fn start_from_filename(&self, filename: &str) -> Option<DateTime<Utc>> {
        self.patterns.iter().find_map(|(re, layout)| {
            let caps = re.captures(filename)?;
            let naive = match layout {
                Layout::Separated => NaiveDateTime::parse_from_str(
                    &format!("{} {}", &caps[1], &caps[2]),
                    "%Y-%m-%d %H-%M-%S",
                ),
                Layout::CompactPair => {
                    NaiveDateTime::parse_from_str(&format!("{}{}", &caps[1], &caps[2]), "%Y%m%d%H%M%S")
                }
                Layout::DigitRun => NaiveDateTime::parse_from_str(&caps[1], "%Y%m%d%H%M%S"),
                Layout::Iso => NaiveDateTime::parse_from_str(&caps[1].replace(':', "-"), "%Y-%m-%dT%H-%M-%S"),
            };
            naive.ok().map(|n| n.and_utc())
        })
    }

    /// Size-based duration guess in seconds.
    pub fn estimate_duration(&self, size_bytes: u64) -> f64 {
        if size_bytes == 0 {
            return self.fallback_duration_secs as f64;
        }
        let estimate = (size_bytes as f64 / BYTES_PER_MB * self.seconds_per_mb).floor() as u64;
        estimate.max(self.min_duration_secs) as f64
    }

    fn is_media_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|known| known.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }

    fn describe(&self, path: &Path) -> Result<Option<SourceClip>> {
        let meta = std::fs::metadata(path)?;
        if !meta.is_file() {
            return Ok(None);
        }

        let filename = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let start = match self.start_from_filename(&filename) {
            Some(ts) => ts,
            None => {
                let mtime = DateTime::<Utc>::from(meta.modified()?);
                info!(file = filename, mtime = %mtime, "Using file mtime as start time");
                mtime
            }
        };

        let size_bytes = meta.len();
        let duration_secs = self.estimate_duration(size_bytes);
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

        Ok(Some(SourceClip {
            path,
            start,
            end: add_seconds(start, duration_secs),
            duration_secs,
            size_bytes,
        }))
    }
}

impl SegmentSource for SegmentDiscovery {
    fn find_overlapping(&self, camera_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<SourceClip>> {
        Ok(self.find_clips(camera_id, from, to))
    }

    fn camera_ids(&self) -> Vec<String> {
        self.list_cameras()
    }

    fn name(&self) -> &'static str {
        "filesystem"
    }
}

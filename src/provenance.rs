//! Provenance records: which source files (and how many bytes of each)
//! produced an assembled clip. Written once per successful job as a JSON
//! document plus a plain-text summary.

use std::fmt::Write as FmtWrite;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ClipError, Result};
use crate::storage::SourceClip;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSegment {
    pub file_path: PathBuf,
    pub filename: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub file_size: u64,
}

impl From<&SourceClip> for SourceSegment {
    fn from(clip: &SourceClip) -> Self {
        Self {
            file_path: clip.path.clone(),
            filename: clip.filename(),
            start_time: clip.start,
            end_time: clip.end,
            file_size: clip.size_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub job_id: String,
    pub camera_id: String,
    pub requested_start: DateTime<Utc>,
    pub requested_end: DateTime<Utc>,
    pub actual_start: DateTime<Utc>,
    pub actual_end: DateTime<Utc>,
    pub duration_seconds: f64,
    /// Which segment source located the inputs.
    pub source: String,
    pub source_segments: Vec<SourceSegment>,
    pub created_at: DateTime<Utc>,
}

impl ProvenanceRecord {
    /// Build the record for `sources`, which must be non-empty. The actual
    /// window is the union of the sources' bounds.
    pub fn new(
        job_id: &str,
        camera_id: &str,
        requested: (DateTime<Utc>, DateTime<Utc>),
        source: &str,
        sources: &[SourceClip],
    ) -> Result<Self> {
        let actual_start = sources.iter().map(|c| c.start).min()
            .ok_or_else(|| ClipError::Provenance("no source segments".into()))?;
        let actual_end = sources.iter().map(|c| c.end).max()
            .ok_or_else(|| ClipError::Provenance("no source segments".into()))?;

        let mut source_segments: Vec<SourceSegment> = sources.iter().map(SourceSegment::from).collect();
        source_segments.sort_by_key(|s| s.start_time);

        Ok(Self {
            job_id: job_id.to_string(),
            camera_id: camera_id.to_string(),
            requested_start: requested.0,
            requested_end: requested.1,
            actual_start,
            actual_end,
            duration_seconds: (requested.1 - requested.0).num_milliseconds() as f64 / 1000.0,
            source: source.to_string(),
            source_segments,
            created_at: Utc::now(),
        })
    }

    /// Human-readable summary.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Clip ID: {}", self.job_id);
        let _ = writeln!(out, "Camera: {}", self.camera_id);
        let _ = writeln!(out, "Source: {}", self.source);
        let _ = writeln!(out, "Requested Time Range: {} to {}", self.requested_start, self.requested_end);
        let _ = writeln!(out, "Actual Time Range: {} to {}", self.actual_start, self.actual_end);
        let _ = writeln!(out, "Duration: {} seconds", self.duration_seconds);
        let _ = writeln!(out, "Source Clips Used: {}", self.source_segments.len());
        for (i, seg) in self.source_segments.iter().enumerate() {
            let _ = writeln!(
                out,
                "  {}. {} ({} to {}, {} bytes)",
                i + 1,
                seg.filename,
                seg.start_time.to_rfc3339(),
                seg.end_time.to_rfc3339(),
                seg.file_size
            );
        }
        out
    }

    /// Write `<base_name>.json` and `<base_name>.txt` under `dir`.
    /// Returns the JSON path.
    pub fn write(&self, dir: &Path, base_name: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .map_err(|e| ClipError::Provenance(format!("create {dir:?}: {e}")))?;

        let json_path = dir.join(format!("{base_name}.json"));
        std::fs::write(&json_path, serde_json::to_string_pretty(self)?)
            .map_err(|e| ClipError::Provenance(format!("write {json_path:?}: {e}")))?;

        let txt_path = dir.join(format!("{base_name}.txt"));
        std::fs::write(&txt_path, self.to_text())
            .map_err(|e| ClipError::Provenance(format!("write {txt_path:?}: {e}")))?;

        info!(job_id = self.job_id, json = ?json_path, segments = self.source_segments.len(), "Provenance written");
        Ok(json_path)
    }
}

// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Storage subsystem: where recorded footage for a camera and window lives.
//!
//! Two interchangeable backends implement [`SegmentSource`]:
//!   - [`index::SegmentIndex`]: persisted per-camera segment list with keyframes.
//!   - [`discovery::SegmentDiscovery`]: best-effort live filesystem scan.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;

pub mod discovery;
pub mod index;

/// A source file that overlaps a requested window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceClip {
    pub path: PathBuf,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_secs: f64,
    pub size_bytes: u64,
}

impl SourceClip {
    /// File name component, or the whole path when it has none.
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }
}

/// "Given camera + window, return the overlapping source files."
pub trait SegmentSource: Send + Sync {
    /// Overlapping sources ordered by start time. Unknown cameras yield an
    /// empty list.
    fn find_overlapping(
        &self,
        camera_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SourceClip>>;

    /// Cameras known to this source, sorted.
    fn camera_ids(&self) -> Vec<String>;

    /// Short label recorded in provenance.
    fn name(&self) -> &'static str;
}

/// Inclusive overlap: touching boundaries count.
pub fn overlaps(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> bool {
    start <= to && end >= from
}

/// Signed seconds between two instants, millisecond resolution.
pub(crate) fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

/// `ts + secs`, rounded to the millisecond.
pub(crate) fn add_seconds(ts: DateTime<Utc>, secs: f64) -> DateTime<Utc> {
    ts + chrono::Duration::milliseconds((secs * 1000.0).round() as i64)
}

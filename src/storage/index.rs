// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Segment index — maps (camera_id, time_range) → [`Segment`].
//!
//! The index is loaded once from a JSON document at startup. When the
//! document is absent a fixed default dataset is synthesized and written
//! back, so later runs see exactly the same segments. After load the index
//! is read-mostly; callers share it behind an `Arc`.
//!
//! ```text
//! {
//!   "camera1": [
//!     { "file": "...", "start": "...", "end": "...", "keyframes": [0.0, 5.0, ...] }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ClipError, Result};
use crate::storage::{add_seconds, overlaps, seconds_between, SegmentSource, SourceClip};

/// A recorded interval with the offsets (seconds from `start`) where the
/// transcoder can cut cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSegment")]
pub struct Segment {
    file: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    keyframes: Vec<f64>,
}

#[derive(Deserialize)]
struct RawSegment {
    file: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    keyframes: Vec<f64>,
}

impl TryFrom<RawSegment> for Segment {
    type Error = ClipError;

    fn try_from(raw: RawSegment) -> Result<Self> {
        Segment::new(raw.file, raw.start, raw.end, raw.keyframes)
    }
}

impl Segment {
    /// Build a segment, enforcing `start < end` and a keyframe list that is
    /// ascending, starts at 0 and never passes the segment duration.
    pub fn new(
        file: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        keyframes: Vec<f64>,
    ) -> Result<Self> {
        let file = file.into();
        if start >= end {
            return Err(ClipError::Index(format!("segment '{file}': start must precede end")));
        }
        if keyframes.first() != Some(&0.0) {
            return Err(ClipError::Index(format!("segment '{file}': first keyframe must be 0")));
        }
        if keyframes.iter().any(|k| !k.is_finite()) || keyframes.windows(2).any(|w| w[1] < w[0]) {
            return Err(ClipError::Index(format!("segment '{file}': keyframes not ascending")));
        }
        let duration = seconds_between(start, end);
        if keyframes.iter().any(|&k| k > duration) {
            return Err(ClipError::Index(format!(
                "segment '{file}': keyframe beyond duration {duration}s"
            )));
        }
        Ok(Self { file, start, end, keyframes })
    }

    pub fn file(&self) -> &str { &self.file }
    pub fn start(&self) -> DateTime<Utc> { self.start }
    pub fn end(&self) -> DateTime<Utc> { self.end }
    pub fn keyframes(&self) -> &[f64] { &self.keyframes }

    pub fn duration_secs(&self) -> f64 {
        seconds_between(self.start, self.end)
    }

    /// Align `timestamp` to a keyframe of this segment.
    ///
    /// Returns the absolute snapped time and the keyframe offset chosen.
    /// Timestamps before the segment clamp to `(start, 0)`, timestamps after
    /// it clamp to `(end, last keyframe)`. Otherwise the nearest keyframe
    /// wins (the smaller offset on an exact tie); with `prefer_earlier` a
    /// nearest keyframe lying after the timestamp is replaced by the latest
    /// one at or before it, and symmetrically for `!prefer_earlier`.
    pub fn snap_to_keyframe(&self, timestamp: DateTime<Utc>, prefer_earlier: bool) -> (DateTime<Utc>, f64) {
        let relative = seconds_between(self.start, timestamp);
        let last = self.keyframes.last().copied().unwrap_or(0.0);

        if relative < 0.0 {
            return (self.start, 0.0);
        }
        if relative > self.duration_secs() {
            return (self.end, last);
        }

        let mut chosen = self.keyframes[0];
        for &kf in &self.keyframes[1..] {
            if (kf - relative).abs() < (chosen - relative).abs() {
                chosen = kf;
            }
        }

        if prefer_earlier && chosen > relative {
            if let Some(earlier) = self.keyframes.iter().copied().filter(|&k| k <= relative).last() {
                chosen = earlier;
            }
        } else if !prefer_earlier && chosen < relative {
            if let Some(later) = self.keyframes.iter().copied().find(|&k| k >= relative) {
                chosen = later;
            }
        }

        (add_seconds(self.start, chosen), chosen)
    }
}

/// Per-camera ordered segment lists.
#[derive(Debug, Default)]
pub struct SegmentIndex {
    cameras: BTreeMap<String, Vec<Segment>>,
}

impl SegmentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the index stored at `path`, or seed and persist the default
    /// dataset when nothing is stored there yet.
    pub fn open(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let cameras: BTreeMap<String, Vec<Segment>> = serde_json::from_str(&content)
                .map_err(|e| ClipError::Index(format!("{path:?}: {e}")))?;
            let mut index = Self::new();
            for (camera_id, segments) in cameras {
                for seg in segments {
                    index.insert(&camera_id, seg);
                }
            }
            info!(path = ?path, cameras = index.cameras.len(), segments = index.len(), "Segment index loaded");
            return Ok(index);
        }

        warn!(path = ?path, "No segment index found, seeding default dataset");
        let index = Self::default_dataset()?;
        index.save(path)?;
        Ok(index)
    }

    /// Write the index as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.cameras)?;
        std::fs::write(path, json)?;
        info!(path = ?path, segments = self.len(), "Segment index persisted");
        Ok(())
    }

    /// Insert a segment, keeping the camera's list ordered by start time.
    pub fn insert(&mut self, camera_id: &str, segment: Segment) {
        let list = self.cameras.entry(camera_id.to_string()).or_default();
        let pos = list.partition_point(|s| s.start <= segment.start);
        list.insert(pos, segment);
    }

    /// Segments for `camera_id` overlapping `[from, to]` (inclusive), sorted
    /// by start time. Unknown cameras yield an empty list.
    pub fn find_segments(&self, camera_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<&Segment> {
        self.segments_for_camera(camera_id)
            .iter()
            .filter(|s| overlaps(s.start, s.end, from, to))
            .collect()
    }

    /// All segments of one camera in chronological order.
    pub fn segments_for_camera(&self, camera_id: &str) -> &[Segment] {
        self.cameras.get(camera_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn camera_ids(&self) -> Vec<String> {
        self.cameras.keys().cloned().collect()
    }

    /// Total number of indexed segments.
    pub fn len(&self) -> usize {
        self.cameras.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn default_dataset() -> Result<Self> {
        let base = Utc.with_ymd_and_hms(2025, 8, 25, 18, 0, 0).single()
            .ok_or_else(|| ClipError::Index("invalid default base time".into()))?;
        let at = |secs: i64| base + chrono::Duration::seconds(secs);
        let every = |step: f64, total: f64| -> Vec<f64> {
            let mut kfs: Vec<f64> = (0..).map(|i| i as f64 * step).take_while(|&k| k < total).collect();
            kfs.push(total);
            kfs
        };

        let mut index = Self::new();
        index.insert("camera1", Segment::new("mock_cameras/test.mp4", at(0), at(30), every(5.0, 30.0))?);
        index.insert("camera1", Segment::new("mock_cameras/test2.mp4", at(30), at(60), every(5.0, 30.0))?);
        index.insert("camera2", Segment::new("mock_cameras/test2.mp4", at(0), at(30), every(4.0, 30.0))?);
        index.insert("camera2", Segment::new("mock_cameras/test3.mp4", at(30), at(60), every(3.0, 30.0))?);
        index.insert("camera3", Segment::new("mock_cameras/test3.mp4", at(0), at(45), every(6.0, 45.0))?);
        Ok(index)
    }
}

impl SegmentSource for SegmentIndex {
    fn find_overlapping(&self, camera_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<SourceClip>> {
        Ok(self
            .find_segments(camera_id, from, to)
            .into_iter()
            .map(|s| {
                let path = PathBuf::from(&s.file);
                let size_bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                SourceClip {
                    path,
                    start: s.start,
                    end: s.end,
                    duration_secs: s.duration_secs(),
                    size_bytes,
                }
            })
            .collect())
    }

    fn camera_ids(&self) -> Vec<String> {
        SegmentIndex::camera_ids(self)
    }

    fn name(&self) -> &'static str {
        "index"
    }
}

//! Clip request and job records.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Caller's ask: footage around `timestamp` for one camera.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipRequest {
    pub camera_id: String,
    pub timestamp: DateTime<Utc>,
    /// Requested length in seconds. Accepted for compatibility; the window is
    /// always derived from the configured lead/trail.
    #[serde(default)]
    pub duration: Option<u32>,
}

impl ClipRequest {
    /// `[timestamp - lead, timestamp + trail]`.
    pub fn window(&self, lead: Duration, trail: Duration) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.timestamp - lead, self.timestamp + trail)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl ClipStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ClipStatus::Done | ClipStatus::Failed)
    }

    /// PENDING → PROCESSING → DONE | FAILED, nothing else.
    pub fn can_transition_to(self, next: ClipStatus) -> bool {
        matches!(
            (self, next),
            (ClipStatus::Pending, ClipStatus::Processing)
                | (ClipStatus::Processing, ClipStatus::Done)
                | (ClipStatus::Processing, ClipStatus::Failed)
        )
    }
}

impl fmt::Display for ClipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClipStatus::Pending => "pending",
            ClipStatus::Processing => "processing",
            ClipStatus::Done => "done",
            ClipStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One clip job as tracked by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipJob {
    #[serde(rename = "clip_id")]
    pub job_id: String,
    pub camera_id: String,
    #[serde(rename = "start_time")]
    pub window_start: DateTime<Utc>,
    #[serde(rename = "end_time")]
    pub window_end: DateTime<Utc>,
    pub status: ClipStatus,
    /// Where the assembled clip can be fetched once DONE.
    #[serde(rename = "download_url", skip_serializing_if = "Option::is_none")]
    pub output_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ClipJob {
    /// New PENDING job covering `[timestamp - lead, timestamp + trail]`.
    pub fn new(job_id: String, request: &ClipRequest, lead: Duration, trail: Duration) -> Self {
        let (window_start, window_end) = request.window(lead, trail);
        Self {
            job_id,
            camera_id: request.camera_id.clone(),
            window_start,
            window_end,
            status: ClipStatus::Pending,
            output_reference: None,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

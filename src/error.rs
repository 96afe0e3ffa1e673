use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClipError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Index error: {0}")]
    Index(String),

    #[error("No clips found for camera '{camera_id}' in time range")]
    NoSegments { camera_id: String },

    #[error("Transcoder exited with code {code:?}: {stderr}")]
    TranscoderFailed {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("Transcoder timed out after {secs} seconds")]
    TranscoderTimeout { secs: u64 },

    #[error("Cannot launch transcoder '{binary}': {source}")]
    TranscoderLaunch {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Provenance error: {0}")]
    Provenance(String),

    #[error("Job '{id}' cannot move from {from} to {to}")]
    InvalidTransition { id: String, from: String, to: String },

    #[error("Job '{id}' not found")]
    JobNotFound { id: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClipError {
    /// Stable label used for the error-type metric.
    pub fn kind(&self) -> &'static str {
        match self {
            ClipError::Config(_) => "config",
            ClipError::Io(_) => "io",
            ClipError::Json(_) => "serialization",
            ClipError::Index(_) => "index",
            ClipError::NoSegments { .. } => "no_segments",
            ClipError::TranscoderFailed { .. } => "ffmpeg_failed",
            ClipError::TranscoderTimeout { .. } => "ffmpeg_timeout",
            ClipError::TranscoderLaunch { .. } => "subprocess_failed",
            ClipError::Provenance(_) => "provenance",
            ClipError::InvalidTransition { .. } => "invalid_transition",
            ClipError::JobNotFound { .. } => "job_not_found",
            ClipError::Internal(_) => "worker_exception",
        }
    }
}

pub type Result<T> = std::result::Result<T, ClipError>;

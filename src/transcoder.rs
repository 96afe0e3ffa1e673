//! External transcoder invocation.
//!
//! The transcoder is a black box driven by argument vectors. Every run is
//! bounded by a wall-clock timeout; on expiry the child is killed and the
//! run reported as [`ClipError::TranscoderTimeout`].

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{ClipError, Result};

/// Captured output of a successful run.
#[derive(Debug, Clone, Default)]
pub struct TranscodeOutput {
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Run the transcoder with `args`. Non-zero exit, timeout and launch
    /// failure are all returned as errors.
    async fn run(&self, args: Vec<String>) -> Result<TranscodeOutput>;
}

/// `ffmpeg` (or a compatible binary) as a subprocess.
pub struct FfmpegTranscoder {
    binary: PathBuf,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self { binary: binary.into(), timeout }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn run(&self, args: Vec<String>) -> Result<TranscodeOutput> {
        let binary = self.binary.display().to_string();
        debug!(command = %format!("{binary} {}", args.join(" ")), "Running transcoder");

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ClipError::TranscoderLaunch { binary: binary.clone(), source })?;

        // Dropping the pending future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Transcoder timed out, killed");
                return Err(ClipError::TranscoderTimeout { secs: self.timeout.as_secs() });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            Ok(TranscodeOutput { stdout, stderr })
        } else {
            Err(ClipError::TranscoderFailed { code: output.status.code(), stdout, stderr })
        }
    }
}

/// Stream-copy trim of one input.
pub fn trim_args(input: &Path, start_offset: f64, duration: f64, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-ss".into(),
        format!("{start_offset:.3}"),
        "-i".into(),
        input.display().to_string(),
        "-t".into(),
        format!("{duration:.3}"),
        "-c".into(),
        "copy".into(),
        "-avoid_negative_ts".into(),
        "make_zero".into(),
        output.display().to_string(),
    ]
}

/// Stream-copy concatenation driven by a concat-demuxer manifest.
pub fn concat_args(manifest: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        manifest.display().to_string(),
        "-c".into(),
        "copy".into(),
        "-avoid_negative_ts".into(),
        "make_zero".into(),
        output.display().to_string(),
    ]
}

/// Concat-demuxer manifest body: one `file '<path>'` line per input.
pub fn concat_manifest<'a>(inputs: impl IntoIterator<Item = &'a Path>) -> String {
    inputs
        .into_iter()
        .map(|p| {
            let path = p.to_string_lossy().replace('\\', "/").replace('\'', r"'\''");
            format!("file '{path}'\n")
        })
        .collect()
}

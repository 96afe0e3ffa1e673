// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Clip assembly: turn the overlapping source files of a window into one
//! output file without re-encoding.
//!
//! One source → stream-copy trim. Several → stream-copy concatenation via a
//! concat-demuxer manifest that only lives for the duration of the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::error::{ClipError, Result};
use crate::jobs::ClipJob;
use crate::manager::JobProcessor;
use crate::provenance::ProvenanceRecord;
use crate::storage::{seconds_between, SegmentSource, SourceClip};
use crate::transcoder::{self, Transcoder};

#[derive(Debug, Clone, PartialEq)]
pub enum AssemblyPlan {
    /// Cut `[start_offset, start_offset + duration)` out of a single input.
    Trim { input: PathBuf, start_offset: f64, duration: f64 },
    /// Join inputs in start-time order.
    Concat { inputs: Vec<PathBuf> },
}

pub struct AssemblyPlanner {
    transcoder: Arc<dyn Transcoder>,
}

impl AssemblyPlanner {
    pub fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self { transcoder }
    }

    /// Decide how `candidates` become one clip covering `[from, to]`.
    pub fn plan(candidates: &[SourceClip], from: DateTime<Utc>, to: DateTime<Utc>) -> Result<AssemblyPlan> {
        match candidates {
            [] => Err(ClipError::Internal("nothing to assemble".into())),
            [only] => {
                let cut_in = from.max(only.start);
                Ok(AssemblyPlan::Trim {
                    input: absolute(&only.path),
                    start_offset: seconds_between(only.start, from).max(0.0),
                    duration: seconds_between(cut_in, to).max(0.0),
                })
            }
            many => {
                let mut ordered: Vec<&SourceClip> = many.iter().collect();
                ordered.sort_by_key(|c| c.start);
                Ok(AssemblyPlan::Concat { inputs: ordered.into_iter().map(|c| absolute(&c.path)).collect() })
            }
        }
    }

    /// Plan and run the transcoder, writing `output_path`.
    ///
    /// Launch failure, non-zero exit and timeout are all returned as errors.
    /// The concat manifest, if any, is removed whatever the outcome.
    pub async fn assemble(
        &self,
        candidates: &[SourceClip],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        output_path: &Path,
    ) -> Result<AssemblyPlan> {
        let plan = Self::plan(candidates, from, to)?;
        let output = absolute(output_path);
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let result = match &plan {
            AssemblyPlan::Trim { input, start_offset, duration } => {
                info!(input = ?input, start_offset, duration, output = ?output, "Trimming single source");
                self.run(transcoder::trim_args(input, *start_offset, *duration, &output)).await
            }
            AssemblyPlan::Concat { inputs } => {
                let manifest = ScratchFile(output.with_extension("concat.txt"));
                std::fs::write(&manifest.0, transcoder::concat_manifest(inputs.iter().map(PathBuf::as_path)))?;
                info!(sources = inputs.len(), manifest = ?manifest.0, output = ?output, "Concatenating sources");
                self.run(transcoder::concat_args(&manifest.0, &output)).await
            }
        };

        result.map(|_| plan)
    }

    async fn run(&self, args: Vec<String>) -> Result<()> {
        let command = args.join(" ");
        match self.transcoder.run(args).await {
            Ok(_) => Ok(()),
            Err(e) => {
                if let ClipError::TranscoderFailed { code, stdout, stderr } = &e {
                    error!(command, code = ?code, stderr = %stderr, stdout = %stdout, "Transcoder failed");
                } else {
                    error!(command, error = %e, "Transcoder did not complete");
                }
                Err(e)
            }
        }
    }
}

/// Removes its path on drop.
struct ScratchFile(PathBuf);

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = ?self.0, error = %e, "Cannot remove scratch file");
            }
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Discovery → assembly → provenance, as run by the coordinator's workers.
pub struct ClipPipeline {
    source: Arc<dyn SegmentSource>,
    planner: AssemblyPlanner,
    videos_dir: PathBuf,
    annotations_dir: PathBuf,
}

impl ClipPipeline {
    pub fn new(
        source: Arc<dyn SegmentSource>,
        planner: AssemblyPlanner,
        videos_dir: impl Into<PathBuf>,
        annotations_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            planner,
            videos_dir: videos_dir.into(),
            annotations_dir: annotations_dir.into(),
        }
    }
}

#[async_trait]
impl JobProcessor for ClipPipeline {
    async fn process(&self, job: &ClipJob) -> Result<String> {
        let (from, to) = (job.window_start, job.window_end);

        let source = self.source.clone();
        let camera_id = job.camera_id.clone();
        let clips = tokio::task::spawn_blocking(move || source.find_overlapping(&camera_id, from, to))
            .await
            .map_err(|e| ClipError::Internal(format!("discovery task: {e}")))??;

        if clips.is_empty() {
            return Err(ClipError::NoSegments { camera_id: job.camera_id.clone() });
        }

        let base_name = format!("{}_{}_{}", job.camera_id, Utc::now().format("%Y%m%d_%H%M%S"), job.job_id);
        let filename = format!("{base_name}.mp4");
        let output_path = self.videos_dir.join(&filename);

        self.planner.assemble(&clips, from, to, &output_path).await?;

        let record = ProvenanceRecord::new(&job.job_id, &job.camera_id, (from, to), self.source.name(), &clips)?;
        record.write(&self.annotations_dir, &base_name)?;

        info!(job_id = job.job_id, output = ?output_path, sources = clips.len(), "Clip assembled");
        Ok(format!("/videos/{filename}"))
    }
}

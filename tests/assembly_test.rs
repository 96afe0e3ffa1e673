//! Assembly planner, transcoder adapter and clip pipeline tests.
//!
//! A recording fake stands in for ffmpeg; one test drives a real subprocess
//! through `sh` to exercise timeout and exit-code handling.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use tempfile::TempDir;

use clipper::assembly::{AssemblyPlan, AssemblyPlanner, ClipPipeline};
use clipper::error::{ClipError, Result};
use clipper::jobs::{ClipJob, ClipRequest};
use clipper::manager::JobProcessor;
use clipper::provenance::ProvenanceRecord;
use clipper::storage::index::{Segment, SegmentIndex};
use clipper::storage::SourceClip;
use clipper::transcoder::{self, FfmpegTranscoder, TranscodeOutput, Transcoder};

fn tmp_dir() -> TempDir {
    tempfile::tempdir().expect("create tempdir")
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 25, 18, 0, 0).unwrap() + Duration::seconds(secs)
}

fn clip(path: &Path, start: i64, end: i64) -> SourceClip {
    SourceClip {
        path: path.to_path_buf(),
        start: at(start),
        end: at(end),
        duration_secs: (end - start) as f64,
        size_bytes: 1000 + start as u64,
    }
}

/// Records every invocation. Snapshots the concat manifest (if any) so tests
/// can inspect it after the planner has removed it.
#[derive(Default)]
struct FakeTranscoder {
    calls: Mutex<Vec<Vec<String>>>,
    manifests: Mutex<Vec<String>>,
    fail_with: Option<i32>,
}

impl FakeTranscoder {
    fn failing(code: i32) -> Self {
        Self { fail_with: Some(code), ..Default::default() }
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn run(&self, args: Vec<String>) -> Result<TranscodeOutput> {
        if let Some(pos) = args.iter().position(|a| a == "concat") {
            let manifest = &args[pos + 4];
            let body = std::fs::read_to_string(manifest).expect("manifest exists during run");
            self.manifests.lock().push(body);
        }
        self.calls.lock().push(args.clone());

        if let Some(code) = self.fail_with {
            return Err(ClipError::TranscoderFailed {
                code: Some(code),
                stdout: String::new(),
                stderr: "boom".into(),
            });
        }
        let output = args.last().expect("output arg");
        std::fs::write(output, b"clip").expect("write output");
        Ok(TranscodeOutput::default())
    }
}

// ─────────────────────────────── planning ────────────────────────────────────

#[test]
fn test_single_segment_containing_window_is_trimmed() {
    let c = clip(Path::new("/rec/a.mp4"), 0, 30);
    let plan = AssemblyPlanner::plan(&[c], at(10), at(25)).expect("plan");
    assert_eq!(
        plan,
        AssemblyPlan::Trim { input: PathBuf::from("/rec/a.mp4"), start_offset: 10.0, duration: 15.0 }
    );
}

#[test]
fn test_single_segment_starting_inside_window() {
    let c = clip(Path::new("/rec/a.mp4"), 5, 35);
    let plan = AssemblyPlanner::plan(&[c], at(0), at(20)).expect("plan");
    // offset clamps to 0; duration runs from the segment start to window end.
    assert_eq!(
        plan,
        AssemblyPlan::Trim { input: PathBuf::from("/rec/a.mp4"), start_offset: 0.0, duration: 15.0 }
    );
}

#[test]
fn test_multiple_segments_concatenated_in_start_order() {
    let clips = [
        clip(Path::new("/rec/b.mp4"), 30, 60),
        clip(Path::new("/rec/a.mp4"), 0, 30),
    ];
    let plan = AssemblyPlanner::plan(&clips, at(10), at(50)).expect("plan");
    assert_eq!(
        plan,
        AssemblyPlan::Concat { inputs: vec![PathBuf::from("/rec/a.mp4"), PathBuf::from("/rec/b.mp4")] }
    );
}

#[test]
fn test_empty_candidates_rejected() {
    assert!(AssemblyPlanner::plan(&[], at(0), at(10)).is_err());
}

// ─────────────────────────────── arguments ───────────────────────────────────

#[test]
fn test_trim_and_concat_args() {
    let trim = transcoder::trim_args(Path::new("/in.mp4"), 2.5, 20.0, Path::new("/out.mp4"));
    assert_eq!(
        trim,
        vec!["-y", "-ss", "2.500", "-i", "/in.mp4", "-t", "20.000", "-c", "copy", "-avoid_negative_ts", "make_zero", "/out.mp4"]
    );

    let concat = transcoder::concat_args(Path::new("/list.txt"), Path::new("/out.mp4"));
    assert_eq!(
        concat,
        vec!["-y", "-f", "concat", "-safe", "0", "-i", "/list.txt", "-c", "copy", "-avoid_negative_ts", "make_zero", "/out.mp4"]
    );
}

#[test]
fn test_concat_manifest_escapes_quotes() {
    let body = transcoder::concat_manifest([Path::new("/rec/a.mp4"), Path::new("/rec/it's.mp4")]);
    assert_eq!(body, "file '/rec/a.mp4'\nfile '/rec/it'\\''s.mp4'\n");
}

// ─────────────────────────────── assembly ────────────────────────────────────

#[tokio::test]
async fn test_assemble_trim_invokes_transcoder_once() {
    let dir = tmp_dir();
    let fake = Arc::new(FakeTranscoder::default());
    let planner = AssemblyPlanner::new(fake.clone());
    let output = dir.path().join("out").join("clip.mp4");

    let c = clip(&dir.path().join("a.mp4"), 0, 30);
    let plan = planner.assemble(&[c], at(10), at(25), &output).await.expect("assemble");

    assert!(matches!(plan, AssemblyPlan::Trim { .. }));
    assert!(output.exists());
    let calls = fake.calls.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0][1..3], ["-ss".to_string(), "10.000".to_string()]);
}

#[tokio::test]
async fn test_concat_manifest_removed_on_success() {
    let dir = tmp_dir();
    let fake = Arc::new(FakeTranscoder::default());
    let planner = AssemblyPlanner::new(fake.clone());
    let output = dir.path().join("clip.mp4");

    let clips = [clip(&dir.path().join("b.mp4"), 30, 60), clip(&dir.path().join("a.mp4"), 0, 30)];
    planner.assemble(&clips, at(10), at(50), &output).await.expect("assemble");

    let manifest = dir.path().join("clip.concat.txt");
    assert!(!manifest.exists(), "manifest must be removed after success");

    let manifests = fake.manifests.lock();
    assert_eq!(manifests.len(), 1);
    let lines: Vec<&str> = manifests[0].lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("/a.mp4'"));
    assert!(lines[1].ends_with("/b.mp4'"));
}

#[tokio::test]
async fn test_concat_manifest_removed_on_failure() {
    let dir = tmp_dir();
    let fake = Arc::new(FakeTranscoder::failing(1));
    let planner = AssemblyPlanner::new(fake.clone());
    let output = dir.path().join("clip.mp4");

    let clips = [clip(&dir.path().join("a.mp4"), 0, 30), clip(&dir.path().join("b.mp4"), 30, 60)];
    let err = planner.assemble(&clips, at(10), at(50), &output).await.unwrap_err();

    assert!(matches!(err, ClipError::TranscoderFailed { code: Some(1), .. }));
    assert_eq!(err.kind(), "ffmpeg_failed");
    assert_eq!(fake.manifests.lock().len(), 1);
    assert!(!dir.path().join("clip.concat.txt").exists(), "manifest must be removed after failure");
}

// ─────────────────────────────── subprocess ──────────────────────────────────

#[cfg(unix)]
#[tokio::test]
async fn test_ffmpeg_transcoder_exit_code_timeout_and_launch() {
    let sh = FfmpegTranscoder::new("sh", StdDuration::from_secs(5));
    let ok = sh.run(vec!["-c".into(), "echo out; echo err >&2".into()]).await.expect("success");
    assert_eq!(ok.stdout.trim(), "out");
    assert_eq!(ok.stderr.trim(), "err");

    match sh.run(vec!["-c".into(), "echo bad >&2; exit 3".into()]).await {
        Err(ClipError::TranscoderFailed { code, stderr, .. }) => {
            assert_eq!(code, Some(3));
            assert_eq!(stderr.trim(), "bad");
        }
        other => panic!("expected failure, got {other:?}"),
    }

    let slow = FfmpegTranscoder::new("sh", StdDuration::from_millis(200));
    let started = std::time::Instant::now();
    let err = slow.run(vec!["-c".into(), "sleep 10".into()]).await.unwrap_err();
    assert!(matches!(err, ClipError::TranscoderTimeout { .. }));
    assert!(started.elapsed() < StdDuration::from_secs(5));

    let missing = FfmpegTranscoder::new("/definitely/not/a/transcoder", StdDuration::from_secs(1));
    let err = missing.run(vec![]).await.unwrap_err();
    assert!(matches!(err, ClipError::TranscoderLaunch { .. }));
    assert_eq!(err.kind(), "subprocess_failed");
}

// ─────────────────────────────── pipeline ────────────────────────────────────

fn index_with_three_segments(dir: &Path) -> SegmentIndex {
    let mut index = SegmentIndex::new();
    for (i, name) in ["s0.mp4", "s1.mp4", "s2.mp4"].iter().enumerate() {
        let path = dir.join(name);
        std::fs::write(&path, vec![0u8; 100 * (i + 1)]).unwrap();
        let start = at(30 * i as i64);
        let end = at(30 * (i as i64 + 1));
        let seg = Segment::new(path.to_string_lossy(), start, end, vec![0.0, 10.0, 20.0, 30.0]).unwrap();
        index.insert("camera1", seg);
    }
    index
}

fn job_for(camera: &str, target: i64) -> ClipJob {
    let request = ClipRequest { camera_id: camera.into(), timestamp: at(target), duration: None };
    ClipJob::new("job-1".into(), &request, Duration::seconds(15), Duration::seconds(5))
}

#[tokio::test]
async fn test_pipeline_concat_writes_provenance() {
    let dir = tmp_dir();
    let index = index_with_three_segments(dir.path());
    let fake = Arc::new(FakeTranscoder::default());
    let videos = dir.path().join("videos");
    let annotations = dir.path().join("annotations");
    let pipeline = ClipPipeline::new(Arc::new(index), AssemblyPlanner::new(fake.clone()), &videos, &annotations);

    // Window [T+10, T+50] crosses the first two segments only.
    let mut job = job_for("camera1", 25);
    job.window_start = at(10);
    job.window_end = at(50);

    let output_ref = pipeline.process(&job).await.expect("process");
    assert!(output_ref.starts_with("/videos/camera1_"));
    assert!(output_ref.ends_with("_job-1.mp4"));
    assert!(videos.join(output_ref.trim_start_matches("/videos/")).exists());
    assert!(fake.calls.lock()[0].contains(&"concat".to_string()));

    let json_path = std::fs::read_dir(&annotations)
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.extension().is_some_and(|e| e == "json"))
        .expect("provenance json");
    let record: ProvenanceRecord =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).expect("parse provenance");

    assert_eq!(record.job_id, "job-1");
    assert_eq!(record.source, "index");
    assert_eq!(record.requested_start, at(10));
    assert_eq!(record.requested_end, at(50));
    assert_eq!(record.actual_start, at(0));
    assert_eq!(record.actual_end, at(60));
    let files: Vec<&str> = record.source_segments.iter().map(|s| s.filename.as_str()).collect();
    assert_eq!(files, vec!["s0.mp4", "s1.mp4"]);
    assert_eq!(record.source_segments[1].file_size, 200);

    let txt = json_path.with_extension("txt");
    let text = std::fs::read_to_string(txt).expect("provenance text");
    assert!(text.contains("Source Clips Used: 2"));
}

#[tokio::test]
async fn test_pipeline_single_segment_trim() {
    let dir = tmp_dir();
    let index = index_with_three_segments(dir.path());
    let fake = Arc::new(FakeTranscoder::default());
    let pipeline = ClipPipeline::new(
        Arc::new(index),
        AssemblyPlanner::new(fake.clone()),
        dir.path().join("videos"),
        dir.path().join("annotations"),
    );

    let mut job = job_for("camera1", 0);
    job.window_start = at(32);
    job.window_end = at(52);
    pipeline.process(&job).await.expect("process");

    let calls = fake.calls.lock();
    let args = &calls[0];
    assert_eq!(args[2], "2.000");
    assert_eq!(args[6], "20.000");
    assert!(args[4].ends_with("s1.mp4"));
}

#[tokio::test]
async fn test_pipeline_no_segments() {
    let dir = tmp_dir();
    let index = index_with_three_segments(dir.path());
    let fake = Arc::new(FakeTranscoder::default());
    let pipeline = ClipPipeline::new(
        Arc::new(index),
        AssemblyPlanner::new(fake.clone()),
        dir.path().join("videos"),
        dir.path().join("annotations"),
    );

    let err = pipeline.process(&job_for("camera9", 20)).await.unwrap_err();
    assert!(matches!(err, ClipError::NoSegments { .. }));
    assert!(fake.calls.lock().is_empty());
    assert!(!dir.path().join("annotations").exists());
}

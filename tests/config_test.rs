//! Configuration parsing and validation.

use std::path::PathBuf;

use clipper::config::{Config, SourceKind};

#[test]
fn test_empty_document_uses_defaults() {
    let cfg = Config::from_toml("").expect("defaults");
    assert_eq!(cfg.jobs.workers, 3);
    assert_eq!(cfg.jobs.lead_secs, 15);
    assert_eq!(cfg.jobs.trail_secs, 5);
    assert_eq!(cfg.transcoder.timeout_secs, 300);
    assert_eq!(cfg.transcoder.binary, PathBuf::from("ffmpeg"));
    assert_eq!(cfg.discovery.source, SourceKind::Filesystem);
    assert_eq!(cfg.discovery.extensions, vec!["mp4", "mkv", "avi"]);
    assert_eq!(cfg.storage.clips_dir, PathBuf::from("mediamtx_clips"));
    assert_eq!(cfg.api.port, 8000);
}

#[test]
fn test_sections_override_defaults() {
    let cfg = Config::from_toml(
        r#"
        [storage]
        clips_dir = "/srv/recordings"
        index_path = "/srv/index.json"

        [discovery]
        source = "index"
        seconds_per_mb = 2.5

        [jobs]
        workers = 8

        [transcoder]
        binary = "/usr/local/bin/ffmpeg"
        timeout_secs = 60
        "#,
    )
    .expect("parse");
    assert_eq!(cfg.storage.clips_dir, PathBuf::from("/srv/recordings"));
    assert_eq!(cfg.storage.videos_dir, PathBuf::from("videos"));
    assert_eq!(cfg.discovery.source, SourceKind::Index);
    assert_eq!(cfg.discovery.seconds_per_mb, 2.5);
    assert_eq!(cfg.discovery.min_duration_secs, 5);
    assert_eq!(cfg.jobs.workers, 8);
    assert_eq!(cfg.transcoder.timeout_secs, 60);
}

#[test]
fn test_validation_rejects_bad_values() {
    assert!(Config::from_toml("[jobs]\nworkers = 0").is_err());
    assert!(Config::from_toml("[transcoder]\ntimeout_secs = 0").is_err());
    assert!(Config::from_toml("[discovery]\nextensions = []").is_err());
    assert!(Config::from_toml("[discovery]\nseconds_per_mb = 0.0").is_err());
    assert!(Config::from_toml("[discovery]\nsource = \"s3\"").is_err());
    assert!(Config::from_toml("not toml at all [").is_err());
}

#[test]
fn test_from_file_missing() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(Config::from_file(&dir.path().join("absent.toml")).is_err());
}

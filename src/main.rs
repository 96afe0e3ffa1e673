//! clipper — camera clip assembly service
//!
//! Usage:
//!   clipper serve    --config config.toml
//!   clipper cameras  --config config.toml
//!   clipper segments --config config.toml --camera camera1 --from 2025-08-25T18:00:10 --to 2025-08-25T18:00:50
//!   clipper clip     --config config.toml --camera camera1 --at 2025-08-25T18:00:20

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use clipper::api::{self, AppState};
use clipper::assembly::{AssemblyPlanner, ClipPipeline};
use clipper::config::{Config, SourceKind};
use clipper::error::Result;
use clipper::jobs::ClipRequest;
use clipper::manager::JobCoordinator;
use clipper::metrics::ClipMetrics;
use clipper::storage::discovery::SegmentDiscovery;
use clipper::storage::index::SegmentIndex;
use clipper::storage::SegmentSource;
use clipper::transcoder::FfmpegTranscoder;

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Parser)]
#[command(name = "clipper", about = "Camera clip assembly service", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the worker pool and HTTP API.
    Serve {
        /// Path to the TOML configuration file (defaults apply when omitted).
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// List cameras known to the configured segment source.
    Cameras {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show indexed segments in a window with keyframe-snapped cut points.
    Segments {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        camera: String,
        /// Window start, e.g. 2025-08-25T18:00:10
        #[arg(long)]
        from: String,
        /// Window end, e.g. 2025-08-25T18:00:50
        #[arg(long)]
        to: String,
    },
    /// Assemble one clip and wait for it.
    Clip {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        camera: String,
        /// Target timestamp, e.g. 2025-08-25T18:00:20
        #[arg(long)]
        at: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config } => run_serve(load_config(config)).await,
        Command::Cameras { config } => run_cameras(load_config(config)),
        Command::Segments { config, camera, from, to } => {
            run_segments(load_config(config), &camera, parse_time(&from), parse_time(&to))
        }
        Command::Clip { config, camera, at } => run_clip(load_config(config), camera, parse_time(&at)).await,
    }
}

fn load_config(path: Option<PathBuf>) -> Config {
    let Some(path) = path else {
        return Config::default();
    };
    match Config::from_file(&path) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, path = ?path, "Failed to load config");
            std::process::exit(1);
        }
    }
}

fn parse_time(value: &str) -> DateTime<Utc> {
    match NaiveDateTime::parse_from_str(value, TIME_FORMAT) {
        Ok(dt) => dt.and_utc(),
        Err(e) => {
            error!(value, error = %e, "Invalid timestamp, expected e.g. 2025-08-25T18:00:20");
            std::process::exit(1);
        }
    }
}

fn exit_on_err<T>(result: Result<T>, what: &str) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "{what}");
            std::process::exit(1);
        }
    }
}

fn build_source(cfg: &Config) -> Result<Arc<dyn SegmentSource>> {
    let source: Arc<dyn SegmentSource> = match cfg.discovery.source {
        SourceKind::Filesystem => {
            let discovery = SegmentDiscovery::new(cfg.storage.clips_dir.clone(), &cfg.discovery)?;
            if !discovery.base_dir_exists() {
                warn!(dir = ?discovery.base_dir(), "Clips directory does not exist yet");
            }
            Arc::new(discovery)
        }
        SourceKind::Index => Arc::new(SegmentIndex::open(&cfg.storage.index_path)?),
    };
    Ok(source)
}

fn build_coordinator(cfg: &Config, source: Arc<dyn SegmentSource>, metrics: Arc<ClipMetrics>) -> JobCoordinator {
    let transcoder = FfmpegTranscoder::new(
        cfg.transcoder.binary.clone(),
        Duration::from_secs(cfg.transcoder.timeout_secs),
    );
    let pipeline = ClipPipeline::new(
        source,
        AssemblyPlanner::new(Arc::new(transcoder)),
        cfg.storage.videos_dir.clone(),
        cfg.storage.annotations_dir.clone(),
    );
    JobCoordinator::new(&cfg.jobs, Arc::new(pipeline), metrics)
}

async fn run_serve(cfg: Config) {
    let prometheus = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Prometheus recorder unavailable");
            None
        }
    };

    let source = exit_on_err(build_source(&cfg), "Failed to open segment source");
    exit_on_err(
        std::fs::create_dir_all(&cfg.storage.videos_dir).map_err(Into::into),
        "Cannot create videos directory",
    );

    let metrics = Arc::new(ClipMetrics::new());
    let coordinator = build_coordinator(&cfg, source.clone(), metrics.clone());

    info!(
        source = source.name(),
        workers = cfg.jobs.workers,
        lead_secs = cfg.jobs.lead_secs,
        trail_secs = cfg.jobs.trail_secs,
        transcoder = ?cfg.transcoder.binary,
        "Starting clip service"
    );

    let server = if cfg.api.enabled {
        let state = Arc::new(AppState {
            coordinator: coordinator.clone(),
            source,
            metrics,
            prometheus,
            videos_dir: cfg.storage.videos_dir.clone(),
            lead: cfg.jobs.lead(),
            trail: cfg.jobs.trail(),
        });
        Some(tokio::spawn(api::start_server(state, cfg.api.port)))
    } else {
        None
    };

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received CTRL+C, shutting down…"),
        Err(e) => error!(error = %e, "Signal error"),
    }

    if let Some(server) = server {
        server.abort();
    }
    coordinator.shutdown();
}

fn run_cameras(cfg: Config) {
    let source = exit_on_err(build_source(&cfg), "Failed to open segment source");
    let cameras = source.camera_ids();
    println!("=== Cameras ({}) ===", source.name());
    if cameras.is_empty() {
        println!("  (none)");
    }
    for cam in cameras {
        println!("  {cam}");
    }
}

fn run_segments(cfg: Config, camera_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) {
    let index = exit_on_err(SegmentIndex::open(&cfg.storage.index_path), "Failed to open segment index");
    let segments = index.find_segments(camera_id, from, to);

    println!("Camera: {camera_id}  window: {from} — {to}");
    if segments.is_empty() {
        println!("  no segments overlap this window");
        return;
    }
    for seg in segments {
        let (cut_in, in_offset) = seg.snap_to_keyframe(from, true);
        let (cut_out, out_offset) = seg.snap_to_keyframe(to, false);
        println!(
            "  {}  {} — {}  keyframes={}  cut-in {} (+{in_offset}s)  cut-out {} (+{out_offset}s)",
            seg.file(),
            seg.start().format(TIME_FORMAT),
            seg.end().format(TIME_FORMAT),
            seg.keyframes().len(),
            cut_in.format(TIME_FORMAT),
            cut_out.format(TIME_FORMAT),
        );
    }
}

async fn run_clip(cfg: Config, camera_id: String, at: DateTime<Utc>) {
    let source = exit_on_err(build_source(&cfg), "Failed to open segment source");
    let coordinator = build_coordinator(&cfg, source, Arc::new(ClipMetrics::new()));

    let job_id = exit_on_err(
        coordinator.submit(ClipRequest { camera_id, timestamp: at, duration: None }),
        "Failed to submit clip",
    );

    let job = loop {
        match coordinator.get(&job_id) {
            Some(job) if job.status.is_terminal() => break job,
            Some(_) => tokio::time::sleep(Duration::from_millis(200)).await,
            None => {
                error!(job_id, "Job vanished");
                std::process::exit(1);
            }
        }
    };
    coordinator.shutdown();

    println!("Clip {}: {}", job.job_id, job.status);
    println!("  window : {} — {}", job.window_start, job.window_end);
    if let Some(output) = &job.output_reference {
        println!("  output : {output}");
    }
    if let Some(err) = &job.error_message {
        println!("  error  : {err}");
        std::process::exit(1);
    }
}

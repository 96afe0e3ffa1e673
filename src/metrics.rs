//! Clip metrics: queue depth, job counts, errors and latency.
//!
//! Every update is kept locally (for [`ClipMetrics::snapshot`]) and pushed to
//! the `metrics` facade, where whichever recorder the binary installed picks
//! it up.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use parking_lot::Mutex;
use serde::Serialize;

pub mod names {
    pub const REQUESTS_TOTAL: &str = "clip_requests_total";
    pub const LATENCY_SECONDS: &str = "clip_latency_seconds";
    pub const QUEUE_DEPTH: &str = "clip_queue_depth";
    pub const ERRORS_TOTAL: &str = "clip_errors_total";
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub queue_depth: usize,
    pub active_jobs: usize,
    pub completed_total: u64,
    pub failed_total: u64,
    pub errors: BTreeMap<String, u64>,
}

#[derive(Default)]
pub struct ClipMetrics {
    requests: AtomicU64,
    queue_depth: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
    errors: Mutex<BTreeMap<String, u64>>,
    /// job_id → submission instant, for latency.
    in_flight: Mutex<HashMap<String, Instant>>,
}

impl ClipMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request_start(&self, job_id: &str, camera_id: &str) {
        self.in_flight.lock().insert(job_id.to_string(), Instant::now());
        self.requests.fetch_add(1, Ordering::Relaxed);
        counter!(names::REQUESTS_TOTAL, "camera_id" => camera_id.to_string(), "status" => "started").increment(1);
    }

    pub fn record_request_complete(&self, job_id: &str, camera_id: &str, success: bool) {
        if let Some(started) = self.in_flight.lock().remove(job_id) {
            histogram!(names::LATENCY_SECONDS).record(started.elapsed().as_secs_f64());
        }
        let status = if success {
            self.completed.fetch_add(1, Ordering::Relaxed);
            "success"
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
            "failed"
        };
        counter!(names::REQUESTS_TOTAL, "camera_id" => camera_id.to_string(), "status" => status).increment(1);
    }

    /// Undo [`record_request_start`](Self::record_request_start) for a job
    /// that never made it onto the queue.
    pub fn cancel_request(&self, job_id: &str) {
        if self.in_flight.lock().remove(job_id).is_some() {
            self.requests.fetch_sub(1, Ordering::Relaxed);
        }
    }

    pub fn record_error(&self, error_type: &str) {
        *self.errors.lock().entry(error_type.to_string()).or_insert(0) += 1;
        counter!(names::ERRORS_TOTAL, "error_type" => error_type.to_string()).increment(1);
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth, Ordering::Relaxed);
        gauge!(names::QUEUE_DEPTH).set(depth as f64);
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    /// Jobs submitted and not yet terminal.
    pub fn active_jobs(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests.load(Ordering::Relaxed),
            queue_depth: self.queue_depth(),
            active_jobs: self.active_jobs(),
            completed_total: self.completed.load(Ordering::Relaxed),
            failed_total: self.failed.load(Ordering::Relaxed),
            errors: self.errors.lock().clone(),
        }
    }
}

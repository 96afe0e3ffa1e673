// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Job coordinator: job table, FIFO queue and a fixed worker pool.
//!
//! ```text
//! submit() ──┐                          ┌── worker-0 ─┐
//! submit() ──┼──→ FIFO of job ids ──────┼── worker-1 ─┼──→ JobProcessor
//! submit() ──┘                          └── worker-2 ─┘
//!                    │                         │
//!                    ▼                         ▼
//!              job table (one lock, never held across a job)
//! ```
//!
//! Workers are started lazily by the first submission. A job that fails or
//! panics is recorded as FAILED; the worker carries on with the next id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::JobsConfig;
use crate::error::{ClipError, Result};
use crate::jobs::{ClipJob, ClipRequest, ClipStatus};
use crate::metrics::ClipMetrics;

/// Turns a PROCESSING job into an output reference.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: &ClipJob) -> Result<String>;
}

/// Cheap-to-clone handle onto the shared coordinator state.
#[derive(Clone)]
pub struct JobCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    jobs: Mutex<HashMap<String, ClipJob>>,
    queue_tx: mpsc::UnboundedSender<String>,
    queue_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    /// Jobs sent but not yet dequeued. The gauge is published under this lock.
    queued: Mutex<usize>,
    workers_started: AtomicBool,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
    lead: Duration,
    trail: Duration,
    processor: Arc<dyn JobProcessor>,
    metrics: Arc<ClipMetrics>,
}

impl Inner {
    fn adjust_queued(&self, delta: isize) {
        let mut queued = self.queued.lock();
        *queued = queued.saturating_add_signed(delta);
        self.metrics.set_queue_depth(*queued);
    }
}

impl JobCoordinator {
    pub fn new(cfg: &JobsConfig, processor: Arc<dyn JobProcessor>, metrics: Arc<ClipMetrics>) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                jobs: Mutex::new(HashMap::new()),
                queue_tx,
                queue_rx: tokio::sync::Mutex::new(queue_rx),
                queued: Mutex::new(0),
                workers_started: AtomicBool::new(false),
                worker_handles: Mutex::new(Vec::new()),
                worker_count: cfg.workers,
                lead: cfg.lead(),
                trail: cfg.trail(),
                processor,
                metrics,
            }),
        }
    }

    /// Make sure the pool is running, then record a PENDING job and enqueue
    /// it. Must be called from within a Tokio runtime.
    pub fn submit(&self, request: ClipRequest) -> Result<String> {
        self.start_workers()?;

        let job_id = uuid::Uuid::new_v4().to_string();
        let job = ClipJob::new(job_id.clone(), &request, self.inner.lead, self.inner.trail);

        self.inner.jobs.lock().insert(job_id.clone(), job);

        // Metrics first: once sent, a worker may finish the job before we return.
        self.inner.metrics.record_request_start(&job_id, &request.camera_id);
        self.inner.adjust_queued(1);
        if self.inner.queue_tx.send(job_id.clone()).is_err() {
            self.inner.adjust_queued(-1);
            self.inner.metrics.cancel_request(&job_id);
            self.inner.jobs.lock().remove(&job_id);
            return Err(ClipError::Internal("job queue closed".into()));
        }

        info!(
            job_id,
            camera = request.camera_id,
            timestamp = %request.timestamp,
            duration = ?request.duration,
            "Job submitted"
        );
        Ok(job_id)
    }

    /// Snapshot of one job.
    pub fn get(&self, job_id: &str) -> Option<ClipJob> {
        self.inner.jobs.lock().get(job_id).cloned()
    }

    /// Move `job_id` to `status`, atomically with its terminal fields.
    /// Terminal statuses stamp `completed_at`.
    pub fn update_status(
        &self,
        job_id: &str,
        status: ClipStatus,
        output_reference: Option<String>,
        error_message: Option<String>,
    ) -> Result<()> {
        let camera_id = {
            let mut jobs = self.inner.jobs.lock();
            let job = jobs
                .get_mut(job_id)
                .ok_or_else(|| ClipError::JobNotFound { id: job_id.to_string() })?;

            if !job.status.can_transition_to(status) {
                return Err(ClipError::InvalidTransition {
                    id: job_id.to_string(),
                    from: job.status.to_string(),
                    to: status.to_string(),
                });
            }

            job.status = status;
            if output_reference.is_some() {
                job.output_reference = output_reference;
            }
            if error_message.is_some() {
                job.error_message = error_message;
            }
            if status.is_terminal() {
                job.completed_at = Some(Utc::now());
            }
            job.camera_id.clone()
        };

        if status.is_terminal() {
            self.inner
                .metrics
                .record_request_complete(job_id, &camera_id, status == ClipStatus::Done);
        }
        Ok(())
    }

    /// Jobs waiting in the queue, not yet picked up by a worker.
    pub fn queue_depth(&self) -> usize {
        *self.inner.queued.lock()
    }

    /// Every job ever submitted in this process.
    pub fn job_count(&self) -> usize {
        self.inner.jobs.lock().len()
    }

    /// Jobs submitted and not yet terminal.
    pub fn active_count(&self) -> usize {
        self.inner.jobs.lock().values().filter(|j| !j.status.is_terminal()).count()
    }

    pub fn workers_started(&self) -> bool {
        self.inner.workers_started.load(Ordering::SeqCst)
    }

    /// Spawn the worker pool once; later calls are no-ops.
    fn start_workers(&self) -> Result<()> {
        if self
            .inner
            .workers_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                self.inner.workers_started.store(false, Ordering::SeqCst);
                return Err(ClipError::Internal(format!("no Tokio runtime to run workers: {e}")));
            }
        };

        let mut handles = self.inner.worker_handles.lock();
        for i in 0..self.inner.worker_count {
            let inner = self.inner.clone();
            let name = format!("worker-{i}");
            handles.push(runtime.spawn(async move { worker_loop(name, inner).await }));
        }
        info!(workers = self.inner.worker_count, "Started worker tasks");
        Ok(())
    }

    /// Abort all workers. Jobs still queued or running are left as they are.
    pub fn shutdown(&self) {
        for handle in self.inner.worker_handles.lock().drain(..) {
            handle.abort();
        }
        info!("Worker pool stopped");
    }
}

async fn worker_loop(name: String, inner: Arc<Inner>) {
    info!(worker = name, "Worker started");
    let coordinator = JobCoordinator { inner };

    loop {
        let next = { coordinator.inner.queue_rx.lock().await.recv().await };
        let Some(job_id) = next else {
            info!(worker = name, "Queue closed, worker exiting");
            break;
        };

        coordinator.inner.adjust_queued(-1);

        run_job(&name, &coordinator, &job_id).await;
    }
}

/// Drive one job to a terminal status. Never panics, never returns early
/// with the job left PROCESSING.
async fn run_job(worker: &str, coordinator: &JobCoordinator, job_id: &str) {
    let Some(job) = coordinator.get(job_id) else {
        warn!(worker, job_id, "Dequeued unknown job, skipping");
        return;
    };

    if let Err(e) = coordinator.update_status(job_id, ClipStatus::Processing, None, None) {
        error!(worker, job_id, error = %e, "Cannot start job");
        return;
    }
    info!(worker, job_id, camera = job.camera_id, "Processing job");

    // Run on its own task so a panic surfaces as a JoinError here.
    let processor = coordinator.inner.processor.clone();
    let outcome = tokio::spawn(async move { processor.process(&job).await }).await;

    let metrics = &coordinator.inner.metrics;
    let update = match outcome {
        Ok(Ok(output)) => {
            info!(worker, job_id, output, "Job completed");
            coordinator.update_status(job_id, ClipStatus::Done, Some(output), None)
        }
        Ok(Err(e)) => {
            error!(worker, job_id, error = %e, "Job failed");
            metrics.record_error(e.kind());
            coordinator.update_status(job_id, ClipStatus::Failed, None, Some(e.to_string()))
        }
        Err(join_err) => {
            error!(worker, job_id, error = %join_err, "Worker fault while processing job");
            metrics.record_error("worker_exception");
            coordinator.update_status(
                job_id,
                ClipStatus::Failed,
                None,
                Some(format!("Worker error: {join_err}")),
            )
        }
    };

    if let Err(e) = update {
        error!(worker, job_id, error = %e, "Cannot record job outcome");
    }
}

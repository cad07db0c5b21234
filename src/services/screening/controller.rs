//! Screening job controller.
//!
//! Owns the job lifecycle (`Running ⇄ Paused → Completed | Cancelled | Failed`),
//! enforces that at most one job is active, drives the batch scanner on a
//! spawned task and checkpoints results to the task store after every batch.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use dashmap::DashMap;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::control::ControlHandle;
use super::detector::DetectorConfig;
use super::scanner::{BatchProgress, BatchScanner};
use crate::config::ScanConfig;
use crate::error::{AppError, Result};
use crate::services::TaskStore;
use crate::sources::MarketDataProvider;
use crate::types::{
    rank_by_drop_ratio, JobParams, JobStatus, LookbackWindow, ProgressSnapshot, Signal, StartOutcome,
};

/// Mutable per-job state. Guarded by one mutex so snapshots never tear.
#[derive(Debug, Default)]
struct JobState {
    status: JobStatus,
    processed: usize,
    total: usize,
    found: usize,
    current_batch: usize,
    total_batches: usize,
    message: String,
    error: Option<String>,
    results: Vec<Signal>,
}

/// In-memory handle on one job: progress cache, accumulator and control flags.
pub struct JobHandle {
    job_id: String,
    control: ControlHandle,
    state: Mutex<JobState>,
}

impl JobHandle {
    fn new(job_id: String) -> Self {
        Self {
            job_id,
            control: ControlHandle::new(),
            state: Mutex::new(JobState {
                status: JobStatus::Running,
                message: "starting".to_string(),
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn status(&self) -> JobStatus {
        self.lock().status
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.lock();
        let progress = if state.total > 0 {
            (state.processed as f64 / state.total as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };

        ProgressSnapshot {
            job_id: Some(self.job_id.clone()),
            status: state.status,
            current: state.processed,
            total: state.total,
            found: state.found,
            current_batch: state.current_batch,
            total_batches: state.total_batches,
            is_paused: state.status == JobStatus::Paused,
            message: state.message.clone(),
            progress,
            error: state.error.clone(),
        }
    }

    /// Accumulated signals, deepest retracement first.
    pub fn results(&self) -> Vec<Signal> {
        let mut results = self.lock().results.clone();
        rank_by_drop_ratio(&mut results);
        results
    }

    fn apply_tick(&self, tick: BatchProgress) {
        let mut state = self.lock();
        state.processed = state.processed.max(tick.processed);
        state.found = tick.found;
        state.message = tick.message;
    }

    /// Append a batch's signals; returns the full accumulator for checkpointing.
    fn append_batch(&self, signals: Vec<Signal>, processed: usize) -> Vec<Signal> {
        let mut state = self.lock();
        state.results.extend(signals);
        state.processed = state.processed.max(processed);
        state.found = state.results.len();
        state.results.clone()
    }
}

/// Drives screening jobs. One active job at a time.
pub struct ScreenController {
    provider: Arc<dyn MarketDataProvider>,
    store: Arc<TaskStore>,
    config: ScanConfig,
    /// Job-keyed registry of in-memory handles.
    jobs: DashMap<String, Arc<JobHandle>>,
    /// Most recently started job. Holding this lock is the single-flight gate.
    latest: Mutex<Option<Arc<JobHandle>>>,
}

impl ScreenController {
    pub fn new(provider: Arc<dyn MarketDataProvider>, store: Arc<TaskStore>, config: ScanConfig) -> Arc<Self> {
        Arc::new(Self {
            provider,
            store,
            config,
            jobs: DashMap::new(),
            latest: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    fn latest(&self) -> Option<Arc<JobHandle>> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Start a job, or report the one already running.
    ///
    /// Must be called from within a tokio runtime; the scan loop is spawned
    /// and left unsupervised.
    pub fn start(self: &Arc<Self>, params: JobParams) -> Result<StartOutcome> {
        if params.batch_size == 0 {
            return Err(AppError::BadRequest("batch_size must be positive".to_string()));
        }
        if params.lookback_days == 0 {
            return Err(AppError::BadRequest("lookback_days must be positive".to_string()));
        }
        let window = LookbackWindow::ending_today(params.lookback_days).ok_or_else(|| {
            AppError::BadRequest(format!("lookback_days {} is out of range", params.lookback_days))
        })?;

        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = latest.as_ref().filter(|h| h.status().is_active()) {
            info!("Start requested while job {} is active", active.job_id);
            return Ok(StartOutcome::AlreadyRunning(active.job_id.clone()));
        }

        let job_id = new_job_id();
        self.store.create_job(&job_id, &params)?;

        let handle = Arc::new(JobHandle::new(job_id.clone()));
        self.jobs.retain(|_, h| !h.status().is_terminal());
        self.jobs.insert(job_id.clone(), handle.clone());
        *latest = Some(handle.clone());
        drop(latest);

        info!(
            "Starting job {} (lookback {}d, batch {}, filter {:?}, entire universe: {})",
            job_id,
            params.lookback_days,
            params.batch_size,
            params.universe_filter,
            params.scan_entire_universe
        );

        let controller = Arc::clone(self);
        tokio::spawn(async move { controller.run_job(handle, params, window).await });

        Ok(StartOutcome::Started(job_id))
    }

    /// Pause the active job. Pausing a paused job is a no-op.
    pub fn pause(&self) -> Result<String> {
        let handle = self.active_handle()?;
        let mut state = handle.lock();

        match state.status {
            JobStatus::Paused => return Ok(handle.job_id.clone()),
            JobStatus::Running => {}
            _ => return Err(no_active_job()),
        }

        handle.control.pause();
        state.status = JobStatus::Paused;
        state.message = "paused".to_string();
        self.store.update_status(&handle.job_id, JobStatus::Paused)?;

        info!("Paused job {}", handle.job_id);
        Ok(handle.job_id.clone())
    }

    /// Resume a paused job. Resuming a running job is a no-op.
    pub fn resume(&self) -> Result<String> {
        let handle = self.active_handle()?;
        let mut state = handle.lock();

        match state.status {
            JobStatus::Running => return Ok(handle.job_id.clone()),
            JobStatus::Paused => {}
            _ => return Err(no_active_job()),
        }

        handle.control.resume();
        state.status = JobStatus::Running;
        state.message = "resumed".to_string();
        self.store.update_status(&handle.job_id, JobStatus::Running)?;

        info!("Resumed job {}", handle.job_id);
        Ok(handle.job_id.clone())
    }

    /// Request cancellation. The scan loop records `Cancelled` once it observes it.
    pub fn cancel(&self) -> Result<String> {
        let handle = self.active_handle()?;
        let mut state = handle.lock();

        if !state.status.is_active() {
            return Err(no_active_job());
        }

        handle.control.cancel();
        state.message = "cancelling".to_string();

        info!("Cancel requested for job {}", handle.job_id);
        Ok(handle.job_id.clone())
    }

    /// Snapshot of the most recent job, or an idle snapshot if none ran yet.
    pub fn get_progress(&self) -> ProgressSnapshot {
        self.latest()
            .map(|h| h.snapshot())
            .unwrap_or_else(ProgressSnapshot::idle)
    }

    /// Snapshot of a job still held in the registry.
    pub fn job_progress(&self, job_id: &str) -> Option<ProgressSnapshot> {
        self.jobs.get(job_id).map(|h| h.snapshot())
    }

    /// Signals accumulated by the most recent job, deepest retracement first.
    pub fn get_current_results(&self) -> Vec<Signal> {
        self.latest().map(|h| h.results()).unwrap_or_default()
    }

    /// Delete a stored job and its results. The active job cannot be deleted.
    pub fn delete_job(&self, job_id: &str) -> Result<()> {
        if let Some(handle) = self.jobs.get(job_id) {
            if handle.status().is_active() {
                return Err(AppError::Conflict(format!("job {} is still active", job_id)));
            }
        }

        if !self.store.delete_job(job_id)? {
            return Err(AppError::NotFound(format!("Task not found: {}", job_id)));
        }
        self.jobs.remove(job_id);

        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        if latest.as_ref().is_some_and(|h| h.job_id == job_id) {
            *latest = None;
        }
        drop(latest);

        info!("Deleted job {}", job_id);
        Ok(())
    }

    fn active_handle(&self) -> Result<Arc<JobHandle>> {
        self.latest()
            .filter(|h| h.status().is_active())
            .ok_or_else(no_active_job)
    }

    async fn run_job(self: Arc<Self>, handle: Arc<JobHandle>, params: JobParams, window: LookbackWindow) {
        // The loop runs as its own task so a panic inside it still ends the job.
        let scan = {
            let controller = Arc::clone(&self);
            let handle = Arc::clone(&handle);
            tokio::spawn(async move { controller.scan(&handle, &params, &window).await })
        };

        match scan.await {
            Ok(Ok(status)) => self.finish(&handle, status, None),
            Ok(Err(e)) => {
                error!("Job {} failed: {}", handle.job_id, e);
                self.finish(&handle, JobStatus::Failed, Some(e.to_string()));
            }
            Err(e) => {
                error!("Job {} scan task aborted: {}", handle.job_id, e);
                self.finish(&handle, JobStatus::Failed, Some(format!("scan aborted: {}", e)));
            }
        }
    }

    /// The scan loop. Returns the terminal status to record.
    async fn scan(&self, handle: &JobHandle, params: &JobParams, window: &LookbackWindow) -> Result<JobStatus> {
        let job_id = handle.job_id.as_str();

        let mut universe = self
            .provider
            .get_universe(params.universe_filter.as_deref())
            .await?;
        if !params.scan_entire_universe {
            universe.truncate(params.max_instruments);
        }

        let total = universe.len();
        let total_batches = total.div_ceil(params.batch_size);
        self.store.record_universe(job_id, total, total_batches)?;
        {
            let mut state = handle.lock();
            state.total = total;
            state.total_batches = total_batches;
        }
        info!(
            "Job {}: {} instruments in {} batches ({} to {})",
            job_id, total, total_batches, window.start, window.end
        );

        if total == 0 {
            warn!("Job {}: universe is empty, nothing to scan", job_id);
            return Ok(JobStatus::Completed);
        }

        let scanner = BatchScanner::new(
            self.provider.clone(),
            DetectorConfig {
                limit_up_threshold: self.config.limit_up_threshold,
                min_run_length: self.config.min_run_length,
            },
            self.config.progress_every,
        );

        for (batch_idx, batch) in universe.chunks(params.batch_size).enumerate() {
            if handle.control.cancel_requested() {
                return Ok(JobStatus::Cancelled);
            }

            let offset = batch_idx * params.batch_size;
            let batch_number = batch_idx + 1;
            let found_before = {
                let mut state = handle.lock();
                state.current_batch = batch_number;
                state.results.len()
            };
            self.store.record_batch(job_id, batch_number)?;

            let outcome = scanner
                .scan_batch(batch, offset, window, &handle.control, found_before, |tick| {
                    handle.apply_tick(tick)
                })
                .await;

            let processed = offset + outcome.processed;
            let accumulated = handle.append_batch(outcome.signals, processed);
            self.store.save_results(job_id, &accumulated)?;
            self.store.update_progress(job_id, processed, accumulated.len(), None)?;

            info!(
                "Job {}: batch {}/{} checkpointed ({} processed, {} found)",
                job_id,
                batch_number,
                total_batches,
                processed,
                accumulated.len()
            );

            if outcome.stopped_early {
                return Ok(JobStatus::Cancelled);
            }
        }

        Ok(JobStatus::Completed)
    }

    fn finish(&self, handle: &JobHandle, status: JobStatus, error: Option<String>) {
        let mut state = handle.lock();
        state.status = status;
        state.message = status.as_str().to_string();
        state.error = error.clone();
        if status == JobStatus::Completed {
            state.found = state.results.len();
        }

        // Written under the job lock so a racing pause cannot overwrite the final status.
        // Stored counters stay at the last batch checkpoint, which matches the stored rows.
        if let Err(e) = self
            .store
            .complete_job(&handle.job_id, status, None, error.as_deref())
        {
            error!("Failed to record final status of job {}: {}", handle.job_id, e);
        }
    }
}

fn no_active_job() -> AppError {
    AppError::Conflict("no active screening job".to_string())
}

fn new_job_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("task_{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), &suffix[..8])
}

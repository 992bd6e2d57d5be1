// ============================================
// Periodic Jobs
// ============================================
//
// Background jobs driven by an in-process interval loop:
// 1. Affinity aggregation (every 6 hours)
// 2. Abandoned checkout detection (hourly)
//
// Each job is single-flight: a run that finds the job's RunLock held
// returns JobRun::Skipped instead of overlapping. Failures on one item
// (visitor, checkout) are logged and counted, never fatal to the run.

pub mod abandoned_checkout;
pub mod affinity_aggregator;

pub use abandoned_checkout::AbandonedCheckoutDetector;
pub use affinity_aggregator::AffinityAggregator;

use crate::error::Result;
use crate::metrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{error, info};
use uuid::Uuid;

/// Single-flight guard for one job
#[derive(Debug, Default)]
pub struct RunLock {
    running: AtomicBool,
}

impl RunLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// None when a run is already in progress
    pub fn try_acquire(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard { lock: self })
    }

    pub fn is_held(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Releases the lock on drop
#[derive(Debug)]
pub struct RunGuard<'a> {
    lock: &'a RunLock,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.lock.running.store(false, Ordering::Release);
    }
}

/// Batch run statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchStats {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub items_processed: u32,
    pub items_succeeded: u32,
    pub items_failed: u32,
    /// Items that needed no write (e.g. visitors without interactions)
    pub items_skipped: u32,
    pub total_duration_ms: u64,
}

impl BatchStats {
    pub fn start(now: DateTime<Utc>) -> Self {
        Self {
            started_at: Some(now),
            ..Default::default()
        }
    }

    pub fn finish(mut self, started: Instant) -> Self {
        self.completed_at = Some(Utc::now());
        self.total_duration_ms = started.elapsed().as_millis() as u64;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobRun {
    Completed(BatchStats),
    /// Another run held the lock, or the job is disabled
    Skipped,
}

impl JobRun {
    pub fn stats(&self) -> Option<&BatchStats> {
        match self {
            JobRun::Completed(stats) => Some(stats),
            JobRun::Skipped => None,
        }
    }
}

#[async_trait]
pub trait PeriodicJob: Send + Sync {
    /// Job name (logs and metric labels)
    fn name(&self) -> &'static str;

    fn interval(&self) -> Duration;

    /// One pass evaluated against `now`
    async fn run_at(&self, now: DateTime<Utc>) -> Result<JobRun>;

    async fn run(&self) -> Result<JobRun> {
        self.run_at(Utc::now()).await
    }
}

/// Run one pass and export its outcome as metrics
pub async fn execute(job: &dyn PeriodicJob) -> Result<JobRun> {
    let start = Instant::now();
    let result = job.run().await;

    match &result {
        Ok(JobRun::Completed(stats)) => {
            metrics::record_job_run(job.name(), "completed", start.elapsed());
            metrics::record_job_items(job.name(), "succeeded", stats.items_succeeded as u64);
            metrics::record_job_items(job.name(), "failed", stats.items_failed as u64);
            metrics::record_job_items(job.name(), "skipped", stats.items_skipped as u64);
        }
        Ok(JobRun::Skipped) => metrics::record_job_run(job.name(), "skipped", start.elapsed()),
        Err(_) => metrics::record_job_run(job.name(), "error", start.elapsed()),
    }

    result
}

/// Fixed-interval loop for one job until shutdown
///
/// - errors never stop the loop
/// - consecutive failures add an exponential backoff (capped at 32s)
pub async fn run_job_loop(job: Arc<dyn PeriodicJob>, mut shutdown: broadcast::Receiver<()>) {
    let mut interval_timer = interval(job.interval());
    let mut consecutive_failures = 0u32;

    info!(
        job_name = job.name(),
        interval_secs = job.interval().as_secs(),
        "Starting job loop"
    );

    loop {
        tokio::select! {
            _ = interval_timer.tick() => {
                let run_id = Uuid::new_v4();

                match execute(job.as_ref()).await {
                    Ok(run) => {
                        if let Some(stats) = run.stats() {
                            info!(
                                job_name = job.name(),
                                run_id = %run_id,
                                processed = stats.items_processed,
                                succeeded = stats.items_succeeded,
                                failed = stats.items_failed,
                                skipped = stats.items_skipped,
                                duration_ms = stats.total_duration_ms,
                                "Job pass completed"
                            );
                        }
                        if consecutive_failures > 0 {
                            info!(
                                job_name = job.name(),
                                recovered_after = consecutive_failures,
                                "Job recovered after failures"
                            );
                            consecutive_failures = 0;
                        }
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        error!(
                            job_name = job.name(),
                            run_id = %run_id,
                            error = %e,
                            consecutive_failures = consecutive_failures,
                            "Job execution failed, will retry on next interval"
                        );

                        if consecutive_failures >= 3 {
                            let backoff_secs = 2u64.pow(consecutive_failures.min(5));
                            info!(
                                job_name = job.name(),
                                backoff_secs = backoff_secs,
                                "Applying exponential backoff due to consecutive failures"
                            );
                            tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                        }
                    }
                }
            }
            _ = shutdown.recv() => {
                info!(job_name = job.name(), "Received shutdown signal, stopping job loop");
                break;
            }
        }
    }

    info!(job_name = job.name(), "Job loop stopped");
}

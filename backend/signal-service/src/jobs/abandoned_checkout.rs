// ============================================
// Abandoned Checkout Detector
// ============================================
//
// Hourly job emitting a synthetic checkout_abandon event for checkout
// starts between one and two hours old that never reached a completion
// (checkout_complete / purchase_complete) in the same visitor session.
//
// Window: (now - max_age, now - min_age]. Candidates are grouped by
// (visitor_hash, target_id, session_id) and capped per run.

use super::{BatchStats, JobRun, PeriodicJob, RunLock};
use crate::config::AbandonedCheckoutConfig;
use crate::db::{EventSink, EventStore, CHECKOUT_ABANDON};
use crate::error::Result;
use crate::models::{AbandonedCheckout, NewEvent};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

pub const JOB_NAME: &str = "abandoned_checkout";

pub struct AbandonedCheckoutDetector {
    events: Arc<dyn EventStore>,
    sink: Arc<dyn EventSink>,
    config: AbandonedCheckoutConfig,
    lock: RunLock,
}

impl AbandonedCheckoutDetector {
    pub fn new(
        events: Arc<dyn EventStore>,
        sink: Arc<dyn EventSink>,
        config: AbandonedCheckoutConfig,
    ) -> Self {
        Self {
            events,
            sink,
            config,
            lock: RunLock::new(),
        }
    }

    pub fn lock(&self) -> &RunLock {
        &self.lock
    }

    /// Abandoned checkout groups for a run at `now`
    pub async fn find_abandoned(&self, now: DateTime<Utc>) -> Result<Vec<AbandonedCheckout>> {
        let after = now - ChronoDuration::seconds(self.config.max_age_secs);
        let until = now - ChronoDuration::seconds(self.config.min_age_secs);

        self.events
            .abandoned_checkouts(after, until, self.config.max_per_run)
            .await
    }

    async fn emit_abandon(&self, checkout: &AbandonedCheckout, now: DateTime<Utc>) -> Result<i64> {
        self.sink
            .append(NewEvent {
                visitor_hash: checkout.visitor_hash.clone(),
                session_id: checkout.session_id.clone(),
                event_type: CHECKOUT_ABANDON.to_string(),
                target_id: checkout.target_id,
                event_value: Some(0.0),
                weight: self.config.abandon_weight,
                meta: None,
                created_at: now,
            })
            .await
    }
}

#[async_trait]
impl PeriodicJob for AbandonedCheckoutDetector {
    fn name(&self) -> &'static str {
        JOB_NAME
    }

    fn interval(&self) -> Duration {
        self.config.interval()
    }

    async fn run_at(&self, now: DateTime<Utc>) -> Result<JobRun> {
        if !self.config.commerce_enabled {
            debug!("Store integration disabled, abandoned checkout detection skipped");
            return Ok(JobRun::Skipped);
        }

        let Some(_guard) = self.lock.try_acquire() else {
            info!(job_name = JOB_NAME, "Previous run still in progress, skipping");
            return Ok(JobRun::Skipped);
        };

        let start_time = Instant::now();
        let mut stats = BatchStats::start(now);

        let abandoned = self.find_abandoned(now).await?;
        if !abandoned.is_empty() {
            info!(count = abandoned.len(), "Detected abandoned checkouts");
        }

        for checkout in &abandoned {
            stats.items_processed += 1;

            match self.emit_abandon(checkout, now).await {
                Ok(event_id) => {
                    stats.items_succeeded += 1;
                    debug!(
                        visitor_hash = %checkout.visitor_hash,
                        target_id = checkout.target_id,
                        event_id = event_id,
                        "Checkout abandon recorded"
                    );
                }
                Err(e) => {
                    stats.items_failed += 1;
                    error!(
                        visitor_hash = %checkout.visitor_hash,
                        target_id = checkout.target_id,
                        error = %e,
                        "Failed to record checkout abandon"
                    );
                }
            }
        }

        Ok(JobRun::Completed(stats.finish(start_time)))
    }
}

// ============================================
// Affinity Aggregator
// ============================================
//
// Periodic job building per-visitor category/author affinities.
//
// Workflow:
// 1. Pick visitors with >= min_events events in the activity window
//    (busiest first, capped per run)
// 2. Sum event weights per post over the interaction window (top posts)
// 3. Add each post's sum to every category of the post and to its author
// 4. Store the profile in the transient cache with a TTL
//
// Visitors without interactions get no cache entry.

use super::{BatchStats, JobRun, PeriodicJob, RunLock};
use crate::cache::AffinityCache;
use crate::config::AffinityConfig;
use crate::db::{EventStore, PostMetadata};
use crate::error::Result;
use crate::models::AffinityProfile;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

pub const JOB_NAME: &str = "affinity_aggregator";

pub struct AffinityAggregator {
    events: Arc<dyn EventStore>,
    metadata: Arc<dyn PostMetadata>,
    cache: AffinityCache,
    config: AffinityConfig,
    lock: RunLock,
}

impl AffinityAggregator {
    pub fn new(
        events: Arc<dyn EventStore>,
        metadata: Arc<dyn PostMetadata>,
        cache: AffinityCache,
        config: AffinityConfig,
    ) -> Self {
        Self {
            events,
            metadata,
            cache,
            config,
            lock: RunLock::new(),
        }
    }

    pub fn lock(&self) -> &RunLock {
        &self.lock
    }

    /// Affinity profile for one visitor, or None without interactions
    pub async fn compute_visitor_affinities(
        &self,
        visitor_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AffinityProfile>> {
        let since = now - ChronoDuration::days(self.config.interaction_window_days);
        let interactions = self
            .events
            .post_interactions(visitor_hash, since, self.config.max_interactions)
            .await?;

        if interactions.is_empty() {
            return Ok(None);
        }

        let mut category_weights: BTreeMap<i64, f64> = BTreeMap::new();
        let mut author_weights: BTreeMap<i64, f64> = BTreeMap::new();

        for interaction in &interactions {
            for category_id in self.metadata.get_categories(interaction.target_id).await? {
                *category_weights.entry(category_id).or_default() += interaction.total_weight;
            }

            if let Some(author_id) = self.metadata.get_author(interaction.target_id).await? {
                *author_weights.entry(author_id).or_default() += interaction.total_weight;
            }
        }

        Ok(Some(AffinityProfile {
            visitor_hash: visitor_hash.to_string(),
            category_weights,
            author_weights,
            computed_at: now,
        }))
    }

    /// Recompute and overwrite one visitor's cached profile.
    /// Returns false when there was nothing to store.
    pub async fn refresh_visitor(&self, visitor_hash: &str, now: DateTime<Utc>) -> Result<bool> {
        match self.compute_visitor_affinities(visitor_hash, now).await? {
            Some(profile) => {
                self.cache.store(&profile).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drop the cached profile once a fresh visitor profile exists elsewhere
    pub async fn on_profile_computed(&self, visitor_hash: &str) -> Result<()> {
        self.cache.invalidate(visitor_hash).await?;
        debug!(visitor_hash = %visitor_hash, "Affinity cache invalidated");
        Ok(())
    }

    pub async fn cached_affinities(&self, visitor_hash: &str) -> Result<Option<AffinityProfile>> {
        self.cache.load(visitor_hash).await
    }
}

#[async_trait]
impl PeriodicJob for AffinityAggregator {
    fn name(&self) -> &'static str {
        JOB_NAME
    }

    fn interval(&self) -> Duration {
        self.config.interval()
    }

    async fn run_at(&self, now: DateTime<Utc>) -> Result<JobRun> {
        if !self.config.enabled {
            debug!("Affinity aggregation disabled");
            return Ok(JobRun::Skipped);
        }

        let Some(_guard) = self.lock.try_acquire() else {
            info!(job_name = JOB_NAME, "Previous run still in progress, skipping");
            return Ok(JobRun::Skipped);
        };

        let start_time = Instant::now();
        let mut stats = BatchStats::start(now);

        let since = now - ChronoDuration::days(self.config.activity_window_days);
        let visitors = self
            .events
            .active_visitors(since, self.config.min_events, self.config.max_visitors_per_run)
            .await?;

        info!(visitor_count = visitors.len(), "Fetched active visitors for affinity update");

        for visitor_hash in &visitors {
            stats.items_processed += 1;

            match self.refresh_visitor(visitor_hash, now).await {
                Ok(true) => stats.items_succeeded += 1,
                Ok(false) => stats.items_skipped += 1,
                Err(e) => {
                    stats.items_failed += 1;
                    error!(
                        visitor_hash = %visitor_hash,
                        error = %e,
                        "Failed to compute visitor affinities"
                    );
                }
            }
        }

        Ok(JobRun::Completed(stats.finish(start_time)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{InMemoryTransientCache, TransientCache};
    use crate::db::{EventSink, InMemoryEventStore, StaticPostMetadata};
    use crate::error::AppError;
    use crate::models::NewEvent;

    struct Fixture {
        events: Arc<InMemoryEventStore>,
        transient: Arc<InMemoryTransientCache>,
        job: AffinityAggregator,
    }

    fn fixture_with(metadata: Arc<dyn PostMetadata>) -> Fixture {
        let events = Arc::new(InMemoryEventStore::new());
        let transient = Arc::new(InMemoryTransientCache::new());
        let cache = AffinityCache::new(
            transient.clone(),
            "signals",
            std::time::Duration::from_secs(6 * 3600),
        );
        let job = AffinityAggregator::new(
            events.clone(),
            metadata,
            cache,
            AffinityConfig::default(),
        );

        Fixture {
            events,
            transient,
            job,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(
            StaticPostMetadata::new()
                .with_post(1, Some(100), vec![10, 11])
                .with_post(2, Some(100), vec![11])
                .with_post(3, None, vec![12]),
        ))
    }

    async fn add_events(
        events: &InMemoryEventStore,
        visitor: &str,
        post_id: i64,
        weight: f64,
        count: usize,
        at: DateTime<Utc>,
    ) {
        for _ in 0..count {
            events
                .append(NewEvent {
                    visitor_hash: visitor.to_string(),
                    session_id: "s1".to_string(),
                    event_type: "page_view".to_string(),
                    target_id: post_id,
                    event_value: None,
                    weight,
                    meta: None,
                    created_at: at,
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_activity_threshold() {
        let f = fixture();
        let now = Utc::now();
        let yesterday = now - ChronoDuration::days(1);

        add_events(&f.events, "busy", 1, 1.0, 10, yesterday).await;
        add_events(&f.events, "quiet", 1, 1.0, 9, yesterday).await;

        let run = f.job.run_at(now).await.unwrap();
        let stats = run.stats().unwrap();
        assert_eq!(stats.items_processed, 1);
        assert_eq!(stats.items_succeeded, 1);

        assert!(f.job.cached_affinities("busy").await.unwrap().is_some());
        assert!(f.job.cached_affinities("quiet").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_weight_fans_out_to_categories_and_author() {
        let f = fixture();
        let now = Utc::now();
        let day_ago = now - ChronoDuration::days(1);

        add_events(&f.events, "v1", 1, 2.0, 3, day_ago).await;
        add_events(&f.events, "v1", 2, 1.5, 2, day_ago).await;
        add_events(&f.events, "v1", 3, -1.0, 5, day_ago).await;

        let profile = f
            .job
            .compute_visitor_affinities("v1", now)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(profile.category_weights.get(&10), Some(&6.0));
        assert_eq!(profile.category_weights.get(&11), Some(&9.0));
        assert_eq!(profile.category_weights.get(&12), Some(&-5.0));
        assert_eq!(profile.author_weights.get(&100), Some(&9.0));
        assert_eq!(profile.author_weights.len(), 1);
        assert_eq!(profile.computed_at, now);
    }

    #[tokio::test]
    async fn test_interactions_outside_window_are_ignored() {
        let f = fixture();
        let now = Utc::now();

        add_events(&f.events, "v1", 1, 1.0, 10, now - ChronoDuration::days(31)).await;

        assert!(f
            .job
            .compute_visitor_affinities("v1", now)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_skipped_when_lock_held() {
        let f = fixture();
        add_events(&f.events, "v1", 1, 1.0, 12, Utc::now()).await;

        let _guard = f.job.lock().try_acquire().unwrap();
        assert_eq!(f.job.run_at(Utc::now()).await.unwrap(), JobRun::Skipped);
        assert!(f.transient.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_job_is_skipped() {
        let events = Arc::new(InMemoryEventStore::new());
        let cache = AffinityCache::new(
            Arc::new(InMemoryTransientCache::new()),
            "signals",
            std::time::Duration::from_secs(60),
        );
        let job = AffinityAggregator::new(
            events,
            Arc::new(StaticPostMetadata::new()),
            cache,
            AffinityConfig {
                enabled: false,
                ..Default::default()
            },
        );

        assert_eq!(job.run_at(Utc::now()).await.unwrap(), JobRun::Skipped);
    }

    struct FlakyMetadata;

    #[async_trait]
    impl PostMetadata for FlakyMetadata {
        async fn get_author(&self, _post_id: i64) -> Result<Option<i64>> {
            Ok(None)
        }

        async fn get_categories(&self, post_id: i64) -> Result<Vec<i64>> {
            if post_id == 666 {
                Err(AppError::Database("categories unavailable".to_string()))
            } else {
                Ok(vec![1])
            }
        }
    }

    #[tokio::test]
    async fn test_visitor_failure_does_not_stop_batch() {
        let f = fixture_with(Arc::new(FlakyMetadata));
        let now = Utc::now();
        let day_ago = now - ChronoDuration::days(1);

        add_events(&f.events, "broken", 666, 1.0, 20, day_ago).await;
        add_events(&f.events, "healthy", 5, 1.0, 10, day_ago).await;

        let run = f.job.run_at(now).await.unwrap();
        let stats = run.stats().unwrap();
        assert_eq!(stats.items_processed, 2);
        assert_eq!(stats.items_failed, 1);
        assert_eq!(stats.items_succeeded, 1);
        assert!(f.job.cached_affinities("healthy").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_on_profile_computed_removes_entry() {
        let f = fixture();
        let now = Utc::now();
        add_events(&f.events, "v1", 1, 1.0, 10, now).await;

        assert!(f.job.refresh_visitor("v1", now).await.unwrap());
        assert!(f
            .transient
            .get("signals:affinity:v1")
            .await
            .unwrap()
            .is_some());

        f.job.on_profile_computed("v1").await.unwrap();
        assert!(f.job.cached_affinities("v1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_caps_visitors_keeping_busiest() {
        let f = fixture();
        let now = Utc::now();
        let day_ago = now - ChronoDuration::days(1);

        for i in 0..100 {
            add_events(&f.events, &format!("v{i:03}"), 1, 1.0, 11, day_ago).await;
        }
        add_events(&f.events, "quietest", 1, 1.0, 10, day_ago).await;

        let run = f.job.run_at(now).await.unwrap();
        let stats = run.stats().unwrap();
        assert_eq!(stats.items_processed, 100);
        assert_eq!(stats.items_succeeded, 100);

        assert!(f.job.cached_affinities("v000").await.unwrap().is_some());
        assert!(f.job.cached_affinities("v099").await.unwrap().is_some());
        assert!(f.job.cached_affinities("quietest").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_profile_keeps_top_weighted_posts() {
        // post n lives in category 1000 + n
        let metadata = (1..=51).fold(StaticPostMetadata::new(), |meta, post_id| {
            meta.with_post(post_id, None, vec![1000 + post_id])
        });
        let f = fixture_with(Arc::new(metadata));
        let now = Utc::now();
        let day_ago = now - ChronoDuration::days(1);

        for post_id in 1..=51 {
            add_events(&f.events, "v1", post_id, post_id as f64, 1, day_ago).await;
        }

        let profile = f
            .job
            .compute_visitor_affinities("v1", now)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(profile.category_weights.len(), 50);
        assert!(!profile.category_weights.contains_key(&1001));
        assert_eq!(profile.category_weights.get(&1002), Some(&2.0));
        assert_eq!(profile.category_weights.get(&1051), Some(&51.0));
    }
}

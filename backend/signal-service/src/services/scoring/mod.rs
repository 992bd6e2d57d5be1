/// Scoring Module
///
/// Applies visitor exclusions to recommendation candidates.
///
/// # Pipeline
/// Rules run in a fixed order and the first one that fires decides the score:
/// 1. Hidden post → suppression sentinel (-999.0)
/// 2. Muted/blocked author → suppression sentinel
/// 3. Dismissed category → base score × penalty factor (0.1)
///
/// `filter_results` then removes every item at or below the suppression
/// threshold (-900).
pub mod rules;

pub use rules::{
    Candidate, DismissedCategoryRule, ExcludedAuthorRule, HiddenPostRule, PenaltyRule,
};

use crate::config::ScoringConfig;
use crate::db::PostMetadata;
use crate::error::Result;
use crate::metrics;
use crate::models::Scored;
use crate::services::exclusions::{ExclusionCache, ExclusionStore};
use std::sync::Arc;
use tracing::debug;

/// Score marking a result for removal rather than re-ranking
pub const SUPPRESSION_SENTINEL: f64 = -999.0;

/// Results scored at or below this are dropped
pub const SUPPRESSION_THRESHOLD: f64 = -900.0;

pub fn is_suppressed(score: f64) -> bool {
    score <= SUPPRESSION_THRESHOLD
}

pub struct ScoringEngine {
    exclusions: Arc<ExclusionStore>,
    metadata: Arc<dyn PostMetadata>,
    rules: Vec<Box<dyn PenaltyRule>>,
}

impl ScoringEngine {
    /// Engine with the standard hide > author > category rule order
    pub fn new(
        exclusions: Arc<ExclusionStore>,
        metadata: Arc<dyn PostMetadata>,
        config: &ScoringConfig,
    ) -> Self {
        let rules: Vec<Box<dyn PenaltyRule>> = vec![
            Box::new(HiddenPostRule),
            Box::new(ExcludedAuthorRule),
            Box::new(DismissedCategoryRule::new(config.category_penalty_factor)),
        ];
        Self::with_rules(exclusions, metadata, rules)
    }

    pub fn with_rules(
        exclusions: Arc<ExclusionStore>,
        metadata: Arc<dyn PostMetadata>,
        rules: Vec<Box<dyn PenaltyRule>>,
    ) -> Self {
        Self {
            exclusions,
            metadata,
            rules,
        }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Candidate score after the visitor's exclusions
    pub async fn apply_penalty(
        &self,
        cache: &mut ExclusionCache,
        base_score: f64,
        candidate_post_id: i64,
        visitor_hash: &str,
    ) -> Result<f64> {
        let exclusions = self.exclusions.list_exclusions(cache, visitor_hash).await?;
        if exclusions.is_empty() {
            return Ok(base_score);
        }

        let candidate = Candidate {
            post_id: candidate_post_id,
            base_score,
            metadata: self.metadata.as_ref(),
        };

        for rule in &self.rules {
            if let Some(score) = rule.evaluate(&candidate, &exclusions).await? {
                metrics::record_penalty(rule.name());
                debug!(
                    visitor_hash = %visitor_hash,
                    post_id = candidate_post_id,
                    rule = rule.name(),
                    base_score = base_score,
                    score = score,
                    "Exclusion penalty applied"
                );
                return Ok(score);
            }
        }

        Ok(base_score)
    }

    /// Drop suppressed results, keeping order. Unscored items are kept.
    pub fn filter_results<T: Scored>(&self, results: Vec<T>, visitor_hash: &str) -> Vec<T> {
        let before = results.len();
        let kept: Vec<T> = results
            .into_iter()
            .filter(|item| !item.score().map_or(false, is_suppressed))
            .collect();

        if kept.len() != before {
            debug!(
                visitor_hash = %visitor_hash,
                removed = before - kept.len(),
                "Suppressed results filtered"
            );
        }
        kept
    }

    /// Penalize every scored candidate, then filter. `post_id_of` and
    /// `set_score` adapt the caller's candidate type.
    pub async fn rank_candidates<T, G, S>(
        &self,
        cache: &mut ExclusionCache,
        candidates: Vec<T>,
        visitor_hash: &str,
        post_id_of: G,
        mut set_score: S,
    ) -> Result<Vec<T>>
    where
        T: Scored + Send,
        G: Fn(&T) -> i64 + Send,
        S: FnMut(&mut T, f64) + Send,
    {
        let mut penalized = Vec::with_capacity(candidates.len());
        for mut candidate in candidates {
            if let Some(base_score) = candidate.score() {
                let post_id = post_id_of(&candidate);
                let score = self
                    .apply_penalty(cache, base_score, post_id, visitor_hash)
                    .await?;
                set_score(&mut candidate, score);
            }
            penalized.push(candidate);
        }

        Ok(self.filter_results(penalized, visitor_hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{InMemoryExclusionRepository, StaticPostMetadata};
    use crate::error::AppError;
    use crate::models::ScoredResult;
    use async_trait::async_trait;
    use mockall::mock;

    mock! {
        Metadata {}

        #[async_trait]
        impl PostMetadata for Metadata {
            async fn get_author(&self, post_id: i64) -> Result<Option<i64>>;
            async fn get_categories(&self, post_id: i64) -> Result<Vec<i64>>;
        }
    }

    fn engine_with(metadata: Arc<dyn PostMetadata>) -> (ScoringEngine, Arc<ExclusionStore>) {
        let store = Arc::new(ExclusionStore::new(Arc::new(InMemoryExclusionRepository::new())));
        let engine = ScoringEngine::new(store.clone(), metadata, &ScoringConfig::default());
        (engine, store)
    }

    fn catalog_metadata() -> Arc<dyn PostMetadata> {
        Arc::new(
            StaticPostMetadata::new()
                .with_post(1, Some(10), vec![100, 101])
                .with_post(2, Some(20), vec![200])
                .with_post(3, None, vec![]),
        )
    }

    #[tokio::test]
    async fn test_no_exclusions_skips_metadata() {
        let mut metadata = MockMetadata::new();
        metadata.expect_get_author().never();
        metadata.expect_get_categories().never();

        let (engine, _store) = engine_with(Arc::new(metadata));
        let mut cache = ExclusionCache::new();

        let score = engine.apply_penalty(&mut cache, 12.5, 1, "v1").await.unwrap();
        assert_eq!(score, 12.5);
    }

    #[tokio::test]
    async fn test_hidden_post_is_suppressed_for_any_score() {
        let (engine, store) = engine_with(catalog_metadata());
        let mut cache = ExclusionCache::new();
        store.add_exclusion(&mut cache, "v1", "hide_post", 1).await.unwrap();

        for base in [50.0, -3.0, 0.0, 1e9] {
            let score = engine.apply_penalty(&mut cache, base, 1, "v1").await.unwrap();
            assert_eq!(score, SUPPRESSION_SENTINEL);
        }
    }

    #[tokio::test]
    async fn test_muted_and_blocked_authors_are_suppressed() {
        let (engine, store) = engine_with(catalog_metadata());
        let mut cache = ExclusionCache::new();
        store.add_exclusion(&mut cache, "v1", "mute_author", 10).await.unwrap();
        store.add_exclusion(&mut cache, "v2", "block_author", 20).await.unwrap();

        assert_eq!(
            engine.apply_penalty(&mut cache, 8.0, 1, "v1").await.unwrap(),
            SUPPRESSION_SENTINEL
        );
        assert_eq!(
            engine.apply_penalty(&mut cache, 8.0, 2, "v2").await.unwrap(),
            SUPPRESSION_SENTINEL
        );
        // Other author untouched
        assert_eq!(engine.apply_penalty(&mut cache, 8.0, 2, "v1").await.unwrap(), 8.0);
    }

    #[tokio::test]
    async fn test_dismissed_category_dampens() {
        let (engine, store) = engine_with(catalog_metadata());
        let mut cache = ExclusionCache::new();
        store.add_exclusion(&mut cache, "v1", "dismiss_category", 101).await.unwrap();

        let score = engine.apply_penalty(&mut cache, 50.0, 1, "v1").await.unwrap();
        assert_eq!(score, 5.0);

        // Post without categories is untouched
        assert_eq!(engine.apply_penalty(&mut cache, 50.0, 3, "v1").await.unwrap(), 50.0);
    }

    #[tokio::test]
    async fn test_hide_wins_without_further_lookups() {
        let mut metadata = MockMetadata::new();
        metadata.expect_get_author().never();
        metadata.expect_get_categories().never();

        let (engine, store) = engine_with(Arc::new(metadata));
        let mut cache = ExclusionCache::new();
        store.add_exclusion(&mut cache, "v1", "hide_post", 1).await.unwrap();
        store.add_exclusion(&mut cache, "v1", "mute_author", 10).await.unwrap();
        store.add_exclusion(&mut cache, "v1", "dismiss_category", 100).await.unwrap();

        let score = engine.apply_penalty(&mut cache, 30.0, 1, "v1").await.unwrap();
        assert_eq!(score, SUPPRESSION_SENTINEL);
    }

    #[tokio::test]
    async fn test_author_wins_over_category() {
        let mut metadata = MockMetadata::new();
        metadata.expect_get_author().times(1).returning(|_| Ok(Some(10)));
        metadata.expect_get_categories().never();

        let (engine, store) = engine_with(Arc::new(metadata));
        let mut cache = ExclusionCache::new();
        store.add_exclusion(&mut cache, "v1", "block_author", 10).await.unwrap();
        store.add_exclusion(&mut cache, "v1", "dismiss_category", 100).await.unwrap();

        let score = engine.apply_penalty(&mut cache, 30.0, 1, "v1").await.unwrap();
        assert_eq!(score, SUPPRESSION_SENTINEL);
    }

    #[tokio::test]
    async fn test_metadata_failure_propagates() {
        let mut metadata = MockMetadata::new();
        metadata
            .expect_get_author()
            .returning(|_| Err(AppError::Database("connection reset".to_string())));

        let (engine, store) = engine_with(Arc::new(metadata));
        let mut cache = ExclusionCache::new();
        store.add_exclusion(&mut cache, "v1", "mute_author", 10).await.unwrap();

        let err = engine.apply_penalty(&mut cache, 1.0, 1, "v1").await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }

    #[test]
    fn test_filter_results_drops_suppressed() {
        let (engine, _store) = engine_with(catalog_metadata());
        let results = vec![
            ScoredResult::new(1, -999.0),
            ScoredResult::new(2, 42.0),
            ScoredResult::new(3, -950.0),
        ];

        let kept = engine.filter_results(results, "v1");
        assert_eq!(kept, vec![ScoredResult::new(2, 42.0)]);
    }

    #[test]
    fn test_filter_results_keeps_order_and_unscored() {
        let (engine, _store) = engine_with(catalog_metadata());
        let results = vec![
            ScoredResult::new(1, 3.0),
            ScoredResult {
                post_id: 2,
                score: None,
            },
            ScoredResult::new(3, -900.0),
            ScoredResult::new(4, -899.9),
        ];

        let kept: Vec<i64> = engine
            .filter_results(results, "v1")
            .into_iter()
            .map(|r| r.post_id)
            .collect();
        assert_eq!(kept, vec![1, 2, 4]);
    }

    #[tokio::test]
    async fn test_rank_candidates_matches_per_item_penalty() {
        let (engine, store) = engine_with(catalog_metadata());
        let mut cache = ExclusionCache::new();
        store.add_exclusion(&mut cache, "v1", "hide_post", 1).await.unwrap();
        store.add_exclusion(&mut cache, "v1", "dismiss_category", 200).await.unwrap();

        let candidates = vec![
            ScoredResult::new(1, 40.0),
            ScoredResult::new(2, 40.0),
            ScoredResult::new(3, 40.0),
        ];

        let ranked = engine
            .rank_candidates(
                &mut cache,
                candidates,
                "v1",
                |c| c.post_id,
                |c, score| c.score = Some(score),
            )
            .await
            .unwrap();

        assert_eq!(
            ranked,
            vec![ScoredResult::new(2, 4.0), ScoredResult::new(3, 40.0)]
        );
    }

    #[test]
    fn test_default_rule_order() {
        let (engine, _store) = engine_with(catalog_metadata());
        assert_eq!(engine.rule_names(), vec!["hide_post", "author", "dismiss_category"]);
    }
}

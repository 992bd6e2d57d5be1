// ============================================
// Exclusion Store
// ============================================
//
// Per-visitor exclusion rules (hide_post, mute_author, block_author,
// dismiss_category) on top of an ExclusionRepository.
//
// Reads go through an ExclusionCache owned by the caller and scoped to one
// request or scoring pass. Every mutation invalidates the visitor's entry
// in that cache before returning.

pub mod negative;

pub use negative::NegativeSignalProcessor;

use crate::db::ExclusionRepository;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{ExclusionRule, ExclusionType, ExclusionTypeCount, NewExclusion};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Request-scoped exclusion lists keyed by visitor
#[derive(Debug, Default)]
pub struct ExclusionCache {
    entries: HashMap<String, Arc<Vec<ExclusionRule>>>,
}

impl ExclusionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, visitor_hash: &str) -> Option<Arc<Vec<ExclusionRule>>> {
        self.entries.get(visitor_hash).cloned()
    }

    fn insert(&mut self, visitor_hash: &str, rules: Arc<Vec<ExclusionRule>>) {
        self.entries.insert(visitor_hash.to_string(), rules);
    }

    pub fn invalidate(&mut self, visitor_hash: &str) {
        self.entries.remove(visitor_hash);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_cached(&self, visitor_hash: &str) -> bool {
        self.entries.contains_key(visitor_hash)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExclusionStats {
    pub total_exclusions: i64,
    pub exclusions_by_type: Vec<ExclusionTypeCount>,
}

pub struct ExclusionStore {
    repo: Arc<dyn ExclusionRepository>,
}

impl ExclusionStore {
    pub fn new(repo: Arc<dyn ExclusionRepository>) -> Self {
        Self { repo }
    }

    /// Add (or refresh) an exclusion. Returns false without writing when
    /// `exclusion_type` is not one of the four allowed kinds.
    pub async fn add_exclusion(
        &self,
        cache: &mut ExclusionCache,
        visitor_hash: &str,
        exclusion_type: &str,
        target_id: i64,
    ) -> Result<bool> {
        self.add_exclusion_for_user(cache, visitor_hash, exclusion_type, target_id, None)
            .await
    }

    pub async fn add_exclusion_for_user(
        &self,
        cache: &mut ExclusionCache,
        visitor_hash: &str,
        exclusion_type: &str,
        target_id: i64,
        user_id: Option<i64>,
    ) -> Result<bool> {
        let exclusion_type = match exclusion_type.parse::<ExclusionType>() {
            Ok(kind) => kind,
            Err(e) => {
                warn!(visitor_hash = %visitor_hash, error = %e, "Rejected exclusion write");
                return Ok(false);
            }
        };

        self.upsert(cache, visitor_hash, exclusion_type, target_id, user_id)
            .await?;
        Ok(true)
    }

    /// Typed upsert; returns the row id
    pub async fn upsert(
        &self,
        cache: &mut ExclusionCache,
        visitor_hash: &str,
        exclusion_type: ExclusionType,
        target_id: i64,
        user_id: Option<i64>,
    ) -> Result<i64> {
        if visitor_hash.trim().is_empty() {
            return Err(AppError::Validation("visitor_hash is required".to_string()));
        }

        let result = self
            .repo
            .upsert(NewExclusion {
                visitor_hash: visitor_hash.to_string(),
                user_id,
                exclusion_type,
                target_id,
                created_at: Utc::now(),
            })
            .await;
        cache.invalidate(visitor_hash);
        let id = result?;

        metrics::record_exclusion_write("upsert", exclusion_type.as_str());
        info!(
            visitor_hash = %visitor_hash,
            exclusion_type = %exclusion_type,
            target_id = target_id,
            exclusion_id = id,
            "Exclusion stored"
        );

        Ok(id)
    }

    /// Remove an exclusion owned by `visitor_hash`. False when no row matched.
    pub async fn remove_exclusion(
        &self,
        cache: &mut ExclusionCache,
        exclusion_id: i64,
        visitor_hash: &str,
    ) -> Result<bool> {
        let result = self.repo.delete_owned(exclusion_id, visitor_hash).await;
        cache.invalidate(visitor_hash);
        let removed = result? > 0;

        if removed {
            metrics::record_exclusion_write("remove", "any");
            info!(visitor_hash = %visitor_hash, exclusion_id = exclusion_id, "Exclusion removed");
        } else {
            debug!(
                visitor_hash = %visitor_hash,
                exclusion_id = exclusion_id,
                "No owned exclusion to remove"
            );
        }

        Ok(removed)
    }

    /// Like `remove_exclusion`, reporting a miss as `ExclusionNotFound`
    pub async fn remove_owned(
        &self,
        cache: &mut ExclusionCache,
        exclusion_id: i64,
        visitor_hash: &str,
    ) -> Result<()> {
        if self.remove_exclusion(cache, exclusion_id, visitor_hash).await? {
            Ok(())
        } else {
            Err(AppError::ExclusionNotFound(exclusion_id))
        }
    }

    /// Visitor's exclusions, newest first
    pub async fn list_exclusions(
        &self,
        cache: &mut ExclusionCache,
        visitor_hash: &str,
    ) -> Result<Arc<Vec<ExclusionRule>>> {
        if let Some(rules) = cache.get(visitor_hash) {
            return Ok(rules);
        }

        let rules = Arc::new(self.repo.list_for_visitor(visitor_hash).await?);
        cache.insert(visitor_hash, rules.clone());
        Ok(rules)
    }

    pub async fn exclusion_count(&self, visitor_hash: &str) -> Result<i64> {
        self.repo.count_for_visitor(visitor_hash).await
    }

    pub async fn stats(&self) -> Result<ExclusionStats> {
        let exclusions_by_type = self.repo.count_by_type().await?;
        let total_exclusions = exclusions_by_type.iter().map(|c| c.count).sum();

        Ok(ExclusionStats {
            total_exclusions,
            exclusions_by_type,
        })
    }
}

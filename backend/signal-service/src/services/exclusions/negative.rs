//! Turns stored negative signals into exclusion rules.

use super::{ExclusionCache, ExclusionStore};
use crate::db::PostMetadata;
use crate::error::Result;
use crate::models::{ExclusionRule, ExclusionType};
use std::sync::Arc;
use tracing::debug;

pub struct NegativeSignalProcessor {
    store: Arc<ExclusionStore>,
    metadata: Arc<dyn PostMetadata>,
}

impl NegativeSignalProcessor {
    pub fn new(store: Arc<ExclusionStore>, metadata: Arc<dyn PostMetadata>) -> Self {
        Self { store, metadata }
    }

    /// Exclusion kind triggered by an event type, if any
    pub fn exclusion_for(event_type: &str) -> Option<ExclusionType> {
        match event_type {
            "hide_post" => Some(ExclusionType::HidePost),
            "mute_author" => Some(ExclusionType::MuteAuthor),
            "block_author" => Some(ExclusionType::BlockAuthor),
            "dismiss" => Some(ExclusionType::DismissCategory),
            _ => None,
        }
    }

    /// Create the exclusion matching a stored event on `post_id`.
    /// Returns the exclusion id, or None when the event triggers nothing or
    /// the post has no author/category to exclude.
    pub async fn process_event(
        &self,
        cache: &mut ExclusionCache,
        event_type: &str,
        post_id: i64,
        visitor_hash: &str,
        user_id: Option<i64>,
    ) -> Result<Option<i64>> {
        let Some(exclusion_type) = Self::exclusion_for(event_type) else {
            return Ok(None);
        };

        let target_id = match exclusion_type {
            ExclusionType::HidePost => Some(post_id),
            ExclusionType::MuteAuthor | ExclusionType::BlockAuthor => {
                self.metadata.get_author(post_id).await?
            }
            // The primary category is dismissed
            ExclusionType::DismissCategory => {
                self.metadata.get_categories(post_id).await?.first().copied()
            }
        };

        let Some(target_id) = target_id else {
            debug!(
                event_type = %event_type,
                post_id = post_id,
                "Negative signal has no target to exclude"
            );
            return Ok(None);
        };

        let id = self
            .store
            .upsert(cache, visitor_hash, exclusion_type, target_id, user_id)
            .await?;
        Ok(Some(id))
    }

    /// Current exclusions, for callers that already hold a processor
    pub async fn exclusions(
        &self,
        cache: &mut ExclusionCache,
        visitor_hash: &str,
    ) -> Result<Arc<Vec<ExclusionRule>>> {
        self.store.list_exclusions(cache, visitor_hash).await
    }
}

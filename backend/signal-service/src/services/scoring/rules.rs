use super::SUPPRESSION_SENTINEL;
use crate::db::PostMetadata;
use crate::error::Result;
use crate::models::{ExclusionRule, ExclusionType};
use async_trait::async_trait;

/// Candidate under evaluation
pub struct Candidate<'a> {
    pub post_id: i64,
    pub base_score: f64,
    pub metadata: &'a dyn PostMetadata,
}

/// One step of the penalty pipeline. Returns the final score when the rule
/// fires; later rules are then skipped.
#[async_trait]
pub trait PenaltyRule: Send + Sync {
    fn name(&self) -> &'static str;

    async fn evaluate(
        &self,
        candidate: &Candidate<'_>,
        exclusions: &[ExclusionRule],
    ) -> Result<Option<f64>>;
}

fn has_kind(exclusions: &[ExclusionRule], kinds: &[ExclusionType]) -> bool {
    exclusions.iter().any(|e| kinds.contains(&e.exclusion_type))
}

/// Post explicitly hidden → full suppression
pub struct HiddenPostRule;

#[async_trait]
impl PenaltyRule for HiddenPostRule {
    fn name(&self) -> &'static str {
        "hide_post"
    }

    async fn evaluate(
        &self,
        candidate: &Candidate<'_>,
        exclusions: &[ExclusionRule],
    ) -> Result<Option<f64>> {
        let hidden = exclusions.iter().any(|e| {
            e.exclusion_type == ExclusionType::HidePost && e.target_id == candidate.post_id
        });
        Ok(hidden.then_some(SUPPRESSION_SENTINEL))
    }
}

/// Author muted or blocked → full suppression
pub struct ExcludedAuthorRule;

#[async_trait]
impl PenaltyRule for ExcludedAuthorRule {
    fn name(&self) -> &'static str {
        "author"
    }

    async fn evaluate(
        &self,
        candidate: &Candidate<'_>,
        exclusions: &[ExclusionRule],
    ) -> Result<Option<f64>> {
        if !has_kind(exclusions, &[ExclusionType::MuteAuthor, ExclusionType::BlockAuthor]) {
            return Ok(None);
        }

        let Some(author_id) = candidate.metadata.get_author(candidate.post_id).await? else {
            return Ok(None);
        };

        let excluded = exclusions
            .iter()
            .any(|e| e.exclusion_type.targets_author() && e.target_id == author_id);
        Ok(excluded.then_some(SUPPRESSION_SENTINEL))
    }
}

/// Category dismissed → dampened score
pub struct DismissedCategoryRule {
    factor: f64,
}

impl DismissedCategoryRule {
    pub fn new(factor: f64) -> Self {
        Self { factor }
    }
}

#[async_trait]
impl PenaltyRule for DismissedCategoryRule {
    fn name(&self) -> &'static str {
        "dismiss_category"
    }

    async fn evaluate(
        &self,
        candidate: &Candidate<'_>,
        exclusions: &[ExclusionRule],
    ) -> Result<Option<f64>> {
        if !has_kind(exclusions, &[ExclusionType::DismissCategory]) {
            return Ok(None);
        }

        let categories = candidate.metadata.get_categories(candidate.post_id).await?;
        if categories.is_empty() {
            return Ok(None);
        }

        let dismissed = exclusions.iter().any(|e| {
            e.exclusion_type == ExclusionType::DismissCategory && categories.contains(&e.target_id)
        });
        Ok(dismissed.then(|| candidate.base_score * self.factor))
    }
}

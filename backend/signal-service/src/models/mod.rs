use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Stored behavioral event. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Event {
    pub id: i64,
    /// Stable, non-PII visitor hash
    pub visitor_hash: String,
    pub session_id: String,
    pub event_type: String,
    /// Post, product, author or category id depending on event_type
    pub target_id: i64,
    pub event_value: Option<f64>,
    pub weight: f64,
    pub meta: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Event waiting to be appended
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewEvent {
    pub visitor_hash: String,
    pub session_id: String,
    pub event_type: String,
    pub target_id: i64,
    pub event_value: Option<f64>,
    pub weight: f64,
    pub meta: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl NewEvent {
    pub fn into_event(self, id: i64) -> Event {
        Event {
            id,
            visitor_hash: self.visitor_hash,
            session_id: self.session_id,
            event_type: self.event_type,
            target_id: self.target_id,
            event_value: self.event_value,
            weight: self.weight,
            meta: self.meta,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalDefinition {
    pub event_type: &'static str,
    pub base_weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionType {
    HidePost,
    MuteAuthor,
    BlockAuthor,
    DismissCategory,
}

impl ExclusionType {
    pub const ALL: [ExclusionType; 4] = [
        ExclusionType::HidePost,
        ExclusionType::MuteAuthor,
        ExclusionType::BlockAuthor,
        ExclusionType::DismissCategory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExclusionType::HidePost => "hide_post",
            ExclusionType::MuteAuthor => "mute_author",
            ExclusionType::BlockAuthor => "block_author",
            ExclusionType::DismissCategory => "dismiss_category",
        }
    }

    /// Whether target_id refers to an author
    pub fn targets_author(&self) -> bool {
        matches!(self, ExclusionType::MuteAuthor | ExclusionType::BlockAuthor)
    }
}

impl fmt::Display for ExclusionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExclusionType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hide_post" => Ok(ExclusionType::HidePost),
            "mute_author" => Ok(ExclusionType::MuteAuthor),
            "block_author" => Ok(ExclusionType::BlockAuthor),
            "dismiss_category" => Ok(ExclusionType::DismissCategory),
            other => Err(AppError::InvalidExclusionType(other.to_string())),
        }
    }
}

impl TryFrom<String> for ExclusionType {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Persistent visitor preference suppressing or penalizing recommendations
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct ExclusionRule {
    pub id: i64,
    pub visitor_hash: String,
    pub user_id: Option<i64>,
    #[sqlx(try_from = "String")]
    pub exclusion_type: ExclusionType,
    pub target_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Upsert payload keyed by (visitor_hash, exclusion_type, target_id)
#[derive(Debug, Clone, PartialEq)]
pub struct NewExclusion {
    pub visitor_hash: String,
    pub user_id: Option<i64>,
    pub exclusion_type: ExclusionType,
    pub target_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Cached category/author taste vector for one visitor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AffinityProfile {
    pub visitor_hash: String,
    pub category_weights: BTreeMap<i64, f64>,
    pub author_weights: BTreeMap<i64, f64>,
    pub computed_at: DateTime<Utc>,
}

impl AffinityProfile {
    pub fn is_empty(&self) -> bool {
        self.category_weights.is_empty() && self.author_weights.is_empty()
    }

    /// Strongest categories first
    pub fn top_categories(&self, limit: usize) -> Vec<(i64, f64)> {
        let mut entries: Vec<(i64, f64)> = self
            .category_weights
            .iter()
            .map(|(id, weight)| (*id, *weight))
            .collect();
        entries.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        entries.truncate(limit);
        entries
    }
}

/// Summed weight of one visitor's events on one post
#[derive(Debug, Clone, Copy, PartialEq, FromRow)]
pub struct PostInteraction {
    pub target_id: i64,
    pub total_weight: f64,
}

/// checkout_start group without a completion event
#[derive(Debug, Clone, PartialEq, Eq, Hash, FromRow)]
pub struct AbandonedCheckout {
    pub visitor_hash: String,
    pub target_id: i64,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct EventTypeCount {
    pub event_type: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExclusionTypeCount {
    pub exclusion_type: ExclusionType,
    pub count: i64,
}

/// Anything carrying an optional recommendation score
pub trait Scored {
    fn score(&self) -> Option<f64>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub post_id: i64,
    pub score: Option<f64>,
}

impl ScoredResult {
    pub fn new(post_id: i64, score: f64) -> Self {
        Self {
            post_id,
            score: Some(score),
        }
    }
}

impl Scored for ScoredResult {
    fn score(&self) -> Option<f64> {
        self.score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusion_type_round_trip() {
        for kind in ExclusionType::ALL {
            assert_eq!(kind.as_str().parse::<ExclusionType>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_exclusion_type() {
        let err = "mute_category".parse::<ExclusionType>().unwrap_err();
        assert!(matches!(err, AppError::InvalidExclusionType(t) if t == "mute_category"));
    }

    #[test]
    fn test_top_categories() {
        let profile = AffinityProfile {
            visitor_hash: "v".to_string(),
            category_weights: BTreeMap::from([(1, 2.0), (2, 9.5), (3, -1.0)]),
            author_weights: BTreeMap::new(),
            computed_at: Utc::now(),
        };

        assert_eq!(profile.top_categories(2), vec![(2, 9.5), (1, 2.0)]);
        assert!(!profile.is_empty());
    }

    #[test]
    fn test_affinity_profile_json_keys() {
        let profile = AffinityProfile {
            visitor_hash: "v".to_string(),
            category_weights: BTreeMap::from([(12, 3.5)]),
            author_weights: BTreeMap::from([(4, 1.0)]),
            computed_at: Utc::now(),
        };

        let json = serde_json::to_string(&profile).unwrap();
        let decoded: AffinityProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, profile);
    }
}

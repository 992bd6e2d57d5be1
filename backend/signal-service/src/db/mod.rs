// ============================================
// Storage collaborators
// ============================================
//
// Trait seams for the stores the engine reads and writes:
// - EventSink / EventStore: append-only behavioral events
// - ExclusionRepository: per-visitor exclusion rows
// - PostMetadata: post → author / categories lookups
//
// Each trait has a PostgreSQL implementation (sqlx) and an in-memory
// implementation. The aggregate queries on EventStore have default
// implementations built on `query`, which the PostgreSQL store replaces
// with SQL.

pub mod event_repo;
pub mod exclusion_repo;
pub mod memory;
pub mod post_metadata;

pub use event_repo::PgEventStore;
pub use exclusion_repo::PgExclusionRepository;
pub use memory::{InMemoryEventStore, InMemoryExclusionRepository, StaticPostMetadata};
pub use post_metadata::PgPostMetadata;

use crate::error::Result;
use crate::models::{
    AbandonedCheckout, Event, EventTypeCount, ExclusionRule, ExclusionTypeCount, NewEvent,
    NewExclusion, PostInteraction,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

pub const CHECKOUT_START: &str = "checkout_start";
pub const CHECKOUT_ABANDON: &str = "checkout_abandon";
pub const CHECKOUT_COMPLETION_TYPES: [&str; 2] = ["checkout_complete", "purchase_complete"];

/// Filter for raw event reads
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventQuery {
    /// Empty means any type
    pub event_types: Vec<String>,
    pub visitor_hash: Option<String>,
    pub session_id: Option<String>,
    /// Inclusive lower bound
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub until: Option<DateTime<Utc>>,
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.event_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn visitor(mut self, visitor_hash: impl Into<String>) -> Self {
        self.visitor_hash = Some(visitor_hash.into());
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        (self.event_types.is_empty() || self.event_types.iter().any(|t| *t == event.event_type))
            && self
                .visitor_hash
                .as_ref()
                .map_or(true, |v| *v == event.visitor_hash)
            && self
                .session_id
                .as_ref()
                .map_or(true, |s| *s == event.session_id)
            && self.since.map_or(true, |since| event.created_at >= since)
            && self.until.map_or(true, |until| event.created_at <= until)
    }
}

/// Write side of the event log
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Append one event, returning its id
    async fn append(&self, event: NewEvent) -> Result<i64>;
}

/// Read side of the event log
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Raw events matching the filter, oldest first
    async fn query(&self, query: &EventQuery) -> Result<Vec<Event>>;

    /// Visitors with at least `min_events` events since `since`,
    /// busiest first, at most `limit`
    async fn active_visitors(
        &self,
        since: DateTime<Utc>,
        min_events: usize,
        limit: usize,
    ) -> Result<Vec<String>> {
        let events = self.query(&EventQuery::new().since(since)).await?;

        let mut counts: HashMap<String, usize> = HashMap::new();
        for event in events {
            *counts.entry(event.visitor_hash).or_default() += 1;
        }

        let mut active: Vec<(String, usize)> = counts
            .into_iter()
            .filter(|(_, count)| *count >= min_events)
            .collect();
        active.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Ok(active
            .into_iter()
            .take(limit)
            .map(|(visitor, _)| visitor)
            .collect())
    }

    /// Per-post weight sums for one visitor since `since`, highest first
    async fn post_interactions(
        &self,
        visitor_hash: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PostInteraction>> {
        let events = self
            .query(&EventQuery::new().visitor(visitor_hash).since(since))
            .await?;

        let mut sums: HashMap<i64, f64> = HashMap::new();
        for event in events.iter().filter(|e| e.target_id > 0) {
            *sums.entry(event.target_id).or_default() += event.weight;
        }

        let mut interactions: Vec<PostInteraction> = sums
            .into_iter()
            .map(|(target_id, total_weight)| PostInteraction {
                target_id,
                total_weight,
            })
            .collect();
        interactions.sort_by(|a, b| {
            b.total_weight
                .total_cmp(&a.total_weight)
                .then(a.target_id.cmp(&b.target_id))
        });
        interactions.truncate(limit);

        Ok(interactions)
    }

    /// checkout_start groups created in (after, until] with no completion
    /// in the same visitor session at or after the start
    async fn abandoned_checkouts(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<AbandonedCheckout>> {
        let starts = self
            .query(
                &EventQuery::new()
                    .types([CHECKOUT_START])
                    .since(after)
                    .until(until),
            )
            .await?;

        let mut seen = HashSet::new();
        let mut abandoned = Vec::new();

        for start in starts.into_iter().filter(|e| e.created_at > after) {
            let group = AbandonedCheckout {
                visitor_hash: start.visitor_hash.clone(),
                target_id: start.target_id,
                session_id: start.session_id.clone(),
            };
            if seen.contains(&group) {
                continue;
            }

            let completions = self
                .query(
                    &EventQuery::new()
                        .types(CHECKOUT_COMPLETION_TYPES)
                        .visitor(start.visitor_hash.as_str())
                        .session(start.session_id.as_str())
                        .since(start.created_at),
                )
                .await?;
            if !completions.is_empty() {
                continue;
            }

            seen.insert(group.clone());
            abandoned.push(group);
            if abandoned.len() >= limit {
                break;
            }
        }

        Ok(abandoned)
    }

    /// Number of events of the given types since `since`
    async fn count_events(&self, event_types: &[&str], since: DateTime<Utc>) -> Result<i64> {
        let events = self
            .query(&EventQuery::new().types(event_types.iter().copied()).since(since))
            .await?;
        Ok(events.len() as i64)
    }

    /// Most frequent event types since `since`, skipping `exclude`
    async fn top_event_types(
        &self,
        since: DateTime<Utc>,
        exclude: &[&str],
        limit: usize,
    ) -> Result<Vec<EventTypeCount>> {
        let events = self.query(&EventQuery::new().since(since)).await?;

        let mut counts: HashMap<String, i64> = HashMap::new();
        for event in events {
            if !exclude.contains(&event.event_type.as_str()) {
                *counts.entry(event.event_type).or_default() += 1;
            }
        }

        let mut top: Vec<EventTypeCount> = counts
            .into_iter()
            .map(|(event_type, count)| EventTypeCount { event_type, count })
            .collect();
        top.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.event_type.cmp(&b.event_type)));
        top.truncate(limit);

        Ok(top)
    }
}

/// Exclusion rows, unique per (visitor_hash, exclusion_type, target_id)
#[async_trait]
pub trait ExclusionRepository: Send + Sync {
    /// Insert or refresh created_at/user_id on conflict; returns the row id
    async fn upsert(&self, exclusion: NewExclusion) -> Result<i64>;

    /// Delete a row owned by `visitor_hash`; returns rows affected
    async fn delete_owned(&self, exclusion_id: i64, visitor_hash: &str) -> Result<u64>;

    /// Newest first
    async fn list_for_visitor(&self, visitor_hash: &str) -> Result<Vec<ExclusionRule>>;

    async fn count_for_visitor(&self, visitor_hash: &str) -> Result<i64>;

    /// Row counts grouped by type, largest first
    async fn count_by_type(&self) -> Result<Vec<ExclusionTypeCount>>;
}

/// Post attribute lookups
#[async_trait]
pub trait PostMetadata: Send + Sync {
    async fn get_author(&self, post_id: i64) -> Result<Option<i64>>;

    /// Categories in assignment order; the first is the primary category
    async fn get_categories(&self, post_id: i64) -> Result<Vec<i64>>;
}

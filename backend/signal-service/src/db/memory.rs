//! In-memory stores for tests and local runs without PostgreSQL.

use super::{EventQuery, EventSink, EventStore, ExclusionRepository, PostMetadata};
use crate::error::Result;
use crate::models::{
    Event, ExclusionRule, ExclusionType, ExclusionTypeCount, NewEvent, NewExclusion,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryEventStore {
    events: RwLock<Vec<Event>>,
    next_id: AtomicI64,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    pub async fn all(&self) -> Vec<Event> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl EventSink for InMemoryEventStore {
    async fn append(&self, event: NewEvent) -> Result<i64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut events = self.events.write().await;
        events.push(event.into_event(id));
        Ok(id)
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn query(&self, query: &EventQuery) -> Result<Vec<Event>> {
        let events = self.events.read().await;
        let mut matched: Vec<Event> = events.iter().filter(|e| query.matches(e)).cloned().collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(matched)
    }
}

type ExclusionKey = (String, ExclusionType, i64);

#[derive(Default)]
pub struct InMemoryExclusionRepository {
    rows: DashMap<ExclusionKey, ExclusionRule>,
    next_id: AtomicI64,
}

impl InMemoryExclusionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl ExclusionRepository for InMemoryExclusionRepository {
    async fn upsert(&self, exclusion: NewExclusion) -> Result<i64> {
        let key = (
            exclusion.visitor_hash.clone(),
            exclusion.exclusion_type,
            exclusion.target_id,
        );

        let mut entry = self.rows.entry(key).or_insert_with(|| ExclusionRule {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            visitor_hash: exclusion.visitor_hash.clone(),
            user_id: exclusion.user_id,
            exclusion_type: exclusion.exclusion_type,
            target_id: exclusion.target_id,
            created_at: exclusion.created_at,
        });
        entry.user_id = exclusion.user_id;
        entry.created_at = exclusion.created_at;

        Ok(entry.id)
    }

    async fn delete_owned(&self, exclusion_id: i64, visitor_hash: &str) -> Result<u64> {
        let key = self
            .rows
            .iter()
            .find(|row| row.id == exclusion_id && row.visitor_hash == visitor_hash)
            .map(|row| row.key().clone());

        Ok(match key {
            Some(key) => self.rows.remove(&key).map_or(0, |_| 1),
            None => 0,
        })
    }

    async fn list_for_visitor(&self, visitor_hash: &str) -> Result<Vec<ExclusionRule>> {
        let mut rules: Vec<ExclusionRule> = self
            .rows
            .iter()
            .filter(|row| row.visitor_hash == visitor_hash)
            .map(|row| row.value().clone())
            .collect();
        rules.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rules)
    }

    async fn count_for_visitor(&self, visitor_hash: &str) -> Result<i64> {
        Ok(self
            .rows
            .iter()
            .filter(|row| row.visitor_hash == visitor_hash)
            .count() as i64)
    }

    async fn count_by_type(&self) -> Result<Vec<ExclusionTypeCount>> {
        let mut counts: HashMap<ExclusionType, i64> = HashMap::new();
        for row in self.rows.iter() {
            *counts.entry(row.exclusion_type).or_default() += 1;
        }

        let mut grouped: Vec<ExclusionTypeCount> = counts
            .into_iter()
            .map(|(exclusion_type, count)| ExclusionTypeCount {
                exclusion_type,
                count,
            })
            .collect();
        grouped.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(a.exclusion_type.cmp(&b.exclusion_type))
        });
        Ok(grouped)
    }
}

/// Fixed post → (author, categories) table
#[derive(Debug, Clone, Default)]
pub struct StaticPostMetadata {
    posts: HashMap<i64, (Option<i64>, Vec<i64>)>,
}

impl StaticPostMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_post(mut self, post_id: i64, author_id: Option<i64>, categories: Vec<i64>) -> Self {
        self.posts.insert(post_id, (author_id, categories));
        self
    }
}

#[async_trait]
impl PostMetadata for StaticPostMetadata {
    async fn get_author(&self, post_id: i64) -> Result<Option<i64>> {
        Ok(self.posts.get(&post_id).and_then(|(author, _)| *author))
    }

    async fn get_categories(&self, post_id: i64) -> Result<Vec<i64>> {
        Ok(self
            .posts
            .get(&post_id)
            .map(|(_, categories)| categories.clone())
            .unwrap_or_default())
    }
}

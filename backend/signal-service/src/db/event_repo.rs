use super::{EventQuery, EventSink, EventStore, CHECKOUT_COMPLETION_TYPES, CHECKOUT_START};
use crate::error::Result;
use crate::models::{AbandonedCheckout, Event, EventTypeCount, NewEvent, PostInteraction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

/// Event log backed by the `signal_events` table
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventSink for PgEventStore {
    async fn append(&self, event: NewEvent) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO signal_events
                (visitor_hash, session_id, event_type, target_id, event_value, weight, meta, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&event.visitor_hash)
        .bind(&event.session_id)
        .bind(&event.event_type)
        .bind(event.target_id)
        .bind(event.event_value)
        .bind(event.weight)
        .bind(&event.meta)
        .bind(event.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("id"))
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn query(&self, query: &EventQuery) -> Result<Vec<Event>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, visitor_hash, session_id, event_type, target_id, event_value, weight, meta, created_at \
             FROM signal_events WHERE TRUE",
        );

        if !query.event_types.is_empty() {
            builder
                .push(" AND event_type = ANY(")
                .push_bind(query.event_types.clone())
                .push(")");
        }
        if let Some(visitor_hash) = &query.visitor_hash {
            builder.push(" AND visitor_hash = ").push_bind(visitor_hash.clone());
        }
        if let Some(session_id) = &query.session_id {
            builder.push(" AND session_id = ").push_bind(session_id.clone());
        }
        if let Some(since) = query.since {
            builder.push(" AND created_at >= ").push_bind(since);
        }
        if let Some(until) = query.until {
            builder.push(" AND created_at <= ").push_bind(until);
        }
        builder.push(" ORDER BY created_at ASC, id ASC");

        let events = builder
            .build_query_as::<Event>()
            .fetch_all(&self.pool)
            .await?;

        Ok(events)
    }

    async fn active_visitors(
        &self,
        since: DateTime<Utc>,
        min_events: usize,
        limit: usize,
    ) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT visitor_hash
            FROM signal_events
            WHERE created_at >= $1
            GROUP BY visitor_hash
            HAVING COUNT(*) >= $2
            ORDER BY COUNT(*) DESC, visitor_hash ASC
            LIMIT $3
            "#,
        )
        .bind(since)
        .bind(min_events as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.get::<String, _>("visitor_hash"))
            .collect())
    }

    async fn post_interactions(
        &self,
        visitor_hash: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PostInteraction>> {
        let interactions = sqlx::query_as::<_, PostInteraction>(
            r#"
            SELECT target_id, SUM(weight)::DOUBLE PRECISION AS total_weight
            FROM signal_events
            WHERE visitor_hash = $1
              AND target_id > 0
              AND created_at >= $2
            GROUP BY target_id
            ORDER BY total_weight DESC, target_id ASC
            LIMIT $3
            "#,
        )
        .bind(visitor_hash)
        .bind(since)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(interactions)
    }

    async fn abandoned_checkouts(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<AbandonedCheckout>> {
        let completion_types: Vec<String> = CHECKOUT_COMPLETION_TYPES
            .iter()
            .map(|t| t.to_string())
            .collect();

        let abandoned = sqlx::query_as::<_, AbandonedCheckout>(
            r#"
            SELECT cs.visitor_hash, cs.target_id, cs.session_id
            FROM signal_events cs
            WHERE cs.event_type = $1
              AND cs.created_at > $2
              AND cs.created_at <= $3
              AND NOT EXISTS (
                  SELECT 1 FROM signal_events cc
                  WHERE cc.visitor_hash = cs.visitor_hash
                    AND cc.session_id = cs.session_id
                    AND cc.event_type = ANY($4)
                    AND cc.created_at >= cs.created_at
              )
            GROUP BY cs.visitor_hash, cs.target_id, cs.session_id
            ORDER BY MIN(cs.created_at) ASC
            LIMIT $5
            "#,
        )
        .bind(CHECKOUT_START)
        .bind(after)
        .bind(until)
        .bind(completion_types)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(abandoned)
    }

    async fn count_events(&self, event_types: &[&str], since: DateTime<Utc>) -> Result<i64> {
        let types: Vec<String> = event_types.iter().map(|t| t.to_string()).collect();

        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM signal_events WHERE event_type = ANY($1) AND created_at >= $2",
        )
        .bind(types)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("count"))
    }

    async fn top_event_types(
        &self,
        since: DateTime<Utc>,
        exclude: &[&str],
        limit: usize,
    ) -> Result<Vec<EventTypeCount>> {
        let excluded: Vec<String> = exclude.iter().map(|t| t.to_string()).collect();

        let top = sqlx::query_as::<_, EventTypeCount>(
            r#"
            SELECT event_type, COUNT(*) AS count
            FROM signal_events
            WHERE created_at >= $1
              AND NOT (event_type = ANY($2))
            GROUP BY event_type
            ORDER BY count DESC, event_type ASC
            LIMIT $3
            "#,
        )
        .bind(since)
        .bind(excluded)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(top)
    }
}

use super::ExclusionRepository;
use crate::error::Result;
use crate::models::{ExclusionRule, ExclusionType, ExclusionTypeCount, NewExclusion};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::warn;

/// Exclusions backed by the `user_exclusions` table
#[derive(Clone)]
pub struct PgExclusionRepository {
    pool: PgPool,
}

impl PgExclusionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExclusionRepository for PgExclusionRepository {
    async fn upsert(&self, exclusion: NewExclusion) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO user_exclusions (visitor_hash, user_id, exclusion_type, target_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (visitor_hash, exclusion_type, target_id)
            DO UPDATE SET created_at = EXCLUDED.created_at, user_id = EXCLUDED.user_id
            RETURNING id
            "#,
        )
        .bind(&exclusion.visitor_hash)
        .bind(exclusion.user_id)
        .bind(exclusion.exclusion_type.as_str())
        .bind(exclusion.target_id)
        .bind(exclusion.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("id"))
    }

    async fn delete_owned(&self, exclusion_id: i64, visitor_hash: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM user_exclusions WHERE id = $1 AND visitor_hash = $2")
            .bind(exclusion_id)
            .bind(visitor_hash)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn list_for_visitor(&self, visitor_hash: &str) -> Result<Vec<ExclusionRule>> {
        let rules = sqlx::query_as::<_, ExclusionRule>(
            r#"
            SELECT id, visitor_hash, user_id, exclusion_type, target_id, created_at
            FROM user_exclusions
            WHERE visitor_hash = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(visitor_hash)
        .fetch_all(&self.pool)
        .await?;

        Ok(rules)
    }

    async fn count_for_visitor(&self, visitor_hash: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM user_exclusions WHERE visitor_hash = $1")
            .bind(visitor_hash)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get::<i64, _>("count"))
    }

    async fn count_by_type(&self) -> Result<Vec<ExclusionTypeCount>> {
        let rows = sqlx::query(
            r#"
            SELECT exclusion_type, COUNT(*) AS count
            FROM user_exclusions
            GROUP BY exclusion_type
            ORDER BY count DESC, exclusion_type ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: String = row.get("exclusion_type");
            match raw.parse::<ExclusionType>() {
                Ok(exclusion_type) => counts.push(ExclusionTypeCount {
                    exclusion_type,
                    count: row.get::<i64, _>("count"),
                }),
                Err(e) => warn!(error = %e, "Skipping exclusion rows with unknown type"),
            }
        }

        Ok(counts)
    }
}

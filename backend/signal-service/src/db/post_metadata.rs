use super::PostMetadata;
use crate::error::Result;
use async_trait::async_trait;
use sqlx::{PgPool, Row};

/// Reads `posts.author_id` and `post_categories` owned by the content system
#[derive(Clone)]
pub struct PgPostMetadata {
    pool: PgPool,
}

impl PgPostMetadata {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostMetadata for PgPostMetadata {
    async fn get_author(&self, post_id: i64) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT author_id FROM posts WHERE id = $1")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .and_then(|r| r.get::<Option<i64>, _>("author_id"))
            .filter(|author_id| *author_id > 0))
    }

    async fn get_categories(&self, post_id: i64) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            r#"
            SELECT category_id
            FROM post_categories
            WHERE post_id = $1
            ORDER BY position ASC, category_id ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.get::<i64, _>("category_id"))
            .collect())
    }
}

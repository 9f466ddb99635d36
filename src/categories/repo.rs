use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::PgStore;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    #[serde(rename = "categoryName")]
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCount {
    pub id: Uuid,
    #[serde(rename = "categoryName")]
    pub name: String,
    pub total_questions: i64,
}

#[async_trait]
pub trait CategoryRepo: Send + Sync {
    /// Return the category called `name`, creating it first if needed.
    async fn upsert_by_name(&self, name: &str) -> anyhow::Result<Category>;

    async fn list(&self) -> anyhow::Result<Vec<Category>>;

    async fn list_with_question_count(&self) -> anyhow::Result<Vec<CategoryCount>>;
}

#[async_trait]
impl CategoryRepo for PgStore {
    async fn upsert_by_name(&self, name: &str) -> anyhow::Result<Category> {
        // DO UPDATE (not DO NOTHING) so RETURNING yields the existing row too.
        let category = sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (id, name)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id, name, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("upsert category {name:?}"))?;
        Ok(category)
    }

    async fn list(&self) -> anyhow::Result<Vec<Category>> {
        let rows = sqlx::query_as::<_, Category>(
            "SELECT id, name, created_at FROM categories ORDER BY created_at, name",
        )
        .fetch_all(&self.pool)
        .await
        .context("list categories")?;
        Ok(rows)
    }

    async fn list_with_question_count(&self) -> anyhow::Result<Vec<CategoryCount>> {
        let rows = sqlx::query_as::<_, CategoryCount>(
            r#"
            SELECT c.id, c.name, COUNT(q.id) AS total_questions
              FROM categories c
              LEFT JOIN questions q ON c.id = ANY(q.category_ids)
             GROUP BY c.id, c.name, c.created_at
             ORDER BY c.created_at, c.name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("count questions per category")?;
        Ok(rows)
    }
}

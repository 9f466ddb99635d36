use anyhow::Context;
use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::categories::repo::Category;
use crate::db::PgStore;
use crate::questions::repo_types::{
    CategoryWithQuestions, NewQuestion, Question, QuestionSummary,
};
use crate::users::repo::escape_like;

/// Rows per INSERT statement; keeps bind parameters well under the Postgres limit.
const INSERT_CHUNK: usize = 1000;

const QUESTION_COLUMNS: &str =
    "id, question_text, options, correct_answer, category_ids, created_at, updated_at";

#[async_trait]
pub trait QuestionRepo: Send + Sync {
    /// Insert all questions or none of them.
    async fn insert_many(&self, questions: Vec<NewQuestion>) -> anyhow::Result<Vec<Question>>;

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Question>>;

    /// Categories whose name contains `name_filter` (case-insensitive; all
    /// categories when `None`), each with the questions linked to it.
    async fn list_by_category_name(
        &self,
        name_filter: Option<&str>,
    ) -> anyhow::Result<Vec<CategoryWithQuestions>>;
}

#[async_trait]
impl QuestionRepo for PgStore {
    async fn insert_many(&self, questions: Vec<NewQuestion>) -> anyhow::Result<Vec<Question>> {
        if questions.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await.context("begin question insert")?;
        let mut inserted = Vec::with_capacity(questions.len());

        for chunk in questions.chunks(INSERT_CHUNK) {
            let mut qb = QueryBuilder::<Postgres>::new(
                "INSERT INTO questions (id, question_text, options, correct_answer, category_ids) ",
            );
            qb.push_values(chunk, |mut row, q| {
                row.push_bind(Uuid::new_v4())
                    .push_bind(q.question_text.clone())
                    .push_bind(q.options.clone())
                    .push_bind(q.correct_answer.clone())
                    .push_bind(q.categories.clone());
            });
            qb.push(format!(" RETURNING {QUESTION_COLUMNS}"));

            let rows = qb
                .build_query_as::<Question>()
                .fetch_all(&mut *tx)
                .await
                .context("batch insert questions")?;
            inserted.extend(rows);
        }

        tx.commit().await.context("commit question insert")?;
        Ok(inserted)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Question>> {
        let q = sqlx::query_as::<_, Question>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("find question by id")?;
        Ok(q)
    }

    async fn list_by_category_name(
        &self,
        name_filter: Option<&str>,
    ) -> anyhow::Result<Vec<CategoryWithQuestions>> {
        let pattern = name_filter.map(|n| format!("%{}%", escape_like(n)));
        let categories = sqlx::query_as::<_, Category>(
            r#"
            SELECT id, name, created_at
              FROM categories
             WHERE $1::text IS NULL OR name ILIKE $1
             ORDER BY created_at, name
            "#,
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .context("match categories")?;

        if categories.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = categories.iter().map(|c| c.id).collect();
        let questions = sqlx::query_as::<_, Question>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE category_ids && $1 ORDER BY created_at"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .context("load questions for categories")?;

        Ok(group_by_category(categories, &questions))
    }
}

/// Attach to every category the questions that reference it.
pub(crate) fn group_by_category(
    categories: Vec<Category>,
    questions: &[Question],
) -> Vec<CategoryWithQuestions> {
    categories
        .into_iter()
        .map(|c| CategoryWithQuestions {
            questions: questions
                .iter()
                .filter(|q| q.categories.contains(&c.id))
                .map(QuestionSummary::from)
                .collect(),
            id: c.id,
            category_name: c.name,
        })
        .collect()
}

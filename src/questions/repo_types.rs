use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: Uuid,
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    #[sqlx(rename = "category_ids")]
    pub categories: Vec<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A question ready to insert; category ids are already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuestion {
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub categories: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSummary {
    pub id: Uuid,
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
}

impl From<&Question> for QuestionSummary {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            question_text: q.question_text.clone(),
            options: q.options.clone(),
            correct_answer: q.correct_answer.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryWithQuestions {
    pub id: Uuid,
    pub category_name: String,
    pub questions: Vec<QuestionSummary>,
}

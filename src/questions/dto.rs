use serde::{Deserialize, Serialize};

use crate::{
    questions::repo_types::{CategoryWithQuestions, Question},
    users::repo_types::AnswerSubmission,
};

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub questions: Vec<Question>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryQuery {
    pub category_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CategoryQuestions {
    pub categories: Vec<CategoryWithQuestions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerRequest {
    #[serde(default)]
    pub question_id: Option<String>,
    #[serde(default)]
    pub selected_answer: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitAnswerResponse {
    pub answer: AnswerSubmission,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub search_query: Option<String>,
    pub timezone: Option<String>,
}

/// One matched answer with its question, time rendered in the requested zone.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerView {
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub selected_answer: String,
    pub submission_time: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub answers: Vec<AnswerView>,
}

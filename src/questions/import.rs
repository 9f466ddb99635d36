//! Two-pass CSV question import.
//!
//! The first pass collects every category name in the file and makes sure
//! each one exists. The second pass reads the file again and builds the
//! questions with category ids taken from that mapping, so no question is
//! ever written with a reference to a missing category.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    categories::repo::CategoryRepo,
    error::AppError,
    questions::{
        repo::QuestionRepo,
        repo_types::{NewQuestion, Question},
    },
};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("No questions found in the CSV file")]
    Empty,
    #[error("Error reading CSV file")]
    Read(#[from] csv::Error),
    #[error("Error while saving questions or categories")]
    Persist(#[source] anyhow::Error),
    #[error("Error reading CSV file")]
    Worker(#[from] tokio::task::JoinError),
}

impl From<ImportError> for AppError {
    fn from(e: ImportError) -> Self {
        match e {
            ImportError::Empty => AppError::bad_request(e.to_string()),
            ImportError::Read(ref cause) => AppError::internal(e.to_string(), cause),
            ImportError::Persist(ref cause) => AppError::internal(e.to_string(), cause),
            ImportError::Worker(ref cause) => AppError::internal(e.to_string(), cause),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "questionText", default)]
    question_text: Option<String>,
    #[serde(rename = "categoryName", default)]
    category_name: Option<String>,
    #[serde(default)]
    options: Option<String>,
    #[serde(rename = "correctAnswer", default)]
    correct_answer: Option<String>,
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn open(path: &Path) -> Result<csv::Reader<std::fs::File>, csv::Error> {
    ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .flexible(true)
        .from_path(path)
}

/// Distinct category names in file order.
fn collect_category_names(path: &Path) -> Result<Vec<String>, csv::Error> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for row in open(path)?.deserialize::<CsvRow>() {
        let row = row?;
        for name in row.category_name.as_deref().map(split_list).into_iter().flatten() {
            if seen.insert(name.to_string()) {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

/// Rows lacking options or a correct answer are skipped.
fn collect_questions(
    path: &Path,
    ids: &HashMap<String, Uuid>,
) -> Result<Vec<NewQuestion>, csv::Error> {
    let mut out = Vec::new();
    for row in open(path)?.deserialize::<CsvRow>() {
        let row = row?;
        let (Some(options), Some(correct_answer)) = (row.options, row.correct_answer) else {
            continue;
        };
        if options.is_empty() || correct_answer.is_empty() {
            continue;
        }

        let mut categories = Vec::new();
        for name in row.category_name.as_deref().map(split_list).into_iter().flatten() {
            if let Some(id) = ids.get(name) {
                if !categories.contains(id) {
                    categories.push(*id);
                }
            }
        }

        out.push(NewQuestion {
            question_text: row.question_text.unwrap_or_default(),
            options: split_list(&options).map(str::to_string).collect(),
            correct_answer,
            categories,
        });
    }
    Ok(out)
}

/// Import the CSV at `path` and return the inserted questions.
pub async fn import_questions(
    categories: &dyn CategoryRepo,
    questions: &dyn QuestionRepo,
    path: &Path,
) -> Result<Vec<Question>, ImportError> {
    let owned: PathBuf = path.to_path_buf();
    let names = tokio::task::spawn_blocking(move || collect_category_names(&owned)).await??;
    debug!(count = names.len(), "categories found in csv");

    let mut ids = HashMap::with_capacity(names.len());
    for name in names {
        let category = categories
            .upsert_by_name(&name)
            .await
            .map_err(ImportError::Persist)?;
        ids.insert(name, category.id);
    }

    let owned: PathBuf = path.to_path_buf();
    let rows = tokio::task::spawn_blocking(move || collect_questions(&owned, &ids)).await??;
    if rows.is_empty() {
        return Err(ImportError::Empty);
    }

    let inserted = questions.insert_many(rows).await.map_err(|e| {
        error!(error = ?e, "question batch insert failed");
        ImportError::Persist(e)
    })?;
    info!(count = inserted.len(), "questions imported");
    Ok(inserted)
}

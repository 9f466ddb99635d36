use axum::extract::State;
use serde::Serialize;
use tracing::instrument;

use crate::{
    categories::repo::{Category, CategoryCount},
    error::{AppError, AppResult},
    response::ApiResponse,
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct CategoryList<T> {
    pub categories: Vec<T>,
}

#[instrument(skip(state))]
pub async fn list_categories(
    State(state): State<AppState>,
) -> AppResult<ApiResponse<CategoryList<Category>>> {
    let categories = state.categories.list().await?;
    if categories.is_empty() {
        return Err(AppError::not_found("No categories found"));
    }
    Ok(ApiResponse::ok(
        CategoryList { categories },
        "Categories fetched successfully",
    ))
}

#[instrument(skip(state))]
pub async fn list_with_question_count(
    State(state): State<AppState>,
) -> AppResult<ApiResponse<CategoryList<CategoryCount>>> {
    let categories = state.categories.list_with_question_count().await?;
    if categories.is_empty() {
        return Err(AppError::not_found("No categories found"));
    }
    Ok(ApiResponse::ok(
        CategoryList { categories },
        "Categories fetched successfully with question count",
    ))
}

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

use crate::{auth::require_auth, state::AppState};

pub mod dto;
pub mod handlers;
pub mod import;
pub mod repo;
pub mod repo_types;

pub fn router(state: AppState) -> Router<AppState> {
    let limit = state.config.upload_limit_bytes;
    Router::new()
        .route(
            "/question/",
            post(handlers::bulk_import).layer(DefaultBodyLimit::max(limit)),
        )
        .route("/question/category", get(handlers::questions_by_category))
        .route("/question/submitAnswer", post(handlers::submit_answer))
        .route("/question/searchWithAnswer", get(handlers::search_with_answer))
        .route_layer(from_fn_with_state(state, require_auth))
}

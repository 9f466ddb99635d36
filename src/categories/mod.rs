use axum::{middleware::from_fn_with_state, routing::get, Router};

use crate::{auth::require_auth, state::AppState};

pub mod handlers;
pub mod repo;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/category/", get(handlers::list_categories))
        .route(
            "/category/withQuestionCount",
            get(handlers::list_with_question_count),
        )
        .route_layer(from_fn_with_state(state, require_auth))
}

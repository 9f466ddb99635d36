use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, patch},
    Router,
};

use crate::{auth::require_auth, state::AppState};

pub mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;

pub fn router(state: AppState) -> Router<AppState> {
    let limit = state.config.upload_limit_bytes;
    Router::new()
        .route("/user/", get(handlers::current_user))
        .route("/user/update-profile", patch(handlers::update_profile))
        .route(
            "/user/update-avatar",
            patch(handlers::update_avatar).layer(DefaultBodyLimit::max(limit)),
        )
        .route_layer(from_fn_with_state(state, require_auth))
}

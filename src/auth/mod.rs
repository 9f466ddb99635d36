use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub mod claims;
pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod services;

pub use extractors::AuthUser;
pub use middleware::require_auth;

pub fn router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/auth/logout", post(handlers::logout))
        .route_layer(from_fn_with_state(state, require_auth));

    Router::new()
        .route("/auth/signup", post(handlers::signup))
        .route("/auth/verify-email", get(handlers::verify_email))
        .route("/auth/signin", post(handlers::signin))
        .route("/auth/refresh-token", post(handlers::refresh_token))
        .merge(protected)
}

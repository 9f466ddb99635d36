use axum::{
    body::{to_bytes, Body},
    extract::{FromRef, Request, State},
    http::header::CONTENT_TYPE,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use tracing::{debug, warn};

use crate::{
    auth::{
        claims::TokenKind,
        extractors::{bearer_token, first_present},
        jwt::JwtKeys,
    },
    error::AppError,
    state::AppState,
    users::repo_types::CurrentUser,
};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Largest JSON body inspected for an `accessToken` field.
const BODY_PEEK_LIMIT: usize = 2 * 1024 * 1024;

/// Resolve the caller from an access token and attach it as `CurrentUser`.
///
/// Looks at the `accessToken` cookie, then an `accessToken` field of a JSON
/// body, then the bearer header. A JSON body is buffered and handed on
/// unchanged.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let from_cookie = jar.get(ACCESS_COOKIE).map(|c| c.value().to_string());
    let from_header = bearer_token(req.headers());

    let (mut req, from_body) = if from_cookie.is_none() && is_json(&req) {
        peek_body_field(req, ACCESS_COOKIE).await?
    } else {
        (req, None)
    };

    let token = first_present([from_cookie, from_body, from_header])
        .ok_or_else(|| AppError::unauthorized("Unauthorized request"))?;

    let claims = JwtKeys::from_ref(&state)
        .verify(&token, TokenKind::Access)
        .map_err(|e| {
            warn!(error = %e, "access token rejected");
            AppError::unauthorized(e.to_string())
        })?;

    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| AppError::unauthorized("Invalid access token"))?;

    debug!(user_id = %user.id, "request authenticated");
    req.extensions_mut().insert(CurrentUser::from(user));
    Ok(next.run(req).await)
}

fn is_json(req: &Request) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false)
}

/// Read the body, pull a string field out of it if it parses as a JSON
/// object, and rebuild the request with the same bytes.
async fn peek_body_field(req: Request, field: &str) -> Result<(Request, Option<String>), AppError> {
    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, BODY_PEEK_LIMIT)
        .await
        .map_err(|_| AppError::bad_request("Request body too large"))?;

    let value = serde_json::from_slice::<serde_json::Value>(&bytes)
        .ok()
        .and_then(|v| v.get(field)?.as_str().map(str::to_string));

    Ok((Request::from_parts(parts, Body::from(bytes)), value))
}

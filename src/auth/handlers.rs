use axum::{
    extract::State,
    http::{header::HOST, HeaderMap, StatusCode},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            RefreshRequest, SessionTokens, SignInRequest, SignInResponse, SignUpRequest,
            SignUpResponse, VerifyEmailQuery,
        },
        extractors::{bearer_token, first_present, AuthUser},
        middleware::{ACCESS_COOKIE, REFRESH_COOKIE},
        services,
    },
    error::AppResult,
    extract::{ApiJson, ApiQuery},
    response::{ApiResponse, Empty},
    state::AppState,
};

fn session_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .path("/")
        .build()
}

/// Expired, empty copy of a session cookie. Sent on logout whether or not the
/// request carried the cookie.
fn cleared_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = session_cookie(name, String::new());
    cookie.make_removal();
    cookie
}

fn with_session(jar: CookieJar, tokens: &SessionTokens) -> CookieJar {
    jar.add(session_cookie(ACCESS_COOKIE, tokens.access_token.clone()))
        .add(session_cookie(REFRESH_COOKIE, tokens.refresh_token.clone()))
}

/// `scheme://host` of the incoming request, honoring a proxy's
/// `X-Forwarded-Proto`.
fn request_origin(headers: &HeaderMap) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("http");
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{scheme}://{host}")
}

#[instrument(skip(state, headers, payload))]
pub async fn signup(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<SignUpRequest>,
) -> AppResult<ApiResponse<SignUpResponse>> {
    let user = services::register(&state, payload, &request_origin(&headers)).await?;
    Ok(ApiResponse::new(
        StatusCode::CREATED,
        SignUpResponse { user },
        "User registered successfully. Please verify your email",
    ))
}

#[instrument(skip(state, query))]
pub async fn verify_email(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<VerifyEmailQuery>,
) -> AppResult<ApiResponse<Empty>> {
    services::verify_email(&state, query.token.as_deref()).await?;
    Ok(ApiResponse::ok(Empty {}, "Email verified successfully"))
}

#[instrument(skip(state, jar, payload))]
pub async fn signin(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(payload): ApiJson<SignInRequest>,
) -> AppResult<(CookieJar, ApiResponse<SignInResponse>)> {
    let (user, tokens) = services::login(&state, payload).await?;
    let jar = with_session(jar, &tokens);
    Ok((
        jar,
        ApiResponse::ok(SignInResponse { user, tokens }, "User logged in successfully"),
    ))
}

/// Refresh token from the cookie, then the JSON body, then the bearer header.
#[instrument(skip_all)]
pub async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    body: Option<Json<RefreshRequest>>,
) -> AppResult<(CookieJar, ApiResponse<SessionTokens>)> {
    let incoming = first_present([
        jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()),
        body.and_then(|Json(b)| b.refresh_token),
        bearer_token(&headers),
    ]);

    let tokens = services::refresh(&state, incoming).await?;
    let jar = with_session(jar, &tokens);
    Ok((jar, ApiResponse::ok(tokens, "Access token refreshed")))
}

#[instrument(skip(state, jar, user))]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    AuthUser(user): AuthUser,
) -> AppResult<(CookieJar, ApiResponse<Empty>)> {
    services::logout(&state, user.id).await?;
    let jar = jar
        .add(cleared_cookie(ACCESS_COOKIE))
        .add(cleared_cookie(REFRESH_COOKIE));
    Ok((jar, ApiResponse::ok(Empty {}, "User logged out")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn origin_defaults_to_http() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("quiz.test:8080"));
        assert_eq!(request_origin(&headers), "http://quiz.test:8080");

        headers.insert("x-forwarded-proto", HeaderValue::from_static("https, http"));
        assert_eq!(request_origin(&headers), "https://quiz.test:8080");
    }

    #[test]
    fn session_cookie_attributes() {
        let c = session_cookie(ACCESS_COOKIE, "tok".into());
        assert_eq!(c.http_only(), Some(true));
        assert_eq!(c.secure(), Some(true));
        assert_eq!(c.same_site(), Some(SameSite::Strict));
        assert_eq!(c.path(), Some("/"));
        assert_eq!(c.max_age(), None);
    }

    #[test]
    fn cleared_cookie_expires_with_same_attributes() {
        let c = cleared_cookie(REFRESH_COOKIE);
        assert_eq!(c.value(), "");
        assert_eq!(c.max_age(), Some(time::Duration::ZERO));
        assert_eq!(c.http_only(), Some(true));
        assert_eq!(c.same_site(), Some(SameSite::Strict));
        assert_eq!(c.path(), Some("/"));
    }
}

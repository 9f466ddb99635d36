//! Account lifecycle: registration, email verification, login, token
//! rotation and logout.

use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        claims::TokenKind,
        dto::{PublicUser, SessionTokens, SignInRequest, SignUpRequest},
        jwt::JwtKeys,
        password::{hash_password, verify_password},
    },
    error::{AppError, AppResult},
    mail::verification_email,
    state::AppState,
    users::repo_types::{AccountStatus, NewUser, User},
};

pub const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Mint an access/refresh pair for `user_id` and store the refresh token on
/// the user, replacing (and so revoking) any previous one.
pub async fn issue_session_pair(state: &AppState, user_id: Uuid) -> AppResult<SessionTokens> {
    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    let tokens = mint_pair(&JwtKeys::from_ref(state), &user)?;
    if !state
        .users
        .set_refresh_token(user.id, &tokens.refresh_token)
        .await?
    {
        return Err(AppError::not_found("User not found"));
    }
    Ok(tokens)
}

fn mint_pair(keys: &JwtKeys, user: &User) -> AppResult<SessionTokens> {
    let access_token = keys
        .sign_access(user)
        .map_err(|e| AppError::internal("Something went wrong while generating tokens", e))?;
    let refresh_token = keys
        .sign_refresh(user.id)
        .map_err(|e| AppError::internal("Something went wrong while generating tokens", e))?;
    Ok(SessionTokens {
        access_token,
        refresh_token,
    })
}

/// Create an unverified account and mail it a verification link rooted at
/// `origin` (scheme + host of the incoming request).
///
/// If the mail cannot be sent the call fails with ServiceUnavailable but the
/// account stays created; registering again then reports a conflict.
pub async fn register(state: &AppState, req: SignUpRequest, origin: &str) -> AppResult<PublicUser> {
    let full_name = req.full_name.trim().to_string();
    let email = normalize_email(&req.email);

    if full_name.is_empty() {
        return Err(AppError::bad_request("Full name is required"));
    }
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::bad_request("Invalid email"));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(AppError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::Conflict("User with this email already exists".into()));
    }

    let password_hash = hash_password(&req.password)
        .map_err(|e| AppError::internal("Could not register user", e))?;

    // The unique index decides races between concurrent sign-ups.
    let user = state
        .users
        .create(NewUser {
            full_name,
            email,
            password_hash,
        })
        .await?
        .ok_or_else(|| AppError::Conflict("User with this email already exists".into()))?;

    let token = JwtKeys::from_ref(state)
        .sign_verification(user.id)
        .map_err(|e| AppError::internal("Could not register user", e))?;
    let link = format!("{origin}/api/v1/auth/verify-email?token={token}");

    if let Err(e) = state
        .mailer
        .send(verification_email(&user.email, &user.full_name, &link))
        .await
    {
        warn!(error = %e, user_id = %user.id, "verification email not delivered");
        return Err(AppError::ServiceUnavailable(
            "Service unavailable: Error sending email!".into(),
        ));
    }

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(PublicUser::from(&user))
}

/// Mark the account behind a verification token as verified. Repeating it is harmless.
pub async fn verify_email(state: &AppState, token: Option<&str>) -> AppResult<()> {
    let token = token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::bad_request("Verification token is required"))?;

    let claims = JwtKeys::from_ref(state)
        .verify(token, TokenKind::Verification)
        .map_err(|e| {
            warn!(error = %e, "verification token rejected");
            AppError::bad_request("Invalid or expired verification token")
        })?;

    if !state.users.mark_verified(claims.sub).await? {
        return Err(AppError::bad_request("Invalid or expired verification token"));
    }

    info!(user_id = %claims.sub, "email verified");
    Ok(())
}

pub async fn login(state: &AppState, req: SignInRequest) -> AppResult<(PublicUser, SessionTokens)> {
    let email = req
        .email
        .as_deref()
        .map(normalize_email)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::bad_request("Email is required"))?;

    let user = state
        .users
        .find_by_email(&email)
        .await?
        .ok_or_else(|| {
            warn!(email = %email, "login unknown email");
            AppError::bad_request("User does not exist")
        })?;

    let ok = verify_password(&req.password, &user.password_hash)
        .map_err(|e| AppError::internal("Could not check credentials", e))?;
    if !ok {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::forbidden("Invalid user credentials"));
    }

    match user.status {
        AccountStatus::Verified => {}
        AccountStatus::Unverified => {
            return Err(AppError::forbidden(
                "Please verify your email before logging in",
            ))
        }
        AccountStatus::Banned => {
            warn!(user_id = %user.id, "banned user tried to log in");
            return Err(AppError::forbidden("Your account is banned"));
        }
    }

    let tokens = issue_session_pair(state, user.id).await?;
    info!(user_id = %user.id, "user logged in");
    Ok((PublicUser::from(&user), tokens))
}

/// Exchange a refresh token for a new pair. The presented token must be the
/// one currently stored for the user; the swap to the new value is a single
/// conditional write, so two concurrent calls with the same token cannot
/// both succeed.
pub async fn refresh(state: &AppState, incoming: Option<String>) -> AppResult<SessionTokens> {
    let incoming = incoming
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::unauthorized("Unauthorized request"))?;

    let keys = JwtKeys::from_ref(state);
    let claims = keys
        .verify(&incoming, TokenKind::Refresh)
        .map_err(|e| AppError::unauthorized(e.to_string()))?;

    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| AppError::unauthorized("Invalid refresh token"))?;

    if user.refresh_token.as_deref() != Some(incoming.as_str()) {
        warn!(user_id = %user.id, "stale refresh token presented");
        return Err(AppError::unauthorized("Refresh token is expired or used"));
    }

    let tokens = mint_pair(&keys, &user)?;
    if !state
        .users
        .swap_refresh_token(user.id, &incoming, &tokens.refresh_token)
        .await?
    {
        warn!(user_id = %user.id, "refresh token rotated concurrently or account not active");
        return Err(AppError::unauthorized("Refresh token is expired or used"));
    }

    info!(user_id = %user.id, "session refreshed");
    Ok(tokens)
}

/// Forget the stored refresh token; every outstanding refresh token of the
/// user stops working.
pub async fn logout(state: &AppState, user_id: Uuid) -> AppResult<()> {
    state.users.clear_refresh_token(user_id).await?;
    info!(user_id = %user_id, "user logged out");
    Ok(())
}

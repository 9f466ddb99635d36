use axum::extract::{Multipart, State};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        services::{is_valid_email, normalize_email},
        AuthUser,
    },
    error::{AppError, AppResult},
    extract::ApiJson,
    response::ApiResponse,
    state::AppState,
    upload::{ext_from_mime, spool_field},
    users::{
        dto::{UpdateProfileRequest, UserEnvelope},
        repo_types::CurrentUser,
    },
};

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn current_user(AuthUser(user): AuthUser) -> ApiResponse<UserEnvelope> {
    ApiResponse::ok(UserEnvelope { user }, "Current user fetched successfully")
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(payload): ApiJson<UpdateProfileRequest>,
) -> AppResult<ApiResponse<UserEnvelope>> {
    let full_name = payload.full_name.as_deref().map(str::trim).unwrap_or_default();
    let email = payload.email.as_deref().map(normalize_email).unwrap_or_default();
    if full_name.is_empty() || email.is_empty() {
        return Err(AppError::bad_request("All fields are required"));
    }
    if !is_valid_email(&email) {
        return Err(AppError::bad_request("Invalid email"));
    }

    if let Some(other) = state.users.find_by_email(&email).await? {
        if other.id != user.id {
            warn!(email = %email, "profile email already in use");
            return Err(AppError::Conflict("User with this email already exists".into()));
        }
    }

    let updated = state
        .users
        .update_profile(user.id, full_name, &email)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    info!("profile updated");
    Ok(ApiResponse::ok(
        UserEnvelope {
            user: CurrentUser::from(updated),
        },
        "Account details updated successfully",
    ))
}

/// Multipart field `avatar`, JPEG or PNG. The file is kept under
/// `<public_dir>/temp` and served statically.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_avatar(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    mut mp: Multipart,
) -> AppResult<ApiResponse<CurrentUser>> {
    let upload = spool_field(&mut mp, "avatar", &state.config.upload_dir)
        .await?
        .filter(|u| u.size > 0)
        .ok_or_else(|| AppError::bad_request("Avatar file is missing"))?;

    let ext = upload
        .content_type
        .as_deref()
        .and_then(ext_from_mime)
        .ok_or_else(|| AppError::bad_request("Avatar must be a JPEG or PNG image"))?;

    let public_temp = state.config.public_dir.join("temp");
    let file_name = upload
        .persist_into(&public_temp, "avatar", ext)
        .map_err(|e| AppError::internal("Error while uploading avatar", e))?;
    let url = format!(
        "{}/temp/{}",
        state.config.public_base_url.trim_end_matches('/'),
        file_name
    );

    let updated = state
        .users
        .update_avatar(user.id, &url)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    info!(avatar = %url, "avatar updated");
    Ok(ApiResponse::ok(
        CurrentUser::from(updated),
        "Avatar image updated successfully",
    ))
}

//! The signed-in user's own account.

use axum::{extract::State, Extension, Json};
use axum_extra::extract::cookie::CookieJar;
use diesel::prelude::*;
use serde::Deserialize;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::password::Passwords,
    error::{get_db_conn, is_unique_violation, ApiError, ApiJson, ApiResult},
    handlers::auth::{issue_session, user_conflict, validate_username, MessageResponse, UserResponse},
    middleware::AuthUser,
    models::User,
    pagination::DataResponse,
    schema::users,
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    #[schema(example = "Ada Lovelace")]
    pub name: Option<String>,
    #[validate(custom(function = "validate_username"))]
    #[schema(example = "ada")]
    pub username: Option<String>,
    #[validate(url(message = "Image URL must be a valid URL"))]
    #[schema(example = "https://cdn.example.com/ada.png")]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(min_length = 8)]
    pub new_password: String,
}

#[derive(AsChangeset)]
#[diesel(table_name = users)]
struct ProfileChanges {
    name: Option<String>,
    username: Option<String>,
    image_url: Option<String>,
    updated_at: chrono::NaiveDateTime,
}

fn load_user(state: &AppState, user_id: uuid::Uuid) -> ApiResult<User> {
    let mut conn = get_db_conn(&state.db_pool)?;
    users::table
        .find(user_id)
        .select(User::as_select())
        .first(&mut conn)
        .optional()
        .map_err(|e| {
            error!(error = %e, "Database error loading user");
            ApiError::db_error()
        })?
        .ok_or_else(|| ApiError::unauthorized("Account no longer exists", "USER_NOT_FOUND"))
}

#[utoipa::path(
    get,
    path = "/api/user/profile",
    tag = "User",
    responses(
        (status = 200, description = "Current user", body = DataResponse<UserResponse>),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<DataResponse<UserResponse>>> {
    let user = load_user(&state, auth.id)?;
    Ok(Json(DataResponse::new(user.into())))
}

#[utoipa::path(
    put,
    path = "/api/user/profile",
    tag = "User",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = DataResponse<UserResponse>),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 409, description = "Username taken", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(payload): ApiJson<UpdateProfileRequest>,
) -> ApiResult<Json<DataResponse<UserResponse>>> {
    payload.validate().map_err(|e| ApiError::validation(&e))?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let changes = ProfileChanges {
        name: payload.name.map(|n| n.trim().to_string()),
        username: payload.username.map(|u| u.trim().to_string()),
        image_url: payload.image_url,
        updated_at: chrono::Utc::now().naive_utc(),
    };

    let user: User = diesel::update(users::table.find(auth.id))
        .set(&changes)
        .returning(User::as_returning())
        .get_result(&mut conn)
        .map_err(|e| {
            if is_unique_violation(&e) {
                user_conflict(&e)
            } else {
                error!(error = %e, user_id = %auth.id, "Failed to update profile");
                ApiError::db_error()
            }
        })?;

    info!(user_id = %user.id, "Profile updated");
    Ok(Json(DataResponse::new(user.into())))
}

/// Changes the password, revokes every other session and hands back a fresh cookie.
#[utoipa::path(
    post,
    path = "/api/user/change-password",
    tag = "User",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = DataResponse<MessageResponse>),
        (status = 400, description = "Validation or policy error", body = ApiError),
        (status = 401, description = "Current password is wrong", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    jar: CookieJar,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> ApiResult<(CookieJar, Json<DataResponse<MessageResponse>>)> {
    payload.validate().map_err(|e| ApiError::validation(&e))?;

    if let Err(e) = state.passwords.check(&payload.new_password) {
        return Err(ApiError::bad_request(e.to_string(), "PASSWORD_POLICY_VIOLATION"));
    }

    let user = load_user(&state, auth.id)?;

    let is_valid = Passwords::verify(&payload.current_password, &user.password_hash)
        .map_err(|e| {
            error!(error = %e, "Password verification error");
            ApiError::internal("Password verification error", "PASSWORD_VERIFY_ERROR")
        })?;
    if !is_valid {
        warn!(user_id = %user.id, "Change password with wrong current password");
        return Err(ApiError::unauthorized(
            "Current password is incorrect",
            "INVALID_CREDENTIALS",
        ));
    }

    let password_hash = state.passwords.hash(&payload.new_password).map_err(|e| {
        error!(error = %e, "Password hashing failed");
        ApiError::internal("Failed to process password", "PASSWORD_HASH_ERROR")
    })?;

    let mut conn = get_db_conn(&state.db_pool)?;
    diesel::update(users::table.find(user.id))
        .set((
            users::password_hash.eq(password_hash),
            users::updated_at.eq(chrono::Utc::now().naive_utc()),
        ))
        .execute(&mut conn)
        .map_err(|e| {
            error!(error = %e, "Failed to update password");
            ApiError::internal("Failed to change password", "PASSWORD_UPDATE_ERROR")
        })?;

    let _ = state
        .cache
        .token_revocation
        .revoke_all_user_tokens(user.id, state.jwt_config.token_expiry as u64)
        .await;

    let (jar, _) = issue_session(&state, jar, &user)?;

    info!(user_id = %user.id, "Password changed");
    Ok((
        jar,
        Json(DataResponse::new(MessageResponse {
            message: "Password changed".to_string(),
        })),
    ))
}

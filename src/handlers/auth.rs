//! Authentication handlers.

use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};
use axum_extra::extract::cookie::CookieJar;
use chrono::{Duration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    auth::{
        cookie::{extract_token, logout_cookie, session_cookie},
        hash_token,
        password::Passwords,
        random_token,
    },
    error::{get_db_conn, is_unique_violation, ApiError, ApiJson, ApiResult},
    models::{NewUser, NewUserRole, User},
    pagination::DataResponse,
    rbac::MEMBER_ROLE,
    schema::{roles, user_roles, users},
    telemetry::{record_auth_attempt, AuthOutcome},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "owner@example.com")]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "Sup3r-secret!", min_length = 8)]
    pub password: String,
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    #[schema(example = "Ada Lovelace")]
    pub name: String,
    #[validate(custom(function = "validate_username"))]
    #[schema(example = "ada")]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "owner@example.com")]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "Sup3r-secret!")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: Uuid,
    #[schema(example = "owner@example.com")]
    pub email: String,
    #[schema(example = "Ada Lovelace")]
    pub name: String,
    #[schema(example = "ada")]
    pub username: Option<String>,
    pub image_url: Option<String>,
    pub created_at: chrono::NaiveDateTime,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            username: user.username,
            image_url: user.image_url,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserResponse,
    /// Same value as the `auth_token` cookie, for clients that send a bearer header.
    #[schema(example = "eyJhbGciOiJFZERTQSIsInR5cCI6IkpXVCJ9...")]
    pub token: String,
    #[schema(example = 3600)]
    pub expires_in: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Logged out")]
    pub message: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "owner@example.com")]
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ForgotPasswordResponse {
    #[schema(example = "If an account exists for this email, a reset link has been sent")]
    pub message: String,
    /// Only returned outside production.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "N3w-secret!", min_length = 8)]
    pub password: String,
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let ok = (3..=32).contains(&username.len())
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(ValidationError::new("username").with_message(
            "Username must be 3-32 letters, digits, underscores or hyphens".into(),
        ))
    }
}

/// Maps a unique violation on `users` to the matching 409.
pub(crate) fn user_conflict(e: &diesel::result::Error) -> (StatusCode, Json<ApiError>) {
    let on_username = matches!(
        e,
        diesel::result::Error::DatabaseError(_, info)
            if info.constraint_name().is_some_and(|c| c.contains("username"))
    );
    if on_username {
        ApiError::conflict("Username is already taken", "USERNAME_TAKEN")
    } else {
        ApiError::conflict("An account with this email already exists", "EMAIL_TAKEN")
    }
}

pub(crate) fn issue_session(
    state: &AppState,
    jar: CookieJar,
    user: &User,
) -> ApiResult<(CookieJar, String)> {
    let token = state.jwt_config.issue(user.id, &user.email).map_err(|e| {
        error!(error = %e, "Token generation failed");
        ApiError::internal("Token generation failed", "TOKEN_GENERATION_ERROR")
    })?;

    let cookie = session_cookie(
        token.clone(),
        state.jwt_config.token_expiry,
        state.widget.cookie_secure,
    );
    Ok((jar.add(cookie), token))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "Authentication",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, session cookie set", body = DataResponse<AuthResponse>),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 409, description = "Email or username taken", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, CookieJar, Json<DataResponse<AuthResponse>>)> {
    payload.validate().map_err(|e| ApiError::validation(&e))?;

    if let Err(e) = state.passwords.check(&payload.password) {
        return Err(ApiError::bad_request(e.to_string(), "PASSWORD_POLICY_VIOLATION"));
    }

    let email = payload.email.trim().to_lowercase();
    let mut conn = get_db_conn(&state.db_pool)?;

    let email_taken: bool = diesel::select(diesel::dsl::exists(
        users::table.filter(users::email.eq(&email)),
    ))
    .get_result(&mut conn)
    .map_err(|e| {
        error!(error = %e, "Database error checking email");
        ApiError::db_error()
    })?;
    if email_taken {
        record_auth_attempt("register", AuthOutcome::EmailTaken);
        return Err(ApiError::conflict(
            "An account with this email already exists",
            "EMAIL_TAKEN",
        ));
    }

    let password_hash = state.passwords.hash(&payload.password).map_err(|e| {
        error!(error = %e, "Password hashing failed");
        ApiError::internal("Failed to process password", "PASSWORD_HASH_ERROR")
    })?;

    let new_user = NewUser {
        email,
        name: payload.name.trim().to_string(),
        username: payload.username.map(|u| u.trim().to_string()),
        password_hash,
    };

    let user: User = conn
        .transaction(|conn| {
            let user: User = diesel::insert_into(users::table)
                .values(&new_user)
                .returning(User::as_returning())
                .get_result(conn)?;

            let member_role: Option<Uuid> = roles::table
                .filter(roles::name.eq(MEMBER_ROLE))
                .select(roles::id)
                .first(conn)
                .optional()?;

            if let Some(role_id) = member_role {
                diesel::insert_into(user_roles::table)
                    .values(&NewUserRole {
                        user_id: user.id,
                        role_id,
                    })
                    .execute(conn)?;
            }

            Ok::<_, diesel::result::Error>(user)
        })
        .map_err(|e| {
            if is_unique_violation(&e) {
                warn!(email = %new_user.email, "Registration conflict");
                record_auth_attempt("register", AuthOutcome::EmailTaken);
                user_conflict(&e)
            } else {
                error!(error = %e, "Failed to register user");
                ApiError::db_error()
            }
        })?;

    let (jar, token) = issue_session(&state, jar, &user)?;

    record_auth_attempt("register", AuthOutcome::Success);
    info!(user_id = %user.id, email = %user.email, "User registered");

    let expires_in = state.jwt_config.token_expiry;
    Ok((
        StatusCode::CREATED,
        jar,
        Json(DataResponse::new(AuthResponse {
            user: user.into(),
            token,
            expires_in,
        })),
    ))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful, session cookie set", body = DataResponse<AuthResponse>),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Invalid credentials", body = ApiError),
        (status = 423, description = "Account locked", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> ApiResult<(CookieJar, Json<DataResponse<AuthResponse>>)> {
    payload.validate().map_err(|e| ApiError::validation(&e))?;

    let email = payload.email.trim().to_lowercase();

    if let Some(remaining) = state.lockout.locked_for(&email).await {
        warn!(email = %email, "Login attempt for locked account");
        record_auth_attempt("login", AuthOutcome::AccountLocked);
        return Err(ApiError::locked(
            format!("Account is locked. Try again in {} seconds", remaining),
            "ACCOUNT_LOCKED",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;

    let user: Option<User> = users::table
        .filter(users::email.eq(&email))
        .select(User::as_select())
        .first(&mut conn)
        .optional()
        .map_err(|e| {
            error!(error = %e, "Database error looking up user");
            ApiError::db_error()
        })?;

    let Some(user) = user else {
        warn!(email = %email, "Login attempt for unknown email");
        record_auth_attempt("login", AuthOutcome::InvalidCredentials);
        let _ = state.lockout.record_failure(&email).await;
        return Err(ApiError::unauthorized("Invalid credentials", "INVALID_CREDENTIALS"));
    };

    let is_valid = Passwords::verify(&payload.password, &user.password_hash)
        .map_err(|e| {
            error!(error = %e, "Password verification error");
            ApiError::internal("Password verification error", "PASSWORD_VERIFY_ERROR")
        })?;

    if !is_valid {
        warn!(user_id = %user.id, "Failed login attempt - invalid password");
        record_auth_attempt("login", AuthOutcome::InvalidCredentials);
        if let Ok(true) = state.lockout.record_failure(&email).await {
            warn!(user_id = %user.id, "Account locked after repeated failures");
        }
        return Err(ApiError::unauthorized("Invalid credentials", "INVALID_CREDENTIALS"));
    }

    let _ = state.lockout.reset(&email).await;

    let (jar, token) = issue_session(&state, jar, &user)?;

    record_auth_attempt("login", AuthOutcome::Success);
    info!(user_id = %user.id, "User logged in");

    let expires_in = state.jwt_config.token_expiry;
    Ok((
        jar,
        Json(DataResponse::new(AuthResponse {
            user: user.into(),
            token,
            expires_in,
        })),
    ))
}

/// Clears the cookie and revokes whatever valid token came with the request.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "Authentication",
    responses(
        (status = 200, description = "Session cleared", body = DataResponse<MessageResponse>)
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> (CookieJar, Json<DataResponse<MessageResponse>>) {
    if let Some(token) = extract_token(&headers) {
        if let Ok(claims) = state.jwt_config.verify(&token) {
            let token_hash = hash_token(&token);
            if let Err(e) = state
                .cache
                .token_revocation
                .revoke_token(&token_hash, claims.remaining_secs())
                .await
            {
                debug!(error = %e, "Token revocation skipped");
            }
            info!(user_id = %claims.sub, "User logged out");
        }
    }

    (
        jar.add(logout_cookie(state.widget.cookie_secure)),
        Json(DataResponse::new(MessageResponse {
            message: "Logged out".to_string(),
        })),
    )
}

#[utoipa::path(
    post,
    path = "/api/auth/forgot-password",
    tag = "Authentication",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset initiated", body = DataResponse<ForgotPasswordResponse>),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 429, description = "Too many requests", body = ApiError)
    )
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ForgotPasswordRequest>,
) -> ApiResult<Json<DataResponse<ForgotPasswordResponse>>> {
    payload.validate().map_err(|e| ApiError::validation(&e))?;

    let generic = "If an account exists for this email, a reset link has been sent".to_string();
    let mut conn = get_db_conn(&state.db_pool)?;

    let user_id: Option<Uuid> = users::table
        .filter(users::email.eq(payload.email.trim().to_lowercase()))
        .select(users::id)
        .first(&mut conn)
        .optional()
        .map_err(|e| {
            error!(error = %e, "Database error looking up user");
            ApiError::db_error()
        })?;

    let Some(user_id) = user_id else {
        return Ok(Json(DataResponse::new(ForgotPasswordResponse {
            message: generic,
            reset_token: None,
        })));
    };

    let token = random_token(32);
    let expires_at = (Utc::now() + Duration::seconds(state.reset_token_expiry_secs)).naive_utc();

    diesel::update(users::table.find(user_id))
        .set((
            users::reset_token_hash.eq(Some(hash_token(&token))),
            users::reset_token_expires_at.eq(Some(expires_at)),
        ))
        .execute(&mut conn)
        .map_err(|e| {
            error!(error = %e, "Failed to store reset token");
            ApiError::internal("Failed to initiate password reset", "RESET_TOKEN_ERROR")
        })?;

    info!(user_id = %user_id, "Password reset requested");
    debug!(user_id = %user_id, reset_token = %token, "Password reset token issued");

    Ok(Json(DataResponse::new(ForgotPasswordResponse {
        message: generic,
        reset_token: (!state.is_production).then_some(token),
    })))
}

#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    tag = "Authentication",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = DataResponse<MessageResponse>),
        (status = 400, description = "Invalid or expired token", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ResetPasswordRequest>,
) -> ApiResult<Json<DataResponse<MessageResponse>>> {
    payload.validate().map_err(|e| ApiError::validation(&e))?;

    if let Err(e) = state.passwords.check(&payload.password) {
        return Err(ApiError::bad_request(e.to_string(), "PASSWORD_POLICY_VIOLATION"));
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let now = Utc::now().naive_utc();

    let user: Option<(Uuid, String)> = users::table
        .filter(users::reset_token_hash.eq(hash_token(&payload.token)))
        .filter(users::reset_token_expires_at.gt(now))
        .select((users::id, users::email))
        .first(&mut conn)
        .optional()
        .map_err(|e| {
            error!(error = %e, "Database error looking up reset token");
            ApiError::db_error()
        })?;

    let Some((user_id, email)) = user else {
        return Err(ApiError::bad_request(
            "Invalid or expired reset token",
            "INVALID_RESET_TOKEN",
        ));
    };

    let password_hash = state.passwords.hash(&payload.password).map_err(|e| {
        error!(error = %e, "Password hashing failed");
        ApiError::internal("Failed to process password", "PASSWORD_HASH_ERROR")
    })?;

    diesel::update(users::table.find(user_id))
        .set((
            users::password_hash.eq(password_hash),
            users::reset_token_hash.eq(None::<String>),
            users::reset_token_expires_at.eq(None::<chrono::NaiveDateTime>),
            users::updated_at.eq(now),
        ))
        .execute(&mut conn)
        .map_err(|e| {
            error!(error = %e, "Failed to update password");
            ApiError::internal("Failed to reset password", "PASSWORD_UPDATE_ERROR")
        })?;

    let _ = state
        .cache
        .token_revocation
        .revoke_all_user_tokens(user_id, state.jwt_config.token_expiry as u64)
        .await;
    let _ = state.lockout.reset(&email).await;

    info!(user_id = %user_id, "Password reset completed");

    Ok(Json(DataResponse::new(MessageResponse {
        message: "Password has been reset".to_string(),
    })))
}

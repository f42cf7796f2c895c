//! Session authentication middleware.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::auth::{cookie::extract_token, hash_token};
use crate::error::ApiError;
use crate::telemetry::{record_auth_attempt, AuthOutcome};
use crate::AppState;

/// The authenticated caller, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub token_hash: String,
    pub expires_at: i64,
}

impl AuthUser {
    pub fn remaining_secs(&self) -> u64 {
        (self.expires_at - chrono::Utc::now().timestamp()).max(1) as u64
    }
}

/// Accepts the `auth_token` cookie or an `Authorization: Bearer` header.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_token(req.headers()).ok_or_else(|| {
        ApiError::unauthorized("Authentication required", "MISSING_CREDENTIALS").into_response()
    })?;

    let claims = state.jwt_config.verify(&token).map_err(|_| {
        record_auth_attempt("verify", AuthOutcome::TokenInvalid);
        ApiError::unauthorized("Invalid or expired token", "INVALID_TOKEN").into_response()
    })?;

    let user_id = claims.user_id().ok_or_else(|| {
        ApiError::unauthorized("Invalid or expired token", "INVALID_TOKEN").into_response()
    })?;

    let token_hash = hash_token(&token);
    let revocation = &state.cache.token_revocation;
    if revocation.is_token_revoked(&token_hash).await
        || revocation.is_user_token_revoked(user_id, claims.iat).await
    {
        record_auth_attempt("verify", AuthOutcome::TokenRevoked);
        return Err(
            ApiError::unauthorized("Token has been revoked", "TOKEN_REVOKED").into_response(),
        );
    }

    req.extensions_mut().insert(AuthUser {
        id: user_id,
        email: claims.email.clone(),
        token_hash,
        expires_at: claims.exp,
    });
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

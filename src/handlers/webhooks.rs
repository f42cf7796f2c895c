//! Webhook subscriptions per project.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::random_token,
    error::{get_db_conn, ApiError, ApiJson, ApiResult},
    events::EventType,
    helpers::owned_project,
    middleware::AuthUser,
    models::{NewWebhook, Webhook},
    pagination::DataResponse,
    schema::webhooks,
    webhooks::{validate_events, validate_url},
    AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWebhookRequest {
    #[schema(example = "https://hooks.example.com/feedback")]
    pub url: String,
    /// Defaults to every event.
    #[schema(example = json!(["feedback.created"]))]
    pub events: Option<Vec<String>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookCreatedResponse {
    pub webhook: Webhook,
    /// Signing secret for `X-Feedloop-Signature`. Only shown once.
    #[schema(example = "whsec_Zk3...")]
    pub secret: String,
}

#[utoipa::path(
    get,
    path = "/api/dashboard/projects/{id}/webhooks",
    tag = "Webhooks",
    params(("id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Webhooks of the project", body = DataResponse<Vec<Webhook>>),
        (status = 404, description = "Project not found", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn list_webhooks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<DataResponse<Vec<Webhook>>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    owned_project(&mut conn, project_id, auth.id)?;

    let hooks: Vec<Webhook> = webhooks::table
        .filter(webhooks::project_id.eq(project_id))
        .order(webhooks::created_at.asc())
        .select(Webhook::as_select())
        .load(&mut conn)
        .map_err(|e| {
            error!(error = %e, "Failed to load webhooks");
            ApiError::db_error()
        })?;

    Ok(Json(DataResponse::new(hooks)))
}

#[utoipa::path(
    post,
    path = "/api/dashboard/projects/{id}/webhooks",
    tag = "Webhooks",
    params(("id" = Uuid, Path, description = "Project ID")),
    request_body = CreateWebhookRequest,
    responses(
        (status = 201, description = "Webhook created", body = DataResponse<WebhookCreatedResponse>),
        (status = 400, description = "Invalid URL or event", body = ApiError),
        (status = 404, description = "Project not found", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn create_webhook(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
    ApiJson(payload): ApiJson<CreateWebhookRequest>,
) -> ApiResult<(StatusCode, Json<DataResponse<WebhookCreatedResponse>>)> {
    let url = validate_url(&payload.url)
        .map_err(|e| ApiError::bad_request(e.to_string(), "INVALID_WEBHOOK_URL"))?;

    let requested = payload.events.unwrap_or_else(|| {
        EventType::ALL
            .iter()
            .map(|e| e.as_str().to_string())
            .collect()
    });
    let events = validate_events(&requested)
        .map_err(|e| ApiError::bad_request(e.to_string(), "INVALID_WEBHOOK_EVENT"))?;

    let mut conn = get_db_conn(&state.db_pool)?;
    owned_project(&mut conn, project_id, auth.id)?;

    let secret = format!("whsec_{}", random_token(24));
    let webhook: Webhook = diesel::insert_into(webhooks::table)
        .values(&NewWebhook {
            project_id,
            url,
            events,
            secret: secret.clone(),
        })
        .returning(Webhook::as_returning())
        .get_result(&mut conn)
        .map_err(|e| {
            error!(error = %e, "Failed to create webhook");
            ApiError::db_error()
        })?;

    info!(project_id = %project_id, webhook_id = %webhook.id, "Created webhook");

    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new(WebhookCreatedResponse { webhook, secret })),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/dashboard/projects/{id}/webhooks/{webhook_id}",
    tag = "Webhooks",
    params(
        ("id" = Uuid, Path, description = "Project ID"),
        ("webhook_id" = Uuid, Path, description = "Webhook ID")
    ),
    responses(
        (status = 204, description = "Webhook deleted"),
        (status = 404, description = "Project or webhook not found", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn delete_webhook(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path((project_id, webhook_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let mut conn = get_db_conn(&state.db_pool)?;
    owned_project(&mut conn, project_id, auth.id)?;

    let deleted = diesel::delete(
        webhooks::table
            .filter(webhooks::id.eq(webhook_id))
            .filter(webhooks::project_id.eq(project_id)),
    )
    .execute(&mut conn)
    .map_err(|e| {
        error!(error = %e, "Failed to delete webhook");
        ApiError::db_error()
    })?;

    if deleted == 0 {
        return Err(ApiError::not_found("Webhook not found", "WEBHOOK_NOT_FOUND"));
    }

    info!(project_id = %project_id, webhook_id = %webhook_id, "Deleted webhook");
    Ok(StatusCode::NO_CONTENT)
}

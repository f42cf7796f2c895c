//! Public endpoints called by the embedded widget and the hosted share page.
//!
//! Browser requests are held to the project's domain whitelist. Server-side
//! callers skip that check by presenting the project's `X-Api-Key`.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::secrets_match,
    error::{get_db_conn, ApiError, ApiJson, ApiResult},
    events::{EventType, OutboxService},
    helpers::project_by_slug,
    models::{Feedback, NewFeedback, Project, ProjectSettings},
    pagination::DataResponse,
    schema::feedback,
    telemetry::{record_domain_rejection, record_feedback_ingested, IngestSource},
    widget::{check_origin, request_origin, select_step, ResolvedStep, WidgetConfig, WidgetTheme},
    AppState,
};

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WidgetProjectQuery {
    /// Project slug.
    pub project: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WidgetStepQuery {
    pub project: String,
    pub rating: i16,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WidgetConfigResponse {
    #[schema(example = "checkout-survey")]
    pub project: String,
    pub theme: WidgetTheme,
    pub logic: Vec<crate::widget::LogicStep>,
    pub show_branding: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PublicPageResponse {
    #[schema(example = "Checkout survey")]
    pub name: String,
    pub slug: String,
    pub config: WidgetConfig,
    pub show_branding: bool,
}

#[derive(Debug, Default, Deserialize, Serialize, Validate, ToSchema)]
pub struct FeedbackMeta {
    #[validate(length(max = 2048))]
    #[schema(example = "https://shop.example.com/checkout")]
    pub url: Option<String>,
    #[validate(length(max = 512))]
    pub user_agent: Option<String>,
    #[validate(length(max = 32))]
    #[schema(example = "mobile")]
    pub device: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SubmitFeedbackRequest {
    #[validate(length(min = 1, max = 64))]
    #[schema(example = "checkout-survey")]
    pub project: String,
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    #[schema(example = 4, minimum = 1, maximum = 5)]
    pub rating: i16,
    #[validate(length(max = 20, message = "At most 20 tags"))]
    #[schema(example = json!(["Fast"]))]
    pub tags: Option<Vec<String>>,
    #[validate(length(max = 5000, message = "Comment is too long"))]
    pub comment: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[validate(nested)]
    pub meta: Option<FeedbackMeta>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitFeedbackResponse {
    pub id: Uuid,
    /// The step the widget should show next for this rating.
    pub step: ResolvedStep,
}

enum Caller {
    Browser,
    Server,
}

/// Api key when one is sent, otherwise the origin whitelist.
fn authorize_caller(headers: &HeaderMap, project: &Project) -> ApiResult<Caller> {
    if let Some(key) = headers.get(API_KEY_HEADER) {
        let presented = key.to_str().unwrap_or_default();
        return if secrets_match(presented, &project.api_key) {
            Ok(Caller::Server)
        } else {
            warn!(project_id = %project.id, "Invalid widget api key");
            Err(ApiError::unauthorized("Invalid api key", "INVALID_API_KEY"))
        };
    }

    let origin = request_origin(headers);
    check_origin(origin.as_deref(), &project.domain_whitelist).map_err(|e| {
        record_domain_rejection();
        warn!(project_id = %project.id, origin = ?origin, "Widget request from disallowed origin");
        ApiError::forbidden(e.to_string(), "DOMAIN_NOT_ALLOWED")
    })?;
    Ok(Caller::Browser)
}

fn clean_tags(tags: Option<Vec<String>>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags.unwrap_or_default() {
        let tag = tag.trim();
        if tag.is_empty() || tag.chars().count() > crate::widget::logic::MAX_TAG_LENGTH {
            continue;
        }
        if !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// `answers` JSON as stored on the feedback row.
pub fn build_answers(tags: Vec<String>, comment: Option<String>, email: Option<String>) -> serde_json::Value {
    serde_json::json!({
        "tags": tags,
        "comment": comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
        "email": email.map(|e| e.trim().to_lowercase()),
    })
}

#[utoipa::path(
    get,
    path = "/api/v1/widget/config",
    tag = "Widget",
    params(WidgetProjectQuery),
    responses(
        (status = 200, description = "Theme and logic for the widget", body = DataResponse<WidgetConfigResponse>),
        (status = 403, description = "Origin not whitelisted", body = ApiError),
        (status = 404, description = "Unknown project", body = ApiError)
    )
)]
pub async fn widget_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WidgetProjectQuery>,
) -> ApiResult<Json<DataResponse<WidgetConfigResponse>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let project = project_by_slug(&mut conn, &query.project)?;
    authorize_caller(&headers, &project)?;

    let config = WidgetConfig::from_value(&project.widget_config);
    let settings = ProjectSettings::from_value(&project.settings);

    Ok(Json(DataResponse::new(WidgetConfigResponse {
        project: project.slug,
        theme: config.theme,
        logic: config.logic,
        show_branding: settings.show_branding,
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/widget/step",
    tag = "Widget",
    params(WidgetStepQuery),
    responses(
        (status = 200, description = "Step for the rating", body = DataResponse<ResolvedStep>),
        (status = 400, description = "Rating out of range", body = ApiError),
        (status = 403, description = "Origin not whitelisted", body = ApiError),
        (status = 404, description = "Unknown project", body = ApiError)
    )
)]
pub async fn widget_step(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WidgetStepQuery>,
) -> ApiResult<Json<DataResponse<ResolvedStep>>> {
    if !(1..=5).contains(&query.rating) {
        return Err(ApiError::bad_request(
            "Rating must be between 1 and 5",
            "INVALID_RATING",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let project = project_by_slug(&mut conn, &query.project)?;
    authorize_caller(&headers, &project)?;

    let config = WidgetConfig::from_value(&project.widget_config);
    Ok(Json(DataResponse::new(select_step(&config.logic, query.rating))))
}

#[utoipa::path(
    post,
    path = "/api/v1/widget/feedback",
    tag = "Widget",
    request_body = SubmitFeedbackRequest,
    params(("X-Api-Key" = Option<String>, Header, description = "Project api key for server-side ingestion")),
    responses(
        (status = 201, description = "Feedback stored", body = DataResponse<SubmitFeedbackResponse>),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Wrong api key", body = ApiError),
        (status = 403, description = "Origin not whitelisted", body = ApiError),
        (status = 404, description = "Unknown project", body = ApiError)
    )
)]
pub async fn submit_feedback(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<SubmitFeedbackRequest>,
) -> ApiResult<(StatusCode, Json<DataResponse<SubmitFeedbackResponse>>)> {
    payload.validate().map_err(|e| ApiError::validation(&e))?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let project = project_by_slug(&mut conn, &payload.project)?;
    let caller = authorize_caller(&headers, &project)?;

    let mut meta = payload.meta.unwrap_or_default();
    if meta.user_agent.is_none() {
        meta.user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|ua| ua.chars().take(512).collect());
    }

    let new_feedback = NewFeedback {
        project_id: project.id,
        rating: payload.rating,
        answers: build_answers(clean_tags(payload.tags), payload.comment, payload.email),
        meta: serde_json::to_value(&meta).unwrap_or_default(),
    };

    let row: Feedback = conn
        .transaction(|conn| {
            let row: Feedback = diesel::insert_into(feedback::table)
                .values(&new_feedback)
                .returning(Feedback::as_returning())
                .get_result(conn)?;

            let data = serde_json::to_value(&row).unwrap_or_default();
            OutboxService::emit(conn, EventType::FeedbackCreated, row.id, project.id, data)?;

            Ok::<_, diesel::result::Error>(row)
        })
        .map_err(|e| {
            error!(error = %e, project_id = %project.id, "Failed to store feedback");
            ApiError::db_error()
        })?;

    let source = match caller {
        Caller::Browser => IngestSource::Widget,
        Caller::Server => IngestSource::ApiKey,
    };
    record_feedback_ingested(source, row.rating);
    info!(project_id = %project.id, feedback_id = %row.id, rating = row.rating, "Feedback received");

    let config = WidgetConfig::from_value(&project.widget_config);
    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new(SubmitFeedbackResponse {
            id: row.id,
            step: select_step(&config.logic, row.rating),
        })),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/widget/p/{slug}",
    tag = "Widget",
    params(("slug" = String, Path, description = "Project slug")),
    responses(
        (status = 200, description = "Data for the hosted feedback page", body = DataResponse<PublicPageResponse>),
        (status = 404, description = "Unknown project", body = ApiError)
    )
)]
pub async fn public_page(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<DataResponse<PublicPageResponse>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let project = project_by_slug(&mut conn, &slug)?;
    let settings = ProjectSettings::from_value(&project.settings);

    Ok(Json(DataResponse::new(PublicPageResponse {
        config: WidgetConfig::from_value(&project.widget_config),
        name: project.name,
        slug: project.slug,
        show_branding: settings.show_branding,
    })))
}

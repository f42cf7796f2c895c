//! Project management handlers for the owner dashboard.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::random_token,
    error::{get_db_conn, is_unique_violation, ApiError, ApiJson, ApiResult},
    helpers::{owned_project, validate_slug},
    middleware::AuthUser,
    models::{NewProject, Project, ProjectSettings},
    pagination::{DataResponse, PaginatedResponse, PaginationParams},
    schema::{feedback, projects},
    widget::{normalize_whitelist, WidgetConfig},
    AppState,
};

pub const MAX_RETENTION_DAYS: i32 = 3650;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    #[schema(example = "Checkout survey")]
    pub name: String,
    #[validate(custom(function = "validate_slug"))]
    #[schema(example = "checkout-survey")]
    pub slug: String,
    #[schema(example = json!(["shop.example.com"]))]
    pub domain_whitelist: Option<Vec<String>>,
    pub widget_config: Option<WidgetConfig>,
    pub settings: Option<ProjectSettings>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProjectRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(custom(function = "validate_slug"))]
    pub slug: Option<String>,
    pub domain_whitelist: Option<Vec<String>>,
    pub settings: Option<ProjectSettings>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectResponse {
    pub id: Uuid,
    #[schema(example = "Checkout survey")]
    pub name: String,
    #[schema(example = "checkout-survey")]
    pub slug: String,
    pub domain_whitelist: Vec<String>,
    pub api_key: String,
    pub widget_config: WidgetConfig,
    pub settings: ProjectSettings,
    #[schema(example = 42)]
    pub feedback_count: i64,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

impl ProjectResponse {
    fn new(project: Project, feedback_count: i64) -> Self {
        Self {
            id: project.id,
            widget_config: WidgetConfig::from_value(&project.widget_config),
            settings: ProjectSettings::from_value(&project.settings),
            name: project.name,
            slug: project.slug,
            domain_whitelist: project.domain_whitelist,
            api_key: project.api_key,
            feedback_count,
            created_at: project.created_at,
            updated_at: project.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiKeyResponse {
    #[schema(example = "fl_3q2kTz...")]
    pub api_key: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ShareResponse {
    #[schema(example = "https://feedloop.example.com/api/v1/widget/p/checkout-survey")]
    pub url: String,
    pub embed_snippet: String,
    /// The share URL as an SVG QR code.
    pub qr_svg: String,
}

#[derive(AsChangeset)]
#[diesel(table_name = projects)]
struct ProjectChanges {
    name: Option<String>,
    slug: Option<String>,
    domain_whitelist: Option<Vec<String>>,
    settings: Option<serde_json::Value>,
    updated_at: chrono::NaiveDateTime,
}

fn new_api_key() -> String {
    format!("fl_{}", random_token(24))
}

fn check_settings(settings: &ProjectSettings) -> ApiResult<()> {
    match settings.retention_days {
        Some(days) if !(1..=MAX_RETENTION_DAYS).contains(&days) => Err(ApiError::bad_request(
            format!("retention_days must be between 1 and {MAX_RETENTION_DAYS}"),
            "INVALID_SETTINGS",
        )),
        _ => Ok(()),
    }
}

fn whitelist_or_400(entries: &[String]) -> ApiResult<Vec<String>> {
    normalize_whitelist(entries).map_err(|e| ApiError::bad_request(e.to_string(), "INVALID_DOMAIN"))
}

fn slug_conflict() -> (StatusCode, Json<ApiError>) {
    ApiError::conflict("A project with this slug already exists", "SLUG_TAKEN")
}

fn feedback_count(conn: &mut PgConnection, project_id: Uuid) -> ApiResult<i64> {
    feedback::table
        .filter(feedback::project_id.eq(project_id))
        .count()
        .get_result(conn)
        .map_err(|e| {
            error!(error = %e, "Failed to count feedback");
            ApiError::db_error()
        })
}

#[utoipa::path(
    post,
    path = "/api/dashboard/projects",
    tag = "Projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created", body = DataResponse<ProjectResponse>),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 409, description = "Slug already taken", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn create_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(payload): ApiJson<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<DataResponse<ProjectResponse>>)> {
    payload.validate().map_err(|e| ApiError::validation(&e))?;

    let domain_whitelist = whitelist_or_400(payload.domain_whitelist.as_deref().unwrap_or_default())?;

    let widget_config = payload.widget_config.unwrap_or_default();
    widget_config
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string(), "INVALID_WIDGET_CONFIG"))?;

    let settings = payload.settings.unwrap_or_default();
    check_settings(&settings)?;

    let new_project = NewProject {
        owner_id: auth.id,
        name: payload.name.trim().to_string(),
        slug: payload.slug,
        domain_whitelist,
        api_key: new_api_key(),
        widget_config: widget_config.to_value(),
        settings: serde_json::to_value(&settings).unwrap_or_default(),
    };

    let mut conn = get_db_conn(&state.db_pool)?;
    let project: Project = diesel::insert_into(projects::table)
        .values(&new_project)
        .returning(Project::as_returning())
        .get_result(&mut conn)
        .map_err(|e| {
            if is_unique_violation(&e) {
                slug_conflict()
            } else {
                error!(error = %e, "Failed to create project");
                ApiError::db_error()
            }
        })?;

    info!(project_id = %project.id, project_slug = %project.slug, owner_id = %auth.id, "Created project");

    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new(ProjectResponse::new(project, 0))),
    ))
}

#[utoipa::path(
    get,
    path = "/api/dashboard/projects",
    tag = "Projects",
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated list of own projects", body = PaginatedResponse<ProjectResponse>),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<ProjectResponse>>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let total_count: i64 = projects::table
        .filter(projects::owner_id.eq(auth.id))
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let (limit, offset) = pagination.limit_offset();

    let rows: Vec<Project> = projects::table
        .filter(projects::owner_id.eq(auth.id))
        .order(projects::created_at.desc())
        .limit(limit)
        .offset(offset)
        .select(Project::as_select())
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let ids: Vec<Uuid> = rows.iter().map(|p| p.id).collect();
    let counts: HashMap<Uuid, i64> = feedback::table
        .filter(feedback::project_id.eq_any(&ids))
        .group_by(feedback::project_id)
        .select((feedback::project_id, diesel::dsl::count(feedback::id)))
        .load::<(Uuid, i64)>(&mut conn)
        .map_err(|_| ApiError::db_error())?
        .into_iter()
        .collect();

    let data = rows
        .into_iter()
        .map(|p| {
            let count = counts.get(&p.id).copied().unwrap_or(0);
            ProjectResponse::new(p, count)
        })
        .collect();

    Ok(Json(PaginatedResponse::from_params(data, &pagination, total_count)))
}

#[utoipa::path(
    get,
    path = "/api/dashboard/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project", body = DataResponse<ProjectResponse>),
        (status = 404, description = "Project not found", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn get_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<DataResponse<ProjectResponse>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let project = owned_project(&mut conn, project_id, auth.id)?;
    let count = feedback_count(&mut conn, project.id)?;
    Ok(Json(DataResponse::new(ProjectResponse::new(project, count))))
}

#[utoipa::path(
    put,
    path = "/api/dashboard/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project ID")),
    request_body = UpdateProjectRequest,
    responses(
        (status = 200, description = "Project updated", body = DataResponse<ProjectResponse>),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 404, description = "Project not found", body = ApiError),
        (status = 409, description = "Slug already taken", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn update_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
    ApiJson(payload): ApiJson<UpdateProjectRequest>,
) -> ApiResult<Json<DataResponse<ProjectResponse>>> {
    payload.validate().map_err(|e| ApiError::validation(&e))?;

    let domain_whitelist = payload
        .domain_whitelist
        .as_deref()
        .map(whitelist_or_400)
        .transpose()?;

    if let Some(settings) = &payload.settings {
        check_settings(settings)?;
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    owned_project(&mut conn, project_id, auth.id)?;

    let changes = ProjectChanges {
        name: payload.name.map(|n| n.trim().to_string()),
        slug: payload.slug,
        domain_whitelist,
        settings: payload
            .settings
            .map(|s| serde_json::to_value(s).unwrap_or_default()),
        updated_at: chrono::Utc::now().naive_utc(),
    };

    let project: Project = diesel::update(projects::table.find(project_id))
        .set(&changes)
        .returning(Project::as_returning())
        .get_result(&mut conn)
        .map_err(|e| {
            if is_unique_violation(&e) {
                slug_conflict()
            } else {
                error!(error = %e, project_id = %project_id, "Failed to update project");
                ApiError::db_error()
            }
        })?;

    let count = feedback_count(&mut conn, project.id)?;
    info!(project_id = %project.id, "Updated project");
    Ok(Json(DataResponse::new(ProjectResponse::new(project, count))))
}

#[utoipa::path(
    delete,
    path = "/api/dashboard/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 204, description = "Project and its feedback deleted"),
        (status = 404, description = "Project not found", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn delete_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mut conn = get_db_conn(&state.db_pool)?;
    owned_project(&mut conn, project_id, auth.id)?;

    diesel::delete(projects::table.find(project_id))
        .execute(&mut conn)
        .map_err(|e| {
            error!(error = %e, project_id = %project_id, "Failed to delete project");
            ApiError::db_error()
        })?;

    info!(project_id = %project_id, owner_id = %auth.id, "Deleted project");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/api/dashboard/projects/{id}/widget",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project ID")),
    request_body = WidgetConfig,
    responses(
        (status = 200, description = "Widget config replaced", body = DataResponse<WidgetConfig>),
        (status = 400, description = "Invalid widget config", body = ApiError),
        (status = 404, description = "Project not found", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn update_widget(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
    Json(config): Json<WidgetConfig>,
) -> ApiResult<Json<DataResponse<WidgetConfig>>> {
    config
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string(), "INVALID_WIDGET_CONFIG"))?;

    let mut conn = get_db_conn(&state.db_pool)?;
    owned_project(&mut conn, project_id, auth.id)?;

    diesel::update(projects::table.find(project_id))
        .set((
            projects::widget_config.eq(config.to_value()),
            projects::updated_at.eq(chrono::Utc::now().naive_utc()),
        ))
        .execute(&mut conn)
        .map_err(|e| {
            error!(error = %e, project_id = %project_id, "Failed to save widget config");
            ApiError::db_error()
        })?;

    info!(project_id = %project_id, steps = config.logic.len(), "Widget config saved");
    Ok(Json(DataResponse::new(config)))
}

#[utoipa::path(
    post,
    path = "/api/dashboard/projects/{id}/api-key",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "New api key; the old one stops working", body = DataResponse<ApiKeyResponse>),
        (status = 404, description = "Project not found", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn rotate_api_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<DataResponse<ApiKeyResponse>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    owned_project(&mut conn, project_id, auth.id)?;

    let api_key = new_api_key();
    diesel::update(projects::table.find(project_id))
        .set((
            projects::api_key.eq(&api_key),
            projects::updated_at.eq(chrono::Utc::now().naive_utc()),
        ))
        .execute(&mut conn)
        .map_err(|e| {
            error!(error = %e, project_id = %project_id, "Failed to rotate api key");
            ApiError::db_error()
        })?;

    info!(project_id = %project_id, "Rotated api key");
    Ok(Json(DataResponse::new(ApiKeyResponse { api_key })))
}

#[utoipa::path(
    get,
    path = "/api/dashboard/projects/{id}/share",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Public link, embed snippet and QR code", body = DataResponse<ShareResponse>),
        (status = 404, description = "Project not found", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn share_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<DataResponse<ShareResponse>>> {
    use qrcode::render::svg;
    use qrcode::QrCode;

    let mut conn = get_db_conn(&state.db_pool)?;
    let project = owned_project(&mut conn, project_id, auth.id)?;

    let url = state.widget.share_url(&project.slug);
    let embed_snippet = embed_snippet(&state.widget.public_base_url, &project.slug);

    let code = QrCode::new(url.as_bytes()).map_err(|e| {
        error!(error = %e, "QR code generation failed");
        ApiError::internal("QR code generation failed", "QR_ERROR")
    })?;
    let qr_svg = code
        .render::<svg::Color>()
        .min_dimensions(200, 200)
        .max_dimensions(300, 300)
        .dark_color(svg::Color("#111827"))
        .light_color(svg::Color("#ffffff"))
        .build();

    Ok(Json(DataResponse::new(ShareResponse {
        url,
        embed_snippet,
        qr_svg,
    })))
}

pub fn embed_snippet(public_base_url: &str, slug: &str) -> String {
    format!(
        r#"<script src="{}/widget.js" data-project="{}" async></script>"#,
        public_base_url.trim_end_matches('/'),
        slug
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embed_snippet() {
        assert_eq!(
            embed_snippet("https://fb.example.com/", "shop"),
            r#"<script src="https://fb.example.com/widget.js" data-project="shop" async></script>"#
        );
    }

    #[test]
    fn test_api_keys_are_prefixed_and_unique() {
        let a = new_api_key();
        assert!(a.starts_with("fl_"));
        assert_ne!(a, new_api_key());
    }

    #[test]
    fn test_retention_bounds() {
        let ok = ProjectSettings {
            retention_days: Some(90),
            ..Default::default()
        };
        assert!(check_settings(&ok).is_ok());

        let zero = ProjectSettings {
            retention_days: Some(0),
            ..Default::default()
        };
        assert_eq!(check_settings(&zero).unwrap_err().0, StatusCode::BAD_REQUEST);
        assert!(check_settings(&ProjectSettings::default()).is_ok());
    }
}

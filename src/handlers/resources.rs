//! Resource catalog that permission slugs are scoped to.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use diesel::prelude::*;
use serde::Deserialize;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{get_db_conn, is_unique_violation, ApiError, ApiJson, ApiResult},
    middleware::AuthUser,
    models::{NewResource, Resource},
    pagination::{DataResponse, PaginatedResponse, PaginationParams},
    rbac::{self, is_valid_resource_identifier},
    schema::{permissions, resources},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateResourceRequest {
    #[schema(example = "exports")]
    pub identifier: String,
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    #[schema(example = "Exports")]
    pub name: String,
    pub description: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/admin/resources",
    tag = "Admin",
    params(PaginationParams),
    responses(
        (status = 200, description = "Resources", body = PaginatedResponse<Resource>),
        (status = 403, description = "Missing resources.read", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn list_resources(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<Resource>>> {
    rbac::require(&state, auth.id, "resources.read").await?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let total_count: i64 = resources::table
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let (limit, offset) = pagination.limit_offset();
    let data: Vec<Resource> = resources::table
        .order(resources::identifier.asc())
        .limit(limit)
        .offset(offset)
        .select(Resource::as_select())
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    Ok(Json(PaginatedResponse::from_params(data, &pagination, total_count)))
}

#[utoipa::path(
    post,
    path = "/api/admin/resources",
    tag = "Admin",
    request_body = CreateResourceRequest,
    responses(
        (status = 201, description = "Resource created", body = DataResponse<Resource>),
        (status = 400, description = "Invalid identifier", body = ApiError),
        (status = 403, description = "Missing resources.write", body = ApiError),
        (status = 409, description = "Identifier taken", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn create_resource(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(payload): ApiJson<CreateResourceRequest>,
) -> ApiResult<(StatusCode, Json<DataResponse<Resource>>)> {
    rbac::require(&state, auth.id, "resources.write").await?;
    payload.validate().map_err(|e| ApiError::validation(&e))?;

    let identifier = payload.identifier.trim();
    if !is_valid_resource_identifier(identifier) {
        return Err(ApiError::bad_request(
            "Identifier may only contain lowercase letters, digits, '_' and '-'",
            "INVALID_RESOURCE_IDENTIFIER",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let resource: Resource = diesel::insert_into(resources::table)
        .values(&NewResource {
            identifier: identifier.to_string(),
            name: payload.name.trim().to_string(),
            description: payload.description,
        })
        .returning(Resource::as_returning())
        .get_result(&mut conn)
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::conflict("Resource already exists", "RESOURCE_EXISTS")
            } else {
                error!(error = %e, "Failed to create resource");
                ApiError::db_error()
            }
        })?;

    info!(resource_id = %resource.id, identifier = %resource.identifier, admin_id = %auth.id, "Created resource");
    Ok((StatusCode::CREATED, Json(DataResponse::new(resource))))
}

#[utoipa::path(
    delete,
    path = "/api/admin/resources/{id}",
    tag = "Admin",
    params(("id" = Uuid, Path, description = "Resource ID")),
    responses(
        (status = 204, description = "Resource deleted"),
        (status = 403, description = "Missing resources.write", body = ApiError),
        (status = 404, description = "Resource not found", body = ApiError),
        (status = 409, description = "Resource still referenced by a permission", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn delete_resource(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(resource_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    rbac::require(&state, auth.id, "resources.write").await?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let identifier: String = resources::table
        .find(resource_id)
        .select(resources::identifier)
        .first(&mut conn)
        .optional()
        .map_err(|_| ApiError::db_error())?
        .ok_or_else(|| ApiError::not_found("Resource not found", "RESOURCE_NOT_FOUND"))?;

    let referenced: i64 = permissions::table
        .filter(permissions::resource.eq(&identifier))
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    if referenced > 0 {
        return Err((
            StatusCode::CONFLICT,
            Json(
                ApiError::new(
                    format!("Resource is referenced by {referenced} permission(s)"),
                    "RESOURCE_IN_USE",
                )
                .with_details(serde_json::json!({ "permissions": referenced })),
            ),
        ));
    }

    diesel::delete(resources::table.find(resource_id))
        .execute(&mut conn)
        .map_err(|e| {
            error!(error = %e, resource_id = %resource_id, "Failed to delete resource");
            ApiError::db_error()
        })?;

    info!(resource_id = %resource_id, identifier = %identifier, admin_id = %auth.id, "Deleted resource");
    Ok(StatusCode::NO_CONTENT)
}

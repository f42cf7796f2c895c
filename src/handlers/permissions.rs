//! Permission catalog handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use diesel::prelude::*;
use serde::Deserialize;
use tracing::{error, info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    error::{get_db_conn, is_unique_violation, ApiError, ApiJson, ApiResult},
    middleware::AuthUser,
    models::{NewPermission, Permission},
    pagination::{DataResponse, PaginatedResponse, PaginationParams, DEFAULT_PER_PAGE},
    rbac::{self, parse_slug, WILDCARD},
    schema::{permissions, resources},
    AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PermissionListQuery {
    /// Only permissions of this resource identifier.
    pub resource: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePermissionRequest {
    /// `resource.action`; the resource must exist in the catalog.
    #[schema(example = "feedback.export")]
    pub slug: String,
    #[schema(example = "Export feedback as CSV")]
    pub description: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/admin/permissions",
    tag = "Admin",
    params(PermissionListQuery),
    responses(
        (status = 200, description = "Permissions", body = PaginatedResponse<Permission>),
        (status = 403, description = "Missing permissions.read", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn list_permissions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<PermissionListQuery>,
) -> ApiResult<Json<PaginatedResponse<Permission>>> {
    rbac::require(&state, auth.id, "permissions.read").await?;

    let pagination = PaginationParams::new(
        query.page.unwrap_or(1),
        query.per_page.unwrap_or(DEFAULT_PER_PAGE),
    );
    let mut conn = get_db_conn(&state.db_pool)?;

    let filtered = || {
        let mut q = permissions::table.into_boxed();
        if let Some(resource) = &query.resource {
            q = q.filter(permissions::resource.eq(resource.clone()));
        }
        q
    };

    let total_count: i64 = filtered()
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let (limit, offset) = pagination.limit_offset();
    let data: Vec<Permission> = filtered()
        .order(permissions::slug.asc())
        .limit(limit)
        .offset(offset)
        .select(Permission::as_select())
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    Ok(Json(PaginatedResponse::from_params(data, &pagination, total_count)))
}

#[utoipa::path(
    post,
    path = "/api/admin/permissions",
    tag = "Admin",
    request_body = CreatePermissionRequest,
    responses(
        (status = 201, description = "Permission created", body = DataResponse<Permission>),
        (status = 400, description = "Malformed slug or unknown resource", body = ApiError),
        (status = 403, description = "Missing permissions.write", body = ApiError),
        (status = 409, description = "Permission already exists", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn create_permission(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(payload): ApiJson<CreatePermissionRequest>,
) -> ApiResult<(StatusCode, Json<DataResponse<Permission>>)> {
    rbac::require(&state, auth.id, "permissions.write").await?;

    let slug = payload.slug.trim();
    let (resource, _) = parse_slug(slug).ok_or_else(|| {
        ApiError::bad_request(
            "Permission slug must look like resource.action",
            "INVALID_PERMISSION_SLUG",
        )
    })?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let resource_exists: bool = diesel::select(diesel::dsl::exists(
        resources::table.filter(resources::identifier.eq(resource)),
    ))
    .get_result(&mut conn)
    .map_err(|_| ApiError::db_error())?;

    if !resource_exists {
        return Err(ApiError::bad_request(
            format!("Unknown resource: {resource}"),
            "UNKNOWN_RESOURCE",
        ));
    }

    let permission: Permission = diesel::insert_into(permissions::table)
        .values(&NewPermission {
            slug: slug.to_string(),
            description: payload.description,
            resource: Some(resource.to_string()),
        })
        .returning(Permission::as_returning())
        .get_result(&mut conn)
        .map_err(|e| {
            if is_unique_violation(&e) {
                warn!(slug = %slug, "Permission already exists");
                ApiError::conflict("Permission already exists", "PERMISSION_EXISTS")
            } else {
                error!(error = %e, "Failed to create permission");
                ApiError::db_error()
            }
        })?;

    info!(permission_id = %permission.id, slug = %permission.slug, admin_id = %auth.id, "Created permission");
    Ok((StatusCode::CREATED, Json(DataResponse::new(permission))))
}

#[utoipa::path(
    delete,
    path = "/api/admin/permissions/{id}",
    tag = "Admin",
    params(("id" = Uuid, Path, description = "Permission ID")),
    responses(
        (status = 204, description = "Permission deleted and removed from every role"),
        (status = 403, description = "Missing permissions.write or wildcard permission", body = ApiError),
        (status = 404, description = "Permission not found", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn delete_permission(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(permission_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    rbac::require(&state, auth.id, "permissions.write").await?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let slug: String = permissions::table
        .find(permission_id)
        .select(permissions::slug)
        .first(&mut conn)
        .optional()
        .map_err(|_| ApiError::db_error())?
        .ok_or_else(|| ApiError::not_found("Permission not found", "PERMISSION_NOT_FOUND"))?;

    if slug == WILDCARD {
        return Err(ApiError::forbidden(
            "The wildcard permission cannot be deleted",
            "SYSTEM_PERMISSION_IMMUTABLE",
        ));
    }

    diesel::delete(permissions::table.find(permission_id))
        .execute(&mut conn)
        .map_err(|e| {
            error!(error = %e, permission_id = %permission_id, "Failed to delete permission");
            ApiError::db_error()
        })?;

    rbac::invalidate_all(&state).await;
    info!(permission_id = %permission_id, slug = %slug, admin_id = %auth.id, "Deleted permission");

    Ok(StatusCode::NO_CONTENT)
}

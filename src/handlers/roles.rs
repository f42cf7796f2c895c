//! Role management for the admin backoffice.

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
    error::{get_db_conn, is_unique_violation, ApiError, ApiJson, ApiResult},
    middleware::AuthUser,
    models::{NewRole, NewRolePermission, Permission, Role},
    pagination::{DataResponse, PaginatedResponse, PaginationParams},
    rbac,
    schema::{permissions, role_permissions, roles},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateRoleRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    #[schema(example = "support")]
    pub name: String,
    #[schema(example = "Triage incoming feedback")]
    pub description: Option<String>,
    #[serde(default)]
    pub permission_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateRoleRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    /// Replaces the role's permission set when present.
    pub permission_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleResponse {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<Permission>,
}

#[derive(AsChangeset)]
#[diesel(table_name = roles)]
struct RoleChanges {
    name: Option<String>,
    description: Option<String>,
    updated_at: chrono::NaiveDateTime,
}

fn role_permissions_of(
    conn: &mut PgConnection,
    role_ids: &[Uuid],
) -> QueryResult<HashMap<Uuid, Vec<Permission>>> {
    let rows: Vec<(Uuid, Permission)> = role_permissions::table
        .inner_join(permissions::table)
        .filter(role_permissions::role_id.eq_any(role_ids))
        .order(permissions::slug.asc())
        .select((role_permissions::role_id, Permission::as_select()))
        .load(conn)?;

    let mut by_role: HashMap<Uuid, Vec<Permission>> = HashMap::new();
    for (role_id, permission) in rows {
        by_role.entry(role_id).or_default().push(permission);
    }
    Ok(by_role)
}

fn with_permissions(conn: &mut PgConnection, role: Role) -> ApiResult<RoleResponse> {
    let mut by_role = role_permissions_of(conn, &[role.id]).map_err(|e| {
        error!(error = %e, role_id = %role.id, "Failed to load role permissions");
        ApiError::db_error()
    })?;
    Ok(RoleResponse {
        permissions: by_role.remove(&role.id).unwrap_or_default(),
        role,
    })
}

fn find_role(conn: &mut PgConnection, role_id: Uuid) -> ApiResult<Role> {
    roles::table
        .find(role_id)
        .select(Role::as_select())
        .first(conn)
        .optional()
        .map_err(|_| ApiError::db_error())?
        .ok_or_else(|| ApiError::not_found("Role not found", "ROLE_NOT_FOUND"))
}

/// Deduplicates and checks that every id names an existing permission.
fn known_permissions(conn: &mut PgConnection, mut ids: Vec<Uuid>) -> ApiResult<Vec<Uuid>> {
    ids.sort();
    ids.dedup();
    if ids.is_empty() {
        return Ok(ids);
    }

    let found: i64 = permissions::table
        .filter(permissions::id.eq_any(&ids))
        .count()
        .get_result(conn)
        .map_err(|_| ApiError::db_error())?;

    if found as usize != ids.len() {
        return Err(ApiError::bad_request(
            "Unknown permission id",
            "UNKNOWN_PERMISSION",
        ));
    }
    Ok(ids)
}

fn replace_permissions(
    conn: &mut PgConnection,
    role_id: Uuid,
    permission_ids: &[Uuid],
) -> QueryResult<()> {
    diesel::delete(role_permissions::table.filter(role_permissions::role_id.eq(role_id)))
        .execute(conn)?;
    if permission_ids.is_empty() {
        return Ok(());
    }
    let rows: Vec<NewRolePermission> = permission_ids
        .iter()
        .map(|permission_id| NewRolePermission {
            role_id,
            permission_id: *permission_id,
        })
        .collect();
    diesel::insert_into(role_permissions::table)
        .values(&rows)
        .execute(conn)?;
    Ok(())
}

fn reject_system(role: &Role) -> ApiResult<()> {
    if role.is_system {
        return Err(ApiError::forbidden(
            "System roles cannot be modified",
            "SYSTEM_ROLE_IMMUTABLE",
        ));
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/admin/roles",
    tag = "Admin",
    params(PaginationParams),
    responses(
        (status = 200, description = "Roles with their permissions", body = PaginatedResponse<RoleResponse>),
        (status = 403, description = "Missing roles.read", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn list_roles(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<RoleResponse>>> {
    rbac::require(&state, auth.id, "roles.read").await?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let total_count: i64 = roles::table
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let (limit, offset) = pagination.limit_offset();
    let page: Vec<Role> = roles::table
        .order(roles::name.asc())
        .limit(limit)
        .offset(offset)
        .select(Role::as_select())
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let ids: Vec<Uuid> = page.iter().map(|r| r.id).collect();
    let mut by_role = role_permissions_of(&mut conn, &ids).map_err(|_| ApiError::db_error())?;

    let data = page
        .into_iter()
        .map(|role| RoleResponse {
            permissions: by_role.remove(&role.id).unwrap_or_default(),
            role,
        })
        .collect();

    Ok(Json(PaginatedResponse::from_params(data, &pagination, total_count)))
}

#[utoipa::path(
    post,
    path = "/api/admin/roles",
    tag = "Admin",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Role created", body = DataResponse<RoleResponse>),
        (status = 400, description = "Validation error or unknown permission", body = ApiError),
        (status = 403, description = "Missing roles.write", body = ApiError),
        (status = 409, description = "Role name taken", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(payload): ApiJson<CreateRoleRequest>,
) -> ApiResult<(StatusCode, Json<DataResponse<RoleResponse>>)> {
    rbac::require(&state, auth.id, "roles.write").await?;
    payload.validate().map_err(|e| ApiError::validation(&e))?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let permission_ids = known_permissions(&mut conn, payload.permission_ids)?;

    let new_role = NewRole {
        name: payload.name.trim().to_string(),
        description: payload.description,
    };

    let role = conn
        .transaction(|conn| {
            let role: Role = diesel::insert_into(roles::table)
                .values(&new_role)
                .returning(Role::as_returning())
                .get_result(conn)?;
            replace_permissions(conn, role.id, &permission_ids)?;
            Ok::<_, diesel::result::Error>(role)
        })
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::conflict("Role already exists", "ROLE_EXISTS")
            } else {
                error!(error = %e, "Failed to create role");
                ApiError::db_error()
            }
        })?;

    info!(role_id = %role.id, role_name = %role.name, admin_id = %auth.id, "Created role");

    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new(with_permissions(&mut conn, role)?)),
    ))
}

#[utoipa::path(
    get,
    path = "/api/admin/roles/{id}",
    tag = "Admin",
    params(("id" = Uuid, Path, description = "Role ID")),
    responses(
        (status = 200, description = "Role", body = DataResponse<RoleResponse>),
        (status = 403, description = "Missing roles.read", body = ApiError),
        (status = 404, description = "Role not found", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn get_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(role_id): Path<Uuid>,
) -> ApiResult<Json<DataResponse<RoleResponse>>> {
    rbac::require(&state, auth.id, "roles.read").await?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let role = find_role(&mut conn, role_id)?;
    Ok(Json(DataResponse::new(with_permissions(&mut conn, role)?)))
}

#[utoipa::path(
    put,
    path = "/api/admin/roles/{id}",
    tag = "Admin",
    params(("id" = Uuid, Path, description = "Role ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = DataResponse<RoleResponse>),
        (status = 400, description = "Validation error or unknown permission", body = ApiError),
        (status = 403, description = "Missing roles.write or system role", body = ApiError),
        (status = 404, description = "Role not found", body = ApiError),
        (status = 409, description = "Role name taken", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(role_id): Path<Uuid>,
    ApiJson(payload): ApiJson<UpdateRoleRequest>,
) -> ApiResult<Json<DataResponse<RoleResponse>>> {
    rbac::require(&state, auth.id, "roles.write").await?;
    payload.validate().map_err(|e| ApiError::validation(&e))?;

    let mut conn = get_db_conn(&state.db_pool)?;
    reject_system(&find_role(&mut conn, role_id)?)?;

    let permission_ids = match payload.permission_ids {
        Some(ids) => Some(known_permissions(&mut conn, ids)?),
        None => None,
    };

    let changes = RoleChanges {
        name: payload.name.map(|n| n.trim().to_string()),
        description: payload.description,
        updated_at: chrono::Utc::now().naive_utc(),
    };

    let role = conn
        .transaction(|conn| {
            let role: Role = diesel::update(roles::table.find(role_id))
                .set(&changes)
                .returning(Role::as_returning())
                .get_result(conn)?;
            if let Some(ids) = &permission_ids {
                replace_permissions(conn, role_id, ids)?;
            }
            Ok::<_, diesel::result::Error>(role)
        })
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::conflict("Role already exists", "ROLE_EXISTS")
            } else {
                error!(error = %e, role_id = %role_id, "Failed to update role");
                ApiError::db_error()
            }
        })?;

    rbac::invalidate_all(&state).await;
    info!(role_id = %role_id, admin_id = %auth.id, "Updated role");

    Ok(Json(DataResponse::new(with_permissions(&mut conn, role)?)))
}

#[utoipa::path(
    delete,
    path = "/api/admin/roles/{id}",
    tag = "Admin",
    params(("id" = Uuid, Path, description = "Role ID")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 403, description = "Missing roles.write or system role", body = ApiError),
        (status = 404, description = "Role not found", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn delete_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(role_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    rbac::require(&state, auth.id, "roles.write").await?;

    let mut conn = get_db_conn(&state.db_pool)?;
    reject_system(&find_role(&mut conn, role_id)?)?;

    diesel::delete(roles::table.find(role_id))
        .execute(&mut conn)
        .map_err(|e| {
            error!(error = %e, role_id = %role_id, "Failed to delete role");
            ApiError::db_error()
        })?;

    rbac::invalidate_all(&state).await;
    info!(role_id = %role_id, admin_id = %auth.id, "Deleted role");

    Ok(StatusCode::NO_CONTENT)
}

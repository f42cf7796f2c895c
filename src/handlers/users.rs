//! Admin user management.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{get_db_conn, is_unique_violation, ApiError, ApiJson, ApiResult},
    handlers::auth::{user_conflict, validate_username, UserResponse},
    middleware::AuthUser,
    models::{NewUserRole, User},
    pagination::{DataResponse, PaginatedResponse, PaginationParams, DEFAULT_PER_PAGE},
    rbac,
    schema::{roles, user_roles, users},
    AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserListQuery {
    /// Matches email, name or username.
    pub search: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminUserResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    #[schema(example = json!(["member"]))]
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AdminUpdateUserRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(custom(function = "validate_username"))]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetUserRolesRequest {
    pub role_ids: Vec<Uuid>,
}

#[derive(AsChangeset)]
#[diesel(table_name = users)]
struct AdminUserChanges {
    email: Option<String>,
    name: Option<String>,
    username: Option<String>,
    updated_at: chrono::NaiveDateTime,
}

fn role_names(conn: &mut PgConnection, user_ids: &[Uuid]) -> QueryResult<HashMap<Uuid, Vec<String>>> {
    let rows: Vec<(Uuid, String)> = user_roles::table
        .inner_join(roles::table)
        .filter(user_roles::user_id.eq_any(user_ids))
        .order(roles::name.asc())
        .select((user_roles::user_id, roles::name))
        .load(conn)?;

    let mut by_user: HashMap<Uuid, Vec<String>> = HashMap::new();
    for (user_id, name) in rows {
        by_user.entry(user_id).or_default().push(name);
    }
    Ok(by_user)
}

fn admin_view(conn: &mut PgConnection, user: User) -> ApiResult<AdminUserResponse> {
    let mut names = role_names(conn, &[user.id]).map_err(|e| {
        error!(error = %e, "Failed to load user roles");
        ApiError::db_error()
    })?;
    Ok(AdminUserResponse {
        roles: names.remove(&user.id).unwrap_or_default(),
        user: user.into(),
    })
}

fn find_user(conn: &mut PgConnection, user_id: Uuid) -> ApiResult<User> {
    users::table
        .find(user_id)
        .select(User::as_select())
        .first(conn)
        .optional()
        .map_err(|e| {
            error!(error = %e, "Failed to load user");
            ApiError::db_error()
        })?
        .ok_or_else(|| ApiError::not_found("User not found", "USER_NOT_FOUND"))
}

#[utoipa::path(
    get,
    path = "/api/admin/users",
    tag = "Admin",
    params(UserListQuery),
    responses(
        (status = 200, description = "Users", body = PaginatedResponse<AdminUserResponse>),
        (status = 403, description = "Missing users.read", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<UserListQuery>,
) -> ApiResult<Json<PaginatedResponse<AdminUserResponse>>> {
    rbac::require(&state, auth.id, "users.read").await?;

    let pagination = PaginationParams::new(
        query.page.unwrap_or(1),
        query.per_page.unwrap_or(DEFAULT_PER_PAGE),
    );
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s.replace('%', "\\%").replace('_', "\\_")));

    let mut conn = get_db_conn(&state.db_pool)?;

    let filtered = || {
        let mut q = users::table.into_boxed();
        if let Some(pattern) = &search {
            q = q.filter(
                users::email
                    .ilike(pattern.clone())
                    .or(users::name.ilike(pattern.clone()))
                    .or(users::username.ilike(pattern.clone())),
            );
        }
        q
    };

    let total_count: i64 = filtered()
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let (limit, offset) = pagination.limit_offset();
    let rows: Vec<User> = filtered()
        .order(users::created_at.desc())
        .limit(limit)
        .offset(offset)
        .select(User::as_select())
        .load(&mut conn)
        .map_err(|_| ApiError::db_error())?;

    let ids: Vec<Uuid> = rows.iter().map(|u| u.id).collect();
    let mut names = role_names(&mut conn, &ids).map_err(|_| ApiError::db_error())?;

    let data = rows
        .into_iter()
        .map(|u| AdminUserResponse {
            roles: names.remove(&u.id).unwrap_or_default(),
            user: u.into(),
        })
        .collect();

    Ok(Json(PaginatedResponse::from_params(data, &pagination, total_count)))
}

#[utoipa::path(
    get,
    path = "/api/admin/users/{id}",
    tag = "Admin",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = DataResponse<AdminUserResponse>),
        (status = 403, description = "Missing users.read", body = ApiError),
        (status = 404, description = "User not found", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn get_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<DataResponse<AdminUserResponse>>> {
    rbac::require(&state, auth.id, "users.read").await?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let user = find_user(&mut conn, user_id)?;
    Ok(Json(DataResponse::new(admin_view(&mut conn, user)?)))
}

#[utoipa::path(
    put,
    path = "/api/admin/users/{id}",
    tag = "Admin",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = AdminUpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = DataResponse<AdminUserResponse>),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 403, description = "Missing users.write", body = ApiError),
        (status = 404, description = "User not found", body = ApiError),
        (status = 409, description = "Email or username taken", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn update_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
    ApiJson(payload): ApiJson<AdminUpdateUserRequest>,
) -> ApiResult<Json<DataResponse<AdminUserResponse>>> {
    rbac::require(&state, auth.id, "users.write").await?;
    payload.validate().map_err(|e| ApiError::validation(&e))?;

    let mut conn = get_db_conn(&state.db_pool)?;
    find_user(&mut conn, user_id)?;

    let changes = AdminUserChanges {
        email: payload.email.map(|e| e.trim().to_lowercase()),
        name: payload.name.map(|n| n.trim().to_string()),
        username: payload.username.map(|u| u.trim().to_string()),
        updated_at: chrono::Utc::now().naive_utc(),
    };

    let user: User = diesel::update(users::table.find(user_id))
        .set(&changes)
        .returning(User::as_returning())
        .get_result(&mut conn)
        .map_err(|e| {
            if is_unique_violation(&e) {
                user_conflict(&e)
            } else {
                error!(error = %e, user_id = %user_id, "Failed to update user");
                ApiError::db_error()
            }
        })?;

    info!(user_id = %user.id, admin_id = %auth.id, "Admin updated user");
    Ok(Json(DataResponse::new(admin_view(&mut conn, user)?)))
}

#[utoipa::path(
    delete,
    path = "/api/admin/users/{id}",
    tag = "Admin",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "User and their projects deleted"),
        (status = 400, description = "Cannot delete own account", body = ApiError),
        (status = 403, description = "Missing users.write", body = ApiError),
        (status = 404, description = "User not found", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    rbac::require(&state, auth.id, "users.write").await?;

    if user_id == auth.id {
        return Err(ApiError::bad_request(
            "You cannot delete your own account here",
            "CANNOT_DELETE_SELF",
        ));
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let deleted = diesel::delete(users::table.find(user_id))
        .execute(&mut conn)
        .map_err(|e| {
            error!(error = %e, user_id = %user_id, "Failed to delete user");
            ApiError::db_error()
        })?;

    if deleted == 0 {
        return Err(ApiError::not_found("User not found", "USER_NOT_FOUND"));
    }

    let _ = state
        .cache
        .token_revocation
        .revoke_all_user_tokens(user_id, state.jwt_config.token_expiry as u64)
        .await;
    rbac::invalidate_user(&state, user_id).await;

    info!(user_id = %user_id, admin_id = %auth.id, "Admin deleted user");
    Ok(StatusCode::NO_CONTENT)
}

/// Replaces the user's role set.
#[utoipa::path(
    put,
    path = "/api/admin/users/{id}/roles",
    tag = "Admin",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = SetUserRolesRequest,
    responses(
        (status = 200, description = "Roles replaced", body = DataResponse<AdminUserResponse>),
        (status = 400, description = "Unknown role id", body = ApiError),
        (status = 403, description = "Missing users.write", body = ApiError),
        (status = 404, description = "User not found", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn set_user_roles(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
    ApiJson(payload): ApiJson<SetUserRolesRequest>,
) -> ApiResult<Json<DataResponse<AdminUserResponse>>> {
    rbac::require(&state, auth.id, "users.write").await?;

    let mut role_ids = payload.role_ids;
    role_ids.sort();
    role_ids.dedup();

    let mut conn = get_db_conn(&state.db_pool)?;
    let user = find_user(&mut conn, user_id)?;

    let known: i64 = roles::table
        .filter(roles::id.eq_any(&role_ids))
        .count()
        .get_result(&mut conn)
        .map_err(|_| ApiError::db_error())?;
    if known as usize != role_ids.len() {
        return Err(ApiError::bad_request("Unknown role id", "UNKNOWN_ROLE"));
    }

    conn.transaction(|conn| {
        diesel::delete(user_roles::table.filter(user_roles::user_id.eq(user_id))).execute(conn)?;
        let rows: Vec<NewUserRole> = role_ids
            .iter()
            .map(|role_id| NewUserRole {
                user_id,
                role_id: *role_id,
            })
            .collect();
        if !rows.is_empty() {
            diesel::insert_into(user_roles::table).values(&rows).execute(conn)?;
        }
        Ok::<_, diesel::result::Error>(())
    })
    .map_err(|e| {
        error!(error = %e, user_id = %user_id, "Failed to set user roles");
        ApiError::db_error()
    })?;

    rbac::invalidate_user(&state, user_id).await;
    info!(user_id = %user_id, admin_id = %auth.id, roles = role_ids.len(), "User roles replaced");

    Ok(Json(DataResponse::new(admin_view(&mut conn, user)?)))
}

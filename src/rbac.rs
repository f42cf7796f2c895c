//! Global role-based access control for the admin backoffice.
//!
//! A user's effective permissions are the union of the slugs granted to
//! their roles. The wildcard slug `*` grants everything.

use std::time::Instant;

use diesel::prelude::*;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{get_db_conn, ApiError, ApiResult};
use crate::schema::{permissions, role_permissions, user_roles};
use crate::telemetry::record_permission_check;
use crate::AppState;

pub const WILDCARD: &str = "*";
pub const ADMIN_ROLE: &str = "admin";
pub const MEMBER_ROLE: &str = "member";

fn is_identifier(part: &str) -> bool {
    !part.is_empty()
        && part.len() <= 64
        && part
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// Splits a `resource.action` slug. The wildcard is not a valid custom slug.
pub fn parse_slug(slug: &str) -> Option<(&str, &str)> {
    let (resource, action) = slug.split_once('.')?;
    (is_identifier(resource) && is_identifier(action)).then_some((resource, action))
}

pub fn is_valid_resource_identifier(identifier: &str) -> bool {
    is_identifier(identifier)
}

pub fn grants(held: &[String], required: &str) -> bool {
    held.iter().any(|p| p == WILDCARD || p == required)
}

pub fn load_user_permissions(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> Result<Vec<String>, diesel::result::Error> {
    user_roles::table
        .inner_join(role_permissions::table.on(role_permissions::role_id.eq(user_roles::role_id)))
        .inner_join(permissions::table.on(permissions::id.eq(role_permissions::permission_id)))
        .filter(user_roles::user_id.eq(user_id))
        .select(permissions::slug)
        .distinct()
        .load(conn)
}

/// Effective permissions, from the cache when possible.
pub async fn effective_permissions(state: &AppState, user_id: Uuid) -> ApiResult<(Vec<String>, bool)> {
    if let Some(cached) = state.cache.permission_cache.get(user_id).await {
        return Ok((cached, true));
    }

    let mut conn = get_db_conn(&state.db_pool)?;
    let held = load_user_permissions(&mut conn, user_id).map_err(|e| {
        error!(error = %e, user_id = %user_id, "Failed to load permissions");
        ApiError::db_error()
    })?;

    if state.cache.permission_cache.is_available() {
        if let Err(e) = state.cache.permission_cache.set(user_id, held.clone()).await {
            debug!(error = %e, "Permission cache write skipped");
        }
    }

    Ok((held, false))
}

/// Answers 403 unless `user_id` holds `required` (or `*`).
pub async fn require(state: &AppState, user_id: Uuid, required: &str) -> ApiResult<()> {
    let start = Instant::now();
    let (held, cached) = effective_permissions(state, user_id).await?;
    let granted = grants(&held, required);
    record_permission_check(cached, granted, start.elapsed());

    if granted {
        Ok(())
    } else {
        warn!(user_id = %user_id, permission = required, "Permission denied");
        Err(ApiError::forbidden(
            format!("Missing permission: {required}"),
            "PERMISSION_DENIED",
        ))
    }
}

/// Drops every cached permission set after a role or permission change.
pub async fn invalidate_all(state: &AppState) {
    if state.cache.permission_cache.is_available() {
        if let Err(e) = state.cache.permission_cache.invalidate_all().await {
            warn!(error = %e, "Failed to flush permission cache");
        }
    }
}

pub async fn invalidate_user(state: &AppState, user_id: Uuid) {
    if state.cache.permission_cache.is_available() {
        if let Err(e) = state.cache.permission_cache.invalidate(user_id).await {
            warn!(error = %e, user_id = %user_id, "Failed to invalidate permission cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn held(slugs: &[&str]) -> Vec<String> {
        slugs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_wildcard_grants_everything() {
        let perms = held(&["*"]);
        assert!(grants(&perms, "users.write"));
        assert!(grants(&perms, "anything.at.all"));
    }

    #[test]
    fn test_exact_slug_grants_only_itself() {
        let perms = held(&["users.read"]);
        assert!(grants(&perms, "users.read"));
        assert!(!grants(&perms, "users.write"));
        assert!(!grants(&perms, "users"));
    }

    #[test]
    fn test_parse_slug() {
        assert_eq!(parse_slug("feedback.write"), Some(("feedback", "write")));
        assert_eq!(parse_slug("*"), None);
        assert_eq!(parse_slug("feedback"), None);
        assert_eq!(parse_slug("Feedback.write"), None);
        assert_eq!(parse_slug("feedback.bulk.write"), None);
        assert_eq!(parse_slug(".write"), None);
    }

    #[test]
    fn test_no_permissions_denies() {
        assert!(!grants(&[], "roles.read"));
    }
}

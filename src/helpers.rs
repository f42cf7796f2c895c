//! Lookups and input checks shared by the dashboard and widget handlers.

use axum::{http::StatusCode, Json};
use diesel::prelude::*;
use tracing::error;
use uuid::Uuid;
use validator::ValidationError;

use crate::error::ApiError;
use crate::models::Project;
use crate::schema::projects;

pub const MIN_SLUG_LENGTH: usize = 3;
pub const MAX_SLUG_LENGTH: usize = 64;

/// The project if `owner_id` owns it. Someone else's project answers 404.
pub fn owned_project(
    conn: &mut PgConnection,
    project_id: Uuid,
    owner_id: Uuid,
) -> Result<Project, (StatusCode, Json<ApiError>)> {
    projects::table
        .filter(projects::id.eq(project_id))
        .filter(projects::owner_id.eq(owner_id))
        .select(Project::as_select())
        .first(conn)
        .optional()
        .map_err(|e| {
            error!(error = %e, project_id = %project_id, "Failed to load project");
            ApiError::db_error()
        })?
        .ok_or_else(|| ApiError::not_found("Project not found", "PROJECT_NOT_FOUND"))
}

pub fn project_by_slug(
    conn: &mut PgConnection,
    slug: &str,
) -> Result<Project, (StatusCode, Json<ApiError>)> {
    projects::table
        .filter(projects::slug.eq(slug.trim().to_lowercase()))
        .select(Project::as_select())
        .first(conn)
        .optional()
        .map_err(|e| {
            error!(error = %e, slug, "Failed to load project by slug");
            ApiError::db_error()
        })?
        .ok_or_else(|| ApiError::not_found("Project not found", "PROJECT_NOT_FOUND"))
}

/// Lowercase ASCII letters, digits and inner hyphens.
pub fn is_valid_slug(slug: &str) -> bool {
    (MIN_SLUG_LENGTH..=MAX_SLUG_LENGTH).contains(&slug.len())
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !slug.starts_with('-')
        && !slug.ends_with('-')
}

pub fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    if is_valid_slug(slug) {
        Ok(())
    } else {
        Err(ValidationError::new("slug").with_message(
            "Slug must be 3-64 lowercase letters, digits or hyphens".into(),
        ))
    }
}

//! Feedback triage for project owners: filtered listing, detail and bulk status.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{get_db_conn, ApiError, ApiJson, ApiResult},
    events::{EventType, FeedbackStatusChangedPayload, OutboxService},
    helpers::owned_project,
    middleware::AuthUser,
    models::{Feedback, FeedbackStatus},
    pagination::{DataResponse, PaginatedResponse, PaginationParams, DEFAULT_PER_PAGE},
    schema::feedback,
    AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FeedbackQuery {
    /// `new`, `read` or `archived`.
    pub status: Option<String>,
    /// Exact rating.
    pub rating: Option<i16>,
    pub min_rating: Option<i16>,
    pub max_rating: Option<i16>,
    /// Only feedback whose answers carry this tag.
    pub tag: Option<String>,
    /// Case-insensitive match on the comment.
    pub search: Option<String>,
    /// Inclusive start date (YYYY-MM-DD).
    pub from: Option<NaiveDate>,
    /// Inclusive end date (YYYY-MM-DD).
    pub to: Option<NaiveDate>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Checked form of [`FeedbackQuery`].
#[derive(Debug, Default, PartialEq)]
pub struct FeedbackFilters {
    pub status: Option<FeedbackStatus>,
    pub min_rating: Option<i16>,
    pub max_rating: Option<i16>,
    pub tag: Option<String>,
    pub search: Option<String>,
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
}

fn rating_param(value: Option<i16>, name: &str) -> ApiResult<Option<i16>> {
    match value {
        Some(r) if !(1..=5).contains(&r) => Err(ApiError::bad_request(
            format!("{name} must be between 1 and 5"),
            "INVALID_RATING",
        )),
        other => Ok(other),
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Escapes LIKE wildcards so user input matches literally.
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

impl FeedbackQuery {
    pub fn filters(&self) -> ApiResult<FeedbackFilters> {
        let status = match non_blank(&self.status) {
            Some(s) => Some(FeedbackStatus::parse(&s.to_lowercase()).ok_or_else(|| {
                ApiError::bad_request(
                    "status must be one of new, read, archived",
                    "INVALID_STATUS",
                )
            })?),
            None => None,
        };

        let rating = rating_param(self.rating, "rating")?;
        let mut min_rating = rating_param(self.min_rating, "min_rating")?;
        let mut max_rating = rating_param(self.max_rating, "max_rating")?;
        if let Some(r) = rating {
            min_rating = Some(r);
            max_rating = Some(r);
        }
        if let (Some(min), Some(max)) = (min_rating, max_rating) {
            if min > max {
                return Err(ApiError::bad_request(
                    "min_rating must not exceed max_rating",
                    "INVALID_RATING",
                ));
            }
        }

        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(ApiError::bad_request(
                    "'from' must not be after 'to'",
                    "INVALID_RANGE",
                ));
            }
        }

        Ok(FeedbackFilters {
            status,
            min_rating,
            max_rating,
            tag: non_blank(&self.tag),
            search: non_blank(&self.search),
            from: self.from.and_then(|d| d.and_hms_opt(0, 0, 0)),
            to: self
                .to
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|d| d + Duration::days(1)),
        })
    }

    pub fn pagination(&self) -> PaginationParams {
        PaginationParams::new(
            self.page.unwrap_or(1),
            self.per_page.unwrap_or(DEFAULT_PER_PAGE),
        )
    }
}

fn filtered<'a>(project_id: Uuid, filters: &'a FeedbackFilters) -> feedback::BoxedQuery<'a, Pg> {
    let mut query = feedback::table
        .filter(feedback::project_id.eq(project_id))
        .into_boxed();

    if let Some(status) = filters.status {
        query = query.filter(feedback::status.eq(status.as_str()));
    }
    if let Some(min) = filters.min_rating {
        query = query.filter(feedback::rating.ge(min));
    }
    if let Some(max) = filters.max_rating {
        query = query.filter(feedback::rating.le(max));
    }
    if let Some(tag) = &filters.tag {
        query = query.filter(feedback::answers.contains(serde_json::json!({ "tags": [tag] })));
    }
    if let Some(search) = &filters.search {
        query = query.filter(
            feedback::answers
                .retrieve_as_text("comment")
                .ilike(like_pattern(search)),
        );
    }
    if let Some(from) = filters.from {
        query = query.filter(feedback::created_at.ge(from));
    }
    if let Some(to) = filters.to {
        query = query.filter(feedback::created_at.lt(to));
    }

    query
}

#[utoipa::path(
    get,
    path = "/api/dashboard/projects/{id}/feedback",
    tag = "Feedback",
    params(("id" = Uuid, Path, description = "Project ID"), FeedbackQuery),
    responses(
        (status = 200, description = "Feedback, newest first", body = PaginatedResponse<Feedback>),
        (status = 400, description = "Invalid filter", body = ApiError),
        (status = 404, description = "Project not found", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn list_feedback(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<FeedbackQuery>,
) -> ApiResult<Json<PaginatedResponse<Feedback>>> {
    let filters = query.filters()?;
    let pagination = query.pagination();

    let mut conn = get_db_conn(&state.db_pool)?;
    owned_project(&mut conn, project_id, auth.id)?;

    let total_count: i64 = filtered(project_id, &filters)
        .count()
        .get_result(&mut conn)
        .map_err(|e| {
            error!(error = %e, "Failed to count feedback");
            ApiError::db_error()
        })?;

    let (limit, offset) = pagination.limit_offset();
    let rows: Vec<Feedback> = filtered(project_id, &filters)
        .order((feedback::created_at.desc(), feedback::id.desc()))
        .limit(limit)
        .offset(offset)
        .select(Feedback::as_select())
        .load(&mut conn)
        .map_err(|e| {
            error!(error = %e, "Failed to load feedback");
            ApiError::db_error()
        })?;

    Ok(Json(PaginatedResponse::from_params(rows, &pagination, total_count)))
}

#[utoipa::path(
    get,
    path = "/api/dashboard/projects/{id}/feedback/{feedback_id}",
    tag = "Feedback",
    params(
        ("id" = Uuid, Path, description = "Project ID"),
        ("feedback_id" = Uuid, Path, description = "Feedback ID")
    ),
    responses(
        (status = 200, description = "Feedback row", body = DataResponse<Feedback>),
        (status = 404, description = "Project or feedback not found", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn get_feedback(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path((project_id, feedback_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<DataResponse<Feedback>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    owned_project(&mut conn, project_id, auth.id)?;

    let row: Feedback = feedback::table
        .filter(feedback::id.eq(feedback_id))
        .filter(feedback::project_id.eq(project_id))
        .select(Feedback::as_select())
        .first(&mut conn)
        .optional()
        .map_err(|e| {
            error!(error = %e, "Failed to load feedback");
            ApiError::db_error()
        })?
        .ok_or_else(|| ApiError::not_found("Feedback not found", "FEEDBACK_NOT_FOUND"))?;

    Ok(Json(DataResponse::new(row)))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BulkStatusRequest {
    #[validate(length(min = 1, max = 500, message = "Between 1 and 500 ids are required"))]
    pub ids: Vec<Uuid>,
    #[schema(example = "read")]
    pub status: FeedbackStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkStatusResponse {
    #[schema(example = 3)]
    pub updated: usize,
}

/// Ids that belong to other projects are ignored.
#[utoipa::path(
    patch,
    path = "/api/dashboard/projects/{id}/feedback",
    tag = "Feedback",
    params(("id" = Uuid, Path, description = "Project ID")),
    request_body = BulkStatusRequest,
    responses(
        (status = 200, description = "Rows updated", body = DataResponse<BulkStatusResponse>),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 404, description = "Project not found", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn bulk_update_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
    ApiJson(payload): ApiJson<BulkStatusRequest>,
) -> ApiResult<Json<DataResponse<BulkStatusResponse>>> {
    payload.validate().map_err(|e| ApiError::validation(&e))?;

    let mut conn = get_db_conn(&state.db_pool)?;
    owned_project(&mut conn, project_id, auth.id)?;

    let status = payload.status;
    let updated: Vec<Uuid> = conn
        .transaction(|conn| {
            let changing: Vec<(Uuid, String)> = feedback::table
                .filter(feedback::project_id.eq(project_id))
                .filter(feedback::id.eq_any(&payload.ids))
                .filter(feedback::status.ne(status.as_str()))
                .select((feedback::id, feedback::status))
                .for_update()
                .load(conn)?;
            let ids: Vec<Uuid> = changing.iter().map(|(id, _)| *id).collect();

            let updated: Vec<Uuid> = diesel::update(feedback::table.filter(feedback::id.eq_any(&ids)))
                .set((
                    feedback::status.eq(status.as_str()),
                    feedback::updated_at.eq(chrono::Utc::now().naive_utc()),
                ))
                .returning(feedback::id)
                .get_results(conn)?;

            for (id, previous_status) in changing {
                let data = serde_json::to_value(FeedbackStatusChangedPayload {
                    id,
                    previous_status,
                    status: status.to_string(),
                })
                .unwrap_or_default();
                OutboxService::emit(conn, EventType::FeedbackStatusChanged, id, project_id, data)?;
            }

            Ok::<_, diesel::result::Error>(updated)
        })
        .map_err(|e| {
            error!(error = %e, project_id = %project_id, "Bulk status update failed");
            ApiError::db_error()
        })?;

    info!(project_id = %project_id, status = %status, updated = updated.len(), "Feedback status updated");

    Ok(Json(DataResponse::new(BulkStatusResponse {
        updated: updated.len(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_rating_pins_both_bounds() {
        let query = FeedbackQuery {
            rating: Some(4),
            min_rating: Some(1),
            ..Default::default()
        };
        let filters = query.filters().unwrap();
        assert_eq!(filters.min_rating, Some(4));
        assert_eq!(filters.max_rating, Some(4));
    }

    #[test]
    fn test_rejects_out_of_range_rating() {
        let query = FeedbackQuery {
            max_rating: Some(6),
            ..Default::default()
        };
        let (status, Json(body)) = query.filters().unwrap_err();
        assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(body.code, "INVALID_RATING");
    }

    #[test]
    fn test_rejects_unknown_status_and_inverted_bounds() {
        let query = FeedbackQuery {
            status: Some("deleted".into()),
            ..Default::default()
        };
        let (_, Json(body)) = query.filters().unwrap_err();
        assert_eq!(body.code, "INVALID_STATUS");

        let query = FeedbackQuery {
            min_rating: Some(4),
            max_rating: Some(2),
            ..Default::default()
        };
        assert!(query.filters().is_err());
    }

    #[test]
    fn test_date_bounds_are_inclusive_days() {
        let query = FeedbackQuery {
            from: NaiveDate::from_ymd_opt(2024, 5, 1),
            to: NaiveDate::from_ymd_opt(2024, 5, 1),
            ..Default::default()
        };
        let filters = query.filters().unwrap();
        assert_eq!(filters.to.unwrap() - filters.from.unwrap(), Duration::days(1));
    }

    #[test]
    fn test_blank_text_filters_are_dropped() {
        let query = FeedbackQuery {
            status: Some("  ".into()),
            tag: Some(String::new()),
            search: Some(" slow ".into()),
            ..Default::default()
        };
        let filters = query.filters().unwrap();
        assert_eq!(filters.status, None);
        assert_eq!(filters.tag, None);
        assert_eq!(filters.search.as_deref(), Some("slow"));
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_pagination_defaults() {
        let p = FeedbackQuery::default().pagination();
        assert_eq!(p.page(), 1);
        assert_eq!(p.per_page(), DEFAULT_PER_PAGE);
    }
}

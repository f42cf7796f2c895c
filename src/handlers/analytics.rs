//! Project analytics endpoint.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    analytics::{summarize, AnalyticsSummary, DateRange, FeedbackSample},
    error::{get_db_conn, ApiError, ApiResult},
    helpers::owned_project,
    middleware::AuthUser,
    pagination::DataResponse,
    schema::feedback,
    AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AnalyticsQuery {
    /// Trailing window in days (1-365). Defaults to 30.
    pub days: Option<i64>,
    /// Inclusive start date; overrides `days`.
    pub from: Option<NaiveDate>,
    /// Inclusive end date.
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AnalyticsResponse {
    pub from: NaiveDateTime,
    /// Exclusive upper bound.
    pub to: NaiveDateTime,
    #[serde(flatten)]
    pub summary: AnalyticsSummary,
}

#[utoipa::path(
    get,
    path = "/api/dashboard/projects/{id}/analytics",
    tag = "Analytics",
    params(("id" = Uuid, Path, description = "Project ID"), AnalyticsQuery),
    responses(
        (status = 200, description = "NPS, averages, distribution, tags and trend", body = DataResponse<AnalyticsResponse>),
        (status = 400, description = "Invalid range", body = ApiError),
        (status = 404, description = "Project not found", body = ApiError)
    ),
    security(("cookie_auth" = []), ("bearer_auth" = []))
)]
pub async fn project_analytics(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<Json<DataResponse<AnalyticsResponse>>> {
    let range = DateRange::resolve(
        query.days,
        query.from,
        query.to,
        chrono::Utc::now().naive_utc(),
    )
    .map_err(|e| ApiError::bad_request(e.to_string(), "INVALID_RANGE"))?;

    let mut conn = get_db_conn(&state.db_pool)?;
    owned_project(&mut conn, project_id, auth.id)?;

    let rows: Vec<(i16, String, serde_json::Value, NaiveDateTime)> = feedback::table
        .filter(feedback::project_id.eq(project_id))
        .filter(feedback::created_at.ge(range.start))
        .filter(feedback::created_at.lt(range.end))
        .select((
            feedback::rating,
            feedback::status,
            feedback::answers,
            feedback::created_at,
        ))
        .load(&mut conn)
        .map_err(|e| {
            error!(error = %e, project_id = %project_id, "Failed to load analytics rows");
            ApiError::db_error()
        })?;

    let samples: Vec<FeedbackSample> = rows
        .into_iter()
        .map(|(rating, status, answers, created_at)| FeedbackSample {
            rating,
            status,
            answers,
            created_at,
        })
        .collect();

    Ok(Json(DataResponse::new(AnalyticsResponse {
        from: range.start,
        to: range.end,
        summary: summarize(&samples),
    })))
}

//! Shared error handling utilities.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::DbPool;

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::BAD_REQUEST, Json(Self::new(error, code)))
    }

    /// 400 carrying the per-field issues reported by `validator`.
    pub fn validation(errors: &validator::ValidationErrors) -> (StatusCode, Json<Self>) {
        let details = serde_json::to_value(errors).unwrap_or(serde_json::Value::Null);
        (
            StatusCode::BAD_REQUEST,
            Json(Self::new("Validation failed", "VALIDATION_ERROR").with_details(details)),
        )
    }

    pub fn unauthorized(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::UNAUTHORIZED, Json(Self::new(error, code)))
    }

    pub fn forbidden(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::FORBIDDEN, Json(Self::new(error, code)))
    }

    pub fn not_found(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::NOT_FOUND, Json(Self::new(error, code)))
    }

    pub fn conflict(error: impl Into<String>, code: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::CONFLICT, Json(Self::new(error, code)))
    }

    pub fn locked(error: impl Into<String>, code: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::LOCKED, Json(Self::new(error, code)))
    }

    pub fn internal(error: impl Into<String>, code: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(Self::new(error, code)),
        )
    }

    pub fn db_error() -> (StatusCode, Json<Self>) {
        Self::internal("Database error", "DB_ERROR")
    }
}

pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

/// `Json` body extractor whose rejections use the `ApiError` envelope.
///
/// Well-formed JSON with the wrong shape (a rating of `70000`, a string
/// where a number belongs) is a 400 `VALIDATION_ERROR`, like a failed
/// `validate()`.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ApiError>);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| ApiJson(value))
            .map_err(json_rejection)
    }
}

fn json_rejection(rejection: JsonRejection) -> (StatusCode, Json<ApiError>) {
    let (status, code) = match &rejection {
        JsonRejection::JsonDataError(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        JsonRejection::JsonSyntaxError(_) => (StatusCode::BAD_REQUEST, "INVALID_JSON"),
        JsonRejection::MissingJsonContentType(_) => {
            (StatusCode::UNSUPPORTED_MEDIA_TYPE, "UNSUPPORTED_MEDIA_TYPE")
        }
        _ => (rejection.status(), "INVALID_BODY"),
    };
    let error = ApiError::new("Invalid request body", code)
        .with_details(serde_json::json!({ "body": rejection.body_text() }));
    (status, Json(error))
}

pub fn get_db_conn(
    pool: &DbPool,
) -> Result<
    diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<diesel::PgConnection>>,
    (StatusCode, Json<ApiError>),
> {
    pool.get().map_err(|e| {
        error!(error = %e, "Database connection error");
        ApiError::internal("Database connection error", "DB_CONNECTION_ERROR")
    })
}

/// True when the error is a unique-constraint violation, so callers can answer 409.
pub fn is_unique_violation(e: &diesel::result::Error) -> bool {
    matches!(
        e,
        diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct NameInput {
        #[validate(length(min = 3))]
        name: String,
    }

    #[test]
    fn test_details_omitted_when_absent() {
        let body = serde_json::to_value(ApiError::new("nope", "NOPE")).unwrap();
        assert!(body.get("details").is_none());
        assert_eq!(body["code"], "NOPE");
    }

    #[test]
    fn test_validation_error_carries_field_map() {
        let errors = NameInput { name: "ab".into() }.validate().unwrap_err();
        let (status, Json(body)) = ApiError::validation(&errors);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, "VALIDATION_ERROR");
        assert!(body.details.unwrap().get("name").is_some());
    }

    #[derive(Debug, serde::Deserialize)]
    struct RatingInput {
        #[allow(dead_code)]
        rating: i16,
    }

    async fn extract(body: &'static str, content_type: &str) -> ApiResult<RatingInput> {
        let request = Request::builder()
            .method("POST")
            .header("content-type", content_type)
            .body(axum::body::Body::from(body))
            .unwrap();
        ApiJson::<RatingInput>::from_request(request, &())
            .await
            .map(|ApiJson(value)| value)
    }

    #[tokio::test]
    async fn test_json_rejections_use_error_envelope() {
        assert!(extract(r#"{"rating": 4}"#, "application/json").await.is_ok());

        let (status, Json(body)) = extract(r#"{"rating": 70000}"#, "application/json")
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, "VALIDATION_ERROR");
        assert!(body.details.is_some());

        let (status, Json(body)) = extract("{rating", "application/json").await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, "INVALID_JSON");

        let (status, _) = extract(r#"{"rating": 4}"#, "text/plain").await.unwrap_err();
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
}

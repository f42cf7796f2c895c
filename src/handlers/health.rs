//! Liveness, readiness and build info.

use std::time::Instant;

use axum::{extract::State, http::StatusCode, Json};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{events::OutboxService, AppState};

const SERVICE_NAME: &str = "feedloop";

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    #[schema(example = "feedloop")]
    pub service: String,
    #[schema(example = "0.1.0")]
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, PartialEq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Probe {
    Up { latency_ms: u64 },
    Down { error: String },
}

impl Probe {
    fn timed<E: std::fmt::Display>(start: Instant, result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Probe::Up {
                latency_ms: start.elapsed().as_millis() as u64,
            },
            Err(e) => Probe::Down {
                error: e.to_string(),
            },
        }
    }

    fn is_up(&self) -> bool {
        matches!(self, Probe::Up { .. })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadinessChecks {
    pub database: Probe,
    /// Absent when Redis is not configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<Probe>,
    /// Webhook events waiting for delivery. Informational only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outbox_pending: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadinessResponse {
    #[schema(example = "ready")]
    pub status: String,
    pub checks: ReadinessChecks,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Plain-text liveness", content_type = "text/plain"))
)]
pub async fn health_check_simple() -> &'static str {
    "OK"
}

#[utoipa::path(
    get,
    path = "/health/status",
    tag = "Health",
    responses((status = 200, description = "Service name and version", body = HealthResponse))
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Ready when Postgres answers and, if configured, Redis answers PING.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Dependencies reachable", body = ReadinessResponse),
        (status = 503, description = "A dependency is down", body = ReadinessResponse)
    )
)]
pub async fn ready_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let (database, outbox_pending) = probe_database(&state);

    let redis = if state.cache.token_revocation.is_available() {
        let start = Instant::now();
        let ok = state.cache.token_revocation.ping().await;
        Some(Probe::timed(start, if ok { Ok(()) } else { Err("PING failed") }))
    } else {
        None
    };

    let ready = database.is_up() && redis.as_ref().map_or(true, Probe::is_up);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            status: if ready { "ready" } else { "not_ready" }.to_string(),
            checks: ReadinessChecks {
                database,
                redis,
                outbox_pending,
            },
        }),
    )
}

fn probe_database(state: &AppState) -> (Probe, Option<i64>) {
    let start = Instant::now();
    let mut conn = match state.db_pool.get() {
        Ok(conn) => conn,
        Err(e) => return (Probe::timed(start, Err(e)), None),
    };

    let probe = Probe::timed(
        start,
        diesel::sql_query("SELECT 1").execute(&mut conn).map(|_| ()),
    );
    let pending = probe
        .is_up()
        .then(|| OutboxService::pending_count(&mut conn, state.webhook_max_attempts).ok())
        .flatten();

    (probe, pending)
}

#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses((status = 200, description = "Process is alive"))
)]
pub async fn live_check() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_serializes_with_status_tag() {
        let up = serde_json::to_value(Probe::Up { latency_ms: 3 }).unwrap();
        assert_eq!(up, serde_json::json!({ "status": "up", "latency_ms": 3 }));

        let down = serde_json::to_value(Probe::timed(Instant::now(), Err("refused"))).unwrap();
        assert_eq!(down["status"], "down");
        assert_eq!(down["error"], "refused");
    }

    #[tokio::test]
    async fn test_health_check_names_the_service() {
        let Json(body) = health_check().await;
        assert_eq!(body.status, "healthy");
        assert_eq!(body.service, "feedloop");
    }
}

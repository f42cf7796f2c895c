//! Prometheus metrics: HTTP latency, auth outcomes, permission checks,
//! feedback ingestion and webhook deliveries.

use std::{sync::OnceLock, time::Duration};

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::warn;

/// The recorder is process-global; every enabled state shares one handle.
static RECORDER: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Handle to the Prometheus exporter, absent when metrics are switched off.
#[derive(Clone)]
pub struct MetricsState {
    handle: Option<PrometheusHandle>,
}

impl MetricsState {
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self::disabled();
        }
        let handle = RECORDER.get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| warn!(error = %e, "Prometheus recorder not installed"))
                .ok()
        });
        Self {
            handle: handle.clone(),
        }
    }

    pub fn disabled() -> Self {
        Self { handle: None }
    }

    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }

    pub fn is_enabled(&self) -> bool {
        self.handle.is_some()
    }
}

/// `GET /metrics` in the Prometheus text format.
pub async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    state.render().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        "metrics are disabled",
    ))
}

#[derive(Debug, Clone, Copy)]
pub enum AuthOutcome {
    Success,
    InvalidCredentials,
    AccountLocked,
    EmailTaken,
    TokenInvalid,
    TokenRevoked,
}

impl AuthOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            AuthOutcome::Success => "success",
            AuthOutcome::InvalidCredentials => "invalid_credentials",
            AuthOutcome::AccountLocked => "account_locked",
            AuthOutcome::EmailTaken => "email_taken",
            AuthOutcome::TokenInvalid => "token_invalid",
            AuthOutcome::TokenRevoked => "token_revoked",
        }
    }
}

pub fn record_auth_attempt(action: &str, outcome: AuthOutcome) {
    counter!(
        "auth_attempts_total",
        "action" => action.to_string(),
        "outcome" => outcome.as_str().to_string()
    )
    .increment(1);
}

pub fn record_permission_check(cached: bool, granted: bool, duration: Duration) {
    counter!(
        "permission_checks_total",
        "cached" => cached.to_string(),
        "granted" => granted.to_string()
    )
    .increment(1);

    histogram!(
        "permission_check_duration_seconds",
        "cached" => cached.to_string()
    )
    .record(duration.as_secs_f64());
}

#[derive(Debug, Clone, Copy)]
pub enum IngestSource {
    Widget,
    ApiKey,
}

pub fn record_feedback_ingested(source: IngestSource, rating: i16) {
    let source = match source {
        IngestSource::Widget => "widget",
        IngestSource::ApiKey => "api_key",
    };
    counter!("feedback_ingested_total", "source" => source, "rating" => rating.to_string())
        .increment(1);
}

pub fn record_domain_rejection() {
    counter!("widget_domain_rejections_total").increment(1);
}

pub fn record_webhook_delivery(event: &str, delivered: bool, duration: Duration) {
    counter!(
        "webhook_deliveries_total",
        "event" => event.to_string(),
        "delivered" => delivered.to_string()
    )
    .increment(1);

    histogram!("webhook_delivery_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_retention_purge(deleted: usize) {
    counter!("feedback_retention_purged_total").increment(deleted as u64);
}

pub fn record_request_latency(
    method: &str,
    path: &str,
    status: u16,
    duration: Duration,
) {
    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());
}

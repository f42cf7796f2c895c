//! Structured logs, OTLP spans and Prometheus counters.

pub mod metrics;
pub mod tracing;

pub use metrics::{
    record_auth_attempt, record_domain_rejection, record_feedback_ingested,
    record_permission_check, record_retention_purge, record_webhook_delivery, AuthOutcome,
    IngestSource, MetricsState,
};
pub use tracing::init_telemetry;

//! Background task that drains the outbox into project webhooks.
//!
//! Each poll loads a batch of pending events, POSTs every event to the
//! active webhooks of its project that subscribe to it, and marks the event
//! published once all deliveries succeed. A failed event keeps its place in
//! the outbox and is retried on later polls until it runs out of attempts.
//! The same task runs the feedback retention sweep on its own interval.

use std::time::{Duration, Instant};

use diesel::prelude::*;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::WebhookConfig;
use crate::events::{OutboxPayload, OutboxService, WebhookEnvelope};
use crate::models::{OutboxEvent, Webhook};
use crate::schema::webhooks;
use crate::telemetry::record_webhook_delivery;
use crate::{retention, DbPool};

use super::signature::{sign, EVENT_HEADER, SIGNATURE_HEADER};
use super::WebhookError;

const OUTBOX_RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub request_timeout: Duration,
    pub max_attempts: i32,
    pub retention_interval: Duration,
}

impl From<&WebhookConfig> for DispatcherConfig {
    fn from(config: &WebhookConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            batch_size: config.batch_size,
            request_timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
            max_attempts: config.max_attempts.max(1),
            retention_interval: Duration::from_secs(config.retention_sweep_interval_secs.max(1)),
        }
    }
}

pub struct WebhookDispatcher {
    db_pool: DbPool,
    client: reqwest::Client,
    config: DispatcherConfig,
}

impl WebhookDispatcher {
    pub fn new(db_pool: DbPool, config: DispatcherConfig) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("feedloop-webhooks/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            db_pool,
            client,
            config,
        })
    }

    pub fn spawn(self) -> watch::Sender<bool> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            self.run(shutdown_rx).await;
        });

        shutdown_tx
    }

    #[instrument(skip(self, shutdown_rx), name = "webhook_dispatcher")]
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis(),
            batch_size = self.config.batch_size,
            max_attempts = self.config.max_attempts,
            "Webhook dispatcher started"
        );

        let mut poll_timer = interval(self.config.poll_interval);
        let mut retention_timer = interval(self.config.retention_interval);

        loop {
            tokio::select! {
                _ = poll_timer.tick() => {
                    if let Err(e) = self.poll_and_deliver().await {
                        error!(error = %e, "Error dispatching webhook events");
                    }
                }
                _ = retention_timer.tick() => {
                    if let Err(e) = self.sweep().await {
                        warn!(error = %e, "Error during retention sweep");
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Webhook dispatcher received shutdown signal");
                        break;
                    }
                }
            }
        }

        info!("Webhook dispatcher stopped");
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, WebhookError>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> Result<T, diesel::result::Error> + Send + 'static,
    {
        let pool = self.db_pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| WebhookError::Database(e.to_string()))?;
            f(&mut conn).map_err(|e| WebhookError::Database(e.to_string()))
        })
        .await
        .map_err(|e| WebhookError::Task(e.to_string()))?
    }

    /// One dispatch pass; returns how many events were fully delivered.
    #[instrument(skip(self))]
    pub async fn poll_and_deliver(&self) -> Result<usize, WebhookError> {
        let batch_size = self.config.batch_size;
        let max_attempts = self.config.max_attempts;
        let events = self
            .blocking(move |conn| OutboxService::fetch_pending(conn, batch_size, max_attempts))
            .await?;

        if events.is_empty() {
            return Ok(0);
        }

        debug!(count = events.len(), "Fetched pending webhook events");

        let mut delivered: Vec<Uuid> = Vec::new();
        let mut failed: Vec<Uuid> = Vec::new();

        for event in &events {
            if self.dispatch_event(event).await {
                delivered.push(event.id);
            } else {
                failed.push(event.id);
            }
        }

        let delivered_count = delivered.len();
        self.blocking(move |conn| OutboxService::mark_published_batch(conn, &delivered))
            .await?;

        for event_id in failed {
            let attempts = self
                .blocking(move |conn| OutboxService::record_failure(conn, event_id))
                .await?;
            if attempts >= max_attempts {
                error!(event_id = %event_id, attempts, "Giving up on webhook event");
            }
        }

        Ok(delivered_count)
    }

    /// True when every subscribed webhook accepted the event.
    async fn dispatch_event(&self, event: &OutboxEvent) -> bool {
        let payload: OutboxPayload = match serde_json::from_value(event.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Dropping malformed outbox payload");
                return true;
            }
        };

        let project_id = payload.project_id;
        let event_type = event.event_type.clone();
        let hooks = match self
            .blocking(move |conn| {
                webhooks::table
                    .filter(webhooks::project_id.eq(project_id))
                    .filter(webhooks::is_active.eq(true))
                    .filter(webhooks::events.contains(vec![event_type]))
                    .select(Webhook::as_select())
                    .load(conn)
            })
            .await
        {
            Ok(hooks) => hooks,
            Err(e) => {
                error!(event_id = %event.id, error = %e, "Failed to load webhooks");
                return false;
            }
        };

        if hooks.is_empty() {
            return true;
        }

        let envelope = WebhookEnvelope {
            event: event.event_type.clone(),
            project_id,
            data: payload.data,
            timestamp: event.created_at.and_utc(),
        };
        let body = match serde_json::to_vec(&envelope) {
            Ok(body) => body,
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Dropping unserializable event");
                return true;
            }
        };

        let mut all_ok = true;
        for hook in &hooks {
            let start = Instant::now();
            let result = self.deliver(hook, &event.event_type, &body).await;
            record_webhook_delivery(&event.event_type, result.is_ok(), start.elapsed());

            match result {
                Ok(()) => debug!(
                    event_id = %event.id,
                    webhook_id = %hook.id,
                    "Webhook delivered"
                ),
                Err(e) => {
                    all_ok = false;
                    warn!(
                        event_id = %event.id,
                        webhook_id = %hook.id,
                        attempt = event.attempts + 1,
                        error = %e,
                        "Webhook delivery failed"
                    );
                }
            }
        }

        all_ok
    }

    async fn deliver(&self, hook: &Webhook, event_type: &str, body: &[u8]) -> Result<(), WebhookError> {
        let signature = sign(&hook.secret, body)?;

        let response = self
            .client
            .post(&hook.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(EVENT_HEADER, event_type)
            .header(SIGNATURE_HEADER, signature)
            .body(body.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(WebhookError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    /// Feedback retention plus outbox housekeeping.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<usize, WebhookError> {
        let max_attempts = self.config.max_attempts;
        let purged = self
            .blocking(|conn| retention::purge_expired_feedback(conn, chrono::Utc::now().naive_utc()))
            .await?;
        self.blocking(move |conn| {
            OutboxService::cleanup_old_events(conn, OUTBOX_RETENTION_DAYS, max_attempts)
        })
        .await?;
        Ok(purged)
    }
}

//! Transactional outbox.
//!
//! Events are inserted on the same connection as the change that produced
//! them; the webhook dispatcher drains the table in the background.

use diesel::prelude::*;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::models::{NewOutboxEvent, OutboxEvent};
use crate::schema::outbox_events;

use super::types::{AggregateType, EventType, OutboxPayload};

#[derive(Debug, Clone)]
pub struct OutboxService;

impl OutboxService {
    #[instrument(skip(conn, data), fields(event_type = %event_type, aggregate_id = %aggregate_id))]
    pub fn emit(
        conn: &mut PgConnection,
        event_type: EventType,
        aggregate_id: Uuid,
        project_id: Uuid,
        data: serde_json::Value,
    ) -> Result<OutboxEvent, diesel::result::Error> {
        let payload = serde_json::to_value(OutboxPayload { project_id, data })
            .map_err(|e| diesel::result::Error::SerializationError(Box::new(e)))?;

        let new_event = NewOutboxEvent {
            event_type: event_type.as_str().to_string(),
            aggregate_type: AggregateType::Feedback.as_str().to_string(),
            aggregate_id,
            payload,
        };

        let result = diesel::insert_into(outbox_events::table)
            .values(&new_event)
            .returning(OutboxEvent::as_returning())
            .get_result(conn)?;

        debug!(event_id = %result.id, "Event written to outbox");
        Ok(result)
    }

    /// Oldest pending events that still have delivery attempts left.
    #[instrument(skip(conn))]
    pub fn fetch_pending(
        conn: &mut PgConnection,
        limit: i64,
        max_attempts: i32,
    ) -> Result<Vec<OutboxEvent>, diesel::result::Error> {
        outbox_events::table
            .filter(outbox_events::published.eq(false))
            .filter(outbox_events::attempts.lt(max_attempts))
            .order(outbox_events::created_at.asc())
            .limit(limit)
            .select(OutboxEvent::as_select())
            .load(conn)
    }

    #[instrument(skip(conn, event_ids), fields(count = event_ids.len()))]
    pub fn mark_published_batch(
        conn: &mut PgConnection,
        event_ids: &[Uuid],
    ) -> Result<usize, diesel::result::Error> {
        if event_ids.is_empty() {
            return Ok(0);
        }

        let count = diesel::update(outbox_events::table)
            .filter(outbox_events::id.eq_any(event_ids))
            .set((
                outbox_events::published.eq(true),
                outbox_events::published_at.eq(diesel::dsl::now),
            ))
            .execute(conn)?;

        debug!(count, "Events marked as published");
        Ok(count)
    }

    /// Undelivered events that still have attempts left.
    pub fn pending_count(
        conn: &mut PgConnection,
        max_attempts: i32,
    ) -> Result<i64, diesel::result::Error> {
        outbox_events::table
            .filter(outbox_events::published.eq(false))
            .filter(outbox_events::attempts.lt(max_attempts))
            .count()
            .get_result(conn)
    }

    /// Bumps the attempt counter and returns the new value.
    #[instrument(skip(conn))]
    pub fn record_failure(
        conn: &mut PgConnection,
        event_id: Uuid,
    ) -> Result<i32, diesel::result::Error> {
        diesel::update(outbox_events::table.find(event_id))
            .set(outbox_events::attempts.eq(outbox_events::attempts + 1))
            .returning(outbox_events::attempts)
            .get_result(conn)
    }

    /// Deletes delivered events, and events that ran out of attempts, older than the cutoff.
    #[instrument(skip(conn))]
    pub fn cleanup_old_events(
        conn: &mut PgConnection,
        older_than_days: i64,
        max_attempts: i32,
    ) -> Result<usize, diesel::result::Error> {
        let cutoff = chrono::Utc::now().naive_utc() - chrono::Duration::days(older_than_days);

        let count = diesel::delete(outbox_events::table)
            .filter(
                outbox_events::published
                    .eq(true)
                    .or(outbox_events::attempts.ge(max_attempts)),
            )
            .filter(outbox_events::created_at.lt(cutoff))
            .execute(conn)?;

        if count > 0 {
            debug!(count, older_than_days, "Cleaned up old outbox events");
        }
        Ok(count)
    }
}

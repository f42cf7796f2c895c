//! Per-project feedback retention.
//!
//! `settings.retention_days` is enforced by a periodic sweep that deletes
//! feedback older than the window. Projects without the setting keep
//! everything.

use chrono::{Duration, NaiveDateTime};
use diesel::prelude::*;
use tracing::info;
use uuid::Uuid;

use crate::models::ProjectSettings;
use crate::schema::{feedback, projects};
use crate::telemetry::record_retention_purge;

/// Oldest timestamp a project keeps, or `None` when retention is off.
pub fn cutoff(settings: &ProjectSettings, now: NaiveDateTime) -> Option<NaiveDateTime> {
    settings
        .retention_days
        .filter(|days| *days > 0)
        .map(|days| now - Duration::days(days as i64))
}

pub fn purge_expired_feedback(
    conn: &mut PgConnection,
    now: NaiveDateTime,
) -> Result<usize, diesel::result::Error> {
    let rows: Vec<(Uuid, serde_json::Value)> = projects::table
        .select((projects::id, projects::settings))
        .load(conn)?;

    let mut total = 0;
    for (project_id, settings) in rows {
        let Some(cutoff) = cutoff(&ProjectSettings::from_value(&settings), now) else {
            continue;
        };

        let deleted = diesel::delete(
            feedback::table
                .filter(feedback::project_id.eq(project_id))
                .filter(feedback::created_at.lt(cutoff)),
        )
        .execute(conn)?;

        if deleted > 0 {
            info!(project_id = %project_id, deleted, "Purged expired feedback");
        }
        total += deleted;
    }

    record_retention_purge(total);
    Ok(total)
}

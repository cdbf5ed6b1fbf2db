//! Read operations for the `interaction_events` log.

use chrono::{DateTime, NaiveDate, Utc};
use igtrack_core::EventType;
use sqlx::PgPool;

use crate::DbError;

/// An event joined with its profile's username and, when present, its
/// attribution.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    pub id: i64,
    pub profile_id: i64,
    pub username: String,
    pub event_type: String,
    pub event_ts: DateTime<Utc>,
    pub snapshot_date: NaiveDate,
    pub attribution_reason: Option<String>,
    pub campaign_name: Option<String>,
}

impl EventRow {
    /// Parses the stored `event_type` text.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidValue`] if the column holds an unknown type.
    pub fn event_type(&self) -> Result<EventType, DbError> {
        self.event_type
            .parse()
            .map_err(|_| DbError::InvalidValue(format!("event_type '{}'", self.event_type)))
    }
}

/// Returns a profile's timeline, oldest first (`event_ts`, then insertion order).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_profile_events(
    pool: &PgPool,
    profile_id: i64,
) -> Result<Vec<EventRow>, DbError> {
    let rows = sqlx::query_as::<_, EventRow>(
        "SELECT e.id, e.profile_id, p.current_username AS username, e.event_type, e.event_ts, \
                e.snapshot_date, a.reason AS attribution_reason, c.name AS campaign_name \
         FROM interaction_events e \
         JOIN profiles p ON p.id = e.profile_id \
         LEFT JOIN attributions a ON a.event_id = e.id \
         LEFT JOIN campaigns c ON c.id = a.campaign_id \
         WHERE e.profile_id = $1 \
         ORDER BY e.event_ts, e.id",
    )
    .bind(profile_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns the newest events across all profiles, optionally of one type.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_recent_events(
    pool: &PgPool,
    event_type: Option<EventType>,
    limit: i64,
) -> Result<Vec<EventRow>, DbError> {
    let rows = sqlx::query_as::<_, EventRow>(
        "SELECT e.id, e.profile_id, p.current_username AS username, e.event_type, e.event_ts, \
                e.snapshot_date, a.reason AS attribution_reason, c.name AS campaign_name \
         FROM interaction_events e \
         JOIN profiles p ON p.id = e.profile_id \
         LEFT JOIN attributions a ON a.event_id = e.id \
         LEFT JOIN campaigns c ON c.id = a.campaign_id \
         WHERE ($1::text IS NULL OR e.event_type = $1) \
         ORDER BY e.event_ts DESC, e.id DESC \
         LIMIT $2",
    )
    .bind(event_type.map(EventType::as_str))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

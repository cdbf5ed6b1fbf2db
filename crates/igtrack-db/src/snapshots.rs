//! Read operations for the `snapshots` table.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `snapshots` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SnapshotRow {
    pub id: i64,
    pub snapshot_date: NaiveDate,
    pub source_filename: String,
    /// `"archive"` when the date came from member timestamps inside the zip,
    /// `"filename"` when it was parsed from the archive name.
    pub date_source: String,
    pub profiles_created: i32,
    pub events_created: i32,
    pub profiles_updated: i32,
    pub ingested_at: DateTime<Utc>,
}

/// Returns the most recent snapshots, newest `snapshot_date` first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_snapshots(pool: &PgPool, limit: i64) -> Result<Vec<SnapshotRow>, DbError> {
    let rows = sqlx::query_as::<_, SnapshotRow>(
        "SELECT id, snapshot_date, source_filename, date_source, profiles_created, \
                events_created, profiles_updated, ingested_at \
         FROM snapshots \
         ORDER BY snapshot_date DESC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns the snapshot ingested for `snapshot_date`, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_snapshot_by_date(
    pool: &PgPool,
    snapshot_date: NaiveDate,
) -> Result<Option<SnapshotRow>, DbError> {
    let row = sqlx::query_as::<_, SnapshotRow>(
        "SELECT id, snapshot_date, source_filename, date_source, profiles_created, \
                events_created, profiles_updated, ingested_at \
         FROM snapshots \
         WHERE snapshot_date = $1",
    )
    .bind(snapshot_date)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

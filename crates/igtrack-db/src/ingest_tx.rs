//! Statements that make up one ingestion transaction.
//!
//! Every function takes a `&mut PgConnection` so the caller can run them all
//! inside a single `sqlx::Transaction`. None of them commits.

use chrono::{DateTime, NaiveDate, Utc};
use igtrack_core::{FlagDelta, NewInteractionEvent, ProfileFlags, ProfileState};
use sqlx::PgConnection;

use crate::snapshots::SnapshotRow;
use crate::DbError;

/// Key for the transaction-scoped advisory lock that serialises ingestions.
const INGEST_LOCK_KEY: i64 = 0x6967_7472_6163_6b01;

/// A profile to create if its username has never been seen.
#[derive(Debug, Clone)]
pub struct NewProfile<'a> {
    pub username: &'a str,
    pub first_seen_ts: DateTime<Utc>,
}

/// Marker row for a successfully ingested snapshot date.
#[derive(Debug, Clone)]
pub struct NewSnapshot<'a> {
    pub snapshot_date: NaiveDate,
    pub source_filename: &'a str,
    /// `"archive"` or `"filename"`.
    pub date_source: &'a str,
    pub profiles_created: i32,
    pub events_created: i32,
    pub profiles_updated: i32,
}

#[derive(Debug, sqlx::FromRow)]
struct ProfileFlagsRow {
    id: i64,
    current_username: String,
    is_active_follower: bool,
    is_currently_following: bool,
    is_pending_outbound_request: bool,
}

impl From<ProfileFlagsRow> for ProfileState {
    fn from(row: ProfileFlagsRow) -> Self {
        ProfileState {
            profile_id: row.id,
            username: row.current_username,
            flags: ProfileFlags {
                is_active_follower: row.is_active_follower,
                is_currently_following: row.is_currently_following,
                is_pending_outbound_request: row.is_pending_outbound_request,
            },
        }
    }
}

/// Blocks until no other ingestion holds the lock. Released automatically at
/// commit or rollback.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn acquire_ingest_lock(conn: &mut PgConnection) -> Result<(), DbError> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(INGEST_LOCK_KEY)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Returns `true` if a snapshot row already exists for `snapshot_date`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn snapshot_exists(
    conn: &mut PgConnection,
    snapshot_date: NaiveDate,
) -> Result<bool, DbError> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM snapshots WHERE snapshot_date = $1)")
            .bind(snapshot_date)
            .fetch_one(&mut *conn)
            .await?;
    Ok(exists)
}

/// Inserts profiles for usernames not yet in the table; existing rows are
/// left untouched.
///
/// Returns the number of profiles actually created.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn upsert_new_profiles(
    conn: &mut PgConnection,
    profiles: &[NewProfile<'_>],
) -> Result<u64, DbError> {
    if profiles.is_empty() {
        return Ok(0);
    }

    let usernames: Vec<&str> = profiles.iter().map(|p| p.username).collect();
    let first_seen: Vec<DateTime<Utc>> = profiles.iter().map(|p| p.first_seen_ts).collect();

    let created = sqlx::query(
        "INSERT INTO profiles (current_username, first_seen_ts) \
         SELECT u, ts FROM UNNEST($1::text[], $2::timestamptz[]) AS t(u, ts) \
         ON CONFLICT (current_username) DO NOTHING",
    )
    .bind(&usernames)
    .bind(&first_seen)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    Ok(created)
}

/// Loads the pre-ingestion state of every relevant profile: those named in
/// `usernames` plus any profile currently flagged true on some axis.
///
/// Rows are locked `FOR UPDATE` and ordered by username.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn load_relevant_profiles(
    conn: &mut PgConnection,
    usernames: &[&str],
) -> Result<Vec<ProfileState>, DbError> {
    let rows = sqlx::query_as::<_, ProfileFlagsRow>(
        "SELECT id, current_username, is_active_follower, is_currently_following, \
                is_pending_outbound_request \
         FROM profiles \
         WHERE current_username = ANY($1::text[]) \
            OR is_active_follower \
            OR is_currently_following \
            OR is_pending_outbound_request \
         ORDER BY current_username \
         FOR UPDATE",
    )
    .bind(usernames)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(ProfileState::from).collect())
}

/// Appends events in slice order so that `id` follows emission order.
///
/// Returns the number of rows inserted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_events(
    conn: &mut PgConnection,
    snapshot_date: NaiveDate,
    events: &[NewInteractionEvent],
) -> Result<u64, DbError> {
    if events.is_empty() {
        return Ok(0);
    }

    let profile_ids: Vec<i64> = events.iter().map(|e| e.profile_id).collect();
    let event_types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    let event_ts: Vec<DateTime<Utc>> = events.iter().map(|e| e.event_ts).collect();

    let inserted = sqlx::query(
        "INSERT INTO interaction_events (profile_id, event_type, event_ts, snapshot_date) \
         SELECT p, e, ts, $4 \
         FROM UNNEST($1::bigint[], $2::text[], $3::timestamptz[]) WITH ORDINALITY AS t(p, e, ts, ord) \
         ORDER BY ord",
    )
    .bind(&profile_ids)
    .bind(&event_types)
    .bind(&event_ts)
    .bind(snapshot_date)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    Ok(inserted)
}

/// Applies merged flag deltas, one row per profile. Axes left as `None` keep
/// their stored value.
///
/// Returns the number of profiles updated.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn set_profile_flags(
    conn: &mut PgConnection,
    deltas: &[FlagDelta],
) -> Result<u64, DbError> {
    if deltas.is_empty() {
        return Ok(0);
    }

    let ids: Vec<i64> = deltas.iter().map(|d| d.profile_id).collect();
    let follower: Vec<Option<bool>> = deltas.iter().map(|d| d.is_active_follower).collect();
    let following: Vec<Option<bool>> = deltas.iter().map(|d| d.is_currently_following).collect();
    let pending: Vec<Option<bool>> = deltas
        .iter()
        .map(|d| d.is_pending_outbound_request)
        .collect();

    let updated = sqlx::query(
        "UPDATE profiles AS p SET \
             is_active_follower          = COALESCE(d.follower, p.is_active_follower), \
             is_currently_following      = COALESCE(d.following, p.is_currently_following), \
             is_pending_outbound_request = COALESCE(d.pending, p.is_pending_outbound_request), \
             updated_at                  = NOW() \
         FROM UNNEST($1::bigint[], $2::bool[], $3::bool[], $4::bool[]) \
              AS d(id, follower, following, pending) \
         WHERE p.id = d.id",
    )
    .bind(&ids)
    .bind(&follower)
    .bind(&following)
    .bind(&pending)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    Ok(updated)
}

/// Inserts the snapshot marker row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails; a unique violation means
/// the date was ingested concurrently (see [`DbError::is_unique_violation`]).
pub async fn insert_snapshot(
    conn: &mut PgConnection,
    snapshot: &NewSnapshot<'_>,
) -> Result<SnapshotRow, DbError> {
    let row = sqlx::query_as::<_, SnapshotRow>(
        "INSERT INTO snapshots \
             (snapshot_date, source_filename, date_source, profiles_created, \
              events_created, profiles_updated) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING id, snapshot_date, source_filename, date_source, profiles_created, \
                   events_created, profiles_updated, ingested_at",
    )
    .bind(snapshot.snapshot_date)
    .bind(snapshot.source_filename)
    .bind(snapshot.date_source)
    .bind(snapshot.profiles_created)
    .bind(snapshot.events_created)
    .bind(snapshot.profiles_updated)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row)
}

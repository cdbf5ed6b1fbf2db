//! Read operations for the `profiles` table.
//!
//! Flags are written only by the ingestion transaction (see `ingest_tx`).

use chrono::{DateTime, Utc};
use igtrack_core::{ProfileFlags, RelationshipKind};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `profiles` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProfileRow {
    pub id: i64,
    pub current_username: String,
    pub is_active_follower: bool,
    pub is_currently_following: bool,
    pub is_pending_outbound_request: bool,
    pub first_seen_ts: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProfileRow {
    #[must_use]
    pub fn flags(&self) -> ProfileFlags {
        ProfileFlags {
            is_active_follower: self.is_active_follower,
            is_currently_following: self.is_currently_following,
            is_pending_outbound_request: self.is_pending_outbound_request,
        }
    }
}

/// Restricts [`list_profiles`] to profiles currently flagged on one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileStatusFilter {
    All,
    Only(RelationshipKind),
}

/// Lists profiles ordered by username.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_profiles(
    pool: &PgPool,
    filter: ProfileStatusFilter,
    limit: i64,
) -> Result<Vec<ProfileRow>, DbError> {
    let predicate = match filter {
        ProfileStatusFilter::All => "TRUE",
        ProfileStatusFilter::Only(RelationshipKind::Followers) => "is_active_follower",
        ProfileStatusFilter::Only(RelationshipKind::Following) => "is_currently_following",
        ProfileStatusFilter::Only(RelationshipKind::Pending) => "is_pending_outbound_request",
    };

    // `predicate` is one of the fixed column names above, never user input.
    let sql = format!(
        "SELECT id, current_username, is_active_follower, is_currently_following, \
                is_pending_outbound_request, first_seen_ts, notes, created_at, updated_at \
         FROM profiles \
         WHERE {predicate} \
         ORDER BY current_username \
         LIMIT $1"
    );

    let rows = sqlx::query_as::<_, ProfileRow>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Returns the profile whose current username is exactly `username`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_profile_by_username(
    pool: &PgPool,
    username: &str,
) -> Result<Option<ProfileRow>, DbError> {
    let row = sqlx::query_as::<_, ProfileRow>(
        "SELECT id, current_username, is_active_follower, is_currently_following, \
                is_pending_outbound_request, first_seen_ts, notes, created_at, updated_at \
         FROM profiles \
         WHERE current_username = $1",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

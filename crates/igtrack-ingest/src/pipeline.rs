//! Ingestion pipeline: parse, date, diff, and persist one snapshot.
//!
//! Everything before [`ingest_prepared`] is pure. The persistence step runs
//! as one database transaction serialized against other ingestions by an
//! advisory lock; any failure, including the timeout, rolls it back.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use igtrack_core::{AppConfig, EventType, RelationshipKind, SnapshotMaps};
use igtrack_db::{
    acquire_ingest_lock, insert_events, insert_snapshot, load_relevant_profiles,
    set_profile_flags, snapshot_exists, upsert_new_profiles, NewProfile, NewSnapshot,
};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};

use crate::archive::read_export_archive;
use crate::diff::compute_diff;
use crate::export::{merge_relationships, parse_relationships};
use crate::snapshot_date::{resolve_snapshot_date, DateSource, ResolvedSnapshot};
use crate::window::plausible_millis;
use crate::IngestError;

const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Parsed and dated input, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSnapshot {
    pub maps: SnapshotMaps,
    pub resolved: ResolvedSnapshot,
    pub source_filename: String,
    /// Reference time for every plausibility check of this ingestion.
    pub prepared_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Upper bound on the transaction steps; commit runs outside it.
    pub timeout: Duration,
    /// Run every step, then roll back instead of committing.
    pub dry_run: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            dry_run: false,
        }
    }
}

impl IngestOptions {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.ingest_timeout_secs),
            dry_run: false,
        }
    }

    #[must_use]
    pub fn with_dry_run(self, dry_run: bool) -> Self {
        Self { dry_run, ..self }
    }
}

/// What one ingestion did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub snapshot_date: NaiveDate,
    pub date_source: DateSource,
    pub source_filename: String,
    pub profiles_created: u64,
    pub events_created: u64,
    pub events_by_type: BTreeMap<EventType, usize>,
    pub profiles_updated: u64,
    pub dry_run: bool,
}

/// Parses three raw export payloads and dates them from `filename`.
///
/// # Errors
///
/// Returns [`IngestError::Parse`] for a malformed payload, or
/// [`IngestError::DateResolution`] if `filename` carries no usable date.
pub fn prepare_from_payloads(
    followers: &str,
    following: &str,
    pending: &str,
    filename: &str,
    now: DateTime<Utc>,
) -> Result<PreparedSnapshot, IngestError> {
    let maps = SnapshotMaps {
        followers: parse_relationships(RelationshipKind::Followers, followers)?,
        following: parse_relationships(RelationshipKind::Following, following)?,
        pending: parse_relationships(RelationshipKind::Pending, pending)?,
    };
    let resolved = resolve_snapshot_date(filename, &[], now)?;

    Ok(PreparedSnapshot {
        maps,
        resolved,
        source_filename: filename.to_string(),
        prepared_at: now,
    })
}

/// Reads an export `.zip`, parses its payloads, and dates it from member
/// timestamps or `filename`.
///
/// # Errors
///
/// Returns the archive errors of [`read_export_archive`], [`IngestError::Parse`]
/// for a malformed member, or [`IngestError::DateResolution`].
pub fn prepare_from_archive(
    bytes: &[u8],
    filename: &str,
    now: DateTime<Utc>,
) -> Result<PreparedSnapshot, IngestError> {
    let archive = read_export_archive(bytes)?;

    let mut maps = SnapshotMaps::default();
    for part in &archive.followers {
        merge_relationships(&mut maps.followers, RelationshipKind::Followers, part)?;
    }
    maps.following = parse_relationships(RelationshipKind::Following, &archive.following)?;
    if let Some(pending) = &archive.pending {
        maps.pending = parse_relationships(RelationshipKind::Pending, pending)?;
    }

    let resolved = resolve_snapshot_date(filename, &archive.member_timestamps, now)?;

    Ok(PreparedSnapshot {
        maps,
        resolved,
        source_filename: filename.to_string(),
        prepared_at: now,
    })
}

/// Persists a prepared snapshot atomically.
///
/// # Errors
///
/// - [`IngestError::DuplicateSnapshot`] if the date was already ingested.
/// - [`IngestError::Timeout`] if the transaction exceeds `options.timeout`.
/// - [`IngestError::Db`] for any storage failure.
///
/// Stored state is unchanged whenever an error is returned.
pub async fn ingest_prepared(
    pool: &PgPool,
    prepared: &PreparedSnapshot,
    options: IngestOptions,
) -> Result<IngestSummary, IngestError> {
    let snapshot_date = prepared.resolved.snapshot_date;
    if prepared.maps.is_empty() {
        tracing::warn!(%snapshot_date, "snapshot lists no relationships; all flags will clear");
    }
    tracing::info!(
        %snapshot_date,
        date_source = %prepared.resolved.source,
        filename = %prepared.source_filename,
        dry_run = options.dry_run,
        "ingesting snapshot"
    );

    let result = run_with_deadline(pool, prepared, options).await;

    match &result {
        Ok(summary) => tracing::info!(
            %snapshot_date,
            profiles_created = summary.profiles_created,
            events_created = summary.events_created,
            profiles_updated = summary.profiles_updated,
            dry_run = summary.dry_run,
            "snapshot ingested"
        ),
        Err(IngestError::DuplicateSnapshot { .. }) => {
            tracing::warn!(%snapshot_date, "snapshot already ingested; skipping");
        }
        Err(e) => tracing::error!(%snapshot_date, error = %e, "snapshot ingestion failed"),
    }

    result
}

/// Runs the transaction steps under `options.timeout`, then commits or rolls
/// back outside it. Once `COMMIT` is sent the outcome is reported as-is, so a
/// timeout always means nothing was applied.
async fn run_with_deadline(
    pool: &PgPool,
    prepared: &PreparedSnapshot,
    options: IngestOptions,
) -> Result<IngestSummary, IngestError> {
    let mut tx = pool.begin().await?;

    let deadline =
        tokio::time::timeout(options.timeout, apply_steps(&mut tx, prepared, options.dry_run))
            .await;
    let staged = match deadline {
        Ok(staged) => staged?,
        Err(_) => {
            // Dropping the transaction rolls it back.
            drop(tx);
            return Err(IngestError::Timeout {
                secs: options.timeout.as_secs(),
            });
        }
    };

    finish(tx, staged).await
}

/// Lock, duplicate check, profile upsert, diff, event and flag writes, and
/// the snapshot row. Leaves the transaction open.
async fn apply_steps(
    tx: &mut Transaction<'_, Postgres>,
    prepared: &PreparedSnapshot,
    dry_run: bool,
) -> Result<IngestSummary, IngestError> {
    let ResolvedSnapshot {
        snapshot_date,
        fallback_ts,
        source,
    } = prepared.resolved;
    let maps = &prepared.maps;
    let now = prepared.prepared_at;

    acquire_ingest_lock(&mut **tx).await?;

    if snapshot_exists(&mut **tx, snapshot_date).await? {
        return Err(IngestError::DuplicateSnapshot { snapshot_date });
    }

    let usernames: Vec<&str> = maps.usernames().into_iter().collect();
    let new_profiles: Vec<NewProfile<'_>> = usernames
        .iter()
        .map(|&username| NewProfile {
            username,
            first_seen_ts: maps
                .timestamps_for(username)
                .filter_map(|ms| plausible_millis(ms, now))
                .min()
                .unwrap_or(fallback_ts),
        })
        .collect();
    let profiles_created = upsert_new_profiles(&mut **tx, &new_profiles).await?;

    let current = load_relevant_profiles(&mut **tx, &usernames).await?;
    let outcome = compute_diff(maps, &current, fallback_ts, now);
    tracing::debug!(
        relevant = current.len(),
        events = outcome.events.len(),
        deltas = outcome.deltas.len(),
        "diff computed"
    );

    let events_created = insert_events(&mut **tx, snapshot_date, &outcome.events).await?;
    let profiles_updated = set_profile_flags(&mut **tx, &outcome.deltas).await?;

    insert_snapshot(
        &mut **tx,
        &NewSnapshot {
            snapshot_date,
            source_filename: &prepared.source_filename,
            date_source: source.as_str(),
            profiles_created: saturating_i32(profiles_created),
            events_created: saturating_i32(events_created),
            profiles_updated: saturating_i32(profiles_updated),
        },
    )
    .await
    .map_err(|e| {
        if e.is_unique_violation() {
            IngestError::DuplicateSnapshot { snapshot_date }
        } else {
            IngestError::Db(e)
        }
    })?;

    Ok(IngestSummary {
        snapshot_date,
        date_source: source,
        source_filename: prepared.source_filename.clone(),
        profiles_created,
        events_created,
        events_by_type: outcome.events_by_type(),
        profiles_updated,
        dry_run,
    })
}

/// Commits the staged work, or rolls it back for a dry run. Not bounded by
/// the ingestion timeout.
async fn finish(
    tx: Transaction<'_, Postgres>,
    staged: IngestSummary,
) -> Result<IngestSummary, IngestError> {
    if staged.dry_run {
        tx.rollback().await?;
    } else {
        tx.commit().await?;
    }
    Ok(staged)
}

fn saturating_i32(value: u64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Parses, dates, and persists three raw export payloads.
///
/// # Errors
///
/// See [`prepare_from_payloads`] and [`ingest_prepared`].
pub async fn ingest_payloads(
    pool: &PgPool,
    followers: &str,
    following: &str,
    pending: &str,
    filename: &str,
    options: IngestOptions,
) -> Result<IngestSummary, IngestError> {
    let prepared = prepare_from_payloads(followers, following, pending, filename, Utc::now())?;
    ingest_prepared(pool, &prepared, options).await
}

/// Reads, dates, and persists one export archive.
///
/// # Errors
///
/// See [`prepare_from_archive`] and [`ingest_prepared`].
pub async fn ingest_archive(
    pool: &PgPool,
    bytes: &[u8],
    filename: &str,
    options: IngestOptions,
) -> Result<IngestSummary, IngestError> {
    let prepared = prepare_from_archive(bytes, filename, Utc::now())?;
    ingest_prepared(pool, &prepared, options).await
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn prepare_from_payloads_dates_by_filename() {
        let prepared = prepare_from_payloads(
            r#"[{"string_list_data":[{"value":"alice","timestamp":1700000000}]}]"#,
            r#"{"relationships_following":[]}"#,
            r#"{"relationships_follow_requests_sent":[]}"#,
            "instagram-carol-2025-06-13-abcd.zip",
            now(),
        )
        .unwrap();

        assert_eq!(
            prepared.resolved.snapshot_date,
            NaiveDate::from_ymd_opt(2025, 6, 13).unwrap()
        );
        assert_eq!(prepared.resolved.source, DateSource::Filename);
        assert_eq!(
            prepared.maps.followers.get("alice"),
            Some(&Some(1_700_000_000_000))
        );
        assert!(prepared.maps.following.is_empty());
    }

    #[test]
    fn prepare_from_payloads_names_the_bad_payload() {
        let err = prepare_from_payloads("[]", "not json", "[]", "x-2025-06-13.zip", now())
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::Parse {
                payload: RelationshipKind::Following,
                ..
            }
        ));
    }

    #[test]
    fn prepare_from_payloads_without_date_fails() {
        let err = prepare_from_payloads("[]", "[]", "[]", "export.zip", now()).unwrap_err();
        assert!(matches!(err, IngestError::DateResolution { .. }));
    }

    #[test]
    fn options_follow_config_timeout() {
        let config = AppConfig {
            ingest_timeout_secs: 42,
            ..test_config()
        };
        let options = IngestOptions::from_config(&config).with_dry_run(true);
        assert_eq!(options.timeout, Duration::from_secs(42));
        assert!(options.dry_run);
        assert_eq!(
            IngestOptions::default().timeout,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        );
    }

    #[test]
    fn summary_serializes_event_types_by_wire_name() {
        let summary = IngestSummary {
            snapshot_date: NaiveDate::from_ymd_opt(2025, 6, 13).unwrap(),
            date_source: DateSource::Archive,
            source_filename: "a.zip".to_string(),
            profiles_created: 1,
            events_created: 1,
            events_by_type: BTreeMap::from([(EventType::FollowedMe, 1)]),
            profiles_updated: 1,
            dry_run: false,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["date_source"], "archive");
        assert_eq!(json["snapshot_date"], "2025-06-13");
        assert_eq!(json["events_by_type"]["FOLLOWED_ME"], 1);
    }

    fn alice_follows() -> PreparedSnapshot {
        prepare_from_payloads(
            r#"[{"string_list_data":[{"value":"alice","timestamp":1700000000}]}]"#,
            r#"{"relationships_following":[]}"#,
            r#"{"relationships_follow_requests_sent":[]}"#,
            "instagram-carol-2025-06-13.zip",
            now(),
        )
        .unwrap()
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn commit_is_not_bounded_by_the_step_deadline(pool: PgPool) {
        let prepared = alice_follows();
        let deadline = Duration::from_secs(2);

        let mut tx = pool.begin().await.unwrap();
        let staged = tokio::time::timeout(deadline, apply_steps(&mut tx, &prepared, false))
            .await
            .expect("steps finish within the deadline")
            .unwrap();

        let date = prepared.resolved.snapshot_date;
        assert!(igtrack_db::get_snapshot_by_date(&pool, date)
            .await
            .unwrap()
            .is_none());

        tokio::time::sleep(deadline + Duration::from_millis(500)).await;
        let summary = finish(tx, staged).await.unwrap();

        assert_eq!(summary.events_created, 1);
        assert!(!summary.dry_run);
        assert!(igtrack_db::get_snapshot_by_date(&pool, date)
            .await
            .unwrap()
            .is_some());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn finish_rolls_back_a_dry_run(pool: PgPool) {
        let prepared = alice_follows();

        let mut tx = pool.begin().await.unwrap();
        let staged = apply_steps(&mut tx, &prepared, true).await.unwrap();
        let summary = finish(tx, staged).await.unwrap();

        assert!(summary.dry_run);
        assert!(igtrack_db::get_snapshot_by_date(&pool, prepared.resolved.snapshot_date)
            .await
            .unwrap()
            .is_none());
    }

    fn test_config() -> AppConfig {
        AppConfig {
            database_url: "postgres://localhost/igtrack".to_string(),
            env: igtrack_core::Environment::Test,
            bind_addr: "127.0.0.1:3000".parse().unwrap(),
            log_level: "info".to_string(),
            db_max_connections: 10,
            db_min_connections: 1,
            db_acquire_timeout_secs: 10,
            ingest_timeout_secs: 300,
            max_upload_bytes: 1024,
        }
    }
}

//! Offline unit tests for igtrack-db pool configuration and row types.
//! These tests do not require a live database connection.

use igtrack_core::{AppConfig, Environment};
use igtrack_db::{PoolConfig, ProfileRow, SnapshotRow};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let app_config = AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        ingest_timeout_secs: 300,
        max_upload_bytes: 1024,
    };

    let pool_config = PoolConfig::from_app_config(&app_config);
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[test]
fn profile_row_flags_mirror_columns() {
    use chrono::Utc;

    let row = ProfileRow {
        id: 3,
        current_username: "alice".to_string(),
        is_active_follower: true,
        is_currently_following: false,
        is_pending_outbound_request: true,
        first_seen_ts: Utc::now(),
        notes: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let flags = row.flags();
    assert!(flags.is_active_follower);
    assert!(!flags.is_currently_following);
    assert!(flags.is_pending_outbound_request);
}

/// Compile-time smoke test: confirm that [`SnapshotRow`] has all expected
/// fields with the correct types. No database required.
#[test]
fn snapshot_row_has_expected_fields() {
    use chrono::{NaiveDate, Utc};

    let row = SnapshotRow {
        id: 1_i64,
        snapshot_date: NaiveDate::from_ymd_opt(2025, 6, 13).unwrap(),
        source_filename: "instagram-carol-2025-06-13-abcd.zip".to_string(),
        date_source: "filename".to_string(),
        profiles_created: 4_i32,
        events_created: 6_i32,
        profiles_updated: 4_i32,
        ingested_at: Utc::now(),
    };

    assert_eq!(row.snapshot_date.to_string(), "2025-06-13");
    assert_eq!(row.date_source, "filename");
    assert_eq!(row.events_created, 6);
}

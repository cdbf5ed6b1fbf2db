//! Snapshot-diff ingestion for Instagram relationship exports.
//!
//! Raw export payloads are parsed into [`igtrack_core::SnapshotMaps`], dated by
//! [`snapshot_date::resolve_snapshot_date`], diffed against stored profile
//! flags by [`diff::compute_diff`], and applied atomically by [`pipeline`].

pub mod archive;
pub mod diff;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod snapshot_date;
pub mod window;

pub use archive::{read_export_archive, ExportArchive};
pub use diff::{compute_diff, DiffOutcome};
pub use error::{IngestError, IngestErrorKind};
pub use export::{merge_relationships, parse_relationships};
pub use pipeline::{
    ingest_archive, ingest_payloads, ingest_prepared, prepare_from_archive,
    prepare_from_payloads, IngestOptions, IngestSummary, PreparedSnapshot,
};
pub use snapshot_date::{date_from_filename, resolve_snapshot_date, DateSource, ResolvedSnapshot};

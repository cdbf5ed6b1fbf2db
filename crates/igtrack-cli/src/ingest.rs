//! Ingestion command handlers.
//!
//! Archives given together are all read and dated before anything is written,
//! then applied oldest snapshot first so events land in chronological order.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use igtrack_ingest::{
    ingest_prepared, prepare_from_archive, prepare_from_payloads, IngestError, IngestOptions,
    IngestSummary, PreparedSnapshot,
};

/// File inputs for `ingest-json`.
pub(crate) struct JsonInputs<'a> {
    pub followers: &'a Path,
    pub following: &'a Path,
    pub pending: Option<&'a Path>,
    pub filename: &'a str,
}

/// Orders a batch oldest snapshot first. Equal dates keep argument order.
pub(crate) fn order_oldest_first(batch: &mut [PreparedSnapshot]) {
    batch.sort_by_key(|p| p.resolved.snapshot_date);
}

pub(crate) fn format_summary(summary: &IngestSummary) -> String {
    let mut out = format!(
        "{date} ({source}) {file}: {created} profile(s) created, {events} event(s), \
         {updated} profile(s) updated{dry}",
        date = summary.snapshot_date,
        source = summary.date_source,
        file = summary.source_filename,
        created = summary.profiles_created,
        events = summary.events_created,
        updated = summary.profiles_updated,
        dry = if summary.dry_run {
            " [dry-run, rolled back]"
        } else {
            ""
        },
    );
    for (event_type, count) in &summary.events_by_type {
        let _ = write!(out, "\n  {:<26}{count}", event_type.as_str());
    }
    out
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or_else(|| path.display().to_string(), ToOwned::to_owned)
}

/// Ingest a batch of export archives.
///
/// A snapshot date that was already ingested is reported and skipped; any
/// other failure stops the batch. Archives applied before the failure stay
/// committed.
///
/// # Errors
///
/// Returns an error if any archive cannot be read or dated, or if an
/// ingestion fails for a reason other than a duplicate snapshot.
pub(crate) async fn run_ingest_archives(
    pool: &sqlx::PgPool,
    options: IngestOptions,
    paths: &[PathBuf],
) -> anyhow::Result<()> {
    let now = Utc::now();
    let mut batch = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let prepared = prepare_from_archive(&bytes, &display_name(path), now)
            .with_context(|| format!("failed to prepare {}", path.display()))?;
        tracing::debug!(
            file = %path.display(),
            snapshot_date = %prepared.resolved.snapshot_date,
            "archive prepared"
        );
        batch.push(prepared);
    }
    order_oldest_first(&mut batch);

    if options.dry_run && batch.len() > 1 {
        println!("dry-run: each archive is diffed against the committed state only");
    }

    let mut ingested = 0_usize;
    let mut skipped = 0_usize;
    for prepared in &batch {
        match ingest_prepared(pool, prepared, options).await {
            Ok(summary) => {
                ingested += 1;
                println!("{}", format_summary(&summary));
            }
            Err(IngestError::DuplicateSnapshot { snapshot_date }) => {
                skipped += 1;
                println!(
                    "skipped {}: snapshot for {snapshot_date} already ingested",
                    prepared.source_filename
                );
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("failed to ingest {}", prepared.source_filename)));
            }
        }
    }

    println!("{ingested} archive(s) ingested, {skipped} skipped");
    Ok(())
}

async fn read_payload(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

/// Ingest raw followers/following/pending JSON files as one snapshot.
///
/// # Errors
///
/// Returns an error if a file cannot be read or the ingestion fails.
pub(crate) async fn run_ingest_json(
    pool: &sqlx::PgPool,
    options: IngestOptions,
    inputs: &JsonInputs<'_>,
) -> anyhow::Result<()> {
    let followers = read_payload(inputs.followers).await?;
    let following = read_payload(inputs.following).await?;
    let pending = match inputs.pending {
        Some(path) => read_payload(path).await?,
        None => "[]".to_string(),
    };

    let prepared =
        prepare_from_payloads(&followers, &following, &pending, inputs.filename, Utc::now())?;
    let summary = ingest_prepared(pool, &prepared, options).await?;
    println!("{}", format_summary(&summary));
    Ok(())
}

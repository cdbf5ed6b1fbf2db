//! Canonical snapshot date resolution.
//!
//! The date identifies a snapshot for idempotency and stamps absence-driven
//! events. In-archive member timestamps win over a `YYYY-MM-DD` fragment in
//! the archive filename.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::Serialize;

use crate::window::is_plausible;
use crate::IngestError;

static FILENAME_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").expect("valid regex"));

/// Where the snapshot date came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DateSource {
    Archive,
    Filename,
}

impl DateSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DateSource::Archive => "archive",
            DateSource::Filename => "filename",
        }
    }
}

impl std::fmt::Display for DateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resolved identity of one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSnapshot {
    /// Calendar date used for the idempotency guard.
    pub snapshot_date: NaiveDate,
    /// Default event time when no better per-event timestamp exists.
    pub fallback_ts: DateTime<Utc>,
    pub source: DateSource,
}

/// Resolves the snapshot date for an upload.
///
/// The latest of `member_timestamps` is used when it lies inside the
/// plausibility window relative to `now`; otherwise the first valid
/// `YYYY-MM-DD` in `filename` is used, stamped at midnight UTC.
///
/// # Errors
///
/// Returns [`IngestError::DateResolution`] if neither source yields a date.
pub fn resolve_snapshot_date(
    filename: &str,
    member_timestamps: &[DateTime<Utc>],
    now: DateTime<Utc>,
) -> Result<ResolvedSnapshot, IngestError> {
    if let Some(latest) = member_timestamps.iter().max().copied() {
        if is_plausible(latest, now) {
            return Ok(ResolvedSnapshot {
                snapshot_date: latest.date_naive(),
                fallback_ts: latest,
                source: DateSource::Archive,
            });
        }
        tracing::debug!(%latest, "archive member timestamp outside plausible window");
    }

    let date = date_from_filename(filename).ok_or_else(|| IngestError::DateResolution {
        filename: filename.to_string(),
    })?;

    Ok(ResolvedSnapshot {
        snapshot_date: date,
        fallback_ts: date.and_time(chrono::NaiveTime::MIN).and_utc(),
        source: DateSource::Filename,
    })
}

/// Extracts the first valid `YYYY-MM-DD` date embedded in `filename`.
#[must_use]
pub fn date_from_filename(filename: &str) -> Option<NaiveDate> {
    FILENAME_DATE_RE.captures_iter(filename).find_map(|caps| {
        let year = caps[1].parse::<i32>().ok()?;
        let month = caps[2].parse::<u32>().ok()?;
        let day = caps[3].parse::<u32>().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

use chrono::NaiveDate;
use igtrack_core::RelationshipKind;
use igtrack_db::DbError;
use thiserror::Error;

/// Errors returned by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    /// A payload was not valid JSON or did not match the export shape.
    #[error("failed to parse {payload} export: {source}")]
    Parse {
        payload: RelationshipKind,
        #[source]
        source: serde_json::Error,
    },

    /// The uploaded archive is not a readable zip file.
    #[error("invalid export archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// A member of the archive could not be read as UTF-8 text.
    #[error("failed to read archive member {member}: {source}")]
    ArchiveMember {
        member: String,
        #[source]
        source: std::io::Error,
    },

    /// A located member decompressed past the size cap.
    #[error("archive member {member} exceeds {limit} bytes")]
    ArchiveMemberTooLarge { member: String, limit: u64 },

    /// A required export file is not present in the archive.
    #[error("export archive has no {member} file")]
    MissingArchiveMember { member: &'static str },

    /// Neither archive timestamps nor the filename yielded a usable date.
    #[error("could not resolve a snapshot date from archive contents or filename \"{filename}\"")]
    DateResolution { filename: String },

    /// A snapshot for this date has already been ingested.
    #[error("snapshot for {snapshot_date} has already been ingested")]
    DuplicateSnapshot { snapshot_date: NaiveDate },

    /// The ingestion transaction ran past the configured limit and was rolled back.
    #[error("ingestion transaction exceeded {secs}s and was rolled back")]
    Timeout { secs: u64 },

    #[error("database error: {0}")]
    Db(#[from] DbError),
}

impl From<sqlx::Error> for IngestError {
    fn from(err: sqlx::Error) -> Self {
        IngestError::Db(DbError::Sqlx(err))
    }
}

/// Coarse classification of [`IngestError`] for callers that map failures to
/// responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestErrorKind {
    InputFormat,
    DateResolution,
    Conflict,
    Storage,
}

impl IngestError {
    #[must_use]
    pub fn kind(&self) -> IngestErrorKind {
        match self {
            IngestError::Parse { .. }
            | IngestError::Archive(_)
            | IngestError::ArchiveMember { .. }
            | IngestError::ArchiveMemberTooLarge { .. }
            | IngestError::MissingArchiveMember { .. } => IngestErrorKind::InputFormat,
            IngestError::DateResolution { .. } => IngestErrorKind::DateResolution,
            IngestError::DuplicateSnapshot { .. } => IngestErrorKind::Conflict,
            IngestError::Timeout { .. } | IngestError::Db(_) => IngestErrorKind::Storage,
        }
    }
}

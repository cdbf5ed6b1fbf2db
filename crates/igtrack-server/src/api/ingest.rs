//! Ingestion endpoints: raw payloads as JSON, or a whole export archive.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use igtrack_ingest::IngestSummary;
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{map_ingest_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct IngestPayloadsRequest {
    pub followers: String,
    pub following: String,
    pub pending: String,
    /// Original archive filename; only used for date fallback and the record.
    pub filename: String,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct IngestArchiveQuery {
    pub filename: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

type IngestResponse = (StatusCode, Json<ApiResponse<IngestSummary>>);

fn respond(req_id: RequestId, summary: IngestSummary) -> IngestResponse {
    let status = if summary.dry_run {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    (
        status,
        Json(ApiResponse {
            data: summary,
            meta: ResponseMeta::new(req_id.0),
        }),
    )
}

fn require_filename(req_id: &str, filename: Option<&str>) -> Result<String, ApiError> {
    match filename.map(str::trim) {
        Some(name) if !name.is_empty() => Ok(name.to_owned()),
        _ => Err(ApiError::new(
            req_id,
            "validation_error",
            "filename is required",
        )),
    }
}

/// POST /api/v1/ingest: ingest three raw export payloads.
pub(super) async fn ingest_payloads(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<IngestPayloadsRequest>,
) -> Result<IngestResponse, ApiError> {
    let filename = require_filename(&req_id.0, Some(body.filename.as_str()))?;
    let options = state.ingest.with_dry_run(body.dry_run);

    let summary = igtrack_ingest::ingest_payloads(
        &state.pool,
        &body.followers,
        &body.following,
        &body.pending,
        &filename,
        options,
    )
    .await
    .map_err(|e| map_ingest_error(req_id.0.clone(), &e))?;

    Ok(respond(req_id, summary))
}

/// POST /api/v1/ingest/archive?filename=: ingest a raw export `.zip` body.
pub(super) async fn ingest_archive(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<IngestArchiveQuery>,
    body: Bytes,
) -> Result<IngestResponse, ApiError> {
    let filename = require_filename(&req_id.0, query.filename.as_deref())?;
    if body.is_empty() {
        return Err(ApiError::new(
            &req_id.0,
            "validation_error",
            "request body must be a zip archive",
        ));
    }
    let options = state.ingest.with_dry_run(query.dry_run);

    tracing::debug!(bytes = body.len(), filename = %filename, "archive upload received");
    let summary = igtrack_ingest::ingest_archive(&state.pool, &body, &filename, options)
        .await
        .map_err(|e| map_ingest_error(req_id.0.clone(), &e))?;

    Ok(respond(req_id, summary))
}

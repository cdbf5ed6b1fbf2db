use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct SnapshotsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct SnapshotItem {
    snapshot_date: NaiveDate,
    source_filename: String,
    date_source: String,
    profiles_created: i32,
    events_created: i32,
    profiles_updated: i32,
    ingested_at: DateTime<Utc>,
}

impl From<igtrack_db::SnapshotRow> for SnapshotItem {
    fn from(row: igtrack_db::SnapshotRow) -> Self {
        Self {
            snapshot_date: row.snapshot_date,
            source_filename: row.source_filename,
            date_source: row.date_source,
            profiles_created: row.profiles_created,
            events_created: row.events_created,
            profiles_updated: row.profiles_updated,
            ingested_at: row.ingested_at,
        }
    }
}

/// GET /api/v1/snapshots: ingested snapshots, newest first.
pub(super) async fn list_snapshots(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<SnapshotsQuery>,
) -> Result<Json<ApiResponse<Vec<SnapshotItem>>>, ApiError> {
    let rows = igtrack_db::list_snapshots(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(SnapshotItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// GET /api/v1/snapshots/{date}: the snapshot ingested for one date.
pub(super) async fn get_snapshot(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(snapshot_date): Path<NaiveDate>,
) -> Result<Json<ApiResponse<SnapshotItem>>, ApiError> {
    let row = igtrack_db::get_snapshot_by_date(&state.pool, snapshot_date)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| {
            ApiError::new(
                &req_id.0,
                "not_found",
                format!("no snapshot ingested for {snapshot_date}"),
            )
        })?;

    Ok(Json(ApiResponse {
        data: SnapshotItem::from(row),
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[cfg(test)]
mod tests {
    use super::SnapshotItem;
    use chrono::{NaiveDate, Utc};

    #[test]
    fn snapshot_item_is_serializable() {
        let item = SnapshotItem {
            snapshot_date: NaiveDate::from_ymd_opt(2025, 6, 13).unwrap(),
            source_filename: "instagram-carol-2025-06-13.zip".to_string(),
            date_source: "filename".to_string(),
            profiles_created: 3,
            events_created: 4,
            profiles_updated: 2,
            ingested_at: Utc::now(),
        };

        let json = serde_json::to_string(&item).expect("serialize snapshot");
        assert!(json.contains("\"snapshot_date\":\"2025-06-13\""));
        assert!(json.contains("\"events_created\":4"));
    }
}

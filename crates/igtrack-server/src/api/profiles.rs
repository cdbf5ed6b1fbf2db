use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use igtrack_core::RelationshipKind;
use igtrack_db::ProfileStatusFilter;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::events::EventItem;
use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct ProfilesQuery {
    /// `follower`, `following`, or `pending`.
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct ProfileItem {
    id: i64,
    username: String,
    is_active_follower: bool,
    is_currently_following: bool,
    is_pending_outbound_request: bool,
    first_seen_ts: DateTime<Utc>,
    notes: Option<String>,
    updated_at: DateTime<Utc>,
}

impl From<igtrack_db::ProfileRow> for ProfileItem {
    fn from(row: igtrack_db::ProfileRow) -> Self {
        Self {
            id: row.id,
            username: row.current_username,
            is_active_follower: row.is_active_follower,
            is_currently_following: row.is_currently_following,
            is_pending_outbound_request: row.is_pending_outbound_request,
            first_seen_ts: row.first_seen_ts,
            notes: row.notes,
            updated_at: row.updated_at,
        }
    }
}

fn parse_status_filter(
    req_id: &str,
    status: Option<&str>,
) -> Result<ProfileStatusFilter, ApiError> {
    match status.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(ProfileStatusFilter::All),
        Some(raw) => raw
            .parse::<RelationshipKind>()
            .map(ProfileStatusFilter::Only)
            .map_err(|_| {
                ApiError::new(
                    req_id,
                    "validation_error",
                    format!("status must be 'follower', 'following', or 'pending', got '{raw}'"),
                )
            }),
    }
}

/// GET /api/v1/profiles: profiles by username, optionally one status only.
pub(super) async fn list_profiles(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ProfilesQuery>,
) -> Result<Json<ApiResponse<Vec<ProfileItem>>>, ApiError> {
    let filter = parse_status_filter(&req_id.0, query.status.as_deref())?;

    let rows = igtrack_db::list_profiles(&state.pool, filter, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(ProfileItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// GET /api/v1/profiles/{username}/events: a profile's timeline, oldest first.
pub(super) async fn list_profile_events(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(username): Path<String>,
) -> Result<Json<ApiResponse<Vec<EventItem>>>, ApiError> {
    let profile = igtrack_db::get_profile_by_username(&state.pool, &username)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| {
            ApiError::new(
                &req_id.0,
                "not_found",
                format!("profile '{username}' not found"),
            )
        })?;

    let rows = igtrack_db::list_profile_events(&state.pool, profile.id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(EventItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

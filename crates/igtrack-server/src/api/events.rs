use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use igtrack_core::EventType;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

const MAX_REASON_LEN: usize = 500;

#[derive(Debug, Deserialize)]
pub(super) struct EventsQuery {
    pub event_type: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct AttributionRequest {
    pub reason: String,
    pub campaign: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct AttributionSummary {
    reason: String,
    campaign: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct EventItem {
    id: i64,
    profile_id: i64,
    username: String,
    event_type: String,
    event_ts: DateTime<Utc>,
    snapshot_date: NaiveDate,
    attribution: Option<AttributionSummary>,
}

impl From<igtrack_db::EventRow> for EventItem {
    fn from(row: igtrack_db::EventRow) -> Self {
        let attribution = row.attribution_reason.map(|reason| AttributionSummary {
            reason,
            campaign: row.campaign_name,
        });
        Self {
            id: row.id,
            profile_id: row.profile_id,
            username: row.username,
            event_type: row.event_type,
            event_ts: row.event_ts,
            snapshot_date: row.snapshot_date,
            attribution,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct AttributionItem {
    event_id: i64,
    reason: String,
    campaign_id: Option<i64>,
    updated_at: DateTime<Utc>,
}

fn parse_event_type(req_id: &str, raw: Option<&str>) -> Result<Option<EventType>, ApiError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    raw.parse::<EventType>().map(Some).map_err(|_| {
        ApiError::new(
            req_id,
            "validation_error",
            format!("unknown event_type '{raw}'"),
        )
    })
}

/// GET /api/v1/events: recent events, newest first.
pub(super) async fn list_events(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<ApiResponse<Vec<EventItem>>>, ApiError> {
    let event_type = parse_event_type(&req_id.0, query.event_type.as_deref())?;

    let limit = normalize_limit(query.limit);
    let rows = igtrack_db::list_recent_events(&state.pool, event_type, limit)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(EventItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// PUT /api/v1/events/{event_id}/attribution: set why an event happened.
pub(super) async fn put_event_attribution(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(event_id): Path<i64>,
    Json(body): Json<AttributionRequest>,
) -> Result<Json<ApiResponse<AttributionItem>>, ApiError> {
    let rid = &req_id.0;

    let reason = body.reason.trim();
    if reason.is_empty() || reason.chars().count() > MAX_REASON_LEN {
        return Err(ApiError::new(
            rid,
            "validation_error",
            format!("reason must be 1-{MAX_REASON_LEN} characters"),
        ));
    }
    let campaign = body
        .campaign
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let row = igtrack_db::upsert_event_attribution(&state.pool, event_id, reason, campaign)
        .await
        .map_err(|e| match e {
            igtrack_db::DbError::NotFound => {
                ApiError::new(rid, "not_found", format!("event {event_id} not found"))
            }
            other => map_db_error(rid.clone(), &other),
        })?;

    Ok(Json(ApiResponse {
        data: AttributionItem {
            event_id: row.event_id,
            reason: row.reason,
            campaign_id: row.campaign_id,
            updated_at: row.updated_at,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_filter_parses_wire_names() {
        assert_eq!(parse_event_type("r", None).unwrap(), None);
        assert_eq!(parse_event_type("r", Some("  ")).unwrap(), None);
        assert_eq!(
            parse_event_type("r", Some("I_UNFOLLOWED")).unwrap(),
            Some(EventType::IUnfollowed)
        );
        let err = parse_event_type("r", Some("followed_me")).unwrap_err();
        assert_eq!(err.error.code, "validation_error");
    }

    #[test]
    fn event_item_nests_attribution() {
        let row = igtrack_db::EventRow {
            id: 7,
            profile_id: 3,
            username: "alice".to_string(),
            event_type: "FOLLOWED_ME".to_string(),
            event_ts: Utc::now(),
            snapshot_date: NaiveDate::from_ymd_opt(2025, 6, 13).unwrap(),
            attribution_reason: Some("giveaway".to_string()),
            campaign_name: Some("summer".to_string()),
        };

        let json = serde_json::to_value(EventItem::from(row)).expect("serialize event");
        assert_eq!(json["attribution"]["reason"], "giveaway");
        assert_eq!(json["attribution"]["campaign"], "summer");
        assert_eq!(json["event_type"], "FOLLOWED_ME");
    }
}

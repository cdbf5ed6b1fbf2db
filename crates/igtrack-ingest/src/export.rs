//! Parsing of Instagram relationship export payloads.
//!
//! ## Observed shapes
//!
//! `followers_1.json` is a bare array of items:
//!
//! ```json
//! [{"title": "", "media_list_data": [],
//!   "string_list_data": [{"href": "https://www.instagram.com/alice", "value": "alice", "timestamp": 1700000000}]}]
//! ```
//!
//! `following.json` and `pending_follow_requests.json` wrap the same items in
//! an object, keyed `relationships_following` and
//! `relationships_follow_requests_sent` respectively. Newer exports move the
//! username into the item `title` and drop `value` from the entry.
//!
//! Timestamps are seconds since the Unix epoch and may be absent.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use igtrack_core::{RelationshipKind, RelationshipMap};
use serde::Deserialize;

use crate::IngestError;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExportPayload {
    List(Vec<RelationshipItem>),
    Wrapped(BTreeMap<String, Vec<RelationshipItem>>),
}

impl ExportPayload {
    fn into_items(self) -> Vec<RelationshipItem> {
        match self {
            ExportPayload::List(items) => items,
            ExportPayload::Wrapped(groups) => groups.into_values().flatten().collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RelationshipItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    string_list_data: Vec<StringListEntry>,
}

#[derive(Debug, Deserialize)]
struct StringListEntry {
    #[serde(default)]
    value: Option<String>,
    /// Seconds since the Unix epoch.
    #[serde(default)]
    timestamp: Option<i64>,
}

/// Parses one export payload into a username to latest-timestamp map.
///
/// # Errors
///
/// Returns [`IngestError::Parse`] naming `kind` if `raw` is not valid JSON or
/// does not match the export shape.
pub fn parse_relationships(
    kind: RelationshipKind,
    raw: &str,
) -> Result<RelationshipMap, IngestError> {
    let mut map = RelationshipMap::new();
    merge_relationships(&mut map, kind, raw)?;
    Ok(map)
}

/// Parses `raw` and folds its entries into `map`.
///
/// Used directly when one list is split across several files
/// (`followers_1.json`, `followers_2.json`, ...).
///
/// # Errors
///
/// Returns [`IngestError::Parse`] naming `kind` on malformed input; `map` is
/// left unchanged in that case.
pub fn merge_relationships(
    map: &mut RelationshipMap,
    kind: RelationshipKind,
    raw: &str,
) -> Result<(), IngestError> {
    let payload: ExportPayload = serde_json::from_str(raw).map_err(|source| IngestError::Parse {
        payload: kind,
        source,
    })?;

    for item in payload.into_items() {
        if item.string_list_data.is_empty() {
            if let Some(title) = item.title.as_deref() {
                record(map, title, None);
            }
            continue;
        }

        for entry in &item.string_list_data {
            let username = entry
                .value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .or(item.title.as_deref());
            if let Some(username) = username {
                record(map, username, entry.timestamp);
            }
        }
    }

    Ok(())
}

/// Records one sighting. Repeats keep the greater timestamp; `None` never
/// replaces a known value.
fn record(map: &mut RelationshipMap, raw_username: &str, timestamp_secs: Option<i64>) {
    let username = raw_username.trim();
    if username.is_empty() {
        return;
    }

    let timestamp_ms = timestamp_secs.and_then(|secs| secs.checked_mul(1000));

    match map.entry(username.to_string()) {
        Entry::Vacant(slot) => {
            slot.insert(timestamp_ms);
        }
        Entry::Occupied(mut slot) => {
            // `None < Some(_)`, so `max` keeps any recorded value.
            let merged = (*slot.get()).max(timestamp_ms);
            slot.insert(merged);
        }
    }
}

//! Relationship snapshot types shared by the ingestion pipeline, the database
//! layer and the API.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Username to latest observed timestamp (milliseconds since the Unix epoch).
///
/// `None` means no entry for that username ever carried a timestamp. A
/// `BTreeMap` keeps iteration order stable so downstream output is
/// deterministic.
pub type RelationshipMap = BTreeMap<String, Option<i64>>;

/// Which of the three export lists a payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    /// Accounts that follow the operator.
    Followers,
    /// Accounts the operator follows.
    Following,
    /// Outbound follow requests awaiting approval.
    Pending,
}

impl RelationshipKind {
    pub const ALL: [RelationshipKind; 3] = [
        RelationshipKind::Followers,
        RelationshipKind::Following,
        RelationshipKind::Pending,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RelationshipKind::Followers => "followers",
            RelationshipKind::Following => "following",
            RelationshipKind::Pending => "pending",
        }
    }
}

impl std::fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RelationshipKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "followers" | "follower" => Ok(RelationshipKind::Followers),
            "following" => Ok(RelationshipKind::Following),
            "pending" => Ok(RelationshipKind::Pending),
            other => Err(CoreError::InvalidRelationshipKind(other.to_string())),
        }
    }
}

/// One observed follow-state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    FollowedMe,
    UnfollowedMe,
    IFollowed,
    IUnfollowed,
    FollowRequestSent,
    PendingRequestCancelled,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::FollowedMe,
        EventType::UnfollowedMe,
        EventType::IFollowed,
        EventType::IUnfollowed,
        EventType::FollowRequestSent,
        EventType::PendingRequestCancelled,
    ];

    /// Stored representation, matching the `interaction_events.event_type`
    /// check constraint.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::FollowedMe => "FOLLOWED_ME",
            EventType::UnfollowedMe => "UNFOLLOWED_ME",
            EventType::IFollowed => "I_FOLLOWED",
            EventType::IUnfollowed => "I_UNFOLLOWED",
            EventType::FollowRequestSent => "FOLLOW_REQUEST_SENT",
            EventType::PendingRequestCancelled => "PENDING_REQUEST_CANCELLED",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::InvalidEventType(s.to_string()))
    }
}

/// The three derived status flags stored on every profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFlags {
    pub is_active_follower: bool,
    pub is_currently_following: bool,
    pub is_pending_outbound_request: bool,
}

impl ProfileFlags {
    #[must_use]
    pub fn any(self) -> bool {
        self.is_active_follower || self.is_currently_following || self.is_pending_outbound_request
    }
}

/// A profile's identity plus its flags as read before an ingestion mutates
/// anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileState {
    pub profile_id: i64,
    pub username: String,
    pub flags: ProfileFlags,
}

/// An event the diff engine wants appended to the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewInteractionEvent {
    pub profile_id: i64,
    pub username: String,
    pub event_type: EventType,
    pub event_ts: DateTime<Utc>,
}

/// Merged flag changes for one profile. `None` leaves the stored value as is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlagDelta {
    pub profile_id: i64,
    pub is_active_follower: Option<bool>,
    pub is_currently_following: Option<bool>,
    pub is_pending_outbound_request: Option<bool>,
}

impl FlagDelta {
    #[must_use]
    pub fn new(profile_id: i64) -> Self {
        Self {
            profile_id,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.is_active_follower.is_none()
            && self.is_currently_following.is_none()
            && self.is_pending_outbound_request.is_none()
    }

    /// Returns `flags` with this delta applied.
    #[must_use]
    pub fn apply(&self, flags: ProfileFlags) -> ProfileFlags {
        ProfileFlags {
            is_active_follower: self.is_active_follower.unwrap_or(flags.is_active_follower),
            is_currently_following: self
                .is_currently_following
                .unwrap_or(flags.is_currently_following),
            is_pending_outbound_request: self
                .is_pending_outbound_request
                .unwrap_or(flags.is_pending_outbound_request),
        }
    }
}

/// The three parsed lists of one export snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotMaps {
    pub followers: RelationshipMap,
    pub following: RelationshipMap,
    pub pending: RelationshipMap,
}

impl SnapshotMaps {
    #[must_use]
    pub fn get(&self, kind: RelationshipKind) -> &RelationshipMap {
        match kind {
            RelationshipKind::Followers => &self.followers,
            RelationshipKind::Following => &self.following,
            RelationshipKind::Pending => &self.pending,
        }
    }

    /// Every distinct username named by any of the three lists, sorted.
    #[must_use]
    pub fn usernames(&self) -> BTreeSet<&str> {
        self.followers
            .keys()
            .chain(self.following.keys())
            .chain(self.pending.keys())
            .map(String::as_str)
            .collect()
    }

    /// All timestamps recorded for `username` across the three lists.
    pub fn timestamps_for<'a>(&'a self, username: &'a str) -> impl Iterator<Item = i64> + 'a {
        RelationshipKind::ALL
            .into_iter()
            .filter_map(move |kind| self.get(kind).get(username).copied().flatten())
    }

    /// Flags this snapshot implies for `username`. A username that is both
    /// followed and pending counts as followed only.
    #[must_use]
    pub fn expected_flags(&self, username: &str) -> ProfileFlags {
        let following = self.following.contains_key(username);
        ProfileFlags {
            is_active_follower: self.followers.contains_key(username),
            is_currently_following: following,
            is_pending_outbound_request: !following && self.pending.contains_key(username),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.followers.is_empty() && self.following.is_empty() && self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, Option<i64>)]) -> RelationshipMap {
        entries
            .iter()
            .map(|(name, ts)| ((*name).to_string(), *ts))
            .collect()
    }

    #[test]
    fn event_type_round_trips_through_str() {
        for event_type in EventType::ALL {
            let parsed: EventType = event_type.as_str().parse().unwrap();
            assert_eq!(parsed, event_type);
        }
    }

    #[test]
    fn event_type_rejects_unknown_value() {
        let err = "FOLLOWED_YOU".parse::<EventType>().unwrap_err();
        assert!(matches!(err, CoreError::InvalidEventType(ref v) if v == "FOLLOWED_YOU"));
    }

    #[test]
    fn event_type_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&EventType::PendingRequestCancelled).unwrap();
        assert_eq!(json, "\"PENDING_REQUEST_CANCELLED\"");
    }

    #[test]
    fn relationship_kind_parses_singular_follower() {
        assert_eq!(
            "follower".parse::<RelationshipKind>().unwrap(),
            RelationshipKind::Followers
        );
        assert!("blocked".parse::<RelationshipKind>().is_err());
    }

    #[test]
    fn expected_flags_prefers_following_over_pending() {
        let maps = SnapshotMaps {
            followers: RelationshipMap::new(),
            following: map(&[("dana", Some(1))]),
            pending: map(&[("dana", Some(2)), ("erin", None)]),
        };
        let dana = maps.expected_flags("dana");
        assert!(dana.is_currently_following);
        assert!(!dana.is_pending_outbound_request);

        let erin = maps.expected_flags("erin");
        assert!(erin.is_pending_outbound_request);
        assert!(!erin.is_currently_following);
    }

    #[test]
    fn usernames_are_deduplicated_and_sorted() {
        let maps = SnapshotMaps {
            followers: map(&[("zed", None), ("amy", None)]),
            following: map(&[("amy", Some(5))]),
            pending: map(&[("bob", None)]),
        };
        let names: Vec<&str> = maps.usernames().into_iter().collect();
        assert_eq!(names, vec!["amy", "bob", "zed"]);
    }

    #[test]
    fn timestamps_for_skips_missing_values() {
        let maps = SnapshotMaps {
            followers: map(&[("amy", None)]),
            following: map(&[("amy", Some(5))]),
            pending: map(&[("amy", Some(3))]),
        };
        let ts: Vec<i64> = maps.timestamps_for("amy").collect();
        assert_eq!(ts, vec![5, 3]);
    }

    #[test]
    fn flag_delta_apply_only_touches_set_axes() {
        let mut delta = FlagDelta::new(7);
        assert!(delta.is_empty());
        delta.is_currently_following = Some(true);
        delta.is_pending_outbound_request = Some(false);

        let before = ProfileFlags {
            is_active_follower: true,
            is_currently_following: false,
            is_pending_outbound_request: true,
        };
        let after = delta.apply(before);
        assert!(after.is_active_follower);
        assert!(after.is_currently_following);
        assert!(!after.is_pending_outbound_request);
    }
}

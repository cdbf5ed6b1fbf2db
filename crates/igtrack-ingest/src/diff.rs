//! State diff engine.
//!
//! Compares each relevant profile's stored flags against the flags a new
//! snapshot implies and emits the transitions between them. Pure: no I/O.
//!
//! Per axis:
//!
//! | Axis        | false -> true         | true -> false                                   |
//! |-------------|-----------------------|-------------------------------------------------|
//! | follower    | `FOLLOWED_ME`         | `UNFOLLOWED_ME`                                 |
//! | following   | `I_FOLLOWED`          | `I_UNFOLLOWED`                                  |
//! | pending     | `FOLLOW_REQUEST_SENT` | `PENDING_REQUEST_CANCELLED` unless now followed |
//!
//! A username both followed and pending counts as followed, so it never
//! raises `FOLLOW_REQUEST_SENT`, and a pending flag it carried is cleared as
//! part of `I_FOLLOWED`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use igtrack_core::{
    EventType, FlagDelta, NewInteractionEvent, ProfileFlags, ProfileState, RelationshipKind,
    SnapshotMaps,
};

use crate::window::plausible_millis;

/// Events to append and flag changes to apply for one ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffOutcome {
    /// Ordered by username, then follower/following/pending axis.
    pub events: Vec<NewInteractionEvent>,
    /// At most one entry per profile, ordered by profile id.
    pub deltas: Vec<FlagDelta>,
}

impl DiffOutcome {
    #[must_use]
    pub fn events_by_type(&self) -> BTreeMap<EventType, usize> {
        let mut counts = BTreeMap::new();
        for event in &self.events {
            *counts.entry(event.event_type).or_insert(0) += 1;
        }
        counts
    }
}

/// Computes the transitions between `current` and `maps`.
///
/// `current` must hold the pre-ingestion state of every profile named in
/// `maps` and of every profile flagged true on any axis. All transitions are
/// derived from that one reading; nothing cascades within a pass.
///
/// Presence-driven events take the username's timestamp from the matching map
/// when it is plausible relative to `now`, else `fallback_ts`.
/// Absence-driven events always take `fallback_ts`.
#[must_use]
pub fn compute_diff(
    maps: &SnapshotMaps,
    current: &[ProfileState],
    fallback_ts: DateTime<Utc>,
    now: DateTime<Utc>,
) -> DiffOutcome {
    // Sorted and deduplicated so output never depends on caller order.
    let ordered: BTreeMap<(&str, i64), &ProfileState> = current
        .iter()
        .map(|state| ((state.username.as_str(), state.profile_id), state))
        .collect();

    let mut events = Vec::new();
    let mut deltas: BTreeMap<i64, FlagDelta> = BTreeMap::new();

    for state in ordered.into_values() {
        let before = state.flags;
        let after = maps.expected_flags(&state.username);

        let presence_ts = |kind: RelationshipKind| {
            maps.get(kind)
                .get(&state.username)
                .copied()
                .flatten()
                .and_then(|ms| plausible_millis(ms, now))
                .unwrap_or(fallback_ts)
        };
        let mut emit = |event_type: EventType, event_ts: DateTime<Utc>| {
            events.push(NewInteractionEvent {
                profile_id: state.profile_id,
                username: state.username.clone(),
                event_type,
                event_ts,
            });
        };

        match (before.is_active_follower, after.is_active_follower) {
            (false, true) => emit(
                EventType::FollowedMe,
                presence_ts(RelationshipKind::Followers),
            ),
            (true, false) => emit(EventType::UnfollowedMe, fallback_ts),
            _ => {}
        }

        match (before.is_currently_following, after.is_currently_following) {
            (false, true) => emit(
                EventType::IFollowed,
                presence_ts(RelationshipKind::Following),
            ),
            (true, false) => emit(EventType::IUnfollowed, fallback_ts),
            _ => {}
        }

        // `after` already folds following-beats-pending into the pending axis.
        match (
            before.is_pending_outbound_request,
            after.is_pending_outbound_request,
        ) {
            (false, true) => emit(
                EventType::FollowRequestSent,
                presence_ts(RelationshipKind::Pending),
            ),
            (true, false) if !after.is_currently_following => {
                emit(EventType::PendingRequestCancelled, fallback_ts);
            }
            _ => {}
        }

        merge_delta(&mut deltas, state.profile_id, before, after);
    }

    DiffOutcome {
        events,
        deltas: deltas.into_values().collect(),
    }
}

/// Accumulates the changed axes of one profile into its keyed delta.
fn merge_delta(
    deltas: &mut BTreeMap<i64, FlagDelta>,
    profile_id: i64,
    before: ProfileFlags,
    after: ProfileFlags,
) {
    if before == after {
        return;
    }

    let delta = deltas
        .entry(profile_id)
        .or_insert_with(|| FlagDelta::new(profile_id));

    if before.is_active_follower != after.is_active_follower {
        delta.is_active_follower = Some(after.is_active_follower);
    }
    if before.is_currently_following != after.is_currently_following {
        delta.is_currently_following = Some(after.is_currently_following);
    }
    if before.is_pending_outbound_request != after.is_pending_outbound_request {
        delta.is_pending_outbound_request = Some(after.is_pending_outbound_request);
    }
}

#[cfg(test)]
#[path = "diff_test.rs"]
mod tests;

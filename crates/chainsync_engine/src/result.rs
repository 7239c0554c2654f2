//! Outcome of a state machine transition.

use chainsync_protocol::{EventId, SyncState};

/// Result of one transition.
///
/// The caller undoes `events_to_rollback` in reverse order, then applies
/// `new_events` in order, and persists the returned state, all in one
/// storage transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateResult<E, S = SyncState<E>> {
    /// The chain only grew; nothing has to be undone.
    Advance {
        /// State replacing the previous one.
        sync_state: S,
        /// Events to apply forward.
        new_events: Vec<E>,
    },
    /// Part of the applied chain has to be undone before applying.
    Rebase {
        /// State replacing the previous one.
        sync_state: S,
        /// Events to apply after the rollback.
        new_events: Vec<E>,
        /// Previously applied events to undo, in application order.
        events_to_rollback: Vec<E>,
    },
    /// A local push used stale ids.
    Reject {
        /// Smallest id the re-minted push may start at.
        expected_minimum_id: EventId,
    },
}

impl<E, S> UpdateResult<E, S> {
    /// Returns the tag of the result.
    pub fn tag(&self) -> &'static str {
        match self {
            UpdateResult::Advance { .. } => "advance",
            UpdateResult::Rebase { .. } => "rebase",
            UpdateResult::Reject { .. } => "reject",
        }
    }

    /// Returns the new state, unless the push was rejected.
    pub fn sync_state(&self) -> Option<&S> {
        match self {
            UpdateResult::Advance { sync_state, .. } | UpdateResult::Rebase { sync_state, .. } => {
                Some(sync_state)
            }
            UpdateResult::Reject { .. } => None,
        }
    }

    /// Events the caller must apply.
    pub fn new_events(&self) -> &[E] {
        match self {
            UpdateResult::Advance { new_events, .. } | UpdateResult::Rebase { new_events, .. } => {
                new_events
            }
            UpdateResult::Reject { .. } => &[],
        }
    }

    /// Events the caller must undo first.
    pub fn events_to_rollback(&self) -> &[E] {
        match self {
            UpdateResult::Rebase {
                events_to_rollback, ..
            } => events_to_rollback,
            _ => &[],
        }
    }

    /// Returns true for a rejected push.
    pub fn is_reject(&self) -> bool {
        matches!(self, UpdateResult::Reject { .. })
    }
}

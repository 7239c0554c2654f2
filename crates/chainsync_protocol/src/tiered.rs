//! State and payloads of the backend / leader / local pipeline.
//!
//! Same problem as [`SyncState`](crate::SyncState), with one more hop: the
//! local tier's unconfirmed events are split by whether the leader has
//! already accepted them.

use crate::event::{first_parent_gap, first_unsorted, ChainEvent};
use crate::event_id::{EventId, ROOT_ID};
use crate::state::InvariantViolation;
use serde::{Deserialize, Serialize};

/// The tier an upstream update comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    /// The leader (coordinator) between local and backend.
    Leader,
    /// The authoritative backend.
    Backend,
}

/// Events not yet confirmed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEvents<E> {
    /// Accepted by the leader, awaiting the backend.
    pub leader: Vec<E>,
    /// Not yet accepted by the leader.
    pub local: Vec<E>,
}

impl<E> PendingEvents<E> {
    /// Creates empty pending sets.
    pub fn new() -> Self {
        Self {
            leader: Vec::new(),
            local: Vec::new(),
        }
    }

    /// Returns true if nothing is pending on either tier.
    pub fn is_empty(&self) -> bool {
        self.leader.is_empty() && self.local.is_empty()
    }

    /// Total number of pending events.
    pub fn len(&self) -> usize {
        self.leader.len() + self.local.len()
    }
}

impl<E: Clone> PendingEvents<E> {
    /// Returns `leader ++ local`.
    pub fn combined(&self) -> Vec<E> {
        let mut all = Vec::with_capacity(self.len());
        all.extend(self.leader.iter().cloned());
        all.extend(self.local.iter().cloned());
        all
    }
}

impl<E> Default for PendingEvents<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Sync state of the three-tier pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieredSyncState<E> {
    /// Unconfirmed events, split by tier.
    pub pending: PendingEvents<E>,
    /// Backend-confirmed events retained for a future backend rebase.
    pub rollback_tail: Vec<E>,
    /// Global component of the last backend-confirmed event.
    pub backend_head: i64,
}

impl<E> TieredSyncState<E> {
    /// Creates the state of a fresh session.
    pub fn new() -> Self {
        Self {
            pending: PendingEvents::new(),
            rollback_tail: Vec::new(),
            backend_head: ROOT_ID.global,
        }
    }

    /// Id of the last backend-confirmed event.
    pub fn backend_head_id(&self) -> EventId {
        EventId::new(self.backend_head, 0)
    }
}

impl<E: ChainEvent> TieredSyncState<E> {
    /// Id of the last backend-confirmed event.
    ///
    /// Unlike [`backend_head_id`](Self::backend_head_id) this keeps the
    /// local component of a confirmed event that was minted locally.
    pub fn confirmed_head(&self) -> EventId {
        self.rollback_tail
            .last()
            .map_or(self.backend_head_id(), |e| e.id())
            .max(self.backend_head_id())
    }

    /// Id of the last event the leader is known to have.
    pub fn leader_head(&self) -> EventId {
        self.pending
            .leader
            .last()
            .map_or_else(|| self.confirmed_head(), |e| e.id())
    }

    /// Id of the last event in this tier's chain.
    pub fn local_head(&self) -> EventId {
        self.pending
            .local
            .last()
            .map_or_else(|| self.leader_head(), |e| e.id())
    }

    /// Verifies the structural invariants of the state: the tail and both
    /// pending sets ascend in that order, and local events are linked from
    /// the leader head.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if let Some(index) = first_unsorted(&self.rollback_tail) {
            return Err(InvariantViolation::RollbackTailNotAscending {
                index,
                id: self.rollback_tail[index].id(),
            });
        }

        let pending = self.pending.combined();
        if let Some(index) = first_unsorted(&pending) {
            return Err(InvariantViolation::PendingNotAscending {
                index,
                id: pending[index].id(),
            });
        }

        if let (Some(tail), Some(first)) = (self.rollback_tail.last(), pending.first()) {
            if !first.id().is_greater_than(&tail.id()) {
                return Err(InvariantViolation::TailOverlapsPending {
                    tail: tail.id(),
                    pending: first.id(),
                });
            }
        }

        let local = &self.pending.local;
        if let Some(index) = first_parent_gap(local, self.leader_head()) {
            return Err(InvariantViolation::BrokenParentChain {
                id: local[index].id(),
                parent: local[index].parent_id(),
            });
        }

        Ok(())
    }
}

impl<E> Default for TieredSyncState<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// A payload delivered to the three-tier state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_tag", rename_all = "kebab-case")]
pub enum TieredPayload<E> {
    /// An upstream tier confirmed events.
    Advance {
        /// Tier that sent the update.
        origin: Origin,
        /// Confirmed events, ascending.
        new_events: Vec<E>,
    },
    /// An upstream tier replaced history starting at `rollback_until`.
    Rebase {
        /// Tier that sent the update.
        origin: Origin,
        /// First rolled back event.
        rollback_until: EventId,
        /// Replacement history, ascending.
        new_events: Vec<E>,
    },
    /// The local application appended events.
    LocalPush {
        /// New local events, ascending.
        new_events: Vec<E>,
    },
    /// Drop rollback tail entries before `new_rollback_start`.
    TrimRollbackTail {
        /// First entry to keep.
        new_rollback_start: EventId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Ev(EventId, EventId, bool);

    impl ChainEvent for Ev {
        fn id(&self) -> EventId {
            self.0
        }
        fn parent_id(&self) -> EventId {
            self.1
        }
        fn is_local(&self) -> bool {
            self.2
        }
        fn is_same_event(&self, other: &Self) -> bool {
            self == other
        }
        fn rebase(&self, new_id: EventId, new_parent_id: EventId) -> Self {
            Ev(new_id, new_parent_id, self.2)
        }
    }

    fn id(global: i64, local: u32) -> EventId {
        EventId::new(global, local)
    }

    fn tail_with_local_entry() -> TieredSyncState<Ev> {
        TieredSyncState {
            pending: PendingEvents::new(),
            rollback_tail: vec![Ev(id(0, 0), ROOT_ID, false), Ev(id(0, 1), id(0, 0), false)],
            backend_head: 0,
        }
    }

    #[test]
    fn confirmed_head_keeps_local_component() {
        let state = tail_with_local_entry();
        assert_eq!(state.backend_head_id(), id(0, 0));
        assert_eq!(state.confirmed_head(), id(0, 1));
        assert_eq!(state.leader_head(), id(0, 1));
        assert_eq!(state.local_head(), id(0, 1));
    }

    #[test]
    fn confirmed_head_after_trimmed_tail() {
        let state = TieredSyncState::<Ev> {
            backend_head: 4,
            ..TieredSyncState::new()
        };
        assert_eq!(state.confirmed_head(), id(4, 0));
    }

    #[test]
    fn consistent_state_passes() {
        let mut state = tail_with_local_entry();
        state.pending.leader = vec![Ev(id(1, 0), id(0, 0), false)];
        state.pending.local = vec![Ev(id(1, 1), id(1, 0), true)];
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn local_events_must_follow_leader_head() {
        let mut state = tail_with_local_entry();
        state.pending.local = vec![Ev(id(0, 2), id(0, 0), true)];
        assert_eq!(
            state.check_invariants(),
            Err(InvariantViolation::BrokenParentChain {
                id: id(0, 2),
                parent: id(0, 0),
            })
        );
    }

    #[test]
    fn pending_must_sort_after_tail() {
        let mut state = tail_with_local_entry();
        state.pending.leader = vec![Ev(id(0, 1), id(0, 0), false)];
        assert!(matches!(
            state.check_invariants(),
            Err(InvariantViolation::TailOverlapsPending { .. })
        ));
    }
}

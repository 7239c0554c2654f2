//! The durable sync state owned by one tier.

use crate::event::{first_parent_gap, first_unsorted, ChainEvent};
use crate::event_id::{EventId, ROOT_ID};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reconciliation state of one tier (local session or leader).
///
/// # Invariants
///
/// - `pending` ids are strictly increasing
/// - `rollback_tail` ids are strictly increasing and below every pending id
/// - `local_head` is the id of the last pending event, or `upstream_head`
///   when nothing is pending
/// - pending events are parent-linked, starting at `upstream_head`
///
/// A state is never edited in place by the engine: every transition returns
/// a fresh `SyncState` that replaces the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState<E> {
    /// Events applied optimistically but not yet confirmed upstream.
    pub pending: Vec<E>,
    /// Recently confirmed events kept for a future upstream rebase.
    pub rollback_tail: Vec<E>,
    /// Last event confirmed by the immediate upstream.
    pub upstream_head: EventId,
    /// Last event of this tier's own chain.
    pub local_head: EventId,
}

impl<E> SyncState<E> {
    /// Creates the state of a fresh session, rooted at `ROOT_ID`.
    pub fn new() -> Self {
        Self::at_checkpoint(ROOT_ID)
    }

    /// Creates an empty state resuming from a persisted upstream head.
    pub fn at_checkpoint(upstream_head: EventId) -> Self {
        Self {
            pending: Vec::new(),
            rollback_tail: Vec::new(),
            upstream_head,
            local_head: upstream_head,
        }
    }

    /// Returns true if there are no unconfirmed events.
    pub fn is_settled(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<E: ChainEvent> SyncState<E> {
    /// Builds a state from its parts, deriving `local_head`.
    pub fn from_parts(pending: Vec<E>, rollback_tail: Vec<E>, upstream_head: EventId) -> Self {
        let local_head = pending.last().map_or(upstream_head, |e| e.id());
        Self {
            pending,
            rollback_tail,
            upstream_head,
            local_head,
        }
    }

    /// Verifies the structural invariants of the state.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if let Some(index) = first_unsorted(&self.pending) {
            return Err(InvariantViolation::PendingNotAscending {
                index,
                id: self.pending[index].id(),
            });
        }

        if let Some(index) = first_unsorted(&self.rollback_tail) {
            return Err(InvariantViolation::RollbackTailNotAscending {
                index,
                id: self.rollback_tail[index].id(),
            });
        }

        if let (Some(tail), Some(first)) = (self.rollback_tail.last(), self.pending.first()) {
            if !first.id().is_greater_than(&tail.id()) {
                return Err(InvariantViolation::TailOverlapsPending {
                    tail: tail.id(),
                    pending: first.id(),
                });
            }
        }

        let expected_head = self
            .pending
            .last()
            .map_or(self.upstream_head, |e| e.id());
        if self.local_head != expected_head {
            return Err(InvariantViolation::LocalHeadMismatch {
                expected: expected_head,
                actual: self.local_head,
            });
        }

        if let Some(index) = first_parent_gap(&self.pending, self.upstream_head) {
            return Err(InvariantViolation::BrokenParentChain {
                id: self.pending[index].id(),
                parent: self.pending[index].parent_id(),
            });
        }

        Ok(())
    }
}

impl<E> Default for SyncState<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// A broken structural invariant of a [`SyncState`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Pending ids are not strictly increasing.
    #[error("pending event {id} at index {index} does not follow its predecessor")]
    PendingNotAscending {
        /// Index of the offending event.
        index: usize,
        /// Id of the offending event.
        id: EventId,
    },

    /// Rollback tail ids are not strictly increasing.
    #[error("rollback tail event {id} at index {index} does not follow its predecessor")]
    RollbackTailNotAscending {
        /// Index of the offending event.
        index: usize,
        /// Id of the offending event.
        id: EventId,
    },

    /// The rollback tail reaches into the pending range.
    #[error("rollback tail ends at {tail} but pending starts at {pending}")]
    TailOverlapsPending {
        /// Last rollback tail id.
        tail: EventId,
        /// First pending id.
        pending: EventId,
    },

    /// `local_head` disagrees with the pending tail / upstream head.
    #[error("local head is {actual}, expected {expected}")]
    LocalHeadMismatch {
        /// Head derived from the state.
        expected: EventId,
        /// Head stored in the state.
        actual: EventId,
    },

    /// A pending event is not linked to its predecessor.
    #[error("pending event {id} has parent {parent} which is not its predecessor")]
    BrokenParentChain {
        /// Id of the detached event.
        id: EventId,
        /// Its recorded parent.
        parent: EventId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Ev(EventId, EventId);

    impl ChainEvent for Ev {
        fn id(&self) -> EventId {
            self.0
        }
        fn parent_id(&self) -> EventId {
            self.1
        }
        fn is_local(&self) -> bool {
            true
        }
        fn is_same_event(&self, other: &Self) -> bool {
            self == other
        }
        fn rebase(&self, new_id: EventId, new_parent_id: EventId) -> Self {
            Ev(new_id, new_parent_id)
        }
    }

    fn id(global: i64, local: u32) -> EventId {
        EventId::new(global, local)
    }

    #[test]
    fn fresh_state_is_rooted() {
        let state: SyncState<Ev> = SyncState::new();
        assert_eq!(state.upstream_head, ROOT_ID);
        assert_eq!(state.local_head, ROOT_ID);
        assert!(state.is_settled());
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn from_parts_derives_local_head() {
        let state = SyncState::from_parts(
            vec![Ev(id(1, 1), id(1, 0)), Ev(id(1, 2), id(1, 1))],
            vec![Ev(id(1, 0), id(0, 0))],
            id(1, 0),
        );
        assert_eq!(state.local_head, id(1, 2));
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn detects_tail_overlap() {
        let state = SyncState::from_parts(
            vec![Ev(id(1, 1), id(1, 0))],
            vec![Ev(id(1, 1), id(1, 0))],
            id(1, 0),
        );
        assert!(matches!(
            state.check_invariants(),
            Err(InvariantViolation::TailOverlapsPending { .. })
        ));
    }

    #[test]
    fn detects_stale_local_head() {
        let mut state = SyncState::from_parts(vec![Ev(id(0, 1), id(0, 0))], vec![], id(0, 0));
        state.local_head = id(0, 0);
        assert_eq!(
            state.check_invariants(),
            Err(InvariantViolation::LocalHeadMismatch {
                expected: id(0, 1),
                actual: id(0, 0),
            })
        );
    }

    #[test]
    fn detects_broken_parent_chain() {
        let state = SyncState::from_parts(
            vec![Ev(id(0, 1), id(0, 0)), Ev(id(0, 3), id(0, 2))],
            vec![],
            id(0, 0),
        );
        assert!(matches!(
            state.check_invariants(),
            Err(InvariantViolation::BrokenParentChain { .. })
        ));
    }

    #[test]
    fn detects_unsorted_pending() {
        let state = SyncState::from_parts(
            vec![Ev(id(0, 2), id(0, 0)), Ev(id(0, 1), id(0, 2))],
            vec![],
            id(0, 0),
        );
        assert!(matches!(
            state.check_invariants(),
            Err(InvariantViolation::PendingNotAscending { index: 1, .. })
        ));
    }
}

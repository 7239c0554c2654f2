//! The event capabilities the sync algorithms rely on.

use crate::event_id::EventId;

/// An event that lives in a parent-linked chain.
///
/// Implementations own the application payload (mutation name and
/// arguments); the sync algorithms only look at ids, parent links, the
/// local/upstream origin and structural equality.
pub trait ChainEvent: Clone {
    /// Id of this event.
    fn id(&self) -> EventId;

    /// Id of the event this one logically follows.
    fn parent_id(&self) -> EventId;

    /// Returns true if the event originated on this tier and has not been
    /// confirmed by the immediate upstream.
    ///
    /// Local events are re-minted with a local id bump when rebased; events
    /// that came from upstream get a global bump.
    fn is_local(&self) -> bool;

    /// Structural equality: same id and same payload.
    fn is_same_event(&self, other: &Self) -> bool;

    /// Returns a copy of this event re-parented onto `new_parent_id` under
    /// the id `new_id`. Never mutates `self`.
    #[must_use]
    fn rebase(&self, new_id: EventId, new_parent_id: EventId) -> Self;
}

/// Returns the position of the first event that does not sort strictly
/// after its predecessor, if any.
pub fn first_unsorted<E: ChainEvent>(events: &[E]) -> Option<usize> {
    events
        .windows(2)
        .position(|pair| !pair[1].id().is_greater_than(&pair[0].id()))
        .map(|index| index + 1)
}

/// Returns the position of the first event whose parent link does not
/// point at its predecessor, starting from `base`.
///
/// Upstream-originated events may also hang off the global slot of their
/// predecessor, skipping local events in between.
pub fn first_parent_gap<E: ChainEvent>(events: &[E], base: EventId) -> Option<usize> {
    let mut expected = base;
    for (index, event) in events.iter().enumerate() {
        let parent = event.parent_id();
        let linked =
            parent == expected || (!event.is_local() && parent == expected.global_base());
        if !linked {
            return Some(index);
        }
        expected = event.id();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_id::ROOT_ID;

    #[derive(Debug, Clone, PartialEq)]
    struct Ev {
        id: EventId,
        parent: EventId,
    }

    impl ChainEvent for Ev {
        fn id(&self) -> EventId {
            self.id
        }
        fn parent_id(&self) -> EventId {
            self.parent
        }
        fn is_local(&self) -> bool {
            false
        }
        fn is_same_event(&self, other: &Self) -> bool {
            self == other
        }
        fn rebase(&self, new_id: EventId, new_parent_id: EventId) -> Self {
            Self {
                id: new_id,
                parent: new_parent_id,
            }
        }
    }

    fn ev(global: i64, local: u32, parent: EventId) -> Ev {
        Ev {
            id: EventId::new(global, local),
            parent,
        }
    }

    #[test]
    fn sorted_chain_has_no_unsorted_index() {
        let chain = vec![
            ev(0, 0, ROOT_ID),
            ev(0, 1, EventId::new(0, 0)),
            ev(1, 0, EventId::new(0, 1)),
        ];
        assert_eq!(first_unsorted(&chain), None);
        assert_eq!(first_parent_gap(&chain, ROOT_ID), None);
    }

    #[test]
    fn detects_descending_and_duplicate_ids() {
        let descending = vec![ev(0, 1, ROOT_ID), ev(0, 0, ROOT_ID)];
        assert_eq!(first_unsorted(&descending), Some(1));

        let duplicate = vec![ev(0, 0, ROOT_ID), ev(1, 0, ROOT_ID), ev(1, 0, ROOT_ID)];
        assert_eq!(first_unsorted(&duplicate), Some(2));
    }

    #[test]
    fn detects_parent_gap() {
        let chain = vec![ev(0, 0, ROOT_ID), ev(0, 2, EventId::new(0, 1))];
        assert_eq!(first_parent_gap(&chain, ROOT_ID), Some(1));
        assert_eq!(first_parent_gap(&chain, EventId::new(3, 0)), Some(0));
    }

    #[test]
    fn upstream_event_may_attach_to_global_slot() {
        let chain = vec![ev(3, 1, EventId::new(3, 0)), ev(4, 0, EventId::new(3, 0))];
        assert_eq!(first_parent_gap(&chain, EventId::new(3, 0)), None);
    }

    #[test]
    fn rebase_does_not_mutate_original() {
        let original = ev(0, 0, ROOT_ID);
        let moved = original.rebase(EventId::new(2, 1), EventId::new(2, 0));
        assert_eq!(original.id, EventId::new(0, 0));
        assert_eq!(moved.id, EventId::new(2, 1));
        assert_eq!(moved.parent, EventId::new(2, 0));
    }
}

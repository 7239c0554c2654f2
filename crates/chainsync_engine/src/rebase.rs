//! Re-parenting event sequences onto a new base.

use crate::error::{SyncError, SyncResult};
use chainsync_protocol::{ChainEvent, EventId};

/// Re-parents `events`, in order, onto `base_event_id`.
///
/// Local events chain directly off the previous id and get a local bump.
/// Upstream-originated events being replayed attach to the global slot of
/// the previous id and get a global bump.
///
/// # Errors
///
/// Returns [`SyncError::IdSpaceExhausted`] if a bump would overflow.
pub fn rebase_events<E: ChainEvent>(events: &[E], base_event_id: EventId) -> SyncResult<Vec<E>> {
    let mut prev_event_id = base_event_id;
    events
        .iter()
        .map(|event| {
            let is_local = event.is_local();
            let parent_id = if is_local {
                prev_event_id
            } else {
                prev_event_id.global_base()
            };
            let new_event_id = successor(parent_id, is_local)?;
            prev_event_id = new_event_id;
            Ok(event.rebase(new_event_id, parent_id))
        })
        .collect()
}

/// Mints the id after `id`, failing instead of overflowing.
pub(crate) fn successor(id: EventId, is_local: bool) -> SyncResult<EventId> {
    id.checked_next(is_local)
        .ok_or(SyncError::IdSpaceExhausted { after: id })
}

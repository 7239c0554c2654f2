//! Reference reconciliation scenarios.
//!
//! Each fixture pairs a starting state with the payload delivered to it.
//! The expected outcome is asserted by the tests that use them.

use crate::event::{e, link, local};
use chainsync_protocol::{EventId, Payload, SyncState, ROOT_ID};

use crate::TestEvent;

/// A starting state and the payload delivered to it.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Short description.
    pub name: &'static str,
    /// State before the payload.
    pub state: SyncState<TestEvent>,
    /// Payload to deliver.
    pub payload: Payload<TestEvent>,
}

fn two_local_pending() -> SyncState<TestEvent> {
    let pending = link(ROOT_ID, vec![local(0, 0, "e_0_0"), local(0, 1, "e_0_1")]);
    SyncState::from_parts(pending, Vec::new(), ROOT_ID)
}

/// Upstream echoes the pending event and adds one more.
///
/// Expected: advance, nothing pending, returned events `[e_0_1]`.
pub fn advance_confirms_pending() -> Scenario {
    let pending = vec![local(0, 0, "e_0_0")];
    Scenario {
        name: "advance confirms pending",
        state: SyncState::from_parts(pending, Vec::new(), ROOT_ID),
        payload: Payload::upstream_advance(vec![e(0, 0), e(0, 1)]),
    }
}

/// Upstream delivers a different event than the pending local one.
///
/// Expected: rebase, `e_0_0` re-minted as `(0, 2)` on top of `e_0_1`.
pub fn advance_diverges_from_local() -> Scenario {
    let pending = vec![local(0, 0, "e_0_0")];
    Scenario {
        name: "advance diverges from local",
        state: SyncState::from_parts(pending, Vec::new(), ROOT_ID),
        payload: Payload::upstream_advance(vec![e(0, 1)]),
    }
}

/// Upstream replaces the only tail entry.
///
/// Expected: rebase, tail `[e_1_0]`, `e_0_0` rolled back.
pub fn upstream_rebase_replaces_tail() -> Scenario {
    Scenario {
        name: "upstream rebase replaces tail",
        state: SyncState::from_parts(Vec::new(), vec![e(0, 0)], EventId::new(0, 0)),
        payload: Payload::upstream_rebase(EventId::new(0, 0), vec![e(1, 0)]),
    }
}

/// Upstream sends a descending batch.
///
/// Expected: fatal unsorted batch error.
pub fn unsorted_upstream_batch() -> Scenario {
    Scenario {
        name: "unsorted upstream batch",
        state: two_local_pending(),
        payload: Payload::upstream_advance(vec![e(0, 1), e(0, 0)]),
    }
}

/// The application pushes an event id that is already pending.
///
/// Expected: reject with minimum id `(0, 2)`.
pub fn stale_local_push() -> Scenario {
    let push = link(
        EventId::new(0, 0),
        vec![local(0, 1, "e_0_1"), local(0, 2, "e_0_2")],
    );
    Scenario {
        name: "stale local push",
        state: two_local_pending(),
        payload: Payload::local_push(push),
    }
}

/// All reference scenarios.
pub fn all() -> Vec<Scenario> {
    vec![
        advance_confirms_pending(),
        advance_diverges_from_local(),
        upstream_rebase_replaces_tail(),
        unsorted_upstream_batch(),
        stale_local_push(),
    ]
}

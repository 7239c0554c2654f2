//! Property-based test generators using proptest.
//!
//! Every generated chain is strictly ascending and parent-linked, so the
//! states built from them satisfy the sync state invariants.

use crate::event::TestEvent;
use chainsync_protocol::{
    ChainEvent, EventId, Origin, PendingEvents, SyncState, TieredPayload, TieredSyncState, ROOT_ID,
};
use proptest::prelude::*;

/// Strategy for generating event ids.
pub fn event_id_strategy() -> impl Strategy<Value = EventId> {
    (-1i64..1_000, 0u32..16).prop_map(|(global, local)| EventId::new(global, local))
}

/// Strategy for generating mutation-like event names.
pub fn event_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,6}\\.[a-z]{1,6}").expect("Invalid regex")
}

/// Builds a linked chain on top of `base` from `(is_local, name)` pairs.
pub fn build_chain(base: EventId, specs: Vec<(bool, String)>) -> Vec<TestEvent> {
    let mut prev = base;
    specs
        .into_iter()
        .map(|(is_local, name)| {
            let id = prev.next(is_local);
            let event = TestEvent::new(id, prev, name, is_local);
            prev = id;
            event
        })
        .collect()
}

/// Strategy for a linked chain of mixed local and upstream events.
pub fn chain_strategy(
    base: EventId,
    len: std::ops::Range<usize>,
) -> impl Strategy<Value = Vec<TestEvent>> {
    prop::collection::vec((any::<bool>(), event_name_strategy()), len)
        .prop_map(move |specs| build_chain(base, specs))
}

/// Strategy for a consistent sync state: a confirmed tail from `ROOT_ID`
/// followed by pending events.
pub fn sync_state_strategy() -> impl Strategy<Value = SyncState<TestEvent>> {
    prop::collection::vec(event_name_strategy(), 0..4)
        .prop_flat_map(|names| {
            let tail = build_chain(ROOT_ID, names.into_iter().map(|n| (false, n)).collect());
            let head = tail.last().map_or(ROOT_ID, |e| e.id);
            (Just(tail), Just(head), chain_strategy(head, 0..6))
        })
        .prop_map(|(tail, head, pending)| SyncState::from_parts(pending, tail, head))
}

/// Strategy for an upstream advance against a consistent state.
///
/// The batch echoes a prefix of the pending events and may continue with
/// events upstream received from elsewhere.
pub fn advance_case_strategy() -> impl Strategy<Value = (SyncState<TestEvent>, Vec<TestEvent>)> {
    sync_state_strategy().prop_flat_map(|state| {
        let pending_len = state.pending.len();
        (Just(state), 0..=pending_len, 0usize..3)
            .prop_map(|(state, echoed, extra)| {
                let mut batch: Vec<TestEvent> = state.pending[..echoed]
                    .iter()
                    .cloned()
                    .map(TestEvent::confirmed)
                    .collect();
                let base = batch.last().map_or(state.upstream_head, |e| e.id);
                batch.extend(remote_chain(base, extra));
                (state, batch)
            })
    })
}

/// Strategy for an upstream advance that echoes only the upstream entries
/// of a pending prefix, stepping over the local ones in between.
pub fn interleaved_advance_case_strategy(
) -> impl Strategy<Value = (SyncState<TestEvent>, Vec<TestEvent>)> {
    sync_state_strategy().prop_flat_map(|state| {
        let pending_len = state.pending.len();
        (Just(state), 0..=pending_len, 0usize..3).prop_map(|(state, echoed, extra)| {
            let mut batch: Vec<TestEvent> = state.pending[..echoed]
                .iter()
                .filter(|e| !e.local)
                .cloned()
                .collect();
            let base = batch.last().map_or(state.upstream_head, |e| e.id);
            batch.extend(remote_chain(base, extra));
            (state, batch)
        })
    })
}

fn remote_chain(base: EventId, len: usize) -> Vec<TestEvent> {
    build_chain(base, (0..len).map(|i| (false, format!("remote.{i}"))).collect())
}

/// Strategy for a consistent three-tier state: a backend-confirmed tail,
/// leader-accepted events on top of it and local events on top of those.
pub fn tiered_state_strategy() -> impl Strategy<Value = TieredSyncState<TestEvent>> {
    (
        prop::collection::vec(event_name_strategy(), 0..3),
        prop::collection::vec((any::<bool>(), event_name_strategy()), 0..4),
        prop::collection::vec(event_name_strategy(), 0..4),
    )
        .prop_map(|(tail, leader, local)| {
            let rollback_tail =
                build_chain(ROOT_ID, tail.into_iter().map(|n| (false, n)).collect());
            let confirmed = rollback_tail.last().map_or(ROOT_ID, |e| e.id);
            let leader = build_chain(confirmed, leader);
            let leader_head = leader.last().map_or(confirmed, |e| e.id);
            let local = build_chain(leader_head, local.into_iter().map(|n| (true, n)).collect());
            TieredSyncState {
                pending: PendingEvents { leader, local },
                rollback_tail,
                backend_head: confirmed.global,
            }
        })
}

/// Strategy for a three-tier state together with a leader or backend
/// update that a well-behaved upstream could send it.
pub fn tiered_case_strategy(
) -> impl Strategy<Value = (TieredSyncState<TestEvent>, TieredPayload<TestEvent>)> {
    (tiered_state_strategy(), 0usize..4, 0usize..5, 0usize..3).prop_map(
        |(state, kind, index, extra)| {
            let payload = tiered_payload(&state, kind, index, extra);
            (state, payload)
        },
    )
}

fn tiered_payload(
    state: &TieredSyncState<TestEvent>,
    kind: usize,
    index: usize,
    extra: usize,
) -> TieredPayload<TestEvent> {
    let leader = &state.pending.leader;
    let tail = &state.rollback_tail;
    match kind {
        1 => {
            let mut batch = leader[..index.min(leader.len())].to_vec();
            let base = batch.last().map_or_else(|| state.confirmed_head(), |e| e.id);
            batch.extend(remote_chain(base, extra));
            TieredPayload::Advance {
                origin: Origin::Backend,
                new_events: batch,
            }
        }
        2 if !leader.is_empty() => {
            let target = &leader[index.min(leader.len() - 1)];
            TieredPayload::Rebase {
                origin: Origin::Leader,
                rollback_until: target.id,
                new_events: remote_chain(target.parent_id(), extra),
            }
        }
        3 if !tail.is_empty() => {
            let target = &tail[index.min(tail.len() - 1)];
            TieredPayload::Rebase {
                origin: Origin::Backend,
                rollback_until: target.id,
                new_events: remote_chain(target.parent_id(), extra),
            }
        }
        _ => {
            let local = &state.pending.local;
            let mut batch: Vec<TestEvent> = local[..index.min(local.len())]
                .iter()
                .cloned()
                .map(TestEvent::confirmed)
                .collect();
            let base = batch.last().map_or_else(|| state.leader_head(), |e| e.id);
            batch.extend(remote_chain(base, extra));
            TieredPayload::Advance {
                origin: Origin::Leader,
                new_events: batch,
            }
        }
    }
}

/// Strategy for an upstream rebase against a consistent state with a
/// non-empty tail: the rollback point and a replacement batch.
pub fn rebase_case_strategy(
) -> impl Strategy<Value = (SyncState<TestEvent>, EventId, Vec<TestEvent>)> {
    sync_state_strategy()
        .prop_filter("rebase needs a tail", |state| !state.rollback_tail.is_empty())
        .prop_flat_map(|state| {
            let tail_len = state.rollback_tail.len();
            (Just(state), 0..tail_len, 0usize..4)
        })
        .prop_map(|(state, index, replacement)| {
            let rollback_until = state.rollback_tail[index].id;
            let base = state.rollback_tail[index].parent;
            let specs = (0..replacement)
                .map(|i| (false, format!("replacement.{i}")))
                .collect();
            let batch = build_chain(base, specs);
            (state, rollback_until, batch)
        })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

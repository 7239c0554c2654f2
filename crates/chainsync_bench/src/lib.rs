//! Benchmark utilities.

#![warn(missing_docs)]

use chainsync_protocol::{EventId, SyncState};
use chainsync_testkit::{build_chain, TestEvent};
use rand::Rng;

/// Generate a linked chain of `len` events on top of `base`.
///
/// Roughly `local_ratio` of the events are local.
pub fn random_chain(base: EventId, len: usize, local_ratio: f64) -> Vec<TestEvent> {
    let mut rng = rand::thread_rng();
    let specs = (0..len)
        .map(|i| (rng.gen_bool(local_ratio), format!("mutation.{i}")))
        .collect();
    build_chain(base, specs)
}

/// Generate a state with `tail` confirmed and `pending` unconfirmed events.
pub fn generate_state(tail: usize, pending: usize) -> SyncState<TestEvent> {
    let tail = random_chain(EventId::new(-1, 0), tail, 0.0);
    let head = tail.last().map_or(EventId::new(-1, 0), |e| e.id);
    let pending = random_chain(head, pending, 0.5);
    SyncState::from_parts(pending, tail, head)
}

/// Generate an upstream batch that confirms the first `echoed` pending
/// events and then diverges with `foreign` events from elsewhere.
pub fn generate_batch(state: &SyncState<TestEvent>, echoed: usize, foreign: usize) -> Vec<TestEvent> {
    let mut batch: Vec<TestEvent> = state.pending[..echoed.min(state.pending.len())]
        .iter()
        .cloned()
        .map(TestEvent::confirmed)
        .collect();
    let base = batch.last().map_or(state.upstream_head, |e| e.id);
    let specs = (0..foreign).map(|i| (false, format!("foreign.{i}"))).collect();
    batch.extend(build_chain(base, specs));
    batch
}

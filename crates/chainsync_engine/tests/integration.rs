//! Integration tests: several clients reconciling against one upstream.

use chainsync_engine::{
    LeaderConfig, LeaderStatus, Materializer, MemoryMaterializer, SyncError, SyncLeader,
    UpdateOptions,
};
use chainsync_protocol::{
    decode_checkpoint, decode_payload, encode_payload, ChainEvent, EventId, Payload, SyncState,
    ROOT_ID,
};
use chainsync_testkit::{fixtures, link, local, TestEvent};

type Client = SyncLeader<TestEvent, MemoryMaterializer<TestEvent>>;

/// Authoritative chain that accepts pushes building on its head.
struct Upstream {
    chain: Vec<TestEvent>,
}

impl Upstream {
    fn new() -> Self {
        Self { chain: Vec::new() }
    }

    fn head(&self) -> EventId {
        self.chain.last().map_or(ROOT_ID, |e| e.id())
    }

    /// Accepts `events` if they extend the head, returning the wire payload
    /// to broadcast.
    fn accept(&mut self, events: &[TestEvent]) -> Option<Vec<u8>> {
        let first = events.first()?;
        if first.parent_id() != self.head() {
            return None;
        }
        let confirmed: Vec<TestEvent> = events.iter().cloned().map(TestEvent::confirmed).collect();
        self.chain.extend(confirmed.iter().cloned());
        Some(encode_payload(&Payload::upstream_advance(confirmed)).unwrap())
    }

    /// Drops everything from `index` on and broadcasts the replacement.
    fn rewrite(&mut self, index: usize, replacement: Vec<TestEvent>) -> Vec<u8> {
        let rollback_until = self.chain[index].id();
        self.chain.truncate(index);
        self.chain.extend(replacement.iter().cloned());
        encode_payload(&Payload::upstream_rebase(rollback_until, replacement)).unwrap()
    }
}

fn client() -> Client {
    let options = UpdateOptions::new().with_invariant_checks(true);
    SyncLeader::new(
        LeaderConfig::new().with_options(options),
        MemoryMaterializer::new(),
    )
    .unwrap()
}

fn deliver(client: &Client, wire: &[u8]) {
    let payload: Payload<TestEvent> = decode_payload(wire).unwrap();
    client.handle(payload).unwrap();
}

fn view(client: &Client) -> Vec<(EventId, String)> {
    client
        .materializer()
        .log()
        .into_iter()
        .map(|e| (e.id, e.name))
        .collect()
}

#[test]
fn concurrent_clients_converge() {
    let mut upstream = Upstream::new();
    let alice = client();
    let bob = client();

    alice
        .handle(Payload::local_push(vec![local(0, 0, "alice.add")]))
        .unwrap();
    bob.handle(Payload::local_push(vec![local(0, 0, "bob.add")]))
        .unwrap();

    let wire = upstream.accept(&alice.state().pending).unwrap();
    assert!(upstream.accept(&bob.state().pending).is_none());
    deliver(&alice, &wire);
    deliver(&bob, &wire);

    assert!(alice.state().is_settled());
    let bob_state = bob.state();
    assert_eq!(bob_state.pending.len(), 1);
    assert_eq!(bob_state.pending[0].id, EventId::new(0, 1));
    assert_eq!(bob.stats().rebases, 1);

    let wire = upstream.accept(&bob_state.pending).unwrap();
    deliver(&alice, &wire);
    deliver(&bob, &wire);

    for client in [&alice, &bob] {
        let state = client.state();
        assert!(state.is_settled());
        assert_eq!(state.upstream_head, upstream.head());
    }
    assert_eq!(view(&alice), view(&bob));
    assert_eq!(
        view(&alice),
        vec![
            (EventId::new(0, 0), "alice.add".to_string()),
            (EventId::new(0, 1), "bob.add".to_string()),
        ]
    );
}

#[test]
fn upstream_rewrite_rolls_back_confirmed_and_pending_events() {
    let mut upstream = Upstream::new();
    let alice = client();

    let first = link(ROOT_ID, vec![local(0, 0, "a"), local(0, 1, "b")]);
    alice.handle(Payload::local_push(first.clone())).unwrap();
    let wire = upstream.accept(&first).unwrap();
    deliver(&alice, &wire);

    alice
        .handle(Payload::local_push(vec![local(0, 2, "c").with_parent(EventId::new(0, 1))]))
        .unwrap();

    let replacement = vec![local(0, 1, "b2").confirmed()];
    let wire = upstream.rewrite(1, replacement);
    deliver(&alice, &wire);

    let state = alice.state();
    assert_eq!(state.upstream_head, EventId::new(0, 1));
    assert_eq!(state.pending.len(), 1);
    assert_eq!(state.pending[0].name, "c");
    assert_eq!(
        view(&alice)
            .into_iter()
            .map(|(_, name)| name)
            .collect::<Vec<_>>(),
        vec!["a", "b2", "c"]
    );
}

#[test]
fn redelivery_does_not_duplicate_events() {
    let mut upstream = Upstream::new();
    let alice = client();
    let events = link(ROOT_ID, vec![local(0, 0, "a")]);

    let wire = upstream.accept(&events).unwrap();
    deliver(&alice, &wire);
    deliver(&alice, &wire);

    assert_eq!(alice.materializer().log_ids(), vec![EventId::new(0, 0)]);
    assert_eq!(alice.stats().events_applied, 1);
}

#[test]
fn client_resumes_from_checkpoint() {
    let mut upstream = Upstream::new();
    let alice = client();
    let events = link(ROOT_ID, vec![local(0, 0, "a")]);
    let wire = upstream.accept(&events).unwrap();
    deliver(&alice, &wire);
    alice
        .handle(Payload::local_push(vec![local(0, 1, "b").with_parent(EventId::new(0, 0))]))
        .unwrap();

    let bytes = alice.materializer().checkpoint_bytes().unwrap();
    let state: SyncState<TestEvent> = decode_checkpoint(&bytes).unwrap();
    let resumed = SyncLeader::with_state(
        LeaderConfig::new(),
        MemoryMaterializer::with_log(alice.materializer().log()),
        state,
    );

    assert_eq!(resumed.state(), alice.state());
    assert_eq!(resumed.state().local_head, EventId::new(0, 1));
    assert!(resumed.materializer().persisted_state().unwrap().is_none());
}

#[test]
fn reference_scenarios_through_the_leader() {
    for scenario in fixtures::all() {
        let log: Vec<TestEvent> = scenario
            .state
            .rollback_tail
            .iter()
            .chain(&scenario.state.pending)
            .cloned()
            .collect();
        let leader = SyncLeader::with_state(
            LeaderConfig::new(),
            MemoryMaterializer::with_log(log),
            scenario.state.clone(),
        );

        match leader.handle(scenario.payload.clone()) {
            Ok(result) if result.is_reject() => {
                assert_eq!(leader.state(), scenario.state, "{}", scenario.name);
            }
            Ok(_) => {
                let state = leader.state();
                let expected: Vec<EventId> = state
                    .rollback_tail
                    .iter()
                    .chain(&state.pending)
                    .map(ChainEvent::id)
                    .collect();
                assert_eq!(leader.materializer().log_ids(), expected, "{}", scenario.name);
            }
            Err(err) => {
                assert!(matches!(err, SyncError::UnsortedBatch { .. }), "{}", scenario.name);
                assert_eq!(leader.status(), LeaderStatus::Halted);
            }
        }
    }
}

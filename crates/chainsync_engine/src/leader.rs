//! Single-writer driver around the state machine.

use crate::config::LeaderConfig;
use crate::error::{SyncError, SyncResult};
use crate::machine::update_sync_state;
use crate::materializer::{Materializer, Transition};
use crate::result::UpdateResult;
use chainsync_protocol::{ChainEvent, EventId, Payload, SyncState};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Whether the leader accepts payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderStatus {
    /// Payloads are processed.
    Active,
    /// A protocol violation stopped the leader; it needs a reset.
    Halted,
}

/// Counters kept by the leader.
#[derive(Debug, Clone, Default)]
pub struct LeaderStats {
    /// Transitions that only appended events.
    pub advances: u64,
    /// Transitions that rolled back and re-applied events.
    pub rebases: u64,
    /// Rejected local pushes.
    pub rejects: u64,
    /// Events handed to the materializer for application.
    pub events_applied: u64,
    /// Events handed to the materializer for rollback.
    pub events_rolled_back: u64,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Owns the authoritative [`SyncState`] of one tier.
///
/// Payloads are processed one at a time. Every non-reject transition is
/// handed to the [`Materializer`], and the new state only becomes current
/// once the materializer committed it.
pub struct SyncLeader<E, M> {
    config: LeaderConfig,
    materializer: Arc<M>,
    state: Mutex<SyncState<E>>,
    status: RwLock<LeaderStatus>,
    stats: RwLock<LeaderStats>,
}

impl<E, M> SyncLeader<E, M>
where
    E: ChainEvent,
    M: Materializer<E>,
{
    /// Creates a leader, resuming from the materializer's persisted state.
    pub fn new(config: LeaderConfig, materializer: M) -> SyncResult<Self> {
        let state = materializer.persisted_state()?.unwrap_or_default();
        info!(
            upstream_head = %state.upstream_head,
            pending = state.pending.len(),
            "sync leader started"
        );
        Ok(Self::with_state(config, materializer, state))
    }

    /// Creates a leader from an explicit state.
    pub fn with_state(config: LeaderConfig, materializer: M, state: SyncState<E>) -> Self {
        Self {
            config,
            materializer: Arc::new(materializer),
            state: Mutex::new(state),
            status: RwLock::new(LeaderStatus::Active),
            stats: RwLock::new(LeaderStats::default()),
        }
    }

    /// Returns a snapshot of the current state.
    pub fn state(&self) -> SyncState<E> {
        self.state.lock().clone()
    }

    /// Gets the current status.
    pub fn status(&self) -> LeaderStatus {
        *self.status.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> LeaderStats {
        self.stats.read().clone()
    }

    /// Gets the materializer.
    pub fn materializer(&self) -> &Arc<M> {
        &self.materializer
    }

    /// Processes one payload.
    ///
    /// Protocol violations halt the leader. Materializer failures leave the
    /// state untouched and can be retried with the same payload.
    pub fn handle(&self, payload: Payload<E>) -> SyncResult<UpdateResult<E>> {
        if self.status() == LeaderStatus::Halted {
            let reason = self
                .stats
                .read()
                .last_error
                .clone()
                .unwrap_or_else(|| "halted".into());
            return Err(SyncError::Halted { reason });
        }

        let tag = payload.tag();
        let mut state = self.state.lock();
        let result = match update_sync_state(&state, payload, &self.config.options) {
            Ok(result) => result,
            Err(e) => {
                self.handle_error(&e);
                return Err(e);
            }
        };

        let Some(next) = result.sync_state() else {
            debug!(payload = tag, "local push rejected");
            self.stats.write().rejects += 1;
            return Ok(result);
        };

        let transition = Transition {
            events_to_rollback: result.events_to_rollback(),
            new_events: result.new_events(),
            sync_state: next,
        };
        if let Err(e) = self.materializer.apply_transition(&transition) {
            self.handle_error(&e);
            return Err(e);
        }
        *state = next.clone();

        {
            let mut stats = self.stats.write();
            match &result {
                UpdateResult::Rebase { .. } => stats.rebases += 1,
                _ => stats.advances += 1,
            }
            stats.events_applied += result.new_events().len() as u64;
            stats.events_rolled_back += result.events_to_rollback().len() as u64;
            stats.last_error = None;
        }

        debug!(
            payload = tag,
            result = result.tag(),
            local_head = %state.local_head,
            "payload processed"
        );
        Ok(result)
    }

    /// Pushes local events, re-minting them after each rejection.
    ///
    /// `remint` receives the rejected events and the smallest id the next
    /// attempt may start at, and returns the events to try again.
    pub fn push_local_with<F>(&self, events: Vec<E>, mut remint: F) -> SyncResult<UpdateResult<E>>
    where
        F: FnMut(&[E], EventId) -> Vec<E>,
    {
        let mut events = events;
        let mut attempt = 0;
        loop {
            let result = self.handle(Payload::local_push(events.clone()))?;
            let UpdateResult::Reject {
                expected_minimum_id,
            } = result
            else {
                return Ok(result);
            };
            if attempt >= self.config.max_reject_retries {
                warn!(attempt, %expected_minimum_id, "giving up on rejected local push");
                return Ok(result);
            }
            attempt += 1;
            debug!(attempt, %expected_minimum_id, "re-minting rejected local push");
            events = remint(&events, expected_minimum_id);
        }
    }

    /// Replaces the state and resumes after a halt.
    ///
    /// The caller is responsible for bringing the materialized view in line
    /// with `state`.
    pub fn reset(&self, state: SyncState<E>) {
        info!(upstream_head = %state.upstream_head, "sync leader reset");
        *self.state.lock() = state;
        *self.status.write() = LeaderStatus::Active;
        self.stats.write().last_error = None;
    }

    fn handle_error(&self, error: &SyncError) {
        if error.is_protocol_violation() {
            error!(%error, "protocol violation, halting sync leader");
            *self.status.write() = LeaderStatus::Halted;
        } else {
            warn!(%error, "transition failed");
        }
        self.stats.write().last_error = Some(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpdateOptions;
    use crate::materializer::MemoryMaterializer;
    use chainsync_protocol::ROOT_ID;
    use chainsync_testkit::{e, link, local, TestEvent};

    type Leader = SyncLeader<TestEvent, MemoryMaterializer<TestEvent>>;

    fn config() -> LeaderConfig {
        LeaderConfig::new().with_options(UpdateOptions::new().with_invariant_checks(true))
    }

    fn leader() -> Leader {
        SyncLeader::new(config(), MemoryMaterializer::new()).unwrap()
    }

    #[test]
    fn fresh_leader_starts_at_root() {
        let leader = leader();
        assert_eq!(leader.state(), SyncState::new());
        assert_eq!(leader.status(), LeaderStatus::Active);
        assert_eq!(leader.stats().advances, 0);
    }

    #[test]
    fn push_then_confirm() {
        let leader = leader();
        let push = link(ROOT_ID, vec![local(0, 0, "a")]);

        leader.handle(Payload::local_push(push.clone())).unwrap();
        assert_eq!(leader.state().local_head, EventId::new(0, 0));

        leader.handle(Payload::upstream_advance(push)).unwrap();
        let state = leader.state();
        assert!(state.pending.is_empty());
        assert_eq!(state.upstream_head, EventId::new(0, 0));

        let stats = leader.stats();
        assert_eq!(stats.advances, 2);
        assert_eq!(stats.events_applied, 1);
        assert_eq!(leader.materializer().log_ids(), vec![EventId::new(0, 0)]);
    }

    #[test]
    fn protocol_violation_halts_until_reset() {
        let leader = leader();
        let err = leader
            .handle(Payload::upstream_advance(vec![e(1, 0), e(0, 0)]))
            .unwrap_err();
        assert!(err.is_protocol_violation());
        assert_eq!(leader.status(), LeaderStatus::Halted);

        let err = leader
            .handle(Payload::upstream_advance(vec![e(0, 0)]))
            .unwrap_err();
        assert!(matches!(err, SyncError::Halted { .. }));

        leader.reset(SyncState::new());
        assert_eq!(leader.status(), LeaderStatus::Active);
        leader.handle(Payload::upstream_advance(vec![e(0, 0)])).unwrap();
    }

    #[test]
    fn materializer_failure_keeps_state() {
        let leader = leader();
        leader.materializer().fail_next();

        let payload = Payload::upstream_advance(vec![e(0, 0)]);
        let err = leader.handle(payload.clone()).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(leader.status(), LeaderStatus::Active);
        assert_eq!(leader.state(), SyncState::new());

        leader.handle(payload).unwrap();
        assert_eq!(leader.state().upstream_head, EventId::new(0, 0));
    }

    #[test]
    fn rejected_push_is_reminted() {
        let leader = leader();
        leader
            .handle(Payload::local_push(link(ROOT_ID, vec![local(0, 0, "a")])))
            .unwrap();

        let result = leader
            .push_local_with(vec![local(0, 0, "b")], |rejected, start| {
                vec![rejected[0].clone().with_id(start).with_parent(EventId::new(0, 0))]
            })
            .unwrap();

        assert_eq!(result.tag(), "advance");
        assert_eq!(leader.state().local_head, EventId::new(0, 1));
        assert_eq!(leader.stats().rejects, 1);
    }

    #[test]
    fn remint_gives_up_after_configured_retries() {
        let leader = SyncLeader::new(
            config().with_max_reject_retries(2),
            MemoryMaterializer::new(),
        )
        .unwrap();
        leader
            .handle(Payload::local_push(link(ROOT_ID, vec![local(0, 0, "a")])))
            .unwrap();

        let mut calls = 0;
        let result = leader
            .push_local_with(vec![local(0, 0, "b")], |rejected, _| {
                calls += 1;
                rejected.to_vec()
            })
            .unwrap();

        assert!(result.is_reject());
        assert_eq!(calls, 2);
        assert_eq!(leader.stats().rejects, 3);
    }

    #[test]
    fn restarts_from_persisted_checkpoint() {
        let leader = leader();
        leader.handle(Payload::upstream_advance(vec![e(0, 0)])).unwrap();
        let bytes = leader.materializer().checkpoint_bytes();
        assert!(bytes.is_some());

        let state: SyncState<TestEvent> = leader.materializer().persisted_state().unwrap().unwrap();
        let restarted = Leader::with_state(config(), MemoryMaterializer::new(), state);
        assert_eq!(restarted.state().upstream_head, EventId::new(0, 0));
    }
}

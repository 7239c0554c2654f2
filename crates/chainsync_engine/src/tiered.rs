//! Three-tier (backend / leader / local) variant of the state machine.
//!
//! Pending events are split into the ones the leader already confirmed and
//! the ones only this tier has seen. Leader updates are matched against the
//! local part; backend updates are matched against both. Backend updates
//! that confirm events the leader never confirmed are a hard error.

use crate::config::UpdateOptions;
use crate::divergence::find_divergence_point;
use crate::error::{BatchSource, SyncError, SyncResult};
use crate::machine::{ensure_follows, ensure_sorted, push_onto, trim_tail, PushOutcome};
use crate::rebase::rebase_events;
use crate::result::UpdateResult;
use chainsync_protocol::{
    first_parent_gap, ChainEvent, EventId, Origin, PendingEvents, TieredPayload, TieredSyncState,
};
use std::slice;
use tracing::{debug, warn};

/// Result of a three-tier transition.
pub type TieredUpdateResult<E> = UpdateResult<E, TieredSyncState<E>>;

/// Runs one transition of the three-tier state machine.
///
/// # Errors
///
/// Same protocol violations as [`update_sync_state`](crate::update_sync_state),
/// plus [`SyncError::UnconfirmedLeaderEvents`] for backend batches that skip
/// over events the leader has not confirmed.
pub fn update_tiered_state<E: ChainEvent>(
    state: &TieredSyncState<E>,
    payload: TieredPayload<E>,
    options: &UpdateOptions,
) -> SyncResult<TieredUpdateResult<E>> {
    let result = match payload {
        TieredPayload::Advance {
            origin: Origin::Leader,
            new_events,
        } => handle_advance_leader(state, new_events),
        TieredPayload::Advance {
            origin: Origin::Backend,
            new_events,
        } => handle_advance_backend(state, new_events),
        TieredPayload::Rebase {
            origin: Origin::Leader,
            rollback_until,
            new_events,
        } => handle_rebase_leader(state, rollback_until, new_events),
        TieredPayload::Rebase {
            origin: Origin::Backend,
            rollback_until,
            new_events,
        } => handle_rebase_backend(state, rollback_until, new_events),
        TieredPayload::LocalPush { new_events } => handle_local_push(state, new_events),
        TieredPayload::TrimRollbackTail { new_rollback_start } => {
            let rollback_tail = trim_tail(&state.rollback_tail, new_rollback_start)?;
            Ok(UpdateResult::Advance {
                sync_state: TieredSyncState {
                    rollback_tail,
                    ..state.clone()
                },
                new_events: Vec::new(),
            })
        }
    }?;

    if options.check_invariants {
        if let Some(next) = result.sync_state() {
            next.check_invariants().inspect_err(|violation| {
                warn!(%violation, "tiered transition produced an inconsistent state");
            })?;
        }
    }

    Ok(result)
}

/// The leader confirmed events; match them against the local pending part.
pub fn handle_advance_leader<E: ChainEvent>(
    state: &TieredSyncState<E>,
    new_events: Vec<E>,
) -> SyncResult<TieredUpdateResult<E>> {
    ensure_sorted(&new_events, BatchSource::Leader)?;
    let leader_head = state.leader_head();
    let batch = unseen(new_events, leader_head);
    let Some(head) = batch.last().map(ChainEvent::id) else {
        return Ok(unchanged(state));
    };

    let local = &state.pending.local;
    let point = find_divergence_point(local, &batch);
    let diverged = point < local.len().min(batch.len());
    let remainder = &local[point..];

    let mut leader = state.pending.leader.clone();
    leader.extend(batch.iter().cloned());

    if diverged || is_detached(remainder, head) {
        let rebased = rebase_events(remainder, head)?;
        debug!(%head, matched = point, rolled_back = remainder.len(), "leader advance rebases local events");
        let mut applied = batch[point..].to_vec();
        applied.extend(rebased.iter().cloned());
        return Ok(UpdateResult::Rebase {
            sync_state: with_pending(state, leader, rebased),
            new_events: applied,
            events_to_rollback: remainder.to_vec(),
        });
    }

    debug!(%head, confirmed = point, "leader advance");
    Ok(UpdateResult::Advance {
        sync_state: with_pending(state, leader, remainder.to_vec()),
        new_events: batch[point..].to_vec(),
    })
}

/// The leader replaced its history starting at `rollback_until`.
pub fn handle_rebase_leader<E: ChainEvent>(
    state: &TieredSyncState<E>,
    rollback_until: EventId,
    new_events: Vec<E>,
) -> SyncResult<TieredUpdateResult<E>> {
    ensure_sorted(&new_events, BatchSource::Leader)?;
    let leader = &state.pending.leader;
    let index = leader
        .iter()
        .position(|e| e.id() == rollback_until)
        .ok_or_else(|| {
            warn!(%rollback_until, "leader rebase points outside leader-confirmed events");
            SyncError::RollbackPointNotFound { id: rollback_until }
        })?;
    if let Some(base) = leader[..index].last() {
        ensure_follows(&new_events, base.id(), BatchSource::Leader)?;
    }

    let mut events_to_rollback = leader[index..].to_vec();
    events_to_rollback.extend(state.pending.local.iter().cloned());

    let mut new_leader = leader[..index].to_vec();
    new_leader.extend(new_events.iter().cloned());
    let head = new_leader
        .last()
        .map_or_else(|| state.confirmed_head(), ChainEvent::id);
    let rebased = rebase_events(&state.pending.local, head)?;

    debug!(%rollback_until, %head, rolled_back = events_to_rollback.len(), "leader rebase");

    let mut applied = new_events;
    applied.extend(rebased.iter().cloned());
    Ok(UpdateResult::Rebase {
        sync_state: with_pending(state, new_leader, rebased),
        new_events: applied,
        events_to_rollback,
    })
}

/// The backend confirmed events; match them against leader and local events.
pub fn handle_advance_backend<E: ChainEvent>(
    state: &TieredSyncState<E>,
    new_events: Vec<E>,
) -> SyncResult<TieredUpdateResult<E>> {
    ensure_sorted(&new_events, BatchSource::Backend)?;
    let batch = unseen(new_events, state.confirmed_head());
    let Some(head) = batch.last().map(ChainEvent::id) else {
        return Ok(unchanged(state));
    };

    let leader_len = state.pending.leader.len();
    let combined = state.pending.combined();
    let point = find_divergence_point(&combined, &batch);
    if point > leader_len {
        warn!(
            backend_events = batch.len(),
            leader_events = leader_len,
            local_events = state.pending.local.len(),
            "backend confirmed events the leader has not confirmed"
        );
        return Err(SyncError::UnconfirmedLeaderEvents {
            backend_events: batch.len(),
            leader_events: leader_len,
            local_events: state.pending.local.len(),
        });
    }
    let diverged = point < combined.len().min(batch.len());
    let remainder = &combined[point..];

    let mut rollback_tail = state.rollback_tail.clone();
    rollback_tail.extend(batch.iter().cloned());

    if diverged || is_detached(remainder, head) {
        let rebased = rebase_events(remainder, head)?;
        debug!(%head, matched = point, rolled_back = remainder.len(), "backend advance rebases pending events");
        let mut applied = batch[point..].to_vec();
        applied.extend(rebased.iter().cloned());
        return Ok(UpdateResult::Rebase {
            sync_state: TieredSyncState {
                pending: split_pending(rebased, leader_len - point),
                rollback_tail,
                backend_head: head.global,
            },
            new_events: applied,
            events_to_rollback: remainder.to_vec(),
        });
    }

    debug!(%head, confirmed = point, "backend advance");
    Ok(UpdateResult::Advance {
        sync_state: TieredSyncState {
            pending: PendingEvents {
                leader: state.pending.leader[point..].to_vec(),
                local: state.pending.local.clone(),
            },
            rollback_tail,
            backend_head: head.global,
        },
        new_events: batch[point..].to_vec(),
    })
}

/// The backend replaced confirmed history starting at `rollback_until`.
pub fn handle_rebase_backend<E: ChainEvent>(
    state: &TieredSyncState<E>,
    rollback_until: EventId,
    new_events: Vec<E>,
) -> SyncResult<TieredUpdateResult<E>> {
    ensure_sorted(&new_events, BatchSource::Backend)?;
    let tail = &state.rollback_tail;
    let index = tail
        .iter()
        .position(|e| e.id() == rollback_until)
        .ok_or_else(|| {
            warn!(%rollback_until, "backend rebase points outside the rollback tail");
            SyncError::RollbackPointNotFound { id: rollback_until }
        })?;
    if let Some(base) = tail[..index].last() {
        ensure_follows(&new_events, base.id(), BatchSource::Backend)?;
    }

    let combined = state.pending.combined();
    let mut events_to_rollback = tail[index..].to_vec();
    events_to_rollback.extend(combined.iter().cloned());

    let mut rollback_tail = tail[..index].to_vec();
    rollback_tail.extend(new_events.iter().cloned());
    let head = rollback_tail
        .last()
        .map_or_else(|| tail[index].parent_id(), ChainEvent::id);
    let rebased = rebase_events(&combined, head)?;

    debug!(%rollback_until, %head, rolled_back = events_to_rollback.len(), "backend rebase");

    let mut applied = new_events;
    applied.extend(rebased.iter().cloned());
    Ok(UpdateResult::Rebase {
        sync_state: TieredSyncState {
            pending: split_pending(rebased, state.pending.leader.len()),
            rollback_tail,
            backend_head: head.global,
        },
        new_events: applied,
        events_to_rollback,
    })
}

fn handle_local_push<E: ChainEvent>(
    state: &TieredSyncState<E>,
    new_events: Vec<E>,
) -> SyncResult<TieredUpdateResult<E>> {
    let (events, rebased) = match push_onto(state.local_head(), new_events)? {
        PushOutcome::Empty => return Ok(unchanged(state)),
        PushOutcome::Reject(expected_minimum_id) => {
            return Ok(UpdateResult::Reject {
                expected_minimum_id,
            })
        }
        PushOutcome::Append(events) => (events, false),
        PushOutcome::Rebased(events) => (events, true),
    };

    let mut local = state.pending.local.clone();
    local.extend(events.iter().cloned());
    let sync_state = with_pending(state, state.pending.leader.clone(), local);

    Ok(if rebased {
        UpdateResult::Rebase {
            sync_state,
            new_events: events,
            events_to_rollback: Vec::new(),
        }
    } else {
        UpdateResult::Advance {
            sync_state,
            new_events: events,
        }
    })
}

fn unseen<E: ChainEvent>(events: Vec<E>, head: EventId) -> Vec<E> {
    events
        .into_iter()
        .filter(|e| e.id().is_greater_than(&head))
        .collect()
}

fn is_detached<E: ChainEvent>(remainder: &[E], head: EventId) -> bool {
    remainder
        .first()
        .is_some_and(|first| first_parent_gap(slice::from_ref(first), head).is_some())
}

fn unchanged<E: ChainEvent>(state: &TieredSyncState<E>) -> TieredUpdateResult<E> {
    UpdateResult::Advance {
        sync_state: state.clone(),
        new_events: Vec::new(),
    }
}

fn with_pending<E: ChainEvent>(
    state: &TieredSyncState<E>,
    leader: Vec<E>,
    local: Vec<E>,
) -> TieredSyncState<E> {
    TieredSyncState {
        pending: PendingEvents { leader, local },
        rollback_tail: state.rollback_tail.clone(),
        backend_head: state.backend_head,
    }
}

fn split_pending<E>(mut events: Vec<E>, leader_len: usize) -> PendingEvents<E> {
    let local = events.split_off(leader_len.min(events.len()));
    PendingEvents {
        leader: events,
        local,
    }
}

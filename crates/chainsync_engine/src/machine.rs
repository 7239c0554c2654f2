//! The two-tier (upstream / local) sync state machine.
//!
//! [`update_sync_state`] is a pure function: it reads the current state,
//! consumes one payload and returns the replacement state together with the
//! events the caller has to roll back and apply. It performs no I/O.

use crate::config::{RollbackTailPolicy, UpdateOptions};
use crate::divergence::align_pending;
use crate::error::{BatchSource, SyncError, SyncResult};
use crate::rebase::{rebase_events, successor};
use crate::result::UpdateResult;
use chainsync_protocol::{
    first_parent_gap, first_unsorted, ChainEvent, EventId, Payload, SyncState,
};
use std::slice;
use tracing::{debug, trace, warn};

/// Runs one transition of the sync state machine.
///
/// # Errors
///
/// Fails on protocol violations: unsorted batches, rollback or trim points
/// outside the rollback tail, replacement batches that do not follow the
/// retained history, ids whose successor would overflow, and (with invariant
/// checks enabled) transitions that would produce an inconsistent state. A stale local push is not an error;
/// it yields [`UpdateResult::Reject`].
pub fn update_sync_state<E: ChainEvent>(
    state: &SyncState<E>,
    payload: Payload<E>,
    options: &UpdateOptions,
) -> SyncResult<UpdateResult<E>> {
    let result = match payload {
        Payload::UpstreamRebase {
            rollback_until,
            new_events,
            trim_rollback_until,
        } => upstream_rebase(
            state,
            rollback_until,
            new_events,
            trim_rollback_until,
            options.rollback_tail,
        ),
        Payload::UpstreamAdvance { new_events } => {
            upstream_advance(state, new_events, options.ignore_local_events)
        }
        Payload::LocalPush { new_events } => local_push(state, new_events),
        Payload::TrimRollbackTail { new_rollback_start } => {
            trim_rollback_tail(state, new_rollback_start)
        }
    }?;

    if options.check_invariants {
        if let Some(next) = result.sync_state() {
            next.check_invariants().inspect_err(|violation| {
                warn!(%violation, "transition produced an inconsistent sync state");
            })?;
        }
    }

    Ok(result)
}

fn upstream_rebase<E: ChainEvent>(
    state: &SyncState<E>,
    rollback_until: EventId,
    new_events: Vec<E>,
    trim_rollback_until: Option<EventId>,
    policy: RollbackTailPolicy,
) -> SyncResult<UpdateResult<E>> {
    ensure_sorted(&new_events, BatchSource::UpstreamRebase)?;

    let index = state
        .rollback_tail
        .iter()
        .position(|e| e.id() == rollback_until)
        .ok_or_else(|| {
            warn!(%rollback_until, "upstream rebase points outside the rollback tail");
            SyncError::RollbackPointNotFound { id: rollback_until }
        })?;
    let retained = &state.rollback_tail[..index];
    if let Some(base) = retained.last() {
        ensure_follows(&new_events, base.id(), BatchSource::UpstreamRebase)?;
    }

    let mut events_to_rollback = state.rollback_tail[index..].to_vec();
    events_to_rollback.extend(state.pending.iter().cloned());

    let upstream_head = new_events.last().map_or(rollback_until, |e| e.id());
    let rebased_pending = rebase_events(&state.pending, upstream_head)?;

    let mut rollback_tail = match policy {
        RollbackTailPolicy::RetainConfirmed => retained.to_vec(),
        RollbackTailPolicy::ResetOnRebase => Vec::new(),
    };
    match trim_rollback_until {
        Some(trim) => {
            rollback_tail.extend(new_events.iter().cloned());
            rollback_tail.retain(|e| e.id() >= trim);
        }
        None if policy == RollbackTailPolicy::RetainConfirmed => {
            rollback_tail.extend(new_events.iter().cloned());
        }
        None => {}
    }

    debug!(
        %rollback_until,
        %upstream_head,
        rolled_back = events_to_rollback.len(),
        replayed = rebased_pending.len(),
        "upstream rebase"
    );

    let mut applied = new_events;
    applied.extend(rebased_pending.iter().cloned());

    Ok(UpdateResult::Rebase {
        sync_state: SyncState::from_parts(rebased_pending, rollback_tail, upstream_head),
        new_events: applied,
        events_to_rollback,
    })
}

fn upstream_advance<E: ChainEvent>(
    state: &SyncState<E>,
    new_events: Vec<E>,
    ignore_local_events: bool,
) -> SyncResult<UpdateResult<E>> {
    ensure_sorted(&new_events, BatchSource::UpstreamAdvance)?;

    // Delivery is at-least-once: anything at or below the upstream head
    // was already confirmed.
    let received = new_events.len();
    let batch: Vec<E> = new_events
        .into_iter()
        .filter(|e| e.id().is_greater_than(&state.upstream_head))
        .collect();
    if batch.len() < received {
        trace!(
            dropped = received - batch.len(),
            upstream_head = %state.upstream_head,
            "dropping already confirmed upstream events"
        );
    }

    let Some(last) = batch.last() else {
        return Ok(UpdateResult::Advance {
            sync_state: state.clone(),
            new_events: Vec::new(),
        });
    };
    let upstream_head = last.id();

    let alignment = align_pending(&state.pending, &batch, ignore_local_events);
    let remainder = &state.pending[alignment.confirmed..];
    let detached = remainder
        .first()
        .is_some_and(|first| first_parent_gap(slice::from_ref(first), upstream_head).is_some());

    let rollback_tail = confirmed_tail(
        &state.rollback_tail,
        &state.pending[..alignment.confirmed],
        &batch,
        ignore_local_events,
    );

    if alignment.diverged || detached {
        let divergent = remainder.to_vec();
        let rebased = rebase_events(&divergent, upstream_head)?;

        debug!(
            %upstream_head,
            matched = alignment.matched,
            rolled_back = divergent.len(),
            "upstream advance diverged from pending events"
        );

        let mut applied = batch[alignment.matched..].to_vec();
        applied.extend(rebased.iter().cloned());

        return Ok(UpdateResult::Rebase {
            sync_state: SyncState::from_parts(rebased, rollback_tail, upstream_head),
            new_events: applied,
            events_to_rollback: divergent,
        });
    }

    debug!(
        %upstream_head,
        confirmed = alignment.matched,
        skipped_local = alignment.confirmed - alignment.matched,
        still_pending = remainder.len(),
        "upstream advance"
    );

    Ok(UpdateResult::Advance {
        sync_state: SyncState::from_parts(remainder.to_vec(), rollback_tail, upstream_head),
        new_events: batch[alignment.matched..].to_vec(),
    })
}

/// Appends the confirmed pending prefix and the rest of `batch` to `tail`.
///
/// Entries of the prefix that were matched are replaced by their
/// counterparts in `batch`. With `skip_local`, local entries the upstream
/// stepped over stay in place, so the tail keeps every event that is still
/// in the materialized view.
fn confirmed_tail<E: ChainEvent>(
    tail: &[E],
    prefix: &[E],
    batch: &[E],
    skip_local: bool,
) -> Vec<E> {
    let mut confirmed = batch.iter().peekable();
    let mut rollback_tail = tail.to_vec();
    for event in prefix {
        let skipped = skip_local && event.is_local();
        match confirmed.next_if(|_| !skipped) {
            Some(counterpart) => rollback_tail.push(counterpart.clone()),
            None => rollback_tail.push(event.clone()),
        }
    }
    rollback_tail.extend(confirmed.cloned());
    rollback_tail
}

fn local_push<E: ChainEvent>(
    state: &SyncState<E>,
    new_events: Vec<E>,
) -> SyncResult<UpdateResult<E>> {
    let (events, rebased) = match push_onto(state.local_head, new_events)? {
        PushOutcome::Empty => {
            return Ok(UpdateResult::Advance {
                sync_state: state.clone(),
                new_events: Vec::new(),
            })
        }
        PushOutcome::Reject(expected_minimum_id) => {
            return Ok(UpdateResult::Reject {
                expected_minimum_id,
            })
        }
        PushOutcome::Append(events) => (events, false),
        PushOutcome::Rebased(events) => (events, true),
    };

    let mut pending = state.pending.clone();
    pending.extend(events.iter().cloned());
    let sync_state = SyncState::from_parts(pending, state.rollback_tail.clone(), state.upstream_head);

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

fn trim_rollback_tail<E: ChainEvent>(
    state: &SyncState<E>,
    new_rollback_start: EventId,
) -> SyncResult<UpdateResult<E>> {
    let rollback_tail = trim_tail(&state.rollback_tail, new_rollback_start)?;
    Ok(UpdateResult::Advance {
        sync_state: SyncState {
            rollback_tail,
            ..state.clone()
        },
        new_events: Vec::new(),
    })
}

/// What a local push does to a chain ending at a given head.
pub(crate) enum PushOutcome<E> {
    Empty,
    Reject(EventId),
    Append(Vec<E>),
    Rebased(Vec<E>),
}

pub(crate) fn push_onto<E: ChainEvent>(
    local_head: EventId,
    new_events: Vec<E>,
) -> SyncResult<PushOutcome<E>> {
    let Some(first) = new_events.first() else {
        return Ok(PushOutcome::Empty);
    };
    ensure_sorted(&new_events, BatchSource::LocalPush)?;

    let head = first.id();
    if !head.is_greater_than(&local_head) {
        let expected_minimum_id = successor(local_head, true)?;
        debug!(%head, %local_head, %expected_minimum_id, "rejecting local push with stale ids");
        return Ok(PushOutcome::Reject(expected_minimum_id));
    }

    if let Some(index) = first_parent_gap(&new_events, local_head) {
        debug!(%local_head, index, "local push is not linked to the local head");
        return Ok(PushOutcome::Rebased(rebase_events(&new_events, local_head)?));
    }

    Ok(PushOutcome::Append(new_events))
}

pub(crate) fn trim_tail<E: ChainEvent>(
    rollback_tail: &[E],
    new_rollback_start: EventId,
) -> SyncResult<Vec<E>> {
    let index = rollback_tail
        .iter()
        .position(|e| e.id() == new_rollback_start)
        .ok_or_else(|| {
            warn!(%new_rollback_start, "trim point outside the rollback tail");
            SyncError::TrimPointNotFound {
                id: new_rollback_start,
            }
        })?;
    trace!(dropped = index, %new_rollback_start, "trimming rollback tail");
    Ok(rollback_tail[index..].to_vec())
}

pub(crate) fn ensure_sorted<E: ChainEvent>(events: &[E], batch: BatchSource) -> SyncResult<()> {
    let Some(index) = first_unsorted(events) else {
        return Ok(());
    };
    let previous = events[index - 1].id();
    let current = events[index].id();
    warn!(%batch, index, %previous, %current, "unsorted batch");
    Err(SyncError::UnsortedBatch {
        batch,
        index,
        previous,
        current,
    })
}

pub(crate) fn ensure_follows<E: ChainEvent>(
    events: &[E],
    base: EventId,
    batch: BatchSource,
) -> SyncResult<()> {
    match events.first() {
        Some(first) if !first.id().is_greater_than(&base) => {
            warn!(%batch, first = %first.id(), %base, "batch does not follow retained history");
            Err(SyncError::BatchBehindBase {
                batch,
                first: first.id(),
                base,
            })
        }
        _ => Ok(()),
    }
}

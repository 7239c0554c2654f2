//! The storage seam between the sync leader and the application.

use crate::error::{SyncError, SyncResult};
use chainsync_protocol::{decode_checkpoint, encode_checkpoint, ChainEvent, EventId, SyncState};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, trace};

/// Everything a materializer has to do for one transition.
#[derive(Debug)]
pub struct Transition<'a, E> {
    /// Events to undo, in application order; undo them last to first.
    pub events_to_rollback: &'a [E],
    /// Events to apply, in order, after the rollback.
    pub new_events: &'a [E],
    /// State to persist together with the events.
    pub sync_state: &'a SyncState<E>,
}

/// Applies transitions to the application's materialized view.
///
/// Implementations must apply the rollback, the new events and the state in
/// one storage transaction: either all of it becomes visible or none.
pub trait Materializer<E>: Send + Sync {
    /// Applies one transition atomically.
    fn apply_transition(&self, transition: &Transition<'_, E>) -> SyncResult<()>;

    /// Returns the last persisted state, if any.
    fn persisted_state(&self) -> SyncResult<Option<SyncState<E>>>;
}

/// An in-memory materializer for testing.
///
/// Keeps the materialized event log, checks that every rollback undoes the
/// most recently applied events, and stores the state as a checkpoint.
pub struct MemoryMaterializer<E> {
    log: RwLock<Vec<E>>,
    checkpoint: RwLock<Option<Vec<u8>>>,
    fail_next: AtomicBool,
    transitions: AtomicU64,
}

impl<E> MemoryMaterializer<E> {
    /// Creates an empty materializer.
    pub fn new() -> Self {
        Self::with_log(Vec::new())
    }

    /// Creates a materializer whose view already holds `log`.
    pub fn with_log(log: Vec<E>) -> Self {
        Self {
            log: RwLock::new(log),
            checkpoint: RwLock::new(None),
            fail_next: AtomicBool::new(false),
            transitions: AtomicU64::new(0),
        }
    }

    /// Makes the next transition fail without touching the view.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Number of transitions applied successfully.
    pub fn transitions(&self) -> u64 {
        self.transitions.load(Ordering::SeqCst)
    }

    /// Raw bytes of the last persisted checkpoint.
    pub fn checkpoint_bytes(&self) -> Option<Vec<u8>> {
        self.checkpoint.read().clone()
    }
}

impl<E: Clone> MemoryMaterializer<E> {
    /// Returns the materialized event log.
    pub fn log(&self) -> Vec<E> {
        self.log.read().clone()
    }
}

impl<E: ChainEvent> MemoryMaterializer<E> {
    /// Ids of the materialized event log.
    pub fn log_ids(&self) -> Vec<EventId> {
        self.log.read().iter().map(ChainEvent::id).collect()
    }
}

impl<E> Default for MemoryMaterializer<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Materializer<E> for MemoryMaterializer<E>
where
    E: ChainEvent + Serialize + DeserializeOwned + Send + Sync,
{
    fn apply_transition(&self, transition: &Transition<'_, E>) -> SyncResult<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(SyncError::materializer("injected failure"));
        }

        let mut log = self.log.write();
        let mut next = log.clone();
        for expected in transition.events_to_rollback.iter().rev() {
            match next.pop() {
                Some(undone) if undone.id() == expected.id() => {
                    trace!(id = %undone.id(), "undo");
                }
                Some(undone) => {
                    return Err(SyncError::materializer(format!(
                        "rollback of {} hit {} instead",
                        expected.id(),
                        undone.id()
                    )))
                }
                None => {
                    return Err(SyncError::materializer(format!(
                        "rollback of {} past the start of the log",
                        expected.id()
                    )))
                }
            }
        }
        next.extend(transition.new_events.iter().cloned());
        let checkpoint = encode_checkpoint(transition.sync_state)?;

        *log = next;
        *self.checkpoint.write() = Some(checkpoint);
        self.transitions.fetch_add(1, Ordering::SeqCst);

        debug!(
            rolled_back = transition.events_to_rollback.len(),
            applied = transition.new_events.len(),
            log_len = log.len(),
            "materialized transition"
        );
        Ok(())
    }

    fn persisted_state(&self) -> SyncResult<Option<SyncState<E>>> {
        self.checkpoint
            .read()
            .as_deref()
            .map(decode_checkpoint::<E>)
            .transpose()
            .map_err(SyncError::from)
    }
}

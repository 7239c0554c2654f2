//! Error types for the sync engine.

use chainsync_protocol::{CodecError, EventId, InvariantViolation};
use std::fmt;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Where an event batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchSource {
    /// `upstream-advance` payload.
    UpstreamAdvance,
    /// `upstream-rebase` payload.
    UpstreamRebase,
    /// `local-push` payload.
    LocalPush,
    /// Leader update in the three-tier pipeline.
    Leader,
    /// Backend update in the three-tier pipeline.
    Backend,
}

impl fmt::Display for BatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchSource::UpstreamAdvance => "upstream-advance",
            BatchSource::UpstreamRebase => "upstream-rebase",
            BatchSource::LocalPush => "local-push",
            BatchSource::Leader => "leader",
            BatchSource::Backend => "backend",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while reconciling event chains.
///
/// A `local-push` with stale ids is not an error: it yields
/// [`UpdateResult::Reject`](crate::UpdateResult::Reject).
#[derive(Error, Debug)]
pub enum SyncError {
    /// An upstream rebase names history this tier no longer retains.
    #[error("rollback point {id} not found in rollback tail")]
    RollbackPointNotFound {
        /// The requested rollback point.
        id: EventId,
    },

    /// A trim names an event that is not in the rollback tail.
    #[error("trim point {id} not found in rollback tail")]
    TrimPointNotFound {
        /// The requested new tail start.
        id: EventId,
    },

    /// A batch is not strictly ascending.
    #[error("{batch} batch is not sorted: {current} at index {index} follows {previous}")]
    UnsortedBatch {
        /// Payload kind that carried the batch.
        batch: BatchSource,
        /// Index of the first out-of-order event.
        index: usize,
        /// Id of the event before it.
        previous: EventId,
        /// Id of the out-of-order event.
        current: EventId,
    },

    /// A replacement batch does not sort after the history it builds on.
    #[error("{batch} batch starts at {first} which does not follow {base}")]
    BatchBehindBase {
        /// Payload kind that carried the batch.
        batch: BatchSource,
        /// First event of the batch.
        first: EventId,
        /// Last retained event the batch should follow.
        base: EventId,
    },

    /// Backend events skip over events the leader has not confirmed yet.
    #[error(
        "Cannot process backend events when there are unconfirmed leader events \
         ({backend_events} backend, {leader_events} leader, {local_events} local)"
    )]
    UnconfirmedLeaderEvents {
        /// Size of the backend batch.
        backend_events: usize,
        /// Events awaiting backend confirmation.
        leader_events: usize,
        /// Events awaiting leader confirmation.
        local_events: usize,
    },

    /// Minting the successor of an id would overflow one of its components.
    #[error("event id space exhausted after {after}")]
    IdSpaceExhausted {
        /// The id that has no successor.
        after: EventId,
    },

    /// A transition produced a state that breaks a structural invariant.
    #[error("invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),

    /// The materializer failed to apply a transition.
    #[error("materializer error: {0}")]
    Materializer(String),

    /// Checkpoint or payload codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The leader stopped after a protocol violation and needs a reset.
    #[error("sync halted: {reason}")]
    Halted {
        /// The error that halted the leader.
        reason: String,
    },
}

impl SyncError {
    /// Creates a materializer error.
    pub fn materializer(message: impl Into<String>) -> Self {
        Self::Materializer(message.into())
    }

    /// Returns true if the error means an upstream tier or the transport
    /// broke the ordering contract. Such errors are never retried; the
    /// caller should resync from scratch.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            SyncError::RollbackPointNotFound { .. }
                | SyncError::TrimPointNotFound { .. }
                | SyncError::UnsortedBatch { .. }
                | SyncError::BatchBehindBase { .. }
                | SyncError::UnconfirmedLeaderEvents { .. }
                | SyncError::IdSpaceExhausted { .. }
                | SyncError::Invariant(_)
        )
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Materializer(_))
    }
}

//! Inputs to the sync state machine.

use crate::event::ChainEvent;
use crate::event_id::EventId;
use serde::{Deserialize, Serialize};

/// A payload delivered to the two-tier state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_tag", rename_all = "kebab-case")]
pub enum Payload<E> {
    /// Upstream dropped previously accepted history starting at
    /// `rollback_until` (inclusive) and replaced it with `new_events`.
    UpstreamRebase {
        /// First rolled back event; must be in the rollback tail.
        rollback_until: EventId,
        /// Replacement history, ascending.
        new_events: Vec<E>,
        /// Keep only the resulting rollback tail entries at or after this id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trim_rollback_until: Option<EventId>,
    },
    /// Upstream confirmed events, possibly followed by unseen ones.
    UpstreamAdvance {
        /// Confirmed events, ascending.
        new_events: Vec<E>,
    },
    /// The application layer of this tier appended events.
    LocalPush {
        /// New local events, ascending.
        new_events: Vec<E>,
    },
    /// Drop rollback tail entries before `new_rollback_start`.
    TrimRollbackTail {
        /// First entry to keep.
        new_rollback_start: EventId,
    },
}

impl<E: ChainEvent> Payload<E> {
    /// Creates an upstream advance payload.
    pub fn upstream_advance(new_events: Vec<E>) -> Self {
        Payload::UpstreamAdvance { new_events }
    }

    /// Creates an upstream rebase payload without tail trimming.
    pub fn upstream_rebase(rollback_until: EventId, new_events: Vec<E>) -> Self {
        Payload::UpstreamRebase {
            rollback_until,
            new_events,
            trim_rollback_until: None,
        }
    }

    /// Creates a local push payload.
    pub fn local_push(new_events: Vec<E>) -> Self {
        Payload::LocalPush { new_events }
    }

    /// Creates a rollback tail trim payload.
    pub fn trim_rollback_tail(new_rollback_start: EventId) -> Self {
        Payload::TrimRollbackTail { new_rollback_start }
    }

    /// Returns the wire tag of the payload.
    pub fn tag(&self) -> &'static str {
        match self {
            Payload::UpstreamRebase { .. } => "upstream-rebase",
            Payload::UpstreamAdvance { .. } => "upstream-advance",
            Payload::LocalPush { .. } => "local-push",
            Payload::TrimRollbackTail { .. } => "trim-rollback-tail",
        }
    }

    /// Returns the events carried by the payload.
    pub fn events(&self) -> &[E] {
        match self {
            Payload::UpstreamRebase { new_events, .. }
            | Payload::UpstreamAdvance { new_events }
            | Payload::LocalPush { new_events } => new_events,
            Payload::TrimRollbackTail { .. } => &[],
        }
    }
}

//! A minimal event type for exercising the sync algorithms.

use chainsync_protocol::{ChainEvent, EventId};
use serde::{Deserialize, Serialize};

/// Event used throughout the tests.
///
/// `name` stands in for the application payload (mutation name and
/// arguments): two events are the same event when id and name match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestEvent {
    /// Event id.
    pub id: EventId,
    /// Parent id.
    pub parent: EventId,
    /// Payload stand-in.
    pub name: String,
    /// Whether the event was minted on this tier.
    pub local: bool,
}

impl TestEvent {
    /// Creates an event.
    pub fn new(id: EventId, parent: EventId, name: impl Into<String>, local: bool) -> Self {
        Self {
            id,
            parent,
            name: name.into(),
            local,
        }
    }

    /// Returns the event with a different parent.
    #[must_use]
    pub fn with_parent(mut self, parent: EventId) -> Self {
        self.parent = parent;
        self
    }

    /// Returns the event with a different id.
    #[must_use]
    pub fn with_id(mut self, id: EventId) -> Self {
        self.id = id;
        self
    }

    /// Returns the event as upstream would echo it back.
    #[must_use]
    pub fn confirmed(mut self) -> Self {
        self.local = false;
        self
    }
}

impl ChainEvent for TestEvent {
    fn id(&self) -> EventId {
        self.id
    }

    fn parent_id(&self) -> EventId {
        self.parent
    }

    fn is_local(&self) -> bool {
        self.local
    }

    fn is_same_event(&self, other: &Self) -> bool {
        self.id == other.id && self.name == other.name
    }

    fn rebase(&self, new_id: EventId, new_parent_id: EventId) -> Self {
        Self {
            id: new_id,
            parent: new_parent_id,
            name: self.name.clone(),
            local: self.local,
        }
    }
}

/// Parent an event at `id` has when nothing says otherwise: the previous
/// local slot, or the previous global slot for a `local == 0` id.
pub fn default_parent(id: EventId) -> EventId {
    if id.local > 0 {
        EventId::new(id.global, id.local - 1)
    } else {
        EventId::new(id.global - 1, 0)
    }
}

/// An upstream-originated event at `(global, local)`.
pub fn upstream(global: i64, local: u32, name: &str) -> TestEvent {
    let id = EventId::new(global, local);
    TestEvent::new(id, default_parent(id), name, false)
}

/// A locally minted event at `(global, local)`.
pub fn local(global: i64, local: u32, name: &str) -> TestEvent {
    let id = EventId::new(global, local);
    TestEvent::new(id, default_parent(id), name, true)
}

/// An upstream event named after its id, `e_{global}_{local}`.
pub fn e(global: i64, local: u32) -> TestEvent {
    upstream(global, local, &format!("e_{global}_{local}"))
}

/// Re-parents `events` so each one follows its predecessor, the first one
/// following `base`. Ids are kept.
pub fn link(base: EventId, events: Vec<TestEvent>) -> Vec<TestEvent> {
    let mut prev = base;
    events
        .into_iter()
        .map(|event| {
            let event = event.with_parent(prev);
            prev = event.id;
            event
        })
        .collect()
}

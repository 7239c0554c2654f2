//! Two-component event identifiers.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Identifier of an event within a chain.
///
/// `global` is only ever minted by a confirming upstream tier. `local` is
/// minted by the tier that created the event, counting up from the last
/// global id it knew about. The derived ordering compares `global` first and
/// `local` second, which is the total order every chain is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId {
    /// Component assigned by the authoritative upstream.
    pub global: i64,
    /// Component assigned by the local tier within one global slot.
    pub local: u32,
}

/// Parent of the very first event and the initial upstream head.
///
/// Sorts before every id an upstream or local tier can mint.
pub const ROOT_ID: EventId = EventId {
    global: -1,
    local: 0,
};

impl EventId {
    /// Creates a new event id.
    pub const fn new(global: i64, local: u32) -> Self {
        Self { global, local }
    }

    /// Returns true if this is the root id.
    pub fn is_root(&self) -> bool {
        *self == ROOT_ID
    }

    /// Mints the id following `self`.
    ///
    /// A local successor keeps `global` and bumps `local`; a global
    /// successor bumps `global` and resets `local` to zero.
    ///
    /// # Panics
    ///
    /// Panics if the bumped component overflows. Use
    /// [`checked_next`](Self::checked_next) for ids taken from payloads.
    pub fn next(&self, is_local: bool) -> Self {
        match self.checked_next(is_local) {
            Some(next) => next,
            None => panic!("event id space exhausted after {self}"),
        }
    }

    /// Mints the id following `self`, or `None` if the bumped component
    /// would overflow.
    pub fn checked_next(&self, is_local: bool) -> Option<Self> {
        if is_local {
            Some(Self {
                global: self.global,
                local: self.local.checked_add(1)?,
            })
        } else {
            Some(Self {
                global: self.global.checked_add(1)?,
                local: 0,
            })
        }
    }

    /// Compares two ids in chain order.
    pub fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    /// Returns true if `self` sorts strictly after `other`.
    pub fn is_greater_than(&self, other: &Self) -> bool {
        self > other
    }

    /// Returns the id of the global slot this id lives in.
    pub fn global_base(&self) -> Self {
        Self {
            global: self.global,
            local: 0,
        }
    }
}

impl Default for EventId {
    fn default() -> Self {
        ROOT_ID
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}.{}", self.global, self.local)
    }
}

impl From<(i64, u32)> for EventId {
    fn from((global, local): (i64, u32)) -> Self {
        Self { global, local }
    }
}

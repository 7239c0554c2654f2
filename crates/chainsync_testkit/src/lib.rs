//! # chainsync testkit
//!
//! Test utilities for chainsync.
//!
//! This crate provides:
//! - `TestEvent`, a small `ChainEvent` implementation
//! - Builders for upstream and local events and linked chains
//! - Fixtures for the reference reconciliation scenarios
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chainsync_testkit::prelude::*;
//!
//! let chain = link(ROOT_ID, vec![upstream(0, 0, "a"), local(0, 1, "b")]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod event;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::event::*;
    pub use crate::fixtures::Scenario;
    pub use crate::generators::*;
    pub use chainsync_protocol::{ChainEvent, EventId, Payload, SyncState, ROOT_ID};
}

pub use event::{default_parent, e, link, local, upstream, TestEvent};
pub use fixtures::Scenario;
pub use generators::*;

//! # chainsync engine
//!
//! Reconciles an optimistic local event chain with an authoritative
//! upstream chain.
//!
//! This crate provides:
//! - The two-tier sync state machine (`update_sync_state`)
//! - The three-tier backend / leader / local variant (`update_tiered_state`)
//! - Divergence detection and the rebase executor
//! - `SyncLeader`, a single-writer driver that hands transitions to a
//!   `Materializer`
//! - `MemoryMaterializer` for tests
//!
//! ## Architecture
//!
//! Every tier keeps a chain of events that are applied optimistically
//! (`pending`) and a tail of recently confirmed ones (`rollback_tail`).
//! Upstream messages either extend the confirmed chain or replace part of
//! it; when pending events no longer fit on top of the confirmed chain they
//! are rolled back and re-parented onto the new head.
//!
//! ## Key Invariants
//!
//! - Transitions are pure: `(state, payload) -> (state', result)`
//! - Pending and tail ids are strictly increasing, tail below pending
//! - Pending events stay parent-linked from the upstream head
//! - Replaying `events_to_rollback` backwards and then `new_events` on the
//!   old view yields `rollback_tail' ++ pending'`
//! - Stale local pushes are rejected, never reordered

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod divergence;
mod error;
mod leader;
mod machine;
mod materializer;
mod rebase;
mod result;
mod tiered;

pub use config::{LeaderConfig, RollbackTailPolicy, UpdateOptions};
pub use divergence::{align_pending, find_divergence_point, Alignment};
pub use error::{BatchSource, SyncError, SyncResult};
pub use leader::{LeaderStats, LeaderStatus, SyncLeader};
pub use machine::update_sync_state;
pub use materializer::{Materializer, MemoryMaterializer, Transition};
pub use rebase::rebase_events;
pub use result::UpdateResult;
pub use tiered::{
    handle_advance_backend, handle_advance_leader, handle_rebase_backend, handle_rebase_leader,
    update_tiered_state, TieredUpdateResult,
};

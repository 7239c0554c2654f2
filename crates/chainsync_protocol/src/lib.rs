//! # chainsync protocol
//!
//! Data types shared by every tier of the chainsync pipeline.
//!
//! This crate provides:
//! - `EventId` with its total order and successor rule
//! - The `ChainEvent` capability trait implemented by application events
//! - `SyncState`, the durable per-tier reconciliation state
//! - `Payload`, the tagged input of the state machine
//! - Three-tier (backend / leader / local) state and payload types
//! - CBOR encoding for checkpoints and payloads
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod error;
mod event;
mod event_id;
mod payload;
mod state;
mod tiered;

pub use codec::{
    decode_checkpoint, decode_payload, encode_checkpoint, encode_payload, CHECKPOINT_MAGIC,
    CHECKPOINT_VERSION,
};
pub use error::{CodecError, CodecResult};
pub use event::{first_parent_gap, first_unsorted, ChainEvent};
pub use event_id::{EventId, ROOT_ID};
pub use payload::Payload;
pub use state::{InvariantViolation, SyncState};
pub use tiered::{Origin, PendingEvents, TieredPayload, TieredSyncState};

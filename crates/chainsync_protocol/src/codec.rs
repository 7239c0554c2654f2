//! CBOR encoding of sync states and payloads.
//!
//! Checkpoint format:
//! - Magic: `CSYNCKPT` (8 bytes)
//! - Version: u16 (little-endian)
//! - Body: CBOR-encoded [`SyncState`]
//!
//! Payloads are plain CBOR maps tagged by `_tag`.

use crate::error::{CodecError, CodecResult};
use crate::payload::Payload;
use crate::state::SyncState;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Magic bytes at the start of a checkpoint.
pub const CHECKPOINT_MAGIC: &[u8; 8] = b"CSYNCKPT";

/// Current checkpoint format version.
pub const CHECKPOINT_VERSION: u16 = 1;

const HEADER_LEN: usize = CHECKPOINT_MAGIC.len() + 2;

/// Encodes a sync state into a checkpoint.
pub fn encode_checkpoint<E: Serialize>(state: &SyncState<E>) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(HEADER_LEN + 64);
    buf.extend_from_slice(CHECKPOINT_MAGIC);
    buf.extend_from_slice(&CHECKPOINT_VERSION.to_le_bytes());
    ciborium::into_writer(state, &mut buf)
        .map_err(|e| CodecError::encoding_failed(format!("sync state: {e}")))?;
    Ok(buf)
}

/// Decodes a checkpoint written by [`encode_checkpoint`].
pub fn decode_checkpoint<E: DeserializeOwned>(data: &[u8]) -> CodecResult<SyncState<E>> {
    if data.len() < HEADER_LEN {
        return Err(CodecError::invalid_header("checkpoint too small"));
    }
    if &data[..CHECKPOINT_MAGIC.len()] != CHECKPOINT_MAGIC {
        return Err(CodecError::invalid_header("invalid magic bytes"));
    }

    let version = u16::from_le_bytes([data[8], data[9]]);
    if version != CHECKPOINT_VERSION {
        return Err(CodecError::UnsupportedVersion {
            found: version,
            expected: CHECKPOINT_VERSION,
        });
    }

    ciborium::from_reader(&data[HEADER_LEN..])
        .map_err(|e| CodecError::decoding_failed(format!("sync state: {e}")))
}

/// Encodes a payload to CBOR.
pub fn encode_payload<E: Serialize>(payload: &Payload<E>) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(payload, &mut buf)
        .map_err(|e| CodecError::encoding_failed(format!("payload: {e}")))?;
    Ok(buf)
}

/// Decodes a payload from CBOR.
///
/// Unknown `_tag` values are reported as [`CodecError::DecodingFailed`].
pub fn decode_payload<E: DeserializeOwned>(bytes: &[u8]) -> CodecResult<Payload<E>> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::decoding_failed(format!("payload: {e}")))
}

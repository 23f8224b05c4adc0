//! Hash-chain primitives: hashing and chain integrity verification.
//!
//! Hash input layout (bytes, in order):
//!   1. turn_id as UTF-8 bytes
//!   2. sequence as 8-byte little-endian
//!   3. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   4. canonical JSON of the trace record

use sha2::{Digest, Sha256};

use waypoint_contracts::{
    error::{WaypointError, WaypointResult},
    trace::TraceRecord,
};

use crate::event::TraceEvent;

/// Compute the SHA-256 hash for a single trace event.
///
/// The hash commits to the event's position in the chain, the turn it
/// belongs to, its link to the previous event, and the full record.
///
/// Returns a lowercase 64-character hex string.
pub fn hash_event(
    turn_id: &str,
    sequence: u64,
    record: &TraceRecord,
    prev_hash: &str,
) -> WaypointResult<String> {
    let record_json = serde_json::to_vec(record).map_err(|e| WaypointError::TraceWriteFailed {
        reason: format!("trace record is not serializable: {}", e),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(turn_id.as_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&record_json);

    Ok(hex::encode(hasher.finalize()))
}

/// Verify the integrity of a hash chain.
///
/// Checks prev-hash linkage (starting from `GENESIS_HASH`), that sequence
/// numbers run 0, 1, 2, …, and that every `this_hash` matches the value
/// recomputed from the event's own fields. An empty chain is valid.
pub fn verify_chain(events: &[TraceEvent]) -> bool {
    let mut expected_prev = TraceEvent::GENESIS_HASH.to_string();

    for (position, event) in events.iter().enumerate() {
        if event.sequence != position as u64 || event.prev_hash != expected_prev {
            return false;
        }

        match hash_event(&event.turn_id, event.sequence, &event.record, &event.prev_hash) {
            Ok(recomputed) if recomputed == event.this_hash => {}
            _ => return false,
        }

        expected_prev = event.this_hash.clone();
    }

    true
}

//! Trace event and log types.
//!
//! `TraceEvent` wraps one `TraceRecord` with its sequence number and the
//! hashes that make tampering detectable. `TraceLog` is the exported view
//! of one turn's chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use waypoint_contracts::trace::TraceRecord;

/// A single entry in the hash chain of one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Position in the chain, starting at 0.
    pub sequence: u64,

    pub turn_id: String,

    pub record: TraceRecord,

    /// `this_hash` of the previous event, or `GENESIS_HASH` for the first.
    pub prev_hash: String,

    pub this_hash: String,
}

impl TraceEvent {
    /// The `prev_hash` of the first event in every chain: 64 hex zeros.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";
}

/// The trace of one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceLog {
    pub turn_id: String,

    /// All events in chain order (sequence 0 first).
    pub events: Vec<TraceEvent>,

    /// When the turn's trace was sealed; `None` while the turn is running.
    pub finalized_at: Option<DateTime<Utc>>,

    /// The `this_hash` of the last event. Empty if the turn recorded nothing.
    pub terminal_hash: String,
}

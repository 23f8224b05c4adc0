//! In-memory implementation of `TraceWriter`.
//!
//! `InMemoryTraceWriter` keeps one hash chain per turn in a map protected
//! by a `Mutex`. Clones share the same chains, so the runtime can hand one
//! clone to the engine and keep another for inspection.
//!
//! Only the most recent `retention` finalized turns are kept; older sealed
//! chains are evicted as new turns are finalized. Open chains are never
//! evicted.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use waypoint_contracts::{
    error::{WaypointError, WaypointResult},
    trace::TraceRecord,
};
use waypoint_core::traits::TraceWriter;

use crate::{
    chain::{hash_event, verify_chain},
    event::{TraceEvent, TraceLog},
};

// ── Internal mutable state ────────────────────────────────────────────────────

/// The chain of a single turn.
pub(crate) struct TurnChain {
    pub(crate) events: Vec<TraceEvent>,

    /// The next sequence number to assign.
    pub(crate) sequence: u64,

    /// `this_hash` of the last event, or `GENESIS_HASH` before the first.
    pub(crate) last_hash: String,

    pub(crate) finalized_at: Option<DateTime<Utc>>,
}

/// Every chain, plus the order in which chains were sealed.
#[derive(Default)]
pub(crate) struct Chains {
    pub(crate) turns: HashMap<String, TurnChain>,
    sealed: VecDeque<String>,
}

impl TurnChain {
    fn new() -> Self {
        Self {
            events: Vec::new(),
            sequence: 0,
            last_hash: TraceEvent::GENESIS_HASH.to_string(),
            finalized_at: None,
        }
    }
}

// ── Public writer ─────────────────────────────────────────────────────────────

/// An append-only trace sink backed by one SHA-256 hash chain per turn.
///
/// Writing to a turn that was already finalized is an error.
#[derive(Clone)]
pub struct InMemoryTraceWriter {
    pub(crate) chains: Arc<Mutex<Chains>>,
    retention: usize,
}

impl Default for InMemoryTraceWriter {
    fn default() -> Self {
        Self {
            chains: Arc::default(),
            retention: Self::DEFAULT_RETENTION,
        }
    }
}

impl InMemoryTraceWriter {
    /// Finalized turns kept by `new`.
    pub const DEFAULT_RETENTION: usize = 1024;

    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `retention` finalized turns (at least one).
    pub fn with_retention(retention: usize) -> Self {
        Self {
            chains: Arc::default(),
            retention: retention.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Chains> {
        // Chains are only ever appended to, so a poisoned map is still consistent.
        self.chains.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Export the chain of one turn, or `None` if the turn recorded nothing
    /// and was never finalized.
    pub fn export_log(&self, turn_id: &str) -> Option<TraceLog> {
        let chains = self.lock();
        let chain = chains.turns.get(turn_id)?;
        Some(TraceLog {
            turn_id: turn_id.to_string(),
            events: chain.events.clone(),
            finalized_at: chain.finalized_at,
            terminal_hash: chain.events.last().map(|e| e.this_hash.clone()).unwrap_or_default(),
        })
    }

    /// Verify one turn's chain. An unknown turn has an empty, valid chain.
    pub fn verify_integrity(&self, turn_id: &str) -> bool {
        self.lock()
            .turns
            .get(turn_id)
            .map_or(true, |chain| verify_chain(&chain.events))
    }

    pub fn is_finalized(&self, turn_id: &str) -> bool {
        self.lock()
            .turns
            .get(turn_id)
            .is_some_and(|chain| chain.finalized_at.is_some())
    }

    /// Number of turns with a chain.
    pub fn turn_count(&self) -> usize {
        self.lock().turns.len()
    }
}

// ── TraceWriter impl ──────────────────────────────────────────────────────────

impl TraceWriter for InMemoryTraceWriter {
    /// Append one record to the turn's hash chain.
    fn write(&self, turn_id: &str, record: &TraceRecord) -> WaypointResult<()> {
        let mut chains = self.lock();
        let chain = chains.turns.entry(turn_id.to_string()).or_insert_with(TurnChain::new);

        if chain.finalized_at.is_some() {
            return Err(WaypointError::TraceWriteFailed {
                reason: format!("trace for turn '{turn_id}' is already finalized"),
            });
        }

        let prev_hash = chain.last_hash.clone();
        let sequence = chain.sequence;
        let this_hash = hash_event(turn_id, sequence, record, &prev_hash)?;

        chain.events.push(TraceEvent {
            sequence,
            turn_id: turn_id.to_string(),
            record: record.clone(),
            prev_hash,
            this_hash: this_hash.clone(),
        });
        chain.sequence += 1;
        chain.last_hash = this_hash;

        debug!(turn_id = %turn_id, sequence, step_id = %record.step_id, "trace event appended");
        Ok(())
    }

    /// Seal the turn's chain. A turn that recorded nothing gets an empty,
    /// sealed chain.
    fn finalize(&self, turn_id: &str) -> WaypointResult<()> {
        let mut chains = self.lock();
        let chain = chains.turns.entry(turn_id.to_string()).or_insert_with(TurnChain::new);

        if chain.finalized_at.is_some() {
            return Err(WaypointError::TraceWriteFailed {
                reason: format!("trace for turn '{turn_id}' is already finalized"),
            });
        }
        chain.finalized_at = Some(Utc::now());

        info!(
            turn_id = %turn_id,
            event_count = chain.events.len(),
            terminal_hash = %chain.last_hash,
            "trace finalized"
        );

        chains.sealed.push_back(turn_id.to_string());
        while chains.sealed.len() > self.retention {
            if let Some(oldest) = chains.sealed.pop_front() {
                chains.turns.remove(&oldest);
                debug!(turn_id = %oldest, retention = self.retention, "trace evicted");
            }
        }
        Ok(())
    }
}

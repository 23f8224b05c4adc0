//! Monitor: one trace record per step attempt.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use waypoint_contracts::{
    error::WaypointResult,
    plan::Step,
    state::AgentState,
    trace::TraceRecord,
};

use crate::traits::TraceWriter;

pub struct Monitor {
    writer: Arc<dyn TraceWriter>,
}

impl Monitor {
    pub fn new(writer: Arc<dyn TraceWriter>) -> Self {
        Self { writer }
    }

    /// Record one execution attempt of `step`.
    ///
    /// The record goes to the shared writer first; only once that write
    /// succeeds is it appended to the state's trace, so both always agree.
    ///
    /// # Errors
    ///
    /// Returns the writer's error. The engine treats it as fatal.
    pub fn observe(&self, state: &mut AgentState, step: &Step) -> WaypointResult<()> {
        let record = TraceRecord {
            step_id: step.id.clone(),
            action: step.action.clone(),
            status: step.status,
            result: step.result.clone(),
            replan_depth: state.replan_depth,
            recorded_at: Utc::now(),
        };

        self.writer.write(&state.turn_id.to_string(), &record)?;

        debug!(
            turn_id = %state.turn_id,
            step_id = %record.step_id,
            status = record.status.as_str(),
            "trace record written"
        );
        state.trace.push(record);
        Ok(())
    }

    /// Seal the turn's trace.
    pub fn finalize(&self, state: &AgentState) -> WaypointResult<()> {
        debug!(turn_id = %state.turn_id, records = state.trace.len(), "finalizing trace");
        self.writer.finalize(&state.turn_id.to_string())
    }
}

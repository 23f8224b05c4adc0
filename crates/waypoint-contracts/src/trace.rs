//! Trace records: the per-turn audit log of executed steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::{Params, StepStatus};

/// An immutable record of one step execution attempt.
///
/// The monitor writes exactly one record per attempt, failed ones included,
/// so the trace of a turn is a complete account of what ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub step_id: String,
    pub action: String,
    pub status: StepStatus,
    pub result: Option<Params>,
    /// Replan depth the attempt ran at (0 for the original plan).
    pub replan_depth: u32,
    pub recorded_at: DateTime<Utc>,
}

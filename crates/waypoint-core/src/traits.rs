//! Collaborator trait definitions for the goal-execution pipeline.
//!
//! These traits mark every boundary the engine crosses:
//!
//! - `TextGenerator`        — untrusted planner backend (usually an LLM)
//! - `Tool`                 — untrusted side-effecting capability
//! - `PolicyEngine`         — trusted gate evaluated before any tool runs
//! - `TraceWriter`          — trusted sink recording every step attempt
//! - `ResultVerifier`       — trusted checker for tool results
//! - `InputSource`          — supplier of missing slot values
//! - `DigressionClassifier` — optional topic classifier
//!
//! Shared collaborators are `Send + Sync`: one engine serves every session.

use serde_json::Value;

use waypoint_contracts::{
    error::WaypointResult,
    goal::GoalConfig,
    plan::Params,
    policy::{PolicyVerdict, ToolCall},
    state::{AgentState, Classification},
    trace::TraceRecord,
    verify::VerificationReport,
};

/// Turns a prompt into raw text that is expected to encode a plan.
///
/// No schema is enforced on the output. The plan parser is the only validation.
pub trait TextGenerator: Send + Sync {
    /// Make one blocking call. Implementations must not retry internally.
    fn generate(&self, prompt: &str) -> WaypointResult<String>;
}

/// A named capability the dispatcher can invoke.
///
/// The contract is to return a JSON object with a `status` field of
/// `success` or `failed` plus tool-specific fields. Returning `Err` is how a
/// tool reports an internal error; the dispatcher converts it to a failed step.
pub trait Tool: Send + Sync {
    /// Registry key; matched against `Step::action`.
    fn name(&self) -> &str;

    fn invoke(&self, params: &Params) -> WaypointResult<Value>;
}

/// The policy executor: decides whether a proposed tool call may run.
///
/// Implementations must be deterministic and free of I/O.
pub trait PolicyEngine: Send + Sync {
    fn evaluate(&self, call: &ToolCall) -> WaypointResult<PolicyVerdict>;
}

/// Append-only sink behind the monitor.
///
/// Every step attempt produces exactly one record. A failed write is fatal
/// to the turn.
pub trait TraceWriter: Send + Sync {
    fn write(&self, turn_id: &str, record: &TraceRecord) -> WaypointResult<()>;

    /// Seal the trace of a finished turn.
    fn finalize(&self, turn_id: &str) -> WaypointResult<()>;
}

/// Checks a tool result against the tool contract before the step is marked successful.
pub trait ResultVerifier: Send + Sync {
    fn verify(&self, action: &str, result: &Value) -> WaypointResult<VerificationReport>;
}

/// Supplies values for required slots that are still missing.
///
/// Backed by a human, an upstream extractor, or a test fixture. Returning
/// `None` means the value is not available yet and the turn should suspend.
pub trait InputSource {
    fn request(&self, slot: &str, state: &AgentState) -> Option<Value>;
}

/// Classifies a user message relative to the active goal.
pub trait DigressionClassifier: Send + Sync {
    fn classify(
        &self,
        message: &str,
        goal: &GoalConfig,
        missing_slots: &[String],
    ) -> WaypointResult<Classification>;
}

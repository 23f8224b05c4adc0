//! Runtime error types for the waypoint goal-execution pipeline.
//!
//! Only failures that must reach the caller are errors. Malformed planner
//! output, unknown tools and failing tools are absorbed inside the turn and
//! never surface as a `WaypointError`.

use thiserror::Error;

/// The unified error type for the waypoint runtime.
#[derive(Debug, Error)]
pub enum WaypointError {
    /// A configuration document is malformed or fails validation.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// No agent with this id is loaded.
    #[error("unknown agent '{agent_id}'")]
    UnknownAgent { agent_id: String },

    /// The agent does not declare the requested goal.
    #[error("unknown goal '{goal_id}'")]
    UnknownGoal { goal_id: String },

    /// The text-generation collaborator could not be reached or refused the call.
    #[error("text generation failed: {reason}")]
    GenerationFailed { reason: String },

    /// A tool reported an error from inside its own boundary.
    ///
    /// The dispatcher converts this into a failed step; it never escapes a turn.
    #[error("tool failed: {reason}")]
    ToolFailed { reason: String },

    /// The trace sink could not persist a record.
    ///
    /// Treated as fatal: a step that cannot be traced cannot be trusted.
    #[error("trace write failed: {reason}")]
    TraceWriteFailed { reason: String },

    /// The engine reached a state its transition table cannot handle.
    #[error("state machine error: {reason}")]
    StateMachineError { reason: String },

    /// The session id is unknown to the session store.
    #[error("session '{session_id}' not found")]
    SessionNotFound { session_id: String },

    /// A request to the service surface is malformed.
    #[error("validation error: {reason}")]
    Validation { reason: String },

    /// A turn did not finish within the configured time budget.
    #[error("turn timed out after {timeout_ms} ms")]
    TurnTimedOut { timeout_ms: u64 },

    /// The user left required slots unanswered for too many consecutive turns.
    #[error("slot collection abandoned after {turns} turns; still missing: {}", missing.join(", "))]
    SlotCollectionExhausted { turns: u32, missing: Vec<String> },
}

/// Convenience alias used throughout the waypoint crates.
pub type WaypointResult<T> = Result<T, WaypointError>;

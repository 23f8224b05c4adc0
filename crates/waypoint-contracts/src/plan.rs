//! Plans and the steps they are made of.
//!
//! A `Plan` is created by the planner or replanner and executed front to
//! back. Step order is execution order and is never rearranged mid-run.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// String-keyed JSON mapping used for step parameters, tool results and metadata.
pub type Params = Map<String, Value>;

/// Action name of the placeholder step synthesized when a plan is unusable.
pub const NOOP_ACTION: &str = "noop";

/// Metadata key holding the raw collaborator text a plan was decoded from.
pub const META_RAW: &str = "llm_raw";

/// Metadata key holding the parse tier that produced the plan.
pub const META_PARSE_TIER: &str = "parse_tier";

/// Metadata key set on the zero-step plan left behind by an aborted turn.
pub const META_TERMINAL: &str = "terminal";

/// Lifecycle of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Success => "success",
            StepStatus::Failed => "failed",
        }
    }
}

/// One unit of work: a tool action and the parameters to call it with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Unique within its plan and restricted to `[A-Za-z0-9_-]`.
    pub id: String,
    /// Tool registry key.
    pub action: String,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub status: StepStatus,
    /// Normalized tool result; set by the dispatcher.
    #[serde(default)]
    pub result: Option<Params>,
}

impl Step {
    /// A pending step with no result yet.
    pub fn new(id: impl Into<String>, action: impl Into<String>, params: Params) -> Self {
        Self {
            id: id.into(),
            action: action.into(),
            params,
            status: StepStatus::Pending,
            result: None,
        }
    }

    /// The placeholder step that keeps a plan non-empty.
    pub fn noop(id: impl Into<String>) -> Self {
        Self::new(id, NOOP_ACTION, Params::new())
    }

    /// The `reason` field of a failed result, if any.
    pub fn failure_reason(&self) -> Option<&str> {
        self.result
            .as_ref()
            .and_then(|r| r.get("reason"))
            .and_then(Value::as_str)
    }
}

/// An ordered sequence of steps intended to satisfy a goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub goal: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub metadata: Params,
}

impl Plan {
    /// The zero-step plan an aborted turn ends with.
    ///
    /// Every plan produced by the parser has at least one step; this is the
    /// single exception and is marked `terminal` in its metadata.
    pub fn terminal(goal: impl Into<String>) -> Self {
        let mut metadata = Params::new();
        metadata.insert(META_TERMINAL.to_string(), Value::Bool(true));
        Self {
            goal: goal.into(),
            steps: Vec::new(),
            metadata,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.metadata
            .get(META_TERMINAL)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Index of the first step that has not run yet.
    pub fn next_pending(&self) -> Option<usize> {
        self.steps.iter().position(|s| s.status == StepStatus::Pending)
    }

    pub fn pending_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Pending)
            .count()
    }

    /// Steps that already finished successfully, in plan order.
    pub fn completed_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(|s| s.status == StepStatus::Success)
    }

    /// The collaborator text this plan was decoded from.
    pub fn raw_text(&self) -> Option<&str> {
        self.metadata.get(META_RAW).and_then(Value::as_str)
    }
}

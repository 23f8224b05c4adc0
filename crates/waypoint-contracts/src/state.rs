//! The mutable working record threaded through one turn.
//!
//! `AgentState` is owned exclusively by the engine while a turn runs. Between
//! turns the hosting application may keep it (for example, while a session
//! waits for a missing slot) but never shares it between concurrent turns.

use serde::{Deserialize, Serialize};

use crate::{
    goal::GoalConfig,
    plan::{Params, Plan, Step},
    trace::TraceRecord,
};

/// Unique identifier of one turn. Appears in every trace record written for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub uuid::Uuid);

impl TurnId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The status every phase leaves behind. The next phase is a pure function of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JourneyStatus {
    /// The turn was accepted and needs a fresh plan.
    Started,
    /// A plan suspended on missing input is picked up again.
    Resumed,
    Planned,
    /// Slots are missing and the new user message has not been classified
    /// yet. It is checked for a digression before any slot is collected.
    Unclassified,
    MissingSlots,
    SlotsFilled,
    /// Required input is still missing and nothing more can be collected this turn.
    CollectingInfo,
    ReadyForExecution,
    /// The digression detector ran; the `digression` flag carries its verdict.
    Classified,
    Clarifying,
    PolicyApproved,
    PolicyDenied,
    StepSucceeded,
    StepFailed,
    Replanned,
    PlanCompleted,
    Completed,
    Aborted,
}

/// How an incoming message relates to the active goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    OnTopic,
    Clarification,
    Digression,
}

/// Why a turn ended in the abort state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// The policy executor denied the next tool call.
    PolicyDenied { rule_id: String, reason: String },
    /// Replanning went past the configured depth.
    ReplanLimit { depth: u32, max: u32 },
    /// The turn executed more phases than the global ceiling allows.
    IterationCeiling { limit: u32 },
    /// Slot collection was re-entered too often within one turn.
    SlotRoundsExhausted { rounds: u32, missing: Vec<String> },
    /// The host cancelled the turn, for example after a timeout.
    Cancelled,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::PolicyDenied { reason, .. } => write!(f, "{reason}"),
            AbortReason::ReplanLimit { depth, max } => {
                write!(f, "replanning limit reached (depth {depth}, max {max})")
            }
            AbortReason::IterationCeiling { limit } => {
                write!(f, "iteration ceiling of {limit} reached")
            }
            AbortReason::SlotRoundsExhausted { rounds, missing } => write!(
                f,
                "slot collection repeated {rounds} times without obtaining: {}",
                missing.join(", ")
            ),
            AbortReason::Cancelled => write!(f, "the turn was cancelled"),
        }
    }
}

/// Working state for one goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub turn_id: TurnId,
    pub agent_id: String,
    pub goal_id: String,
    pub goal_config: GoalConfig,
    pub collected_slots: Params,
    /// Required slots still lacking a value, in declaration order.
    pub missing_slots: Vec<String>,
    pub journey_status: JourneyStatus,
    pub plan: Option<Plan>,
    /// Result of the most recent tool call.
    pub tool_result: Option<Params>,
    /// Records of every step attempt this turn, in execution order.
    pub trace: Vec<TraceRecord>,
    pub last_user_message: Option<String>,
    /// Set once the current message has gone through the digression detector.
    pub message_classified: bool,
    pub digression: bool,
    /// The plan answers a digression. The goal's required slots do not gate it.
    pub detour: bool,
    pub classification: Option<Classification>,
    /// Replans performed this turn. Never decreases within a turn.
    pub replan_depth: u32,
    /// Entries into slot collection this turn.
    pub slot_rounds: u32,
    /// The step whose failure triggered the pending replan.
    pub failed_step: Option<Step>,
    pub abort: Option<AbortReason>,
    pub response: Option<String>,
}

impl AgentState {
    /// Fresh state for `goal_id`, with every required slot missing.
    pub fn new(agent_id: impl Into<String>, goal_id: impl Into<String>, goal_config: GoalConfig) -> Self {
        let missing_slots = goal_config.required_slots.clone();
        Self {
            turn_id: TurnId::new(),
            agent_id: agent_id.into(),
            goal_id: goal_id.into(),
            goal_config,
            collected_slots: Params::new(),
            missing_slots,
            journey_status: JourneyStatus::Started,
            plan: None,
            tool_result: None,
            trace: Vec::new(),
            last_user_message: None,
            message_classified: false,
            digression: false,
            detour: false,
            classification: None,
            replan_depth: 0,
            slot_rounds: 0,
            failed_step: None,
            abort: None,
            response: None,
        }
    }

    /// Prepare the state for a new turn driven by `message`.
    ///
    /// Per-turn counters and the trace are reset. Collected slots, the plan
    /// and the journey status survive so a turn suspended on missing input
    /// can be resumed.
    pub fn begin_turn(&mut self, message: Option<String>) {
        self.turn_id = TurnId::new();
        self.last_user_message = message;
        self.message_classified = false;
        self.digression = false;
        self.detour = false;
        self.classification = None;
        self.trace.clear();
        self.replan_depth = 0;
        self.slot_rounds = 0;
        self.failed_step = None;
        self.abort = None;
        self.response = None;
    }

    /// Record a slot value supplied out of band.
    pub fn set_slot(&mut self, slot: impl Into<String>, value: serde_json::Value) {
        self.collected_slots.insert(slot.into(), value);
    }

    /// True when the previous turn halted waiting for user input with a plan in hand.
    pub fn is_suspended(&self) -> bool {
        self.journey_status == JourneyStatus::CollectingInfo && self.plan.is_some()
    }
}

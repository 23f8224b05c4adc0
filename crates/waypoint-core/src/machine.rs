//! The transition table.
//!
//! The next phase is a pure function of the journey status and, after
//! classification, the digression flag. The match below has no wildcard arm:
//! adding a status without an edge does not compile.

use waypoint_contracts::state::JourneyStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Start,
    Planning,
    Executing,
    CollectingInfo,
    DigressionCheck,
    Replanning,
    PolicyCheck,
    ToolExecution,
    Responding,
    /// The turn halted waiting for external input; the plan is kept.
    Suspended,
    Aborted,
}

impl Phase {
    /// Terminal phases end the turn after they run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Responding | Phase::Suspended | Phase::Aborted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Start => "start",
            Phase::Planning => "planning",
            Phase::Executing => "executing",
            Phase::CollectingInfo => "collecting_info",
            Phase::DigressionCheck => "digression_check",
            Phase::Replanning => "replanning",
            Phase::PolicyCheck => "policy_check",
            Phase::ToolExecution => "tool_execution",
            Phase::Responding => "responding",
            Phase::Suspended => "suspended",
            Phase::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn next_phase(status: JourneyStatus, digression: bool) -> Phase {
    match status {
        JourneyStatus::Started => Phase::Planning,
        JourneyStatus::Resumed => Phase::Executing,
        JourneyStatus::Planned => Phase::Executing,
        JourneyStatus::Unclassified => Phase::DigressionCheck,
        JourneyStatus::MissingSlots => Phase::CollectingInfo,
        JourneyStatus::SlotsFilled => Phase::Executing,
        JourneyStatus::CollectingInfo => Phase::Suspended,
        JourneyStatus::ReadyForExecution => Phase::DigressionCheck,
        JourneyStatus::Classified if digression => Phase::Replanning,
        JourneyStatus::Classified => Phase::PolicyCheck,
        JourneyStatus::Clarifying => Phase::CollectingInfo,
        JourneyStatus::PolicyApproved => Phase::ToolExecution,
        JourneyStatus::PolicyDenied => Phase::Aborted,
        JourneyStatus::StepSucceeded => Phase::PolicyCheck,
        JourneyStatus::StepFailed => Phase::Replanning,
        JourneyStatus::Replanned => Phase::Executing,
        JourneyStatus::PlanCompleted => Phase::Responding,
        JourneyStatus::Completed => Phase::Responding,
        JourneyStatus::Aborted => Phase::Aborted,
    }
}

//! Policy verdicts and the tool call they are evaluated against.

use serde::{Deserialize, Serialize};

use crate::plan::Params;

/// A proposed tool invocation, built from the next pending step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub action: String,
    pub params: Params,
}

/// The policy executor's decision for one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyVerdict {
    /// No rule was violated. The dispatcher may run the call.
    Allow,

    /// A rule was violated. Fatal to the current turn, never retried.
    Deny {
        /// The rule that produced the denial.
        rule_id: String,
        /// Human-readable explanation naming the violated threshold.
        reason: String,
    },
}

impl PolicyVerdict {
    pub fn is_allow(&self) -> bool {
        matches!(self, PolicyVerdict::Allow)
    }
}

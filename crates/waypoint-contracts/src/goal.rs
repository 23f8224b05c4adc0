//! Agent and goal configuration.
//!
//! These types are deserialized once at startup and treated as immutable for
//! the lifetime of the process. Loading and validation live in
//! `waypoint_core::config`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One goal an agent can pursue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalConfig {
    /// Natural-language objective handed to the planner.
    pub description: String,

    /// Slots that must hold a non-empty value before any tool runs.
    ///
    /// Declaration order is the order in which missing slots are requested.
    #[serde(default)]
    pub required_slots: Vec<String>,

    /// The tool this goal is primarily served by. Advisory; plans name their own actions.
    #[serde(default)]
    pub tool: Option<String>,

    /// Classifier prompt. When absent the goal opts out of digression detection.
    #[serde(default)]
    pub digression_prompt: Option<String>,

    /// Question to ask the user per slot, e.g. `amount = "How much would you like to transfer?"`.
    #[serde(default)]
    pub slot_prompts: BTreeMap<String, String>,
}

impl GoalConfig {
    /// A goal with the given description and required slots and nothing else.
    pub fn new(description: impl Into<String>, required_slots: &[&str]) -> Self {
        Self {
            description: description.into(),
            required_slots: required_slots.iter().map(|s| s.to_string()).collect(),
            tool: None,
            digression_prompt: None,
            slot_prompts: BTreeMap::new(),
        }
    }

    /// The question used to ask for `slot`.
    pub fn prompt_for(&self, slot: &str) -> String {
        self.slot_prompts
            .get(slot)
            .cloned()
            .unwrap_or_else(|| format!("Please provide '{slot}'."))
    }
}

/// Which text-generation backend an agent is wired to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmSettings {
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Optional prompt overrides. Built-in prompts are used for absent entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplates {
    #[serde(default)]
    pub planner: Option<String>,
    #[serde(default)]
    pub replanner: Option<String>,
    #[serde(default)]
    pub digression_classifier: Option<String>,
}

/// What to do with the current plan when the replanner hands back a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplanStrategy {
    /// Discard all progress and run the revised plan from its first step.
    #[default]
    Restart,
    /// Keep the steps that already succeeded and continue with the revised steps.
    Resume,
}

/// Bounds and policies for the goal-execution state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Maximum collaborator replans per turn.
    #[serde(default = "default_max_replans")]
    pub max_replans: u32,

    /// Maximum phase executions per turn, across every loop in the graph.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Maximum entries into slot collection per turn.
    #[serde(default = "default_max_slot_rounds")]
    pub max_slot_rounds: u32,

    #[serde(default)]
    pub replan_strategy: ReplanStrategy,
}

fn default_max_replans() -> u32 {
    3
}

fn default_max_iterations() -> u32 {
    64
}

fn default_max_slot_rounds() -> u32 {
    3
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_replans: default_max_replans(),
            max_iterations: default_max_iterations(),
            max_slot_rounds: default_max_slot_rounds(),
            replan_strategy: ReplanStrategy::default(),
        }
    }
}

/// The declarative definition of one agent.
///
/// Example:
/// ```toml
/// id = "payments-agent"
/// tools = ["create_payment"]
/// policies = ["banking"]
///
/// [llm]
/// provider = "mock"
///
/// [goals.make_payment]
/// description = "Make a payment to a payee"
/// required_slots = ["amount", "account_number", "sort_code"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub llm: LlmSettings,
    #[serde(default)]
    pub prompts: PromptTemplates,
    /// Tool names this agent may dispatch to.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Names of policy documents the hosting runtime resolves.
    #[serde(default)]
    pub policies: Vec<String>,
    /// Goal used when a session does not name one.
    #[serde(default)]
    pub default_goal: Option<String>,
    pub goals: BTreeMap<String, GoalConfig>,
    #[serde(default)]
    pub engine: EngineSettings,
}

//! Wiring: agent configuration → a ready-to-run `Engine`.
//!
//! `AgentRuntime` resolves the names an agent configuration uses (tools,
//! policy documents, LLM provider) against what this reference runtime
//! ships, and keeps an inspectable handle on the trace sink.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use waypoint_audit::InMemoryTraceWriter;
use waypoint_contracts::{
    error::{WaypointError, WaypointResult},
    goal::{AgentConfig, LlmSettings},
    state::AgentState,
};
use waypoint_core::{
    config::{load_agent_config, resolve_goal},
    digression::GeneratorClassifier,
    dispatch::Dispatcher,
    traits::{InputSource, TextGenerator},
    CancelToken, Engine, TurnReport,
};
use waypoint_policy::TomlPolicyEngine;
use waypoint_verify::SchemaVerifier;

use crate::{generator::BankingGenerator, tools::registry_for};

// ── Embedded configuration ───────────────────────────────────────────────────

/// The payments agent definition.
pub const PAYMENTS_AGENT: &str = include_str!("../agents/payments.toml");

/// The banking policy set.
pub const BANKING_POLICY: &str = include_str!("../policies/banking.toml");

/// Resolve a policy document name from an agent configuration.
pub fn policy_document(name: &str) -> Option<&'static str> {
    match name {
        "banking" => Some(BANKING_POLICY),
        _ => None,
    }
}

/// The text generator for an `[llm]` section. Only the mock provider is
/// available in the reference runtime.
pub fn generator_for(llm: &LlmSettings) -> WaypointResult<Arc<dyn TextGenerator>> {
    match llm.provider.as_str() {
        "mock" => Ok(Arc::new(BankingGenerator::new())),
        other => Err(WaypointError::ConfigError {
            reason: format!("llm provider '{other}' is not available in this runtime"),
        }),
    }
}

/// Result checks for the banking tools, on top of the tool contract.
pub fn banking_verifier() -> WaypointResult<SchemaVerifier> {
    let mut verifier = SchemaVerifier::new();
    verifier.register_schema(
        "create_payment",
        json!({
            "type": "object",
            "required": ["payment_id", "amount"],
            "properties": {
                "payment_id": { "type": "string", "pattern": "^pay_[0-9a-f]{12}$" },
                "amount": { "type": "number", "exclusiveMinimum": 0 }
            }
        }),
    )?;
    verifier.require_fields("make_payment", &["transaction_id"]);
    verifier.require_fields("get_statement", &["account_id", "transactions"]);
    verifier.register_check(
        "check_balance",
        "non-negative-balance",
        Box::new(|result: &Value| match result.get("balance").and_then(Value::as_f64) {
            Some(balance) if balance >= 0.0 => None,
            Some(balance) => Some(format!("balance {balance} is negative")),
            None => Some("balance is missing or not a number".to_string()),
        }),
    );
    Ok(verifier)
}

// ── AgentRuntime ─────────────────────────────────────────────────────────────

pub struct AgentRuntime {
    config: AgentConfig,
    engine: Engine,
    trace: InMemoryTraceWriter,
}

impl AgentRuntime {
    /// Build the engine for `config`.
    ///
    /// # Errors
    ///
    /// `ConfigError` when the configuration names a tool or policy document
    /// this runtime does not provide, or a policy document is invalid.
    pub fn from_config(
        config: AgentConfig,
        generator: Arc<dyn TextGenerator>,
        trace: InMemoryTraceWriter,
    ) -> WaypointResult<Self> {
        let registry = registry_for(&config.tools)?;

        let documents = config
            .policies
            .iter()
            .map(|name| {
                policy_document(name).ok_or_else(|| WaypointError::ConfigError {
                    reason: format!("unknown policy document '{name}'"),
                })
            })
            .collect::<WaypointResult<Vec<_>>>()?;
        let policy = TomlPolicyEngine::from_documents(&documents)?;

        let dispatcher = Dispatcher::new(Arc::new(registry)).with_verifier(Arc::new(banking_verifier()?));
        let classifier = GeneratorClassifier::new(Arc::clone(&generator))
            .with_template(config.prompts.digression_classifier.clone());

        let engine = Engine::new(
            generator,
            dispatcher,
            Arc::new(policy),
            Arc::new(trace.clone()),
            config.engine.clone(),
        )
        .with_templates(&config.prompts)
        .with_classifier(Arc::new(classifier));

        info!(
            agent_id = %config.id,
            tools = config.tools.len(),
            policies = config.policies.len(),
            goals = config.goals.len(),
            "agent runtime ready"
        );
        Ok(Self { config, engine, trace })
    }

    /// Load an agent document and wire it to the generator its `[llm]` section names.
    pub fn load(toml: &str) -> WaypointResult<Self> {
        let config = load_agent_config(toml)?;
        let generator = generator_for(&config.llm)?;
        Self::from_config(config, generator, InMemoryTraceWriter::new())
    }

    /// The embedded payments agent with the mock banking generator.
    pub fn payments() -> WaypointResult<Self> {
        Self::load(PAYMENTS_AGENT)
    }

    /// The embedded payments agent driven by `generator`.
    pub fn payments_with(generator: Arc<dyn TextGenerator>) -> WaypointResult<Self> {
        let config = load_agent_config(PAYMENTS_AGENT)?;
        Self::from_config(config, generator, InMemoryTraceWriter::new())
    }

    pub fn agent_id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The trace sink shared with the engine, for inspection.
    pub fn trace(&self) -> &InMemoryTraceWriter {
        &self.trace
    }

    /// Fresh working state for `goal_id` (or the agent's default goal).
    pub fn new_state(&self, goal_id: Option<&str>) -> WaypointResult<AgentState> {
        let (goal_id, goal) = resolve_goal(&self.config, goal_id)?;
        Ok(AgentState::new(self.config.id.clone(), goal_id, goal.clone()))
    }

    /// Run one turn for `message`.
    pub fn run(
        &self,
        state: &mut AgentState,
        message: &str,
        input: &dyn InputSource,
    ) -> WaypointResult<TurnReport> {
        self.run_with(state, message, input, &CancelToken::new())
    }

    /// Run one turn for `message`, stopping at the next phase boundary once
    /// `cancel` fires.
    pub fn run_with(
        &self,
        state: &mut AgentState,
        message: &str,
        input: &dyn InputSource,
        cancel: &CancelToken,
    ) -> WaypointResult<TurnReport> {
        self.engine
            .start_turn_with(state, Some(message.to_string()), input, cancel)
    }
}

//! TOML-driven policy executor.
//!
//! `TomlPolicyEngine` loads a `PolicyConfig` from one or more TOML documents
//! and implements the `PolicyEngine` trait from waypoint-core.
//!
//! Evaluation algorithm:
//!
//! 1. Iterate rules in declaration order, skipping rules whose `applies_to`
//!    does not match the call's action.
//! 2. The first rule with a violated check denies the call, naming the rule.
//! 3. If no rule is violated → `Allow`.

use std::{collections::HashSet, path::Path};

use tracing::{debug, warn};

use waypoint_contracts::{
    error::{WaypointError, WaypointResult},
    policy::{PolicyVerdict, ToolCall},
};
use waypoint_core::traits::PolicyEngine;

use crate::rule::{PolicyConfig, PolicyRule};

/// A `PolicyEngine` implementation that reads rules from TOML.
///
/// Loaded once at startup and read-only afterwards.
///
/// ```rust,ignore
/// use waypoint_policy::TomlPolicyEngine;
///
/// let engine = TomlPolicyEngine::from_file(Path::new("policies/banking.toml"))?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct TomlPolicyEngine {
    config: PolicyConfig,
}

impl TomlPolicyEngine {
    /// Parse `s` as TOML and build a `TomlPolicyEngine`.
    ///
    /// Returns `WaypointError::ConfigError` if the TOML is malformed, does
    /// not match `PolicyConfig`, or declares an invalid rule.
    pub fn from_toml_str(s: &str) -> WaypointResult<Self> {
        Self::from_documents(&[s])
    }

    /// Read the file at `path` and parse it as a policy document.
    pub fn from_file(path: &Path) -> WaypointResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| WaypointError::ConfigError {
            reason: format!("failed to read policy file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Merge several documents; their rules are evaluated in document order.
    pub fn from_documents(documents: &[&str]) -> WaypointResult<Self> {
        let mut rules = Vec::new();
        for document in documents {
            let config: PolicyConfig =
                toml::from_str(document).map_err(|e| WaypointError::ConfigError {
                    reason: format!("failed to parse policy TOML: {}", e),
                })?;
            rules.extend(config.rules);
        }
        let config = PolicyConfig { rules };
        validate(&config)?;
        debug!(rules = config.rules.len(), "policy set loaded");
        Ok(Self { config })
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.config.rules
    }
}

fn validate(config: &PolicyConfig) -> WaypointResult<()> {
    let mut ids = HashSet::new();
    for rule in &config.rules {
        if rule.id.trim().is_empty() {
            return Err(WaypointError::ConfigError {
                reason: "policy rule with an empty id".to_string(),
            });
        }
        if !ids.insert(rule.id.as_str()) {
            return Err(WaypointError::ConfigError {
                reason: format!("duplicate policy rule id '{}'", rule.id),
            });
        }
        for (name, bound) in [("max_amount", rule.max_amount), ("max_without_2fa", rule.max_without_2fa)] {
            if bound.is_some_and(|b| !b.is_finite() || b < 0.0) {
                return Err(WaypointError::ConfigError {
                    reason: format!("rule '{}': {name} must be a non-negative number", rule.id),
                });
            }
        }
    }
    Ok(())
}

impl PolicyEngine for TomlPolicyEngine {
    /// Evaluate the proposed call against the loaded rule set.
    ///
    /// The first violation found denies the call with a human-readable
    /// reason. Rules that do not apply to the action are skipped, and a call
    /// no rule objects to is allowed.
    fn evaluate(&self, call: &ToolCall) -> WaypointResult<PolicyVerdict> {
        debug!(action = %call.action, "evaluating policy");

        for rule in self.config.rules.iter().filter(|r| r.applies(&call.action)) {
            if let Some(reason) = rule.violation(call) {
                warn!(
                    rule_id = %rule.id,
                    action = %call.action,
                    reason = %reason,
                    "policy rule violated"
                );
                return Ok(PolicyVerdict::Deny {
                    rule_id: rule.id.clone(),
                    reason,
                });
            }
        }

        Ok(PolicyVerdict::Allow)
    }
}

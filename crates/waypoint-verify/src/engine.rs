//! Schema-based tool result verifier.
//!
//! `SchemaVerifier` implements the `ResultVerifier` trait from
//! `waypoint-core`. Verification runs in three phases, and all failures are
//! collected before returning:
//!
//! 1. **Contract** — every result must be an object whose `status` is
//!    `success` or `failed`.
//! 2. **Structural** — if a JSON Schema is registered for the action, the
//!    result is validated against it with the `jsonschema` crate.
//! 3. **Semantic** — required fields and named check functions registered
//!    for the action are evaluated in order.

use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::{debug, warn};

use waypoint_contracts::{
    error::{WaypointError, WaypointResult},
    verify::{VerificationFailure, VerificationReport},
};
use waypoint_core::traits::ResultVerifier;

/// A caller-supplied check. Returns `Some(message)` when the result fails.
pub type CheckFn = Box<dyn Fn(&Value) -> Option<String> + Send + Sync>;

struct NamedCheck {
    name: String,
    check: CheckFn,
}

/// What is registered for one action.
#[derive(Default)]
struct ActionRules {
    schema: Option<Value>,
    required_fields: Vec<String>,
    checks: Vec<NamedCheck>,
}

pub struct SchemaVerifier {
    contract: Value,
    actions: HashMap<String, ActionRules>,
}

impl SchemaVerifier {
    /// A verifier enforcing only the tool result contract.
    pub fn new() -> Self {
        Self {
            contract: json!({
                "type": "object",
                "properties": {
                    "status": { "enum": ["success", "failed"] }
                },
                "required": ["status"]
            }),
            actions: HashMap::new(),
        }
    }

    /// Validate results of `action` against a JSON Schema document.
    ///
    /// Returns `ConfigError` if the document is not a valid schema.
    pub fn register_schema(&mut self, action: impl Into<String>, schema: Value) -> WaypointResult<()> {
        let action = action.into();
        jsonschema::validator_for(&schema).map_err(|e| WaypointError::ConfigError {
            reason: format!("invalid result schema for '{action}': {e}"),
        })?;
        self.actions.entry(action).or_default().schema = Some(schema);
        Ok(())
    }

    /// Require dot-separated field paths (e.g. `"receipt.id"`) to be present
    /// and non-null in successful results of `action`.
    pub fn require_fields(&mut self, action: impl Into<String>, fields: &[&str]) {
        self.actions
            .entry(action.into())
            .or_default()
            .required_fields
            .extend(fields.iter().map(|f| f.to_string()));
    }

    /// Register a named check for `action`.
    pub fn register_check(&mut self, action: impl Into<String>, name: impl Into<String>, check: CheckFn) {
        self.actions
            .entry(action.into())
            .or_default()
            .checks
            .push(NamedCheck { name: name.into(), check });
    }

    fn resolve_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
        let mut current = value;
        for segment in path.split('.') {
            match current.get(segment) {
                Some(v) if !v.is_null() => current = v,
                _ => return None,
            }
        }
        Some(current)
    }

    fn validate_schema(schema: &Value, result: &Value, rule_id: &str, failures: &mut Vec<VerificationFailure>) {
        match jsonschema::validator_for(schema) {
            Ok(validator) => {
                for error in validator.iter_errors(result) {
                    let message = format!("JSON Schema violation at {}: {}", error.instance_path, error);
                    warn!(rule_id, %message, "structural validation failure");
                    failures.push(VerificationFailure {
                        rule_id: rule_id.to_string(),
                        message,
                    });
                }
            }
            Err(e) => failures.push(VerificationFailure {
                rule_id: rule_id.to_string(),
                message: format!("invalid JSON Schema document: {e}"),
            }),
        }
    }
}

impl Default for SchemaVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultVerifier for SchemaVerifier {
    fn verify(&self, action: &str, result: &Value) -> WaypointResult<VerificationReport> {
        let mut failures = Vec::new();

        // ── Phase 1: tool result contract ────────────────────────────────────
        Self::validate_schema(&self.contract, result, "result-contract", &mut failures);

        if let Some(rules) = self.actions.get(action) {
            // ── Phase 2: per-action JSON Schema ──────────────────────────────
            if let Some(schema) = &rules.schema {
                Self::validate_schema(schema, result, "json-schema", &mut failures);
            }

            // ── Phase 3: required fields and named checks ────────────────────
            for field in &rules.required_fields {
                if Self::resolve_path(result, field).is_none() {
                    failures.push(VerificationFailure {
                        rule_id: "required-field".to_string(),
                        message: format!("required field '{field}' is missing or null"),
                    });
                }
            }
            for named in &rules.checks {
                if let Some(message) = (named.check)(result) {
                    warn!(action, check = %named.name, %message, "result check failed");
                    failures.push(VerificationFailure {
                        rule_id: named.name.clone(),
                        message,
                    });
                }
            }
        }

        let passed = failures.is_empty();
        debug!(action, passed, failure_count = failures.len(), "verification complete");
        Ok(VerificationReport { passed, failures })
    }
}

//! Tool registry and dispatcher.
//!
//! The dispatcher is the boundary between the engine and untrusted tool
//! code. Whatever a tool does (returns an error, panics, returns garbage),
//! the outcome is a step marked `success` or `failed`; nothing propagates.

use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use serde_json::{json, Value};
use tracing::{debug, warn};

use waypoint_contracts::{
    error::WaypointResult,
    plan::{Params, Step, StepStatus, NOOP_ACTION},
};

use crate::traits::{ResultVerifier, Tool};

pub const UNKNOWN_TOOL_PREFIX: &str = "unknown_tool:";
pub const INVALID_RESULT: &str = "invalid_result";

/// The built-in `noop` tool. Always succeeds and does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTool;

impl Tool for NoopTool {
    fn name(&self) -> &str {
        NOOP_ACTION
    }

    fn invoke(&self, _params: &Params) -> WaypointResult<Value> {
        Ok(json!({ "status": "success" }))
    }
}

/// Maps action names to tools. Populated at startup, then shared read-only.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// A registry holding only the built-in `noop` tool.
    pub fn new() -> Self {
        let mut registry = Self { tools: HashMap::new() };
        registry.register(Arc::new(NoopTool));
        registry
    }

    /// Register a tool under its own name, replacing any previous entry.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    pub fn get(&self, action: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(action)
    }

    pub fn contains(&self, action: &str) -> bool {
        self.tools.contains_key(action)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    verifier: Option<Arc<dyn ResultVerifier>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry, verifier: None }
    }

    /// Check every successful result before the step is marked successful.
    pub fn with_verifier(mut self, verifier: Arc<dyn ResultVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run one step against the registry, recording status and result on it.
    ///
    /// Never fails: unknown actions, tool errors, panics, malformed results
    /// and rejected verifications all end as `StepStatus::Failed` with a
    /// `reason` in the result.
    pub fn dispatch(&self, step: &mut Step) {
        step.status = StepStatus::Running;

        let Some(tool) = self.registry.get(&step.action) else {
            let reason = format!("{UNKNOWN_TOOL_PREFIX}{}", step.action);
            warn!(step_id = %step.id, action = %step.action, "no tool registered for action");
            return fail(step, reason);
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| tool.invoke(&step.params)));

        let value = match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                warn!(step_id = %step.id, action = %step.action, error = %e, "tool returned an error");
                return fail(step, e.to_string());
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(step_id = %step.id, action = %step.action, panic = %message, "tool panicked");
                return fail(step, format!("tool panicked: {message}"));
            }
        };

        let mut result = match normalize(value) {
            Some(result) => result,
            None => {
                warn!(step_id = %step.id, action = %step.action, "tool returned a malformed result");
                return fail(step, INVALID_RESULT.to_string());
            }
        };

        if result.get("status").and_then(Value::as_str) == Some("failed") {
            warn!(
                step_id = %step.id,
                action = %step.action,
                reason = step_reason(&result),
                "tool reported failure"
            );
            step.status = StepStatus::Failed;
            step.result = Some(result);
            return;
        }

        if let Some(verifier) = &self.verifier {
            let checked = verifier.verify(&step.action, &Value::Object(result.clone()));
            let rejection = match checked {
                Ok(report) if report.passed => None,
                Ok(report) => Some(report.summary()),
                Err(e) => Some(e.to_string()),
            };
            if let Some(reason) = rejection {
                warn!(step_id = %step.id, action = %step.action, reason = %reason, "tool result rejected");
                result.insert("status".into(), Value::from("failed"));
                result.insert("reason".into(), Value::from(reason));
                step.status = StepStatus::Failed;
                step.result = Some(result);
                return;
            }
        }

        debug!(step_id = %step.id, action = %step.action, "step succeeded");
        step.status = StepStatus::Success;
        step.result = Some(result);
    }
}

/// Accept only objects whose `status` is `success` or `failed`
/// (case-insensitive); the status is stored in lowercase.
fn normalize(value: Value) -> Option<Params> {
    let Value::Object(mut result) = value else {
        return None;
    };
    let status = result.get("status")?.as_str()?.trim().to_ascii_lowercase();
    if status != "success" && status != "failed" {
        return None;
    }
    result.insert("status".into(), Value::from(status));
    Some(result)
}

fn fail(step: &mut Step, reason: String) {
    step.status = StepStatus::Failed;
    step.result = Some(failure_result(reason));
}

fn failure_result(reason: String) -> Params {
    let mut result = Params::new();
    result.insert("status".into(), Value::from("failed"));
    result.insert("reason".into(), Value::from(reason));
    result
}

fn step_reason(result: &Params) -> &str {
    result.get("reason").and_then(Value::as_str).unwrap_or("unspecified")
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

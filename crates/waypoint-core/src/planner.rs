//! Planner: goal + context → prompt → collaborator → parsed plan.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use waypoint_contracts::{error::WaypointResult, plan::Params};

use crate::{
    parser::{parse_plan, ParsedPlan},
    traits::TextGenerator,
};

const DEFAULT_PLANNER_PROMPT: &str = "You are a planning assistant.\n\
Goal: {goal}\n\
Context: {context}\n\
Respond with a single JSON object with the keys \"goal\" (string) and \"steps\" \
(array of objects with \"id\", \"action\" and \"params\"). Return JSON only.";

/// Substitute `{name}` placeholders in one pass over `template`.
///
/// Unknown placeholders are left as they are. Substituted values are never
/// scanned again, so a value that itself contains `{name}` is kept verbatim.
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Compact JSON rendering of a parameter map for prompts.
pub(crate) fn render_params(params: &Params) -> String {
    Value::Object(params.clone()).to_string()
}

pub struct Planner {
    generator: Arc<dyn TextGenerator>,
    template: Option<String>,
}

impl Planner {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator, template: None }
    }

    /// Use a configured prompt template instead of the built-in one.
    pub fn with_template(mut self, template: Option<String>) -> Self {
        self.template = template;
        self
    }

    pub fn build_prompt(&self, goal: &str, context: &Params) -> String {
        let template = self.template.as_deref().unwrap_or(DEFAULT_PLANNER_PROMPT);
        let context = render_params(context);
        render_template(template, &[("goal", goal), ("context", &context)])
    }

    /// Make exactly one collaborator call and parse its output.
    ///
    /// # Errors
    ///
    /// Propagates the collaborator's error unchanged; retries are the
    /// caller's decision.
    pub fn plan(&self, goal: &str, context: &Params) -> WaypointResult<ParsedPlan> {
        let prompt = self.build_prompt(goal, context);
        debug!(goal = %goal, prompt_len = prompt.len(), "requesting plan");
        let raw = self.generator.generate(&prompt)?;
        Ok(parse_plan(&raw, goal))
    }
}

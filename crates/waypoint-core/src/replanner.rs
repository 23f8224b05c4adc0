//! Replanner: regenerate a plan after a failed step or a digression.
//!
//! The depth counter is the only thing that stops a plan/execute/replan
//! cycle. It is incremented before anything else, and once it passes the
//! configured maximum the collaborator is not called again.

use std::{collections::HashSet, sync::Arc};

use tracing::{info, warn};

use waypoint_contracts::{
    error::WaypointResult,
    goal::ReplanStrategy,
    plan::{Params, Plan, Step},
};

use crate::{
    parser::{parse_plan, unique_id, ParsedPlan},
    planner::{render_params, render_template},
    traits::TextGenerator,
};

const DEFAULT_REPLANNER_PROMPT: &str = "You are a planning assistant revising a plan.\n\
Goal: {goal}\n\
Context: {context}\n\
What went wrong: {failure}\n\
Current plan: {plan}\n\
Provide a revised plan as a single JSON object with the keys \"goal\" and \"steps\" \
(each step with \"id\", \"action\" and \"params\"). Return JSON only.";

/// What triggered a replan.
#[derive(Debug, Clone)]
pub enum ReplanCause {
    StepFailed(Step),
    Digression { message: String },
}

impl ReplanCause {
    pub fn describe(&self) -> String {
        match self {
            ReplanCause::StepFailed(step) => {
                let result = step
                    .result
                    .as_ref()
                    .map(render_params)
                    .unwrap_or_else(|| "null".to_string());
                format!(
                    "step '{}' (action '{}', params {}) failed with result {}",
                    step.id,
                    step.action,
                    render_params(&step.params),
                    result
                )
            }
            ReplanCause::Digression { message } => {
                format!("the user changed topic: \"{message}\"")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum Replan {
    Revised(ParsedPlan),
    /// The depth bound was exceeded; no collaborator call was made.
    Exhausted { depth: u32 },
}

pub struct Replanner {
    generator: Arc<dyn TextGenerator>,
    template: Option<String>,
}

impl Replanner {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator, template: None }
    }

    pub fn with_template(mut self, template: Option<String>) -> Self {
        self.template = template;
        self
    }

    pub fn build_prompt(
        &self,
        cause: &ReplanCause,
        current: Option<&Plan>,
        goal: &str,
        context: &Params,
    ) -> String {
        let template = self.template.as_deref().unwrap_or(DEFAULT_REPLANNER_PROMPT);
        let plan = match current {
            Some(plan) => serde_json::to_string(&plan.steps).unwrap_or_else(|_| "[]".to_string()),
            None => "[]".to_string(),
        };
        let context = render_params(context);
        let failure = cause.describe();
        render_template(
            template,
            &[
                ("goal", goal),
                ("context", &context),
                ("failure", &failure),
                ("plan", &plan),
            ],
        )
    }

    /// Request a revised plan, bounded by `max` replans per turn.
    ///
    /// `depth` is incremented on every call, including the one that ends
    /// up exhausted, so it never decreases within a turn.
    pub fn replan(
        &self,
        cause: &ReplanCause,
        current: Option<&Plan>,
        goal: &str,
        context: &Params,
        depth: &mut u32,
        max: u32,
    ) -> WaypointResult<Replan> {
        *depth += 1;

        if *depth > max {
            warn!(depth = *depth, max, "replan limit exceeded");
            return Ok(Replan::Exhausted { depth: *depth });
        }

        info!(depth = *depth, max, cause = %cause.describe(), "replanning");
        let prompt = self.build_prompt(cause, current, goal, context);
        let raw = self.generator.generate(&prompt)?;
        Ok(Replan::Revised(parse_plan(&raw, goal)))
    }
}

/// Combine the current plan with a revised one.
///
/// `Restart` discards the current plan. `Resume` keeps the steps that
/// already succeeded, in order and untouched, and appends the revised steps
/// with their ids made unique against the kept ones.
pub fn merge(strategy: ReplanStrategy, current: Option<&Plan>, revised: Plan) -> Plan {
    let kept: Vec<Step> = match (strategy, current) {
        (ReplanStrategy::Resume, Some(plan)) => plan.completed_steps().cloned().collect(),
        _ => return revised,
    };

    let mut used: HashSet<String> = kept.iter().map(|s| s.id.clone()).collect();
    let mut steps = kept;
    for mut step in revised.steps {
        step.id = unique_id(step.id, &mut used);
        steps.push(step);
    }

    Plan {
        goal: revised.goal,
        steps,
        metadata: revised.metadata,
    }
}

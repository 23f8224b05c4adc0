//! The waypoint engine: drives one turn of a goal through the state machine.
//!
//! A turn walks the phases of the transition table:
//!
//!   Start → Planning → Executing → [DigressionCheck] ⇄ CollectingInfo
//!         → DigressionCheck → (Replanning → Executing | PolicyCheck)
//!         → ToolExecution → … → Responding | Suspended | Aborted
//!
//! Each new user message is classified once, as early as possible: before
//! slot collection when required slots are missing, otherwise right before
//! the policy check. A digression replaces the plan with one for the new
//! request, and that plan is not held back by the abandoned goal's slots.
//!
//! Two invariants are enforced structurally:
//!
//! - `Dispatcher::dispatch()` is only reachable from `ToolExecution`, and
//!   `ToolExecution` is only reachable through `PolicyApproved`. A denied
//!   call is never dispatched.
//! - Every turn terminates. Replanning is bounded by `max_replans`, slot
//!   collection by `max_slot_rounds`, and the whole walk by `max_iterations`.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use waypoint_contracts::{
    error::{WaypointError, WaypointResult},
    goal::{EngineSettings, PromptTemplates},
    plan::{Params, Plan, StepStatus, NOOP_ACTION},
    policy::{PolicyVerdict, ToolCall},
    state::{AbortReason, AgentState, Classification, JourneyStatus},
};

use crate::{
    digression::{self, DigressionDetector},
    dispatch::Dispatcher,
    machine::{next_phase, Phase},
    monitor::Monitor,
    planner::Planner,
    replanner::{merge, Replan, ReplanCause, Replanner},
    slots::{bind_slots, missing_slots, SlotFill, SlotFiller},
    traits::{DigressionClassifier, InputSource, PolicyEngine, TextGenerator, TraceWriter},
};

/// How a turn ended, from the caller's point of view.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The plan ran to completion.
    Completed {
        response: String,
        tool_result: Option<Params>,
    },
    /// Required slots are missing; the plan is kept for the next turn.
    AwaitingInput { missing: Vec<String>, prompt: String },
    /// The policy executor denied a tool call. Nothing was dispatched.
    Rejected { rule_id: String, reason: String },
    /// A bound was exceeded; the plan was replaced by an empty terminal plan.
    Aborted { reason: String, response: String },
}

#[derive(Debug, Clone)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    /// Every phase executed, in order.
    pub path: Vec<Phase>,
    pub iterations: u32,
}

impl TurnReport {
    /// The phase the turn ended in.
    pub fn final_phase(&self) -> Option<Phase> {
        self.path.last().copied()
    }
}

/// Cooperative cancellation of a running turn.
///
/// The engine checks the token before every phase; once it is cancelled
/// the turn aborts and no further tool is dispatched. A tool call already
/// in flight is not interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The engine. Built once and shared by every session; all per-turn state
/// lives in the `AgentState` the caller passes in.
pub struct Engine {
    planner: Planner,
    replanner: Replanner,
    detector: DigressionDetector,
    slot_filler: SlotFiller,
    dispatcher: Dispatcher,
    policy: Arc<dyn PolicyEngine>,
    monitor: Monitor,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        dispatcher: Dispatcher,
        policy: Arc<dyn PolicyEngine>,
        trace: Arc<dyn TraceWriter>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            planner: Planner::new(Arc::clone(&generator)),
            replanner: Replanner::new(generator),
            detector: DigressionDetector::new(None),
            slot_filler: SlotFiller,
            dispatcher,
            policy,
            monitor: Monitor::new(trace),
            settings,
        }
    }

    /// Enable digression detection for goals that declare a `digression_prompt`.
    pub fn with_classifier(mut self, classifier: Arc<dyn DigressionClassifier>) -> Self {
        self.detector = DigressionDetector::new(Some(classifier));
        self
    }

    /// Use configured planner and replanner prompts.
    pub fn with_templates(mut self, templates: &PromptTemplates) -> Self {
        self.planner = self.planner.with_template(templates.planner.clone());
        self.replanner = self.replanner.with_template(templates.replanner.clone());
        self
    }

    /// Begin a new turn for `message` and run it.
    pub fn start_turn(
        &self,
        state: &mut AgentState,
        message: Option<String>,
        input: &dyn InputSource,
    ) -> WaypointResult<TurnReport> {
        self.start_turn_with(state, message, input, &CancelToken::new())
    }

    /// Like `start_turn`, but the turn aborts as soon as `cancel` fires.
    pub fn start_turn_with(
        &self,
        state: &mut AgentState,
        message: Option<String>,
        input: &dyn InputSource,
        cancel: &CancelToken,
    ) -> WaypointResult<TurnReport> {
        state.begin_turn(message);
        self.run_turn(state, input, cancel)
    }

    /// Run the state machine until a terminal phase.
    ///
    /// The caller is expected to have called `AgentState::begin_turn`.
    ///
    /// # Errors
    ///
    /// Only failures the turn cannot absorb: the text generator or policy
    /// engine erroring, the trace sink failing, or an impossible state.
    /// Policy denials and exceeded bounds are outcomes, not errors.
    pub fn run_turn(
        &self,
        state: &mut AgentState,
        input: &dyn InputSource,
        cancel: &CancelToken,
    ) -> WaypointResult<TurnReport> {
        let limit = self.settings.max_iterations;
        let mut phase = Phase::Start;
        let mut path = Vec::new();
        let mut iterations = 0u32;

        info!(turn_id = %state.turn_id, goal_id = %state.goal_id, "turn starting");

        loop {
            iterations += 1;
            if iterations > limit {
                warn!(turn_id = %state.turn_id, limit, "iteration ceiling reached");
                state.abort = Some(AbortReason::IterationCeiling { limit });
                state.journey_status = JourneyStatus::Aborted;
                phase = Phase::Aborted;
            } else if cancel.is_cancelled() && !phase.is_terminal() {
                warn!(turn_id = %state.turn_id, phase = %phase, "turn cancelled");
                state.abort = Some(AbortReason::Cancelled);
                state.journey_status = JourneyStatus::Aborted;
                phase = Phase::Aborted;
            }

            debug!(turn_id = %state.turn_id, phase = %phase, "entering phase");
            path.push(phase);
            self.run_phase(phase, state, input)?;

            if phase.is_terminal() {
                break;
            }
            phase = next_phase(state.journey_status, state.digression);
        }

        let outcome = self.outcome(phase, state)?;
        info!(
            turn_id = %state.turn_id,
            phase = %phase,
            iterations,
            steps = state.trace.len(),
            "turn finished"
        );
        Ok(TurnReport { outcome, path, iterations })
    }

    fn run_phase(
        &self,
        phase: Phase,
        state: &mut AgentState,
        input: &dyn InputSource,
    ) -> WaypointResult<()> {
        match phase {
            Phase::Start => self.start(state),
            Phase::Planning => self.plan(state),
            Phase::Executing => self.execute(state),
            Phase::CollectingInfo => self.collect(state, input),
            Phase::DigressionCheck => self.check_digression(state),
            Phase::Replanning => self.replan(state),
            Phase::PolicyCheck => self.check_policy(state),
            Phase::ToolExecution => self.run_tool(state),
            Phase::Responding => self.respond(state),
            Phase::Suspended => self.suspend(state),
            Phase::Aborted => self.abort(state),
        }
    }

    // ── Phases ───────────────────────────────────────────────────────────────

    fn start(&self, state: &mut AgentState) -> WaypointResult<()> {
        state.missing_slots = missing_slots(&state.goal_config, &state.collected_slots);
        state.journey_status = if state.is_suspended() {
            debug!(turn_id = %state.turn_id, "resuming suspended plan");
            JourneyStatus::Resumed
        } else {
            state.plan = None;
            state.tool_result = None;
            JourneyStatus::Started
        };
        Ok(())
    }

    fn plan(&self, state: &mut AgentState) -> WaypointResult<()> {
        let context = context_of(state);
        let parsed = self.planner.plan(&state.goal_config.description, &context)?;
        info!(
            turn_id = %state.turn_id,
            tier = parsed.tier.label(),
            steps = parsed.plan.steps.len(),
            "plan created"
        );
        state.plan = Some(parsed.plan);
        state.journey_status = JourneyStatus::Planned;
        Ok(())
    }

    fn execute(&self, state: &mut AgentState) -> WaypointResult<()> {
        let Some(plan) = &state.plan else {
            return Err(WaypointError::StateMachineError {
                reason: "executing without a plan".to_string(),
            });
        };
        let has_pending = plan.next_pending().is_some();

        state.missing_slots = missing_slots(&state.goal_config, &state.collected_slots);
        state.journey_status = if !slots_gate(state) {
            if has_pending {
                JourneyStatus::ReadyForExecution
            } else {
                JourneyStatus::PlanCompleted
            }
        } else if self.detector.pending(state) {
            JourneyStatus::Unclassified
        } else {
            JourneyStatus::MissingSlots
        };
        Ok(())
    }

    fn collect(&self, state: &mut AgentState, input: &dyn InputSource) -> WaypointResult<()> {
        state.slot_rounds += 1;
        if state.slot_rounds > self.settings.max_slot_rounds {
            warn!(
                turn_id = %state.turn_id,
                rounds = state.slot_rounds,
                missing = ?state.missing_slots,
                "slot collection bound exceeded"
            );
            state.abort = Some(AbortReason::SlotRoundsExhausted {
                rounds: state.slot_rounds,
                missing: state.missing_slots.clone(),
            });
            state.journey_status = JourneyStatus::Aborted;
            return Ok(());
        }

        state.journey_status = match self.slot_filler.fill(state, input) {
            SlotFill::Complete => JourneyStatus::SlotsFilled,
            SlotFill::Pending(_) => JourneyStatus::CollectingInfo,
        };
        Ok(())
    }

    fn check_digression(&self, state: &mut AgentState) -> WaypointResult<()> {
        let classification = self.detector.detect(state);
        digression::apply(state, classification);
        state.journey_status = match classification {
            Classification::Clarification => JourneyStatus::Clarifying,
            Classification::OnTopic if slots_gate(state) => JourneyStatus::MissingSlots,
            Classification::OnTopic | Classification::Digression => JourneyStatus::Classified,
        };
        Ok(())
    }

    fn replan(&self, state: &mut AgentState) -> WaypointResult<()> {
        let detour = state.digression;
        let cause = if detour {
            ReplanCause::Digression {
                message: state.last_user_message.clone().unwrap_or_default(),
            }
        } else if let Some(step) = state.failed_step.clone() {
            ReplanCause::StepFailed(step)
        } else {
            return Err(WaypointError::StateMachineError {
                reason: "replanning without a failed step or digression".to_string(),
            });
        };

        let context = context_of(state);
        let max = self.settings.max_replans;
        let outcome = self.replanner.replan(
            &cause,
            state.plan.as_ref(),
            &state.goal_config.description,
            &context,
            &mut state.replan_depth,
            max,
        )?;

        match outcome {
            Replan::Exhausted { depth } => {
                state.abort = Some(AbortReason::ReplanLimit { depth, max });
                state.journey_status = JourneyStatus::Aborted;
            }
            Replan::Revised(parsed) => {
                let merged = merge(self.settings.replan_strategy, state.plan.as_ref(), parsed.plan);
                info!(
                    turn_id = %state.turn_id,
                    depth = state.replan_depth,
                    tier = parsed.tier.label(),
                    steps = merged.steps.len(),
                    "plan revised"
                );
                state.plan = Some(merged);
                state.detour |= detour;
                state.digression = false;
                state.failed_step = None;
                state.journey_status = JourneyStatus::Replanned;
            }
        }
        Ok(())
    }

    fn check_policy(&self, state: &mut AgentState) -> WaypointResult<()> {
        let plan = active_plan(&mut state.plan)?;
        let Some(index) = plan.next_pending() else {
            state.journey_status = JourneyStatus::PlanCompleted;
            return Ok(());
        };

        let step = &mut plan.steps[index];
        bind_slots(step, &state.collected_slots);
        let call = ToolCall {
            action: step.action.clone(),
            params: step.params.clone(),
        };

        match self.policy.evaluate(&call)? {
            PolicyVerdict::Allow => {
                debug!(turn_id = %state.turn_id, action = %call.action, "policy allowed call");
                state.journey_status = JourneyStatus::PolicyApproved;
            }
            PolicyVerdict::Deny { rule_id, reason } => {
                warn!(
                    turn_id = %state.turn_id,
                    action = %call.action,
                    rule_id = %rule_id,
                    reason = %reason,
                    "policy denied call"
                );
                state.abort = Some(AbortReason::PolicyDenied { rule_id, reason });
                state.journey_status = JourneyStatus::PolicyDenied;
            }
        }
        Ok(())
    }

    fn run_tool(&self, state: &mut AgentState) -> WaypointResult<()> {
        let plan = active_plan(&mut state.plan)?;
        let Some(index) = plan.next_pending() else {
            return Err(WaypointError::StateMachineError {
                reason: "tool execution with no pending step".to_string(),
            });
        };

        let step = &mut plan.steps[index];
        self.dispatcher.dispatch(step);
        let step = step.clone();

        self.monitor.observe(state, &step)?;

        if step.status == StepStatus::Success {
            if step.action != NOOP_ACTION {
                state.tool_result = step.result.clone();
            }
            state.journey_status = JourneyStatus::StepSucceeded;
        } else {
            warn!(
                turn_id = %state.turn_id,
                step_id = %step.id,
                action = %step.action,
                reason = step.failure_reason().unwrap_or("unspecified"),
                depth = state.replan_depth,
                "step failed"
            );
            state.failed_step = Some(step);
            state.journey_status = JourneyStatus::StepFailed;
        }
        Ok(())
    }

    fn respond(&self, state: &mut AgentState) -> WaypointResult<()> {
        state.response = Some(summarize(state));
        state.journey_status = JourneyStatus::Completed;
        self.monitor.finalize(state)
    }

    fn suspend(&self, state: &mut AgentState) -> WaypointResult<()> {
        let prompt = state
            .missing_slots
            .first()
            .map(|slot| state.goal_config.prompt_for(slot))
            .unwrap_or_default();
        state.response = Some(prompt);
        // The status stays `CollectingInfo` so the next turn resumes.
        self.monitor.finalize(state)
    }

    fn abort(&self, state: &mut AgentState) -> WaypointResult<()> {
        let response = match &state.abort {
            Some(AbortReason::PolicyDenied { reason, .. }) => {
                format!("Request rejected: {reason}")
            }
            Some(reason) => {
                warn!(turn_id = %state.turn_id, reason = %reason, "turn aborted");
                state.plan = Some(Plan::terminal(state.goal_config.description.clone()));
                format!("Sorry, I could not complete this request: {reason}.")
            }
            None => {
                return Err(WaypointError::StateMachineError {
                    reason: "aborted without a reason".to_string(),
                })
            }
        };
        state.response = Some(response);
        state.journey_status = JourneyStatus::Aborted;
        self.monitor.finalize(state)
    }

    // ── Outcome ──────────────────────────────────────────────────────────────

    fn outcome(&self, phase: Phase, state: &AgentState) -> WaypointResult<TurnOutcome> {
        let response = state.response.clone().unwrap_or_default();
        match (phase, &state.abort) {
            (Phase::Responding, _) => Ok(TurnOutcome::Completed {
                response,
                tool_result: state.tool_result.clone(),
            }),
            (Phase::Suspended, _) => Ok(TurnOutcome::AwaitingInput {
                missing: state.missing_slots.clone(),
                prompt: response,
            }),
            (Phase::Aborted, Some(AbortReason::PolicyDenied { rule_id, reason })) => {
                Ok(TurnOutcome::Rejected {
                    rule_id: rule_id.clone(),
                    reason: reason.clone(),
                })
            }
            (Phase::Aborted, Some(reason)) => Ok(TurnOutcome::Aborted {
                reason: reason.to_string(),
                response,
            }),
            (other, _) => Err(WaypointError::StateMachineError {
                reason: format!("turn ended in non-terminal phase '{other}'"),
            }),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Whether missing required slots hold the plan back.
fn slots_gate(state: &AgentState) -> bool {
    !state.detour && !state.missing_slots.is_empty()
}

fn active_plan(plan: &mut Option<Plan>) -> WaypointResult<&mut Plan> {
    plan.as_mut().ok_or_else(|| WaypointError::StateMachineError {
        reason: "no active plan".to_string(),
    })
}

/// What the planner sees about the turn.
fn context_of(state: &AgentState) -> Params {
    let mut context = Params::new();
    context.insert("goal_id".into(), Value::from(state.goal_id.clone()));
    context.insert("required_slots".into(), json!(state.goal_config.required_slots));
    context.insert("slots".into(), Value::Object(state.collected_slots.clone()));
    if let Some(tool) = &state.goal_config.tool {
        context.insert("tool".into(), Value::from(tool.clone()));
    }
    if let Some(message) = &state.last_user_message {
        context.insert("user_message".into(), Value::from(message.clone()));
    }
    context
}

/// Deterministic summary of the last tool result: its status and any `*_id` fields.
fn summarize(state: &AgentState) -> String {
    let goal = &state.goal_config.description;
    let Some(result) = &state.tool_result else {
        return format!("Completed: {goal}.");
    };

    let mut details = Vec::new();
    if let Some(status) = result.get("status").and_then(Value::as_str) {
        details.push(format!("status: {status}"));
    }
    for (key, value) in result {
        if key.ends_with("_id") {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            details.push(format!("{key}: {value}"));
        }
    }
    format!("Completed: {goal} ({})", details.join(", "))
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{HashMap, VecDeque},
        sync::Mutex,
    };

    use waypoint_contracts::{
        goal::{GoalConfig, ReplanStrategy},
        trace::TraceRecord,
    };

    use super::*;
    use crate::{dispatch::ToolRegistry, traits::Tool};

    // ── Mocks ────────────────────────────────────────────────────────────────

    /// Replies from a script; repeats the last reply once the script runs out.
    struct ScriptedGenerator {
        replies: Mutex<VecDeque<String>>,
        last: Mutex<String>,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedGenerator {
        fn new(replies: &[&str]) -> (Arc<Self>, Arc<Mutex<Vec<String>>>) {
            let prompts = Arc::new(Mutex::new(Vec::new()));
            let generator = Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                last: Mutex::new(String::new()),
                prompts: Arc::clone(&prompts),
            };
            (Arc::new(generator), prompts)
        }
    }

    impl TextGenerator for ScriptedGenerator {
        fn generate(&self, prompt: &str) -> WaypointResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let mut last = self.last.lock().unwrap();
            if let Some(next) = self.replies.lock().unwrap().pop_front() {
                *last = next;
            }
            Ok(last.clone())
        }
    }

    struct FailingGenerator;

    impl TextGenerator for FailingGenerator {
        fn generate(&self, _prompt: &str) -> WaypointResult<String> {
            Err(WaypointError::GenerationFailed { reason: "connection refused".into() })
        }
    }

    type ToolBody = Box<dyn Fn(u32, &Params) -> Value + Send + Sync>;

    /// A tool whose body sees the 1-based call number.
    struct ScriptedTool {
        name: &'static str,
        calls: Arc<Mutex<u32>>,
        body: ToolBody,
    }

    impl Tool for ScriptedTool {
        fn name(&self) -> &str {
            self.name
        }

        fn invoke(&self, params: &Params) -> WaypointResult<Value> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            Ok((self.body)(*calls, params))
        }
    }

    fn tool(
        name: &'static str,
        body: impl Fn(u32, &Params) -> Value + Send + Sync + 'static,
    ) -> (Arc<ScriptedTool>, Arc<Mutex<u32>>) {
        let calls = Arc::new(Mutex::new(0));
        let tool = ScriptedTool { name, calls: Arc::clone(&calls), body: Box::new(body) };
        (Arc::new(tool), calls)
    }

    /// Denies any call whose `amount` exceeds `max`.
    struct ThresholdPolicy {
        max: f64,
        calls: Arc<Mutex<u32>>,
        seen: Arc<Mutex<Vec<ToolCall>>>,
    }

    impl PolicyEngine for ThresholdPolicy {
        fn evaluate(&self, call: &ToolCall) -> WaypointResult<PolicyVerdict> {
            *self.calls.lock().unwrap() += 1;
            self.seen.lock().unwrap().push(call.clone());
            let amount = call.params.get("amount").and_then(Value::as_f64).unwrap_or(0.0);
            if amount > self.max {
                Ok(PolicyVerdict::Deny {
                    rule_id: "2fa-threshold".into(),
                    reason: format!("payments above {} GBP require 2FA", self.max),
                })
            } else {
                Ok(PolicyVerdict::Allow)
            }
        }
    }

    #[derive(Default)]
    struct MemoryTrace {
        records: Mutex<Vec<TraceRecord>>,
        finalized: Mutex<u32>,
        broken: bool,
    }

    impl TraceWriter for MemoryTrace {
        fn write(&self, _turn_id: &str, record: &TraceRecord) -> WaypointResult<()> {
            if self.broken {
                return Err(WaypointError::TraceWriteFailed { reason: "sink closed".into() });
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }

        fn finalize(&self, _turn_id: &str) -> WaypointResult<()> {
            *self.finalized.lock().unwrap() += 1;
            Ok(())
        }
    }

    struct MapInput(HashMap<&'static str, Value>);

    impl InputSource for MapInput {
        fn request(&self, slot: &str, _state: &AgentState) -> Option<Value> {
            self.0.get(slot).cloned()
        }
    }

    fn no_input() -> MapInput {
        MapInput(HashMap::new())
    }

    struct FixedClassifier(Classification);

    impl DigressionClassifier for FixedClassifier {
        fn classify(&self, _: &str, _: &GoalConfig, _: &[String]) -> WaypointResult<Classification> {
            Ok(self.0)
        }
    }

    // ── Fixture ──────────────────────────────────────────────────────────────

    struct Fixture {
        engine: Engine,
        prompts: Arc<Mutex<Vec<String>>>,
        policy_calls: Arc<Mutex<u32>>,
        policy_seen: Arc<Mutex<Vec<ToolCall>>>,
        trace: Arc<MemoryTrace>,
    }

    fn fixture(
        replies: &[&str],
        tools: Vec<Arc<ScriptedTool>>,
        max_amount: f64,
        settings: EngineSettings,
    ) -> Fixture {
        let (generator, prompts) = ScriptedGenerator::new(replies);
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool);
        }
        let policy_calls = Arc::new(Mutex::new(0));
        let policy_seen = Arc::new(Mutex::new(Vec::new()));
        let policy = ThresholdPolicy {
            max: max_amount,
            calls: Arc::clone(&policy_calls),
            seen: Arc::clone(&policy_seen),
        };
        let trace = Arc::new(MemoryTrace::default());
        let engine = Engine::new(
            generator,
            Dispatcher::new(Arc::new(registry)),
            Arc::new(policy),
            trace.clone(),
            settings,
        );
        Fixture { engine, prompts, policy_calls, policy_seen, trace }
    }

    fn payment_goal() -> GoalConfig {
        let mut goal = GoalConfig::new("make a payment", &["amount"]);
        goal.tool = Some("make_payment".into());
        goal.slot_prompts.insert("amount".into(), "How much would you like to transfer?".into());
        goal
    }

    fn payment_state() -> AgentState {
        AgentState::new("payments", "pay", payment_goal())
    }

    fn amount(value: u64) -> MapInput {
        MapInput(HashMap::from([("amount", Value::from(value))]))
    }

    fn payment_tool() -> (Arc<ScriptedTool>, Arc<Mutex<u32>>) {
        tool("make_payment", |_, params| {
            json!({ "status": "success", "payment_id": "pay_0123456789ab", "amount": params["amount"] })
        })
    }

    const PAY_PLAN: &str =
        r#"{"goal": "make a payment", "steps": [{"id": "pay", "action": "make_payment", "params": {"currency": "GBP"}}]}"#;

    // ── Scenarios ────────────────────────────────────────────────────────────

    #[test]
    fn payment_within_policy_completes() {
        let (pay, pay_calls) = payment_tool();
        let f = fixture(&[PAY_PLAN], vec![pay], 100.0, EngineSettings::default());
        let mut state = payment_state();

        let report = f.engine.start_turn(&mut state, Some("pay 10 GBP".into()), &amount(10)).unwrap();

        match &report.outcome {
            TurnOutcome::Completed { response, tool_result } => {
                assert!(response.contains("payment_id: pay_0123456789ab"), "{response}");
                assert_eq!(tool_result.as_ref().unwrap()["amount"], 10);
            }
            other => panic!("expected Completed, got {:?}", other),
        }
        assert_eq!(report.final_phase(), Some(Phase::Responding));
        assert_eq!(*pay_calls.lock().unwrap(), 1);
        assert_eq!(state.trace.len(), 1);
        assert_eq!(state.trace[0].status, StepStatus::Success);
        assert_eq!(f.trace.records.lock().unwrap().len(), 1);
        assert_eq!(*f.trace.finalized.lock().unwrap(), 1);
        assert_eq!(state.journey_status, JourneyStatus::Completed);
        assert_eq!(
            report.path,
            [
                Phase::Start,
                Phase::Planning,
                Phase::Executing,
                Phase::CollectingInfo,
                Phase::Executing,
                Phase::DigressionCheck,
                Phase::PolicyCheck,
                Phase::ToolExecution,
                Phase::PolicyCheck,
                Phase::Responding,
            ]
        );
    }

    #[test]
    fn slots_are_bound_before_the_policy_check() {
        let (pay, _) = payment_tool();
        let f = fixture(&[PAY_PLAN], vec![pay], 100.0, EngineSettings::default());
        let mut state = payment_state();

        f.engine.start_turn(&mut state, None, &amount(10)).unwrap();

        let seen = f.policy_seen.lock().unwrap();
        assert_eq!(seen[0].params["amount"], 10);
        assert_eq!(seen[0].params["currency"], "GBP");
    }

    #[test]
    fn policy_denial_rejects_without_dispatch() {
        let (pay, pay_calls) = payment_tool();
        let f = fixture(&[PAY_PLAN], vec![pay], 100.0, EngineSettings::default());
        let mut state = payment_state();

        let report = f.engine.start_turn(&mut state, Some("pay 1500 GBP".into()), &amount(1500)).unwrap();

        match &report.outcome {
            TurnOutcome::Rejected { rule_id, reason } => {
                assert_eq!(rule_id, "2fa-threshold");
                assert!(reason.contains("100"), "{reason}");
            }
            other => panic!("expected Rejected, got {:?}", other),
        }
        assert_eq!(*pay_calls.lock().unwrap(), 0);
        assert!(state.trace.is_empty());
        assert!(f.trace.records.lock().unwrap().is_empty());
        assert_eq!(report.final_phase(), Some(Phase::Aborted));
        assert_eq!(state.journey_status, JourneyStatus::Aborted);
        assert!(state.response.as_deref().unwrap().starts_with("Request rejected"));
    }

    #[test]
    fn missing_slot_suspends_then_resumes() {
        let (pay, pay_calls) = payment_tool();
        let f = fixture(&[PAY_PLAN], vec![pay], 100.0, EngineSettings::default());
        let mut state = payment_state();

        let report = f.engine.start_turn(&mut state, Some("send money".into()), &no_input()).unwrap();

        match &report.outcome {
            TurnOutcome::AwaitingInput { missing, prompt } => {
                assert_eq!(missing, &["amount".to_string()]);
                assert_eq!(prompt, "How much would you like to transfer?");
            }
            other => panic!("expected AwaitingInput, got {:?}", other),
        }
        assert_eq!(state.journey_status, JourneyStatus::CollectingInfo);
        assert_eq!(report.final_phase(), Some(Phase::Suspended));
        assert_eq!(*f.policy_calls.lock().unwrap(), 0);
        assert_eq!(*pay_calls.lock().unwrap(), 0);
        assert!(state.is_suspended());

        let report = f.engine.start_turn(&mut state, Some("10".into()), &amount(10)).unwrap();

        assert!(matches!(report.outcome, TurnOutcome::Completed { .. }));
        assert_eq!(report.path[1], Phase::Executing);
        assert_eq!(f.prompts.lock().unwrap().len(), 1, "the kept plan is not regenerated");
        assert_eq!(*pay_calls.lock().unwrap(), 1);
    }

    #[test]
    fn repeated_failures_abort_after_bounded_replans() {
        let (pay, pay_calls) =
            tool("make_payment", |_, _| json!({ "status": "failed", "reason": "bank_unavailable" }));
        let f = fixture(&[PAY_PLAN], vec![pay], 1_000_000.0, EngineSettings::default());
        let mut state = payment_state();

        let report = f.engine.start_turn(&mut state, None, &amount(10)).unwrap();

        match &report.outcome {
            TurnOutcome::Aborted { reason, response } => {
                assert!(reason.contains("replanning limit"), "{reason}");
                assert!(response.contains("could not complete"), "{response}");
            }
            other => panic!("expected Aborted, got {:?}", other),
        }
        // One initial plan plus three replans; the fourth replan is never requested.
        assert_eq!(f.prompts.lock().unwrap().len(), 4);
        assert_eq!(*pay_calls.lock().unwrap(), 4);
        assert_eq!(state.trace.len(), 4);
        assert_eq!(state.replan_depth, 4);
        assert_eq!(state.abort, Some(AbortReason::ReplanLimit { depth: 4, max: 3 }));

        let plan = state.plan.as_ref().unwrap();
        assert!(plan.is_terminal());
        assert!(plan.steps.is_empty());

        let depths: Vec<u32> = state.trace.iter().map(|r| r.replan_depth).collect();
        assert_eq!(depths, [0, 1, 2, 3]);
        assert!(depths.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn unknown_tool_is_replanned_around() {
        let (pay, _) = payment_tool();
        let f = fixture(
            &[r#"{"steps": [{"id": "wire", "action": "wire_transfer"}]}"#, PAY_PLAN],
            vec![pay],
            100.0,
            EngineSettings::default(),
        );
        let mut state = payment_state();

        let report = f.engine.start_turn(&mut state, None, &amount(10)).unwrap();

        assert!(matches!(report.outcome, TurnOutcome::Completed { .. }));
        assert_eq!(state.trace.len(), 2);
        assert_eq!(
            state.trace[0].result.as_ref().unwrap()["reason"],
            "unknown_tool:wire_transfer"
        );
        assert_eq!(state.trace[1].status, StepStatus::Success);
        assert!(f.prompts.lock().unwrap()[1].contains("unknown_tool:wire_transfer"));
    }

    #[test]
    fn malformed_planner_output_runs_a_noop() {
        let f = fixture(&["I'm sorry, I can't do that."], vec![], 100.0, EngineSettings::default());
        let mut state = payment_state();

        let report = f.engine.start_turn(&mut state, None, &amount(5)).unwrap();

        match &report.outcome {
            TurnOutcome::Completed { tool_result, .. } => assert!(tool_result.is_none()),
            other => panic!("expected Completed, got {:?}", other),
        }
        assert_eq!(state.trace.len(), 1);
        assert_eq!(state.trace[0].action, NOOP_ACTION);
        assert_eq!(state.plan.as_ref().unwrap().steps.len(), 1);
    }

    #[test]
    fn trace_has_one_record_per_attempt() {
        let (pay, _) = tool("make_payment", |call, _| {
            if call < 3 {
                json!({ "status": "failed", "reason": "timeout" })
            } else {
                json!({ "status": "success", "payment_id": "pay_x" })
            }
        });
        let (check, _) = tool("check_balance", |_, _| json!({ "status": "success", "balance": 50 }));
        let plan = r#"{"steps": [{"id": "bal", "action": "check_balance"}, {"id": "pay", "action": "make_payment"}]}"#;
        let f = fixture(&[plan], vec![pay, check], 100.0, EngineSettings::default());
        let mut state = payment_state();

        f.engine.start_turn(&mut state, None, &amount(5)).unwrap();

        // Restart replays the balance check each time: 3 x (bal + pay) attempts.
        assert_eq!(state.trace.len(), 6);
        assert_eq!(f.trace.records.lock().unwrap().len(), 6);
    }

    #[test]
    fn resume_strategy_keeps_completed_steps() {
        let (pay, pay_calls) = tool("make_payment", |call, _| {
            if call == 1 {
                json!({ "status": "failed", "reason": "timeout" })
            } else {
                json!({ "status": "success", "payment_id": "pay_y" })
            }
        });
        let (check, check_calls) = tool("check_balance", |_, _| json!({ "status": "success" }));
        let plan = r#"{"steps": [{"id": "bal", "action": "check_balance"}, {"id": "pay", "action": "make_payment"}]}"#;
        let retry = r#"{"steps": [{"id": "pay", "action": "make_payment"}]}"#;
        let settings = EngineSettings { replan_strategy: ReplanStrategy::Resume, ..Default::default() };
        let f = fixture(&[plan, retry], vec![pay, check], 100.0, settings);
        let mut state = payment_state();

        let report = f.engine.start_turn(&mut state, None, &amount(5)).unwrap();

        assert!(matches!(report.outcome, TurnOutcome::Completed { .. }));
        assert_eq!(*check_calls.lock().unwrap(), 1);
        assert_eq!(*pay_calls.lock().unwrap(), 2);
        let ids: Vec<_> = state.plan.as_ref().unwrap().steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["bal", "pay"]);
        assert_eq!(state.trace.len(), 3);
    }

    #[test]
    fn digression_discards_and_replans() {
        let (pay, _) = payment_tool();
        let f = fixture(&[PAY_PLAN], vec![pay], 100.0, EngineSettings::default());
        let engine = f.engine.with_classifier(Arc::new(FixedClassifier(Classification::Digression)));
        let mut goal = payment_goal();
        goal.digression_prompt = Some("Is the user still making a payment?".into());
        let mut state = AgentState::new("payments", "pay", goal);

        let report = engine
            .start_turn(&mut state, Some("actually, what's my balance?".into()), &amount(10))
            .unwrap();

        assert!(matches!(report.outcome, TurnOutcome::Completed { .. }));
        assert!(report.path.contains(&Phase::Replanning));
        // The revised plan serves the new request; the payment slots are not collected.
        assert!(!report.path.contains(&Phase::CollectingInfo));
        assert!(state.collected_slots.is_empty());
        assert!(state.detour);
        assert_eq!(state.replan_depth, 1);
        let prompts = f.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("changed topic"));
        assert!(!state.digression);
    }

    #[test]
    fn clarification_collects_without_replanning() {
        let (pay, _) = payment_tool();
        let f = fixture(&[PAY_PLAN], vec![pay], 100.0, EngineSettings::default());
        let engine = f.engine.with_classifier(Arc::new(FixedClassifier(Classification::Clarification)));
        let mut goal = payment_goal();
        goal.digression_prompt = Some("Is the user still making a payment?".into());
        let mut state = AgentState::new("payments", "pay", goal);

        let report = engine.start_turn(&mut state, Some("which account?".into()), &amount(10)).unwrap();

        assert!(matches!(report.outcome, TurnOutcome::Completed { .. }));
        assert!(!report.path.contains(&Phase::Replanning));
        let check = report.path.iter().position(|p| *p == Phase::DigressionCheck).unwrap();
        assert_eq!(report.path[check + 1], Phase::CollectingInfo);
        assert_eq!(f.prompts.lock().unwrap().len(), 1);
    }

    /// Labels messages by keyword and records the missing slots it was shown.
    struct KeywordClassifier {
        seen_missing: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl DigressionClassifier for KeywordClassifier {
        fn classify(&self, message: &str, _: &GoalConfig, missing: &[String]) -> WaypointResult<Classification> {
            self.seen_missing.lock().unwrap().push(missing.to_vec());
            Ok(if message.contains("balance") {
                Classification::Digression
            } else if message.starts_with("what is") {
                Classification::Clarification
            } else {
                Classification::OnTopic
            })
        }
    }

    const BALANCE_PLAN: &str = r#"{"goal": "check balance", "steps": [{"id": "bal", "action": "check_balance"}]}"#;

    struct ClassifiedFixture {
        engine: Engine,
        prompts: Arc<Mutex<Vec<String>>>,
        pay_calls: Arc<Mutex<u32>>,
        check_calls: Arc<Mutex<u32>>,
        seen_missing: Arc<Mutex<Vec<Vec<String>>>>,
    }

    fn classified_fixture() -> ClassifiedFixture {
        let (pay, pay_calls) = payment_tool();
        let (check, check_calls) = tool("check_balance", |_, _| json!({ "status": "success", "balance": 42 }));
        let f = fixture(&[PAY_PLAN, BALANCE_PLAN], vec![pay, check], 100.0, EngineSettings::default());
        let seen_missing = Arc::new(Mutex::new(Vec::new()));
        let classifier = KeywordClassifier { seen_missing: Arc::clone(&seen_missing) };
        ClassifiedFixture {
            engine: f.engine.with_classifier(Arc::new(classifier)),
            prompts: f.prompts,
            pay_calls,
            check_calls,
            seen_missing,
        }
    }

    fn classified_payment_state() -> AgentState {
        let mut goal = payment_goal();
        goal.digression_prompt = Some("Is the user still making a payment?".into());
        AgentState::new("payments", "pay", goal)
    }

    #[test]
    fn messages_are_classified_before_slot_collection() {
        let f = classified_fixture();
        let mut state = classified_payment_state();

        let report = f.engine.start_turn(&mut state, Some("send money".into()), &no_input()).unwrap();

        assert_eq!(
            report.path,
            [
                Phase::Start,
                Phase::Planning,
                Phase::Executing,
                Phase::DigressionCheck,
                Phase::CollectingInfo,
                Phase::Suspended,
            ]
        );
        assert_eq!(state.classification, Some(Classification::OnTopic));
        assert_eq!(*f.seen_missing.lock().unwrap(), [vec!["amount".to_string()]]);
    }

    #[test]
    fn off_topic_message_while_suspended_replans() {
        let f = classified_fixture();
        let mut state = classified_payment_state();

        f.engine.start_turn(&mut state, Some("send money".into()), &no_input()).unwrap();
        assert!(state.is_suspended());

        let report = f.engine
            .start_turn(&mut state, Some("forget it, what's my balance?".into()), &no_input())
            .unwrap();

        assert_eq!(
            report.path,
            [
                Phase::Start,
                Phase::Executing,
                Phase::DigressionCheck,
                Phase::Replanning,
                Phase::Executing,
                Phase::DigressionCheck,
                Phase::PolicyCheck,
                Phase::ToolExecution,
                Phase::PolicyCheck,
                Phase::Responding,
            ]
        );
        match &report.outcome {
            TurnOutcome::Completed { tool_result, .. } => {
                assert_eq!(tool_result.as_ref().unwrap()["balance"], 42);
            }
            other => panic!("expected Completed, got {:?}", other),
        }
        assert_eq!(state.classification, Some(Classification::Digression));
        assert_eq!(*f.pay_calls.lock().unwrap(), 0);
        assert_eq!(*f.check_calls.lock().unwrap(), 1);
        let prompts = f.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("changed topic"));
    }

    #[test]
    fn clarifying_question_mid_collection_keeps_the_plan() {
        let f = classified_fixture();
        let mut state = classified_payment_state();

        f.engine.start_turn(&mut state, Some("send money".into()), &no_input()).unwrap();
        let plan_before = state.plan.clone().unwrap();

        let report = f.engine
            .start_turn(&mut state, Some("what is a sort code?".into()), &no_input())
            .unwrap();

        assert_eq!(
            report.path,
            [
                Phase::Start,
                Phase::Executing,
                Phase::DigressionCheck,
                Phase::CollectingInfo,
                Phase::Suspended,
            ]
        );
        match &report.outcome {
            TurnOutcome::AwaitingInput { missing, .. } => assert_eq!(missing, &["amount".to_string()]),
            other => panic!("expected AwaitingInput, got {:?}", other),
        }
        assert_eq!(state.classification, Some(Classification::Clarification));
        assert_eq!(state.plan.as_ref().unwrap().steps, plan_before.steps);

        let report = f.engine.start_turn(&mut state, Some("10 pounds".into()), &amount(10)).unwrap();
        assert!(matches!(report.outcome, TurnOutcome::Completed { .. }));
        assert_eq!(*f.pay_calls.lock().unwrap(), 1);
        assert_eq!(f.prompts.lock().unwrap().len(), 1, "no replan for a clarification");
    }

    #[test]
    fn cancelled_turn_dispatches_nothing_further() {
        let cancel = CancelToken::new();
        let (pay, pay_calls) = payment_tool();
        let token = cancel.clone();
        let (check, _) = tool("check_balance", move |_, _| {
            token.cancel();
            json!({ "status": "success", "balance": 50 })
        });
        let plan = r#"{"steps": [{"id": "bal", "action": "check_balance"}, {"id": "pay", "action": "make_payment"}]}"#;
        let f = fixture(&[plan], vec![pay, check], 100.0, EngineSettings::default());
        let mut state = payment_state();

        let report = f.engine.start_turn_with(&mut state, None, &amount(10), &cancel).unwrap();

        match &report.outcome {
            TurnOutcome::Aborted { reason, .. } => assert!(reason.contains("cancelled"), "{reason}"),
            other => panic!("expected Aborted, got {:?}", other),
        }
        assert_eq!(state.abort, Some(AbortReason::Cancelled));
        assert_eq!(*pay_calls.lock().unwrap(), 0);
        assert_eq!(state.trace.len(), 1);
        assert_eq!(*f.trace.finalized.lock().unwrap(), 1);
    }

    #[test]
    fn iteration_ceiling_aborts_the_turn() {
        let (pay, pay_calls) = payment_tool();
        let settings = EngineSettings { max_iterations: 3, ..Default::default() };
        let f = fixture(&[PAY_PLAN], vec![pay], 100.0, settings);
        let mut state = payment_state();

        let report = f.engine.start_turn(&mut state, None, &amount(10)).unwrap();

        match &report.outcome {
            TurnOutcome::Aborted { reason, .. } => assert!(reason.contains("iteration ceiling of 3")),
            other => panic!("expected Aborted, got {:?}", other),
        }
        assert_eq!(report.iterations, 4);
        assert_eq!(report.path.len(), 4);
        assert_eq!(report.final_phase(), Some(Phase::Aborted));
        assert_eq!(*pay_calls.lock().unwrap(), 0);
        assert!(state.plan.as_ref().unwrap().is_terminal());
    }

    #[test]
    fn slot_round_bound_aborts() {
        let settings = EngineSettings { max_slot_rounds: 0, ..Default::default() };
        let f = fixture(&[PAY_PLAN], vec![], 100.0, settings);
        let mut state = payment_state();

        let report = f.engine.start_turn(&mut state, None, &no_input()).unwrap();

        match &report.outcome {
            TurnOutcome::Aborted { reason, .. } => assert!(reason.contains("amount"), "{reason}"),
            other => panic!("expected Aborted, got {:?}", other),
        }
        assert!(matches!(state.abort, Some(AbortReason::SlotRoundsExhausted { rounds: 1, .. })));
    }

    #[test]
    fn generator_failure_escapes_the_turn() {
        let engine = Engine::new(
            Arc::new(FailingGenerator),
            Dispatcher::new(Arc::new(ToolRegistry::new())),
            Arc::new(ThresholdPolicy {
                max: 0.0,
                calls: Arc::default(),
                seen: Arc::default(),
            }),
            Arc::new(MemoryTrace::default()),
            EngineSettings::default(),
        );
        let mut state = payment_state();

        match engine.start_turn(&mut state, None, &no_input()) {
            Err(WaypointError::GenerationFailed { .. }) => {}
            other => panic!("expected GenerationFailed, got {:?}", other.map(|r| r.outcome)),
        }
    }

    #[test]
    fn trace_sink_failure_is_fatal() {
        let (generator, _) = ScriptedGenerator::new(&[PAY_PLAN]);
        let (pay, _) = payment_tool();
        let mut registry = ToolRegistry::new();
        registry.register(pay);
        let engine = Engine::new(
            generator,
            Dispatcher::new(Arc::new(registry)),
            Arc::new(ThresholdPolicy { max: 100.0, calls: Arc::default(), seen: Arc::default() }),
            Arc::new(MemoryTrace { broken: true, ..Default::default() }),
            EngineSettings::default(),
        );
        let mut state = payment_state();

        match engine.start_turn(&mut state, None, &amount(10)) {
            Err(WaypointError::TraceWriteFailed { .. }) => {}
            other => panic!("expected TraceWriteFailed, got {:?}", other.map(|r| r.outcome)),
        }
    }

    #[test]
    fn engine_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
    }
}

//! Scenario 4: Replan Limit
//!
//! The planner insists on an approved `make_payment` of 5000 GBP. Policy
//! allows it, but the tool refuses anything above its 1000 authorization
//! limit. Each failure triggers a replan that produces the same plan; after
//! the third replan the fourth is refused, the plan is replaced by an empty
//! terminal plan and the user is told the request could not be completed.

use std::sync::Arc;

use waypoint_contracts::error::WaypointResult;
use waypoint_core::TurnOutcome;

use crate::{extract::MessageSlotExtractor, generator::ScriptedGenerator, runtime::AgentRuntime};

use super::{print_path, print_trace};

pub const MESSAGE: &str = "pay 5000 GBP to account 12345678 sort 12-34-56";

/// The planner's only answer, repeated for every replan.
pub const STUBBORN_PLAN: &str = r#"{"goal": "Make a payment to a payee", "steps": [
    {"id": "s1", "action": "make_payment", "params": {"approved": true}},
    {"id": "s2", "action": "confirm_transaction", "params": {}}
]}"#;

/// Run Scenario 4: Replan Limit.
pub fn run_scenario() -> WaypointResult<()> {
    println!("=== Scenario 4: Replan Limit ===");
    println!();

    let generator = Arc::new(ScriptedGenerator::new(&[STUBBORN_PLAN]));
    let runtime = AgentRuntime::payments_with(generator.clone())?;
    let input = MessageSlotExtractor::new()?;
    let mut state = runtime.new_state(None)?;

    println!("  User:         {MESSAGE}");
    println!("  Max replans:  {}", runtime.config().engine.max_replans);
    let report = runtime.run(&mut state, MESSAGE, &input)?;

    match &report.outcome {
        TurnOutcome::Aborted { reason, response } => {
            println!("  Abort reason: {reason}");
            println!("  Agent:        {response}");
        }
        other => println!("  Unexpected outcome: {other:?}"),
    }
    print_path(&report);
    print_trace(&state, runtime.trace());
    println!("  Generator calls: {}", generator.calls());
    println!(
        "  Final plan:   {} step(s), terminal = {}",
        state.plan.as_ref().map(|p| p.steps.len()).unwrap_or(0),
        state.plan.as_ref().map(|p| p.is_terminal()).unwrap_or(false)
    );

    println!();
    println!("  Scenario 4 complete.");
    println!();
    Ok(())
}

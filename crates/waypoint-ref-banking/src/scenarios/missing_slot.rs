//! Scenario 3: Missing Slot
//!
//! The first message names the payee but no amount. The turn halts in
//! `CollectingInfo` and asks for the amount without touching the policy
//! executor or any tool. The second message supplies it and the suspended
//! plan resumes without replanning.

use waypoint_contracts::error::WaypointResult;
use waypoint_core::TurnOutcome;

use crate::{extract::MessageSlotExtractor, runtime::AgentRuntime};

use super::{print_path, print_trace};

pub const FIRST: &str = "send money to account 12345678 sort 12-34-56";
pub const SECOND: &str = "£25 please";

/// Run Scenario 3: Missing Slot.
pub fn run_scenario() -> WaypointResult<()> {
    println!("=== Scenario 3: Missing Slot ===");
    println!();

    let runtime = AgentRuntime::payments()?;
    let input = MessageSlotExtractor::new()?;
    let mut state = runtime.new_state(None)?;

    // ── Turn 1: amount missing ───────────────────────────────────────────────

    println!("  User:         {FIRST}");
    let report = runtime.run(&mut state, FIRST, &input)?;
    match &report.outcome {
        TurnOutcome::AwaitingInput { missing, prompt } => {
            println!("  Agent:        {prompt}");
            println!("  Missing:      {}", missing.join(", "));
        }
        other => println!("  Unexpected outcome: {other:?}"),
    }
    print_path(&report);
    println!();

    // ── Turn 2: amount supplied, plan resumes ────────────────────────────────

    println!("  User:         {SECOND}");
    let report = runtime.run(&mut state, SECOND, &input)?;
    match &report.outcome {
        TurnOutcome::Completed { response, .. } => println!("  Agent:        {response}"),
        other => println!("  Unexpected outcome: {other:?}"),
    }
    print_path(&report);
    print_trace(&state, runtime.trace());

    println!();
    println!("  Scenario 3 complete.");
    println!();
    Ok(())
}

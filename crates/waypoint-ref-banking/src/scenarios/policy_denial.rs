//! Scenario 2: Policy Denial
//!
//! A payment of 1500 GBP breaches the `create-payment-2fa` rule
//! (`max_without_2fa = 100`). The policy executor denies the call, the turn
//! ends with a rejection naming the threshold, and no tool runs.

use waypoint_contracts::error::WaypointResult;
use waypoint_core::{Phase, TurnOutcome};

use crate::{extract::MessageSlotExtractor, runtime::AgentRuntime};

use super::print_path;

pub const MESSAGE: &str = "pay 1500 GBP to account 12345678 sort 12-34-56";

/// Run Scenario 2: Policy Denial.
pub fn run_scenario() -> WaypointResult<()> {
    println!("=== Scenario 2: Policy Denial ===");
    println!();

    let runtime = AgentRuntime::payments()?;
    let input = MessageSlotExtractor::new()?;
    let mut state = runtime.new_state(None)?;

    println!("  User:         {MESSAGE}");
    let report = runtime.run(&mut state, MESSAGE, &input)?;

    match &report.outcome {
        TurnOutcome::Rejected { rule_id, reason } => {
            println!("  Policy verdict: DENY by {rule_id}");
            println!("  Agent:        Request rejected: {reason}");
        }
        other => println!("  Unexpected outcome: {other:?}"),
    }
    print_path(&report);
    println!(
        "  Tool calls:   {} (dispatcher {})",
        state.trace.len(),
        if report.path.contains(&Phase::ToolExecution) { "reached" } else { "never reached" }
    );

    println!();
    println!("  Scenario 2 complete.");
    println!();
    Ok(())
}

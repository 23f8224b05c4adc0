//! Scenario 5: Digression
//!
//! Halfway through a payment request the user asks for their balance
//! instead. The digression detector classifies the message once, the
//! payment plan and collected slots are discarded, and the replanner builds
//! a plan for the new request.

use waypoint_contracts::error::WaypointResult;
use waypoint_core::TurnOutcome;

use crate::{extract::MessageSlotExtractor, runtime::AgentRuntime};

use super::{print_path, print_trace};

pub const MESSAGE: &str =
    "Pay 20 GBP to account 12345678 sort 12-34-56. Actually, what's my balance?";

/// Run Scenario 5: Digression.
pub fn run_scenario() -> WaypointResult<()> {
    println!("=== Scenario 5: Digression ===");
    println!();

    let runtime = AgentRuntime::payments()?;
    let input = MessageSlotExtractor::new()?;
    let mut state = runtime.new_state(None)?;

    println!("  User:         {MESSAGE}");
    let report = runtime.run(&mut state, MESSAGE, &input)?;

    println!(
        "  Classified:   {}",
        state
            .classification
            .map(|c| format!("{c:?}"))
            .unwrap_or_else(|| "not classified".to_string())
    );
    match &report.outcome {
        TurnOutcome::Completed { response, tool_result } => {
            println!("  Agent:        {response}");
            if let Some(balance) = tool_result.as_ref().and_then(|r| r.get("balance")) {
                println!("  Balance:      {balance}");
            }
        }
        other => println!("  Unexpected outcome: {other:?}"),
    }
    print_path(&report);
    print_trace(&state, runtime.trace());

    println!();
    println!("  Scenario 5 complete.");
    println!();
    Ok(())
}

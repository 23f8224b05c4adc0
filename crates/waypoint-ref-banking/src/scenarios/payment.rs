//! Scenario 1: Payment
//!
//! The user supplies every required slot in one message. The engine plans,
//! extracts the slots, passes the policy check and dispatches a single
//! `create_payment`, which returns a generated payment id.
//!
//!   Start → Planning → Executing → CollectingInfo → Executing
//!         → DigressionCheck → PolicyCheck → ToolExecution → PolicyCheck
//!         → Responding

use waypoint_contracts::error::WaypointResult;
use waypoint_core::TurnOutcome;

use crate::{extract::MessageSlotExtractor, runtime::AgentRuntime};

use super::{print_path, print_trace};

pub const MESSAGE: &str = "pay 10 GBP to account 12345678 sort 12-34-56";

/// Run Scenario 1: Payment.
pub fn run_scenario() -> WaypointResult<()> {
    println!("=== Scenario 1: Payment ===");
    println!();

    let runtime = AgentRuntime::payments()?;
    let input = MessageSlotExtractor::new()?;
    let mut state = runtime.new_state(None)?;

    println!("  User:         {MESSAGE}");
    let report = runtime.run(&mut state, MESSAGE, &input)?;

    match &report.outcome {
        TurnOutcome::Completed { response, .. } => println!("  Agent:        {response}"),
        other => println!("  Unexpected outcome: {other:?}"),
    }
    print_path(&report);
    print_trace(&state, runtime.trace());

    println!();
    println!("  Scenario 1 complete.");
    println!();
    Ok(())
}

//! Banking reference runtime demo scenarios.
//!
//! Each scenario wires the payments agent with mock collaborators and walks
//! one path through the state machine, printing what happened.

pub mod digression;
pub mod missing_slot;
pub mod payment;
pub mod policy_denial;
pub mod replan_limit;
pub mod sessions;

use waypoint_audit::InMemoryTraceWriter;
use waypoint_contracts::state::AgentState;
use waypoint_core::TurnReport;

/// Print the phase path of a turn on one line.
pub(crate) fn print_path(report: &TurnReport) {
    let path: Vec<&str> = report.path.iter().map(|p| p.as_str()).collect();
    println!("  Phases ({}):  {}", report.iterations, path.join(" → "));
}

/// Print the trace of a turn and whether its hash chain verifies.
pub(crate) fn print_trace(state: &AgentState, trace: &InMemoryTraceWriter) {
    for record in &state.trace {
        let reason = record
            .result
            .as_ref()
            .and_then(|r| r.get("reason"))
            .and_then(|v| v.as_str())
            .map(|r| format!(" ({r})"))
            .unwrap_or_default();
        println!(
            "  Trace:        {} {} → {} at depth {}{}",
            record.step_id,
            record.action,
            record.status.as_str(),
            record.replan_depth,
            reason
        );
    }

    let turn = state.turn_id.to_string();
    let events = trace.export_log(&turn).map(|log| log.events.len()).unwrap_or(0);
    println!(
        "  Trace chain:  {} ({} event(s))",
        if trace.verify_integrity(&turn) { "VERIFIED" } else { "FAILED" },
        events
    );
}

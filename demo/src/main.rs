//! waypoint Banking Reference Runtime — Demo CLI
//!
//! Runs one or all of the banking demo scenarios. Each scenario drives the
//! real goal engine (planner, slot filler, policy executor, dispatcher,
//! monitor) against mock banking tools and a mock planning LLM.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- payment
//!   cargo run -p demo -- policy-denial
//!   cargo run -p demo -- missing-slot
//!   cargo run -p demo -- replan-limit
//!   cargo run -p demo -- digression
//!   cargo run -p demo -- sessions

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use waypoint_contracts::error::WaypointResult;
use waypoint_ref_banking::scenarios::{
    digression, missing_slot, payment, policy_denial, replan_limit, sessions,
};

// ── CLI definition ────────────────────────────────────────────────────────────

/// waypoint — goal-driven agent runtime banking demo.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "waypoint banking reference runtime demo",
    long_about = "Runs waypoint banking scenarios showing planning, slot collection,\n\
                  policy enforcement, bounded replanning and digression handling."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every scenario in sequence.
    RunAll,
    /// Scenario 1: payment with every slot supplied.
    Payment,
    /// Scenario 2: payment above the 2FA threshold is denied.
    PolicyDenial,
    /// Scenario 3: missing amount suspends the turn, next message resumes it.
    MissingSlot,
    /// Scenario 4: a failing tool exhausts the replan limit.
    ReplanLimit,
    /// Scenario 5: the user changes topic mid-request.
    Digression,
    /// Scenario 6: concurrent sessions through the service surface.
    Sessions,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    debug!(command = ?cli.command, "demo starting");

    print_banner();

    let result = match cli.command {
        Command::RunAll => run_all(),
        Command::Payment => payment::run_scenario(),
        Command::PolicyDenial => policy_denial::run_scenario(),
        Command::MissingSlot => missing_slot::run_scenario(),
        Command::ReplanLimit => replan_limit::run_scenario(),
        Command::Digression => digression::run_scenario(),
        Command::Sessions => sessions::run_scenario(),
    };

    match result {
        Ok(()) => {
            println!("All selected scenarios completed successfully.");
        }
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

// ── Scenario dispatch ─────────────────────────────────────────────────────────

fn run_all() -> WaypointResult<()> {
    payment::run_scenario()?;
    policy_denial::run_scenario()?;
    missing_slot::run_scenario()?;
    replan_limit::run_scenario()?;
    digression::run_scenario()?;
    sessions::run_scenario()?;
    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("waypoint — Goal-execution State Machine");
    println!("Banking Reference Demo");
    println!("=======================================");
    println!();
    println!("Per turn the engine walks the transition table:");
    println!("  [1] Planning: the planner asks the LLM for a plan (3-tier parse, never empty)");
    println!("  [2] Slot collection: missing required slots suspend the turn");
    println!("  [3] Digression check: a change of topic discards the plan and replans");
    println!("  [4] Policy check: a denied call ends the turn, nothing is dispatched");
    println!("  [5] Tool execution: failures trigger bounded replanning (max 3)");
    println!("  [6] Every attempt is traced into a SHA-256 hash chain");
    println!();
}

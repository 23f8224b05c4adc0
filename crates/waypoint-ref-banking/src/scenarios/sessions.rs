//! Scenario 6: Concurrent Sessions
//!
//! Three sessions talk to the same agent through the service surface at
//! the same time. Each turn runs on its own blocking task; one session
//! needs two messages because the first lacks an amount.

use std::sync::Arc;

use waypoint_contracts::error::{WaypointError, WaypointResult};

use crate::{
    extract::MessageSlotExtractor,
    runtime::AgentRuntime,
    service::{status_code, AgentService, Reply},
    store::{InMemorySessionStore, SessionStore},
};

/// Run Scenario 6: Concurrent Sessions.
pub fn run_scenario() -> WaypointResult<()> {
    println!("=== Scenario 6: Concurrent Sessions ===");
    println!();

    let rt = tokio::runtime::Runtime::new().map_err(|e| WaypointError::ConfigError {
        reason: format!("failed to start async runtime: {e}"),
    })?;
    rt.block_on(run())?;

    println!();
    println!("  Scenario 6 complete.");
    println!();
    Ok(())
}

async fn run() -> WaypointResult<()> {
    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let mut service = AgentService::new(store, MessageSlotExtractor::new()?);
    service.register(AgentRuntime::payments()?);
    let service = Arc::new(service);

    let alice = service.start_session("payments-agent", None).await?.to_string();
    let bob = service.start_session("payments-agent", Some("balance")).await?.to_string();
    let carol = service.start_session("payments-agent", Some("statement")).await?.to_string();

    let (a, b, c) = tokio::join!(
        service.post_message(&alice, "send money to account 12345678 sort 12-34-56"),
        service.post_message(&bob, "what's my balance?"),
        service.post_message(&carol, "latest statement please"),
    );
    print_reply("alice", &a?);
    print_reply("bob", &b?);
    print_reply("carol", &c?);

    let a = service.post_message(&alice, "£30").await?;
    print_reply("alice", &a);
    println!("  alice history: {} message(s)", service.history(&alice).await?.len());

    // Unknown sessions are reported, not created.
    let unknown = uuid::Uuid::new_v4().to_string();
    if let Err(e) = service.post_message(&unknown, "hello").await {
        println!("  unknown session → {} {e}", status_code(&e));
    }

    for id in [&alice, &bob, &carol] {
        service.end_session(id).await?;
    }
    println!("  open sessions after cleanup: {}", service.store().len().await);
    Ok(())
}

fn print_reply(who: &str, reply: &Reply) {
    let kind = match reply {
        Reply::Final { .. } => "final",
        Reply::NeedsInput { .. } => "needs_input",
        Reply::Error { .. } => "error",
    };
    println!("  {who:<6} [{} {kind}] {}", reply.status_code(), reply.message());
}

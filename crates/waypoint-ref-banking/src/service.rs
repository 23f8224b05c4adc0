//! The service surface: start a session, post messages, read history.
//!
//! Transport-free. An HTTP layer maps `Reply` and `WaypointError` onto
//! responses with `Reply::status_code` and `status_code`.
//!
//! Each turn runs on its own blocking task under a timeout, so a slow
//! collaborator never stalls other sessions. A turn that times out or fails
//! is not committed: the session keeps the state of its last completed turn.
//! A timed-out turn is cancelled and the session stays locked until it has
//! stopped, so it cannot dispatch a tool behind the next message.
//!
//! A journey that finished (completed, rejected or aborted) drops its state.
//! The next message starts a fresh journey and collects its slots again.

use std::{collections::HashMap, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use waypoint_contracts::{
    error::{WaypointError, WaypointResult},
    plan::Params,
    session::{Message, Session, SessionId},
};
use waypoint_core::{config::resolve_goal, CancelToken, TurnOutcome};

use crate::{extract::MessageSlotExtractor, runtime::AgentRuntime, store::SessionStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Upper bound on one turn, collaborator and tool calls included.
    pub turn_timeout: Duration,
    /// Consecutive `needs_input` replies a session may give before its
    /// journey is abandoned.
    pub max_input_turns: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            turn_timeout: Duration::from_secs(30),
            max_input_turns: 5,
        }
    }
}

/// What the caller gets back for a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    /// The goal was carried out.
    Final {
        session_id: String,
        message: String,
        tool_result: Option<Params>,
        /// Step attempts recorded for the turn.
        steps: usize,
    },
    /// More information is needed before anything runs.
    NeedsInput {
        session_id: String,
        message: String,
        missing: Vec<String>,
    },
    /// The turn ended without carrying out the goal.
    Error {
        session_id: String,
        /// `policy_denied` or `aborted`.
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        rule_id: Option<String>,
    },
}

impl Reply {
    /// The turn was processed; the outcome is in the body.
    pub fn status_code(&self) -> u16 {
        200
    }

    pub fn message(&self) -> &str {
        match self {
            Reply::Final { message, .. }
            | Reply::NeedsInput { message, .. }
            | Reply::Error { message, .. } => message,
        }
    }
}

/// Response code for an error that escaped a request.
pub fn status_code(err: &WaypointError) -> u16 {
    match err {
        WaypointError::SessionNotFound { .. } | WaypointError::UnknownAgent { .. } => 404,
        WaypointError::Validation { .. }
        | WaypointError::UnknownGoal { .. }
        | WaypointError::SlotCollectionExhausted { .. } => 422,
        WaypointError::TurnTimedOut { .. } => 504,
        WaypointError::ConfigError { .. }
        | WaypointError::GenerationFailed { .. }
        | WaypointError::ToolFailed { .. }
        | WaypointError::TraceWriteFailed { .. }
        | WaypointError::StateMachineError { .. } => 500,
    }
}

// ── AgentService ─────────────────────────────────────────────────────────────

pub struct AgentService {
    agents: HashMap<String, Arc<AgentRuntime>>,
    store: Arc<dyn SessionStore>,
    input: Arc<MessageSlotExtractor>,
    settings: ServiceSettings,
}

impl AgentService {
    pub fn new(store: Arc<dyn SessionStore>, input: MessageSlotExtractor) -> Self {
        Self {
            agents: HashMap::new(),
            store,
            input: Arc::new(input),
            settings: ServiceSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ServiceSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Serve `runtime` under its agent id.
    pub fn register(&mut self, runtime: AgentRuntime) -> &mut Self {
        self.agents
            .insert(runtime.agent_id().to_string(), Arc::new(runtime));
        self
    }

    pub fn runtime(&self, agent_id: &str) -> Option<&Arc<AgentRuntime>> {
        self.agents.get(agent_id)
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Open a session for `agent_id` working on `goal_id` (or the agent's default goal).
    pub async fn start_session(&self, agent_id: &str, goal_id: Option<&str>) -> WaypointResult<SessionId> {
        let runtime = self.agent(agent_id)?;
        let (goal_id, _) = resolve_goal(runtime.config(), goal_id)?;
        let id = self.store.create(Session::new(agent_id, goal_id)).await;
        info!(session_id = %id, agent_id, goal_id, "session started");
        Ok(id)
    }

    /// Run one turn for `text` and commit it to the session.
    ///
    /// # Errors
    ///
    /// `Validation` for a malformed id or empty text, `SessionNotFound`,
    /// `TurnTimedOut`, `SlotCollectionExhausted`, or whatever the turn
    /// itself could not absorb.
    pub async fn post_message(&self, session_id: &str, text: &str) -> WaypointResult<Reply> {
        let id = SessionId::parse(session_id)?;
        if text.trim().is_empty() {
            return Err(WaypointError::Validation {
                reason: "message text must not be empty".to_string(),
            });
        }
        let entry = self.store.entry(&id).await.ok_or_else(|| not_found(&id))?;

        // Held for the whole turn: messages to one session run one at a time.
        let mut session = entry.lock_owned().await;
        let runtime = Arc::clone(self.agent(&session.agent_id)?);

        let mut state = match session.state.clone() {
            Some(state) => state,
            None => runtime.new_state(Some(&session.goal_id))?,
        };

        let input = Arc::clone(&self.input);
        let message = text.to_string();
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let mut task = tokio::task::spawn_blocking(move || {
            let report = runtime.run_with(&mut state, &message, input.as_ref(), &token)?;
            Ok::<_, WaypointError>((state, report))
        });

        let timeout_ms = self.settings.turn_timeout.as_millis() as u64;
        let (state, report) = match tokio::time::timeout(self.settings.turn_timeout, &mut task).await {
            Err(_) => {
                warn!(session_id = %id, timeout_ms, "turn timed out, cancelling in-flight turn");
                cancel.cancel();
                // The session stays locked until the abandoned turn has stopped.
                tokio::spawn(async move {
                    let _ = task.await;
                    drop(session);
                });
                return Err(WaypointError::TurnTimedOut { timeout_ms });
            }
            Ok(Err(join)) => {
                return Err(WaypointError::StateMachineError {
                    reason: format!("turn task failed: {join}"),
                })
            }
            Ok(Ok(turn)) => turn?,
        };

        session.messages.push(Message::user(text));
        let sid = id.to_string();
        let reply = match report.outcome {
            TurnOutcome::Completed { response, tool_result } => {
                session.state = None;
                session.pending_input_turns = 0;
                Reply::Final {
                    session_id: sid,
                    message: response,
                    tool_result,
                    steps: state.trace.len(),
                }
            }
            TurnOutcome::AwaitingInput { missing, prompt } => {
                session.pending_input_turns += 1;
                if session.pending_input_turns > self.settings.max_input_turns {
                    let turns = session.pending_input_turns;
                    warn!(session_id = %id, turns, missing = ?missing, "slot collection abandoned");
                    session.state = None;
                    session.pending_input_turns = 0;
                    return Err(WaypointError::SlotCollectionExhausted { turns, missing });
                }
                session.state = Some(state);
                Reply::NeedsInput {
                    session_id: sid,
                    message: prompt,
                    missing,
                }
            }
            TurnOutcome::Rejected { rule_id, reason } => {
                session.state = None;
                session.pending_input_turns = 0;
                Reply::Error {
                    session_id: sid,
                    code: "policy_denied".to_string(),
                    message: format!("Request rejected: {reason}"),
                    rule_id: Some(rule_id),
                }
            }
            TurnOutcome::Aborted { response, .. } => {
                session.state = None;
                session.pending_input_turns = 0;
                Reply::Error {
                    session_id: sid,
                    code: "aborted".to_string(),
                    message: response,
                    rule_id: None,
                }
            }
        };
        session.messages.push(Message::assistant(reply.message()));
        Ok(reply)
    }

    /// The session's message history, oldest first.
    pub async fn history(&self, session_id: &str) -> WaypointResult<Vec<Message>> {
        let id = SessionId::parse(session_id)?;
        self.store
            .get(&id)
            .await
            .map(|session| session.messages)
            .ok_or_else(|| not_found(&id))
    }

    pub async fn end_session(&self, session_id: &str) -> WaypointResult<()> {
        let id = SessionId::parse(session_id)?;
        if self.store.delete(&id).await {
            info!(session_id = %id, "session ended");
            Ok(())
        } else {
            Err(not_found(&id))
        }
    }

    fn agent(&self, agent_id: &str) -> WaypointResult<&Arc<AgentRuntime>> {
        self.agents.get(agent_id).ok_or_else(|| WaypointError::UnknownAgent {
            agent_id: agent_id.to_string(),
        })
    }
}

fn not_found(id: &SessionId) -> WaypointError {
    WaypointError::SessionNotFound {
        session_id: id.to_string(),
    }
}

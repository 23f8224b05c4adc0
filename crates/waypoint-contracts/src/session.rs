//! Conversation sessions kept by the hosting service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{WaypointError, WaypointResult},
    state::AgentState,
};

/// Unique identifier of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse a session id received from a caller.
    pub fn parse(s: &str) -> WaypointResult<Self> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| WaypointError::Validation {
                reason: format!("malformed session id '{s}': {e}"),
            })
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of a session's message history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, text: text.into() }
    }
}

/// A conversation between one user and one agent.
///
/// Created on first contact and updated after every completed turn. Never
/// deleted implicitly; lifecycle is managed by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub agent_id: String,
    pub goal_id: String,
    pub messages: Vec<Message>,
    /// State of the last turn, kept only while it waits for missing input.
    pub state: Option<AgentState>,
    /// Consecutive turns that ended waiting for input.
    pub pending_input_turns: u32,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(agent_id: impl Into<String>, goal_id: impl Into<String>) -> Self {
        Self {
            id: SessionId::new(),
            agent_id: agent_id.into(),
            goal_id: goal_id.into(),
            messages: Vec::new(),
            state: None,
            pending_input_turns: 0,
            created_at: Utc::now(),
        }
    }
}

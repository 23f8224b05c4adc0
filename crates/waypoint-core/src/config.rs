//! Agent configuration loading.
//!
//! An agent is described by one TOML document naming its LLM provider,
//! prompt templates, tools, policy documents, goals and engine bounds.
//! Loading validates the document; every failure is a `ConfigError`.

use std::{collections::HashSet, path::Path};

use tracing::debug;

use waypoint_contracts::{
    error::{WaypointError, WaypointResult},
    goal::{AgentConfig, GoalConfig},
};

/// Parse and validate an agent configuration document.
///
/// Duplicate required slots are collapsed, keeping the first occurrence.
pub fn load_agent_config(s: &str) -> WaypointResult<AgentConfig> {
    let mut config: AgentConfig = toml::from_str(s).map_err(|e| WaypointError::ConfigError {
        reason: format!("failed to parse agent TOML: {}", e),
    })?;

    for goal in config.goals.values_mut() {
        let mut seen = HashSet::new();
        goal.required_slots.retain(|slot| seen.insert(slot.clone()));
    }

    validate(&config)?;
    debug!(agent_id = %config.id, goals = config.goals.len(), "agent configuration loaded");
    Ok(config)
}

/// Read the file at `path` and load it as an agent configuration.
pub fn load_agent_config_file(path: &Path) -> WaypointResult<AgentConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| WaypointError::ConfigError {
        reason: format!("failed to read agent file '{}': {}", path.display(), e),
    })?;
    load_agent_config(&contents)
}

/// Pick the goal a session works on: the requested one, else the agent's
/// `default_goal`, else the only goal when there is exactly one.
pub fn resolve_goal<'a>(
    config: &'a AgentConfig,
    goal_id: Option<&str>,
) -> WaypointResult<(&'a str, &'a GoalConfig)> {
    let wanted = match goal_id.or(config.default_goal.as_deref()) {
        Some(id) => id,
        None if config.goals.len() == 1 => {
            return config
                .goals
                .iter()
                .next()
                .map(|(id, goal)| (id.as_str(), goal))
                .ok_or_else(|| WaypointError::UnknownGoal { goal_id: String::new() });
        }
        None => {
            return Err(WaypointError::Validation {
                reason: format!(
                    "agent '{}' declares several goals and no default; a goal id is required",
                    config.id
                ),
            })
        }
    };

    config
        .goals
        .get_key_value(wanted)
        .map(|(id, goal)| (id.as_str(), goal))
        .ok_or_else(|| WaypointError::UnknownGoal { goal_id: wanted.to_string() })
}

fn validate(config: &AgentConfig) -> WaypointResult<()> {
    let fail = |reason: String| Err(WaypointError::ConfigError { reason });

    if config.id.trim().is_empty() {
        return fail("agent id must not be empty".to_string());
    }
    if config.llm.provider.trim().is_empty() {
        return fail(format!("agent '{}': llm.provider must not be empty", config.id));
    }
    if config.goals.is_empty() {
        return fail(format!("agent '{}' declares no goals", config.id));
    }
    for (goal_id, goal) in &config.goals {
        if goal.description.trim().is_empty() {
            return fail(format!("goal '{goal_id}' has an empty description"));
        }
        if goal.required_slots.iter().any(|s| s.trim().is_empty()) {
            return fail(format!("goal '{goal_id}' has an empty slot name"));
        }
    }
    if let Some(default) = &config.default_goal {
        if !config.goals.contains_key(default) {
            return fail(format!("default_goal '{default}' is not a declared goal"));
        }
    }
    if config.engine.max_iterations == 0 {
        return fail("engine.max_iterations must be at least 1".to_string());
    }
    Ok(())
}

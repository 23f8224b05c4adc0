//! Mock text-generation collaborators.
//!
//! `BankingGenerator` stands in for an LLM: it reads the prompt, recognises
//! which kind of request it is (plan, revised plan, classification) and
//! answers deterministically. `ScriptedGenerator` replays canned replies.

use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
};

use serde_json::{json, Value};

use waypoint_contracts::error::{WaypointError, WaypointResult};
use waypoint_core::traits::TextGenerator;

/// Words in a user message that pull the conversation away from a payment.
const OFF_TOPIC_WORDS: &[&str] = &["balance", "statement", "weather", "joke", "forget it"];

const CLARIFYING_PHRASES: &[&str] = &["what do you mean", "why do you need", "what is a sort code"];

// ── BankingGenerator ─────────────────────────────────────────────────────────

/// Keyword-driven stand-in for the planning LLM.
///
/// Planning prompts are answered from the `Goal:` line, revision prompts
/// for a topic change from the user's new request, and classifier prompts
/// from the quoted user message. Payment plans come wrapped in chatter the
/// way a real model tends to answer.
#[derive(Debug, Default, Clone, Copy)]
pub struct BankingGenerator;

impl BankingGenerator {
    pub fn new() -> Self {
        Self
    }

    fn classify(prompt: &str) -> &'static str {
        let message = quoted_user_message(prompt).to_lowercase();
        if CLARIFYING_PHRASES.iter().any(|p| message.contains(p)) {
            "CLARIFICATION"
        } else if OFF_TOPIC_WORDS.iter().any(|w| message.contains(w)) {
            "DIGRESSION"
        } else {
            "ON_TOPIC"
        }
    }

    fn plan_for(topic: &str) -> String {
        let topic = topic.to_lowercase();
        if topic.contains("balance") {
            plan_json("Check the account balance", &[("check_balance", json!({}))])
        } else if topic.contains("statement") {
            plan_json(
                "Get the latest account statement",
                &[("get_statement", json!({ "months": 1 }))],
            )
        } else if topic.contains("payment") || topic.contains("pay ") || topic.contains("send") {
            let plan = plan_json("Make a payment to a payee", &[("create_payment", json!({}))]);
            format!("Sure! Here is the plan:\n{plan}\nLet me know if anything should change.")
        } else {
            plan_json("Acknowledge the request", &[("noop", json!({}))])
        }
    }
}

impl TextGenerator for BankingGenerator {
    fn generate(&self, prompt: &str) -> WaypointResult<String> {
        if prompt.contains("Classify only") {
            return Ok(Self::classify(prompt).to_string());
        }
        if let Some(topic) = line_value(prompt, "What went wrong:") {
            if topic.contains("changed topic") {
                return Ok(Self::plan_for(topic));
            }
        }
        let goal = line_value(prompt, "Goal:").unwrap_or(prompt);
        Ok(Self::plan_for(goal))
    }
}

fn plan_json(goal: &str, steps: &[(&str, Value)]) -> String {
    let steps: Vec<Value> = steps
        .iter()
        .enumerate()
        .map(|(i, (action, params))| {
            json!({ "id": format!("s{}", i + 1), "action": action, "params": params })
        })
        .collect();
    json!({ "goal": goal, "steps": steps }).to_string()
}

/// The rest of the first line starting with `label`.
fn line_value<'a>(prompt: &'a str, label: &str) -> Option<&'a str> {
    prompt
        .lines()
        .find_map(|line| line.trim_start().strip_prefix(label))
        .map(str::trim)
}

fn quoted_user_message(prompt: &str) -> &str {
    line_value(prompt, "User message:")
        .map(|m| m.trim_matches('"'))
        .unwrap_or("")
}

// ── ScriptedGenerator ────────────────────────────────────────────────────────

/// Replies from a fixed script and records every prompt it receives.
///
/// Once the script runs out the last reply is repeated. An empty script
/// fails every call with `GenerationFailed`.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            last: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Every prompt received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate(&self, prompt: &str) -> WaypointResult<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_string());

        let next = self.replies.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(reply) = next {
            *last = Some(reply);
        }
        last.clone().ok_or_else(|| WaypointError::GenerationFailed {
            reason: "script is empty".to_string(),
        })
    }
}

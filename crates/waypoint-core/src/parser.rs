//! Plan parser: raw collaborator text → structured `Plan`.
//!
//! Parsing is a three-stage pipeline and never fails:
//!
//!   Strict → Recovered (balanced object, then permissive literal) → Synthesized
//!
//! Whatever the input, the returned plan has at least one step. The tier that
//! produced it is returned alongside so callers can observe degraded output.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, info, warn};

use waypoint_contracts::plan::{Params, Plan, Step, META_PARSE_TIER, META_RAW, NOOP_ACTION};

/// Maximum length of a step id after sanitization.
pub const MAX_STEP_ID_LEN: usize = 50;

/// How a non-strict decode was recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// The first balanced `{…}` substring decoded as JSON.
    BalancedObject,
    /// The substring decoded only after literal normalization.
    Literal,
}

/// Why a placeholder plan had to be synthesized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisCause {
    /// Nothing in the text could be decoded as an object.
    Undecodable,
    /// An object was decoded but it carried no usable steps.
    EmptySteps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseTier {
    Strict,
    Recovered(Recovery),
    Synthesized(SynthesisCause),
}

impl ParseTier {
    pub fn label(&self) -> &'static str {
        match self {
            ParseTier::Strict => "strict",
            ParseTier::Recovered(Recovery::BalancedObject) => "recovered:balanced_object",
            ParseTier::Recovered(Recovery::Literal) => "recovered:literal",
            ParseTier::Synthesized(SynthesisCause::Undecodable) => "synthesized:undecodable",
            ParseTier::Synthesized(SynthesisCause::EmptySteps) => "synthesized:empty_steps",
        }
    }

    pub fn is_synthesized(&self) -> bool {
        matches!(self, ParseTier::Synthesized(_))
    }
}

/// A parsed plan together with the tier that produced it.
#[derive(Debug, Clone)]
pub struct ParsedPlan {
    pub plan: Plan,
    pub tier: ParseTier,
}

/// Parse raw collaborator output into a plan.
///
/// `fallback_goal` is used when the decoded object names no goal, and for
/// the synthesized plan when nothing decodes at all.
pub fn parse_plan(raw: &str, fallback_goal: &str) -> ParsedPlan {
    let (decoded, tier) = match decode(raw) {
        Some((object, tier)) => (Some(object), tier),
        None => (None, ParseTier::Synthesized(SynthesisCause::Undecodable)),
    };

    let (goal, steps) = match &decoded {
        Some(object) => (goal_of(object, fallback_goal), steps_of(object)),
        None => (fallback_goal.to_string(), Vec::new()),
    };

    let (steps, tier) = if steps.is_empty() {
        let tier = if tier.is_synthesized() {
            tier
        } else {
            ParseTier::Synthesized(SynthesisCause::EmptySteps)
        };
        (vec![Step::noop("step-1")], tier)
    } else {
        (steps, tier)
    };

    match tier {
        ParseTier::Strict => debug!(tier = tier.label(), steps = steps.len(), "plan decoded"),
        ParseTier::Recovered(_) => {
            info!(tier = tier.label(), steps = steps.len(), "plan recovered from loose output")
        }
        ParseTier::Synthesized(_) => warn!(
            tier = tier.label(),
            raw_len = raw.len(),
            "planner output unusable, synthesized noop plan"
        ),
    }

    let mut metadata = Params::new();
    metadata.insert(META_RAW.to_string(), Value::String(raw.to_string()));
    metadata.insert(
        META_PARSE_TIER.to_string(),
        Value::String(tier.label().to_string()),
    );

    ParsedPlan {
        plan: Plan { goal, steps, metadata },
        tier,
    }
}

// ── Decoding tiers ──────────────────────────────────────────────────────────

fn decode(raw: &str) -> Option<(Params, ParseTier)> {
    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(raw.trim()) {
        return Some((object, ParseTier::Strict));
    }

    let candidate = first_balanced_object(raw)?;

    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(candidate) {
        return Some((object, ParseTier::Recovered(Recovery::BalancedObject)));
    }

    let normalized = normalize_literal(candidate);
    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(&normalized) {
        return Some((object, ParseTier::Recovered(Recovery::Literal)));
    }

    None
}

/// Find the first `{…}` substring whose braces balance.
///
/// Braces inside single- or double-quoted strings are ignored, and a
/// backslash escapes the next character inside a string.
pub fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '"' | '\'' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Rewrite a literal-style object into JSON.
///
/// Handles single-quoted strings, the bare words `True`, `False` and `None`,
/// and trailing commas before `}` or `]`.
pub fn normalize_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' => {
                out.push('"');
                let mut escaped = false;
                for inner in chars.by_ref() {
                    if escaped {
                        // `\'` is not a JSON escape.
                        if inner != '\'' {
                            out.push('\\');
                        }
                        out.push(inner);
                        escaped = false;
                    } else if inner == '\\' {
                        escaped = true;
                    } else if inner == c {
                        break;
                    } else if inner == '"' {
                        out.push_str("\\\"");
                    } else {
                        out.push(inner);
                    }
                }
                out.push('"');
            }
            ',' => {
                let mut lookahead = chars.clone();
                let next = loop {
                    match lookahead.next() {
                        Some(w) if w.is_whitespace() => continue,
                        other => break other,
                    }
                };
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(',');
                }
            }
            c if c.is_ascii_alphabetic() => {
                let mut word = String::from(c);
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        word.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match word.as_str() {
                    "True" => out.push_str("true"),
                    "False" => out.push_str("false"),
                    "None" => out.push_str("null"),
                    _ => out.push_str(&word),
                }
            }
            _ => out.push(c),
        }
    }

    out
}

// ── Field extraction ────────────────────────────────────────────────────────

fn goal_of(object: &Params, fallback_goal: &str) -> String {
    match object.get("goal") {
        Some(Value::String(goal)) if !goal.trim().is_empty() => goal.clone(),
        Some(Value::Object(nested)) => nested
            .get("description")
            .and_then(Value::as_str)
            .filter(|d| !d.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| fallback_goal.to_string()),
        _ => fallback_goal.to_string(),
    }
}

fn steps_of(object: &Params) -> Vec<Step> {
    let Some(entries) = object.get("steps").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut used = HashSet::new();
    let mut steps = Vec::new();

    for entry in entries {
        let Some(fields) = entry.as_object() else {
            debug!("skipping non-object step entry");
            continue;
        };

        let position = steps.len() + 1;
        let id = unique_id(step_id(fields.get("id"), position), &mut used);

        let action = match fields.get("action") {
            Some(Value::String(a)) if !a.trim().is_empty() => a.trim().to_string(),
            _ => NOOP_ACTION.to_string(),
        };

        let params = match fields.get("params") {
            Some(Value::Object(p)) => p.clone(),
            _ => Params::new(),
        };

        steps.push(Step::new(id, action, params));
    }

    steps
}

fn step_id(raw: Option<&Value>, position: usize) -> String {
    let text = match raw {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    let sanitized = sanitize_id(&text);
    if sanitized.is_empty() {
        format!("step-{position}")
    } else {
        sanitized
    }
}

/// Make an id safe to use as a graph-node key: characters outside
/// `[A-Za-z0-9_-]` become `_`, and the result is capped at 50 characters.
///
/// An id consisting only of replaced characters counts as absent.
pub fn sanitize_id(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed
        .chars()
        .any(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return String::new();
    }
    trimmed
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEP_ID_LEN)
        .collect()
}

/// Return `candidate`, or `candidate-<n>` for the smallest `n >= 2` not yet used.
pub(crate) fn unique_id(candidate: String, used: &mut HashSet<String>) -> String {
    if used.insert(candidate.clone()) {
        return candidate;
    }
    let mut n = 2;
    loop {
        let next = format!("{candidate}-{n}");
        if used.insert(next.clone()) {
            return next;
        }
        n += 1;
    }
}

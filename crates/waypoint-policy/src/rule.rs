//! Policy rule types and configuration schema.
//!
//! A `PolicyConfig` is deserialized from TOML and holds an ordered list of
//! `PolicyRule`s. Each rule carries optional predicates over the parameters
//! of a proposed tool call. A rule never allows anything by itself: it can
//! only find a violation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use waypoint_contracts::{plan::Params, policy::ToolCall};

fn any_action() -> String {
    "*".to_string()
}

/// A single policy rule loaded from TOML.
///
/// Checks run in a fixed order: `max_amount`, `allowed_currencies`,
/// `requires_approval`, `max_without_2fa`. The first violated check is
/// reported.
///
/// Example in TOML:
/// ```toml
/// [[rules]]
/// id = "payment-limit"
/// applies_to = "make_payment"
/// max_amount = 1000
/// allowed_currencies = ["GBP", "EUR"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Stable identifier reported with every denial.
    pub id: String,

    #[serde(default)]
    pub description: String,

    /// The action this rule governs. `"*"` matches any action.
    #[serde(default = "any_action")]
    pub applies_to: String,

    /// Upper bound on `params.amount`. Only checked when an amount is present.
    #[serde(default)]
    pub max_amount: Option<f64>,

    /// Permitted values of `params.currency` (case-insensitive). Only checked
    /// when a currency is present.
    #[serde(default)]
    pub allowed_currencies: Option<Vec<String>>,

    /// When set, `params.approved` must be `true`.
    #[serde(default)]
    pub requires_approval: bool,

    /// Amounts above this need `params.two_factor_verified == true`.
    #[serde(default)]
    pub max_without_2fa: Option<f64>,
}

impl PolicyRule {
    pub fn applies(&self, action: &str) -> bool {
        self.applies_to == "*" || self.applies_to == action
    }

    /// Return the reason for the first violated check, if any.
    pub fn violation(&self, call: &ToolCall) -> Option<String> {
        let params = &call.params;
        let amount = params.get("amount").filter(|v| !v.is_null());
        let currency = params.get("currency").and_then(Value::as_str);

        if let (Some(max), Some(raw)) = (self.max_amount, amount) {
            match parse_amount(raw) {
                Some(value) if value > max => {
                    return Some(format!(
                        "Amount {} exceeds policy max of {}",
                        fmt_amount(value),
                        fmt_amount(max)
                    ))
                }
                Some(_) => {}
                None => return Some(format!("Amount {raw} is not a number")),
            }
        }

        if let (Some(allowed), Some(currency)) = (&self.allowed_currencies, currency) {
            if !allowed.iter().any(|c| c.eq_ignore_ascii_case(currency)) {
                return Some(format!(
                    "Currency {currency} not allowed for tool {}",
                    call.action
                ));
            }
        }

        if self.requires_approval && !flag(params, "approved") {
            return Some(format!("Approval required for {}", call.action));
        }

        if let (Some(threshold), Some(raw)) = (self.max_without_2fa, amount) {
            let over = parse_amount(raw).map_or(true, |value| value > threshold);
            if over && !flag(params, "two_factor_verified") {
                let threshold = fmt_amount(threshold);
                return Some(match currency {
                    Some(c) => format!("payments above {threshold} {} require 2FA", c.to_ascii_uppercase()),
                    None => format!("payments above {threshold} require 2FA"),
                });
            }
        }

        None
    }
}

/// Accept JSON numbers and numeric strings.
pub fn parse_amount(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn flag(params: &Params, key: &str) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Whole amounts print without a fractional part.
fn fmt_amount(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

/// The top-level structure deserialized from a TOML policy file.
///
/// Rules are evaluated in the order they appear in the `rules` array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

//! Slot extraction from free-text user messages.
//!
//! `MessageSlotExtractor` is the `InputSource` the banking runtime uses: it
//! answers slot requests by pattern-matching the current user message, and
//! falls back to preset values (for example a currency fixed by the channel).

use std::collections::HashMap;

use regex::Regex;
use serde_json::{json, Value};

use waypoint_contracts::{
    error::{WaypointError, WaypointResult},
    state::AgentState,
};
use waypoint_core::traits::InputSource;

pub struct MessageSlotExtractor {
    amount: Regex,
    currency: Regex,
    account_number: Regex,
    sort_code: Regex,
    recipient: Regex,
    presets: HashMap<String, Value>,
}

impl MessageSlotExtractor {
    /// # Errors
    ///
    /// `ConfigError` if a built-in pattern fails to compile.
    pub fn new() -> WaypointResult<Self> {
        Ok(Self {
            amount: compile(
                r"(?i)(?:[£€$]\s?(\d+(?:\.\d{1,2})?))|(?:\b(\d+(?:\.\d{1,2})?)\s?(?:gbp|eur|usd|pounds?|euros?|dollars?)\b)",
            )?,
            currency: compile(r"(?i)(£|€|\$|\bgbp\b|\beur\b|\busd\b|\bpounds?\b|\beuros?\b|\bdollars?\b)")?,
            account_number: compile(r"\b(\d{8})\b")?,
            sort_code: compile(r"\b(\d{2}-\d{2}-\d{2})\b")?,
            recipient: compile(r"\b[Tt]o\s+([A-Z][a-zA-Z]+(?:\s+[A-Z][a-zA-Z]+)?)")?,
            presets: HashMap::new(),
        })
    }

    /// Answer `slot` with `value` whenever the message does not supply it.
    pub fn with_preset(mut self, slot: impl Into<String>, value: Value) -> Self {
        self.presets.insert(slot.into(), value);
        self
    }

    /// Extract one slot from `message`, without presets.
    pub fn extract(&self, slot: &str, message: &str) -> Option<Value> {
        match slot {
            "amount" => {
                let caps = self.amount.captures(message)?;
                let digits = caps.get(1).or_else(|| caps.get(2))?.as_str();
                let amount: f64 = digits.parse().ok()?;
                Some(json!(amount))
            }
            "currency" => {
                let token = self.currency.captures(message)?.get(1)?.as_str().to_lowercase();
                let code = match token.as_str() {
                    "£" | "gbp" | "pound" | "pounds" => "GBP",
                    "€" | "eur" | "euro" | "euros" => "EUR",
                    _ => "USD",
                };
                Some(json!(code))
            }
            "account_number" => self.capture(&self.account_number, message),
            "sort_code" => self.capture(&self.sort_code, message),
            "recipient" => self.capture(&self.recipient, message),
            _ => None,
        }
    }

    fn capture(&self, pattern: &Regex, message: &str) -> Option<Value> {
        let found = pattern.captures(message)?.get(1)?.as_str();
        Some(json!(found))
    }
}

impl InputSource for MessageSlotExtractor {
    fn request(&self, slot: &str, state: &AgentState) -> Option<Value> {
        state
            .last_user_message
            .as_deref()
            .and_then(|message| self.extract(slot, message))
            .or_else(|| self.presets.get(slot).cloned())
    }
}

fn compile(pattern: &str) -> WaypointResult<Regex> {
    Regex::new(pattern).map_err(|e| WaypointError::ConfigError {
        reason: format!("invalid slot pattern: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use waypoint_contracts::goal::GoalConfig;

    use super::*;

    fn extractor() -> MessageSlotExtractor {
        MessageSlotExtractor::new().unwrap()
    }

    #[test]
    fn extracts_every_payment_slot() {
        let ex = extractor();
        let msg = "Send £250.50 to Alice Smith, account 12345678, sort code 12-34-56";

        assert_eq!(ex.extract("amount", msg), Some(json!(250.5)));
        assert_eq!(ex.extract("currency", msg), Some(json!("GBP")));
        assert_eq!(ex.extract("account_number", msg), Some(json!("12345678")));
        assert_eq!(ex.extract("sort_code", msg), Some(json!("12-34-56")));
        assert_eq!(ex.extract("recipient", msg), Some(json!("Alice Smith")));
    }

    #[test]
    fn amount_needs_a_currency_marker() {
        let ex = extractor();
        assert_eq!(ex.extract("amount", "Pay 40 EUR please"), Some(json!(40.0)));
        assert_eq!(ex.extract("currency", "Pay 40 EUR please"), Some(json!("EUR")));
        assert_eq!(ex.extract("amount", "account 12345678"), None);
    }

    #[test]
    fn account_number_must_be_exactly_eight_digits() {
        let ex = extractor();
        assert_eq!(ex.extract("account_number", "account 1234567"), None);
        assert_eq!(ex.extract("account_number", "account 123456789"), None);
    }

    #[test]
    fn recipient_ignores_lowercase_words() {
        assert_eq!(extractor().extract("recipient", "send it to account 12345678"), None);
    }

    #[test]
    fn presets_fill_what_the_message_lacks() {
        let ex = extractor().with_preset("currency", json!("GBP"));
        let mut state = AgentState::new("a", "g", GoalConfig::new("pay", &["currency"]));

        state.last_user_message = Some("pay 20 now".to_string());
        assert_eq!(ex.request("currency", &state), Some(json!("GBP")));

        state.last_user_message = Some("pay 20 euros".to_string());
        assert_eq!(ex.request("currency", &state), Some(json!("EUR")));

        assert_eq!(ex.request("sort_code", &state), None);
    }
}

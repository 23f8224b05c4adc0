//! Slot filling: which required fields are still missing, and how they get filled.

use serde_json::Value;
use tracing::{debug, info};

use waypoint_contracts::{
    goal::GoalConfig,
    plan::{Params, Step, NOOP_ACTION},
    state::AgentState,
};

use crate::traits::InputSource;

/// A slot value counts as missing when it is absent, `null`, or a blank string.
pub fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Required slots without a usable value, in declaration order.
pub fn missing_slots(goal: &GoalConfig, collected: &Params) -> Vec<String> {
    goal.required_slots
        .iter()
        .filter(|slot| is_missing(collected.get(slot.as_str())))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotFill {
    Complete,
    /// These slots are still missing after asking the input source.
    Pending(Vec<String>),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SlotFiller;

impl SlotFiller {
    /// Ask `input` for every missing slot and merge what it supplies.
    ///
    /// Recomputes `state.missing_slots` from scratch, so values collected
    /// earlier in the session are never requested again.
    pub fn fill(&self, state: &mut AgentState, input: &dyn InputSource) -> SlotFill {
        let missing = missing_slots(&state.goal_config, &state.collected_slots);

        for slot in &missing {
            match input.request(slot, state) {
                Some(value) if !is_missing(Some(&value)) => {
                    debug!(slot = %slot, "slot supplied");
                    state.set_slot(slot.clone(), value);
                }
                _ => debug!(slot = %slot, "slot not available"),
            }
        }

        state.missing_slots = missing_slots(&state.goal_config, &state.collected_slots);

        if state.missing_slots.is_empty() {
            SlotFill::Complete
        } else {
            info!(
                goal_id = %state.goal_id,
                missing = ?state.missing_slots,
                "waiting for required slots"
            );
            SlotFill::Pending(state.missing_slots.clone())
        }
    }
}

/// Copy collected slot values into a step's params where the step leaves
/// them unset (absent or `null`). `noop` steps are left alone.
pub fn bind_slots(step: &mut Step, slots: &Params) {
    if step.action == NOOP_ACTION {
        return;
    }
    for (name, value) in slots {
        if matches!(step.params.get(name), None | Some(Value::Null)) {
            step.params.insert(name.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    struct MapInput(HashMap<&'static str, Value>);

    impl InputSource for MapInput {
        fn request(&self, slot: &str, _state: &AgentState) -> Option<Value> {
            self.0.get(slot).cloned()
        }
    }

    fn state() -> AgentState {
        AgentState::new("agent", "pay", GoalConfig::new("pay", &["amount", "currency", "account_number"]))
    }

    #[test]
    fn blank_and_null_values_count_as_missing() {
        let goal = GoalConfig::new("g", &["a", "b", "c", "d"]);
        let mut collected = Params::new();
        collected.insert("a".into(), Value::from("  "));
        collected.insert("b".into(), Value::Null);
        collected.insert("c".into(), Value::from(0));

        assert_eq!(missing_slots(&goal, &collected), ["a", "b", "d"]);
    }

    #[test]
    fn fill_merges_supplied_values_and_reports_pending() {
        let mut state = state();
        let input = MapInput(HashMap::from([
            ("amount", Value::from(10)),
            ("currency", Value::from("")),
        ]));

        let fill = SlotFiller.fill(&mut state, &input);

        assert_eq!(
            fill,
            SlotFill::Pending(vec!["currency".into(), "account_number".into()])
        );
        assert_eq!(state.collected_slots["amount"], 10);
        assert!(!state.collected_slots.contains_key("currency"));
        assert_eq!(state.missing_slots, ["currency", "account_number"]);
    }

    #[test]
    fn fill_completes_when_everything_is_supplied() {
        let mut state = state();
        state.set_slot("amount", Value::from(10));
        let input = MapInput(HashMap::from([
            ("currency", Value::from("GBP")),
            ("account_number", Value::from("12345678")),
        ]));

        assert_eq!(SlotFiller.fill(&mut state, &input), SlotFill::Complete);
        assert!(state.missing_slots.is_empty());
    }

    #[test]
    fn binding_fills_only_unset_params() {
        let mut params = Params::new();
        params.insert("amount".into(), Value::from(5));
        params.insert("currency".into(), Value::Null);
        let mut step = Step::new("s", "make_payment", params);

        let mut slots = Params::new();
        slots.insert("amount".into(), Value::from(99));
        slots.insert("currency".into(), Value::from("GBP"));
        slots.insert("sort_code".into(), Value::from("12-34-56"));
        bind_slots(&mut step, &slots);

        assert_eq!(step.params["amount"], 5);
        assert_eq!(step.params["currency"], "GBP");
        assert_eq!(step.params["sort_code"], "12-34-56");

        let mut noop = Step::noop("n");
        bind_slots(&mut noop, &slots);
        assert!(noop.params.is_empty());
    }
}

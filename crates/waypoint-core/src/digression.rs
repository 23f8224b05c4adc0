//! Digression detection: is the latest user message still about the active goal?

use std::sync::Arc;

use tracing::{debug, info, warn};

use waypoint_contracts::{
    error::WaypointResult,
    goal::GoalConfig,
    state::{AgentState, Classification},
};

use crate::{
    planner::render_template,
    traits::{DigressionClassifier, TextGenerator},
};

const DEFAULT_CLASSIFIER_PROMPT: &str = "Active goal: {goal_description}\n\
Information still needed: {missing_slots}\n\
Guidance: {digression_prompt}\n\
User message: \"{user_message}\"\n\
Answer with exactly one label: ON_TOPIC, CLARIFICATION or DIGRESSION.\n\
Classify only. No explanation.";

pub struct DigressionDetector {
    classifier: Option<Arc<dyn DigressionClassifier>>,
}

impl DigressionDetector {
    pub fn new(classifier: Option<Arc<dyn DigressionClassifier>>) -> Self {
        Self { classifier }
    }

    /// True when the turn's message still has to go through `detect`.
    pub fn pending(&self, state: &AgentState) -> bool {
        self.classifier.is_some()
            && state.goal_config.digression_prompt.is_some()
            && state.last_user_message.is_some()
            && !state.message_classified
    }

    /// Classify the turn's message at most once.
    ///
    /// Returns `OnTopic` without touching the state when classification is
    /// not configured for this goal, there is no message, or the message was
    /// already classified. A classifier error is treated as `OnTopic`.
    pub fn detect(&self, state: &mut AgentState) -> Classification {
        let Some(classifier) = &self.classifier else {
            return Classification::OnTopic;
        };
        if !self.pending(state) {
            return Classification::OnTopic;
        }
        let Some(message) = state.last_user_message.as_deref() else {
            return Classification::OnTopic;
        };

        let classification =
            match classifier.classify(message, &state.goal_config, &state.missing_slots) {
                Ok(c) => c,
                Err(e) => {
                    warn!(goal_id = %state.goal_id, error = %e, "classifier failed, assuming on-topic");
                    Classification::OnTopic
                }
            };

        debug!(goal_id = %state.goal_id, ?classification, "message classified");
        state.message_classified = true;
        state.classification = Some(classification);
        classification
    }
}

/// Apply a classification to the state.
///
/// A digression abandons the goal's progress: plan and collected slots are
/// cleared and every required slot is missing again.
pub fn apply(state: &mut AgentState, classification: Classification) {
    match classification {
        Classification::Digression => {
            info!(goal_id = %state.goal_id, "digression detected, discarding plan and slots");
            state.digression = true;
            state.plan = None;
            state.collected_slots.clear();
            state.missing_slots = state.goal_config.required_slots.clone();
        }
        Classification::OnTopic | Classification::Clarification => state.digression = false,
    }
}

/// Map free text to a label; the first recognised label wins.
pub fn parse_label(text: &str) -> Classification {
    let upper = text.to_ascii_uppercase();
    [
        ("ON_TOPIC", Classification::OnTopic),
        ("CLARIFICATION", Classification::Clarification),
        ("DIGRESSION", Classification::Digression),
    ]
    .into_iter()
    .filter_map(|(label, c)| upper.find(label).map(|at| (at, c)))
    .min_by_key(|(at, _)| *at)
    .map(|(_, c)| c)
    .unwrap_or(Classification::OnTopic)
}

/// A classifier backed by the text-generation collaborator.
pub struct GeneratorClassifier {
    generator: Arc<dyn TextGenerator>,
    template: Option<String>,
}

impl GeneratorClassifier {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator, template: None }
    }

    pub fn with_template(mut self, template: Option<String>) -> Self {
        self.template = template;
        self
    }
}

impl DigressionClassifier for GeneratorClassifier {
    fn classify(
        &self,
        message: &str,
        goal: &GoalConfig,
        missing_slots: &[String],
    ) -> WaypointResult<Classification> {
        let template = self.template.as_deref().unwrap_or(DEFAULT_CLASSIFIER_PROMPT);
        let missing = missing_slots.join(", ");
        let prompt = render_template(
            template,
            &[
                ("goal_description", goal.description.as_str()),
                ("missing_slots", &missing),
                ("digression_prompt", goal.digression_prompt.as_deref().unwrap_or("")),
                ("user_message", message),
            ],
        );
        let raw = self.generator.generate(&prompt)?;
        Ok(parse_label(&raw))
    }
}

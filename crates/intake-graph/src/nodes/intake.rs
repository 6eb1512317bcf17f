use intake_core::{EscalationReason, Message, TurnState};
use tracing::info;

use crate::error::NodeError;
use crate::intent::EscalationDetector;
use crate::nodes::TurnContext;

/// Validates the utterance, appends it to history, and runs escalation
/// detection.
pub struct IntakeNode {
    max_message_length: usize,
    detector: EscalationDetector,
}

impl IntakeNode {
    pub fn new(max_message_length: usize) -> Self {
        Self {
            max_message_length,
            detector: EscalationDetector::new(),
        }
    }

    pub fn run(&self, state: &mut TurnState, ctx: &mut TurnContext) -> Result<(), NodeError> {
        let text = ctx.utterance.trim();
        if text.is_empty() {
            return Err(NodeError::EmptyUtterance);
        }
        if text.chars().count() > self.max_message_length {
            return Err(NodeError::UtteranceTooLong(self.max_message_length));
        }

        state.push_message(Message::user(text, ctx.modality));

        if self.detector.is_escalation_request(text) {
            info!(conversation_id = %state.conversation_id, "User asked for a person");
            state.escalation = Some(EscalationReason::UserRequested);
        }
        Ok(())
    }
}

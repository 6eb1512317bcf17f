use std::sync::Arc;
use std::time::Duration;

use intake_core::{EscalationReason, HumanContact, TurnAction, TurnState};
use tracing::{info, warn};

use crate::collab::{bounded, ContactLookup};
use crate::nodes::TurnContext;

/// Hands the conversation to a human with an empathetic message.
pub struct EscalationNode {
    lookup: Arc<dyn ContactLookup>,
    fallback: HumanContact,
    timeout: Duration,
}

impl EscalationNode {
    pub fn new(lookup: Arc<dyn ContactLookup>, fallback: HumanContact, timeout: Duration) -> Self {
        Self {
            lookup,
            fallback,
            timeout,
        }
    }

    pub async fn run(&self, state: &mut TurnState, ctx: &mut TurnContext) {
        let reason = state
            .escalation
            .take()
            .unwrap_or(EscalationReason::RetriesExhausted);

        let contact = match bounded(self.timeout, self.lookup.lookup()).await {
            Ok(contact) => contact,
            Err(e) => {
                warn!(error = %e, "Contact lookup failed; using default contact");
                self.fallback.clone()
            }
        };

        info!(
            conversation_id = %state.conversation_id,
            reason = %reason,
            "Escalating to a human"
        );

        state.retry_count = 0;
        state.recovering = false;
        state.pending_action = TurnAction::Escalate;
        ctx.escalated = Some(reason);
        ctx.reply = Some(format!("{} {}", opening(reason), contact_line(&contact)));
    }
}

fn opening(reason: EscalationReason) -> &'static str {
    match reason {
        EscalationReason::UserRequested => {
            "Of course, I understand you'd like to speak with a person."
        }
        EscalationReason::SubmissionFailed => {
            "I'm sorry, I wasn't able to file your claim just now. Everything you've told me is saved, and a person can finish this with you."
        }
        EscalationReason::RetriesExhausted => {
            "I'm sorry, I'm having trouble understanding, and I don't want to waste your time."
        }
    }
}

fn contact_line(contact: &HumanContact) -> String {
    let mut line = format!("You can reach {} at {}", contact.name, contact.phone);
    if let Some(email) = &contact.email {
        line.push_str(&format!(" or by email at {}", email));
    }
    if let Some(hours) = &contact.hours {
        line.push_str(&format!(", {}", hours));
    }
    line.push('.');
    line
}

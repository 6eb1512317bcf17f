use std::sync::Arc;
use std::time::Duration;

use intake_core::{EscalationReason, TurnAction, TurnState};
use tracing::{info, warn};

use crate::collab::{bounded, SubmissionSink};
use crate::error::NodeError;
use crate::nodes::TurnContext;

/// Hands a complete record to the submission sink, once.
pub struct SubmissionNode {
    sink: Arc<dyn SubmissionSink>,
    timeout: Duration,
}

impl SubmissionNode {
    pub fn new(sink: Arc<dyn SubmissionSink>, timeout: Duration) -> Self {
        Self { sink, timeout }
    }

    /// On failure or timeout raises the escalation signal; there is no retry.
    pub async fn run(&self, state: &mut TurnState, ctx: &mut TurnContext) -> Result<(), NodeError> {
        if state.record.is_submitted() {
            return Ok(());
        }

        match bounded(self.timeout, self.sink.submit(&state.record)).await {
            Ok(receipt) => {
                state.record.attach_submission(receipt.clone())?;
                info!(
                    conversation_id = %state.conversation_id,
                    submission_id = %receipt.id,
                    "Record submitted"
                );
                state.pending_action = TurnAction::Continue;
                ctx.reply = Some(format!(
                    "Your claim has been submitted. Your reference number is {}. A claims specialist will follow up with you soon. Is there anything else I can help with?",
                    receipt.id
                ));
                ctx.submission = Some(receipt);
            }
            Err(e) => {
                warn!(conversation_id = %state.conversation_id, error = %e, "Submission failed");
                state.escalation = Some(EscalationReason::SubmissionFailed);
            }
        }
        Ok(())
    }
}

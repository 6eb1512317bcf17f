//! The orchestration graph: one turn in, one assistant reply out.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use intake_core::config::IntakeConfig;
use intake_core::{
    EscalationReason, FieldId, InputModality, Message, SubmissionReceipt, TurnAction, TurnState,
};
use intake_record::{check_completeness, Completeness, Extractor, RecordMerger, RecordSchema};
use serde::Serialize;
use tracing::{debug, warn};

use crate::collab::{ContactLookup, SubmissionSink};
use crate::error::NodeError;
use crate::nodes::{
    DecisionNode, EscalationNode, ExtractionNode, IntakeNode, RecoveryNode, SubmissionNode,
    TurnContext,
};
use crate::router::{route, NodeId};

/// Upper bound on node executions in one turn.
const MAX_STEPS_PER_TURN: usize = 12;

const FALLBACK_REPLY: &str = "Sorry, could you say that again?";

/// What one turn produced.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub reply: String,
    pub action: TurnAction,
    pub changed: BTreeSet<FieldId>,
    pub completeness: Completeness,
    /// Set on the turn the record was submitted.
    pub submission: Option<SubmissionReceipt>,
    /// Set on a turn that handed off to a human.
    pub escalated: Option<EscalationReason>,
    /// Nodes executed, in order.
    pub path: Vec<NodeId>,
}

/// Runs conversation nodes under the router until the turn ends.
pub struct OrchestrationGraph {
    intake: IntakeNode,
    extraction: ExtractionNode,
    decision: DecisionNode,
    submission: SubmissionNode,
    escalation: EscalationNode,
    recovery: RecoveryNode,
    schema: Arc<RecordSchema>,
    max_retries: u32,
    greeting: String,
}

impl OrchestrationGraph {
    pub fn new(
        config: &IntakeConfig,
        schema: Arc<RecordSchema>,
        extractor: Arc<dyn Extractor>,
        sink: Arc<dyn SubmissionSink>,
        contacts: Arc<dyn ContactLookup>,
    ) -> Self {
        let conversation = &config.conversation;
        let merger = RecordMerger::new(extractor, schema.clone())
            .with_timeout(Duration::from_millis(conversation.extraction_timeout_ms));
        let collaborator_timeout = Duration::from_millis(conversation.submission_timeout_ms);

        Self {
            intake: IntakeNode::new(conversation.max_message_length),
            extraction: ExtractionNode::new(merger, conversation.context_window),
            decision: DecisionNode::new(schema.clone()),
            submission: SubmissionNode::new(sink, collaborator_timeout),
            escalation: EscalationNode::new(
                contacts,
                config.escalation.default_contact.clone(),
                collaborator_timeout,
            ),
            recovery: RecoveryNode,
            schema,
            max_retries: conversation.max_error_retries,
            greeting: conversation.greeting.clone(),
        }
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    /// Append the greeting as the first assistant message. Returns `None` if
    /// the conversation has already started.
    pub fn begin(&self, state: &mut TurnState) -> Option<String> {
        if !state.history().is_empty() {
            return None;
        }
        state.push_message(Message::assistant(self.greeting.clone()));
        Some(self.greeting.clone())
    }

    pub fn completeness(&self, state: &TurnState) -> Completeness {
        check_completeness(&state.record, &self.schema)
    }

    /// Process one user utterance.
    ///
    /// Always yields exactly one assistant reply, which is appended to the
    /// history before returning.
    pub async fn run_turn(
        &self,
        state: &mut TurnState,
        utterance: &str,
        modality: InputModality,
    ) -> TurnOutcome {
        state.pending_action = TurnAction::Continue;
        let mut ctx = TurnContext::new(utterance, modality, self.completeness(state));
        let mut path = Vec::new();
        let mut had_error = false;
        let mut node = NodeId::Intake;

        while node != NodeId::End {
            if path.len() >= MAX_STEPS_PER_TURN {
                warn!(
                    conversation_id = %state.conversation_id,
                    path = ?path,
                    "Turn hit the step limit"
                );
                break;
            }
            path.push(node);

            if let Err(e) = self.run_node(node, state, &mut ctx).await {
                warn!(
                    conversation_id = %state.conversation_id,
                    node = %node,
                    error = %e,
                    "Node failed"
                );
                state.error = Some(e.to_string());
                had_error = true;
            }

            ctx.completeness = self.completeness(state);
            node = route(node, state, &ctx.completeness, self.max_retries);
        }

        if !had_error {
            state.retry_count = 0;
        }

        let reply = ctx.reply.take().unwrap_or_else(|| FALLBACK_REPLY.to_string());
        state.push_message(Message::assistant(reply.clone()));

        debug!(
            conversation_id = %state.conversation_id,
            path = ?path,
            action = %state.pending_action,
            "Turn complete"
        );

        TurnOutcome {
            reply,
            action: state.pending_action,
            changed: ctx.changed,
            completeness: ctx.completeness,
            submission: ctx.submission,
            escalated: ctx.escalated,
            path,
        }
    }

    async fn run_node(
        &self,
        node: NodeId,
        state: &mut TurnState,
        ctx: &mut TurnContext,
    ) -> Result<(), NodeError> {
        match node {
            NodeId::Intake => self.intake.run(state, ctx)?,
            NodeId::Extraction => self.extraction.run(state, ctx).await,
            NodeId::Decision => self.decision.run(state, ctx),
            NodeId::Submission => self.submission.run(state, ctx).await?,
            NodeId::Escalation => self.escalation.run(state, ctx).await,
            NodeId::ErrorRecovery => self.recovery.run(state),
            NodeId::End => {}
        }
        Ok(())
    }
}

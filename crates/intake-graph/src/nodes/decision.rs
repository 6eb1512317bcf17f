//! Decides what to say next.
//!
//! The reply acknowledges what the user just gave (only fields changed this
//! turn and verifiably present in what they said since the last assistant
//! message), then asks for exactly one missing field.

use std::sync::Arc;

use intake_core::{FieldValue, SubmissionReceipt, TurnAction, TurnState};
use intake_record::{ExtractionWindow, FieldKind, FieldSpec, PatternSet, RecordSchema};
use regex::Regex;

use crate::nodes::TurnContext;

const APOLOGY: &str = "Sorry, I didn't quite catch that.";

pub struct DecisionNode {
    schema: Arc<RecordSchema>,
    timeline_question: Regex,
}

impl DecisionNode {
    pub fn new(schema: Arc<RecordSchema>) -> Self {
        Self {
            schema,
            timeline_question: Regex::new(
                r"(?i)\b(?:how long|what happens next|what now|next steps?|when will|hear back|follow up)\b",
            )
            .expect("Invalid timeline regex"),
        }
    }

    pub fn run(&self, state: &mut TurnState, ctx: &mut TurnContext) {
        if state.escalation.is_some() {
            state.pending_action = TurnAction::Escalate;
            ctx.reply = Some("Let me connect you with someone who can help.".to_string());
            return;
        }

        if let Some(receipt) = state.record.submission().cloned() {
            state.pending_action = TurnAction::Continue;
            state.recovering = false;
            ctx.reply = Some(self.after_submission(state, &receipt));
            return;
        }

        let mut parts = Vec::new();
        if std::mem::take(&mut state.recovering) {
            parts.push(APOLOGY.to_string());
        }
        if let Some(ack) = self.acknowledgement(state, ctx) {
            parts.push(ack);
        }

        if ctx.completeness.is_complete {
            state.pending_action = TurnAction::Submit;
            parts.push("That's everything I need, so I'm filing your claim now.".to_string());
        } else {
            state.pending_action = TurnAction::Continue;
            parts.push(self.next_question(state, ctx));
        }

        ctx.reply = Some(parts.join(" "));
    }

    /// "Thanks, I've noted your full name (Jane Doe) and your phone number (555-0100)."
    fn acknowledgement(&self, state: &TurnState, ctx: &TurnContext) -> Option<String> {
        if ctx.changed.is_empty() {
            return None;
        }
        let said = ExtractionWindow::new(state.since_last_assistant().to_vec());
        if !said.has_user_messages() {
            return None;
        }

        let items: Vec<String> = self
            .schema
            .fields
            .iter()
            .filter(|f| ctx.changed.contains(&f.id))
            .filter_map(|f| match state.record.get(&f.id)? {
                FieldValue::Provided(text) if said.grounds(text) => Some(describe(f, text)),
                FieldValue::ExplicitNone => Some(format!("no {}", f.label)),
                FieldValue::Provided(_) => None,
            })
            .collect();

        if items.is_empty() {
            return None;
        }
        Some(format!("Thanks, I've noted {}.", join_list(&items)))
    }

    fn next_question(&self, state: &TurnState, ctx: &TurnContext) -> String {
        if let Some(spec) = ctx
            .completeness
            .next_missing()
            .and_then(|id| self.schema.field(id))
        {
            return spec.prompt.clone();
        }

        // Everything is addressed but no strict field is valid yet.
        let patterns = PatternSet::global();
        let strict: Vec<&FieldSpec> = self.schema.fields.iter().filter(|f| f.strict).collect();
        let target = strict
            .iter()
            .find(|f| {
                state
                    .record
                    .get(&f.id)
                    .and_then(FieldValue::as_text)
                    .map(|t| !patterns.validate(f.kind, t))
                    .unwrap_or(false)
            })
            .or_else(|| strict.first());
        match target {
            Some(spec) => format!("Could you give me your {} again?", spec.label),
            None => "Is there anything else you'd like to add?".to_string(),
        }
    }

    fn after_submission(&self, state: &TurnState, receipt: &SubmissionReceipt) -> String {
        let asked_timeline = state
            .since_last_assistant()
            .iter()
            .filter(|m| m.is_user())
            .any(|m| self.timeline_question.is_match(&m.content));
        if asked_timeline {
            format!(
                "A claims specialist will review your claim and contact you, usually within two business days. Your reference number is {}.",
                receipt.id
            )
        } else {
            format!(
                "Your claim has already been filed under reference number {}. Is there anything else I can help you with?",
                receipt.id
            )
        }
    }
}

fn describe(field: &FieldSpec, text: &str) -> String {
    match field.kind {
        FieldKind::Narrative => format!("the {}", field.label),
        _ => format!("your {} ({})", field.label, text),
    }
}

fn join_list(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [head @ .., last] => format!("{} and {}", head.join(", "), last),
    }
}

//! Conversation nodes.
//!
//! Each node reads and mutates the turn state plus a per-turn
//! [`TurnContext`]. Nodes never choose their successor; the router does.

pub mod decision;
pub mod escalation;
pub mod extraction;
pub mod intake;
pub mod recovery;
pub mod submission;

use std::collections::BTreeSet;

use intake_core::{EscalationReason, FieldId, InputModality, SubmissionReceipt};
use intake_record::Completeness;

pub use decision::DecisionNode;
pub use escalation::EscalationNode;
pub use extraction::ExtractionNode;
pub use intake::IntakeNode;
pub use recovery::RecoveryNode;
pub use submission::SubmissionNode;

/// Scratch data for a single turn, discarded when the turn ends.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub utterance: String,
    pub modality: InputModality,
    /// Fields the merger changed this turn.
    pub changed: BTreeSet<FieldId>,
    pub completeness: Completeness,
    /// The assistant reply. Later nodes overwrite earlier ones.
    pub reply: Option<String>,
    pub submission: Option<SubmissionReceipt>,
    pub escalated: Option<EscalationReason>,
}

impl TurnContext {
    pub fn new(utterance: impl Into<String>, modality: InputModality, completeness: Completeness) -> Self {
        Self {
            utterance: utterance.into(),
            modality,
            changed: BTreeSet::new(),
            completeness,
            reply: None,
            submission: None,
            escalated: None,
        }
    }
}

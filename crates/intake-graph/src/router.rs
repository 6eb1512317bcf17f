//! Turn routing.
//!
//! One pure function decides the next node after every node runs. Priority:
//! 1. a turn-level error goes to error recovery;
//! 2. error recovery returns to decision, or escalates once retries run out;
//! 3. a pending escalation signal or exhausted retries escalates;
//! 4. a submitted record skips extraction;
//! 5. a complete, unsubmitted record goes from decision to submission;
//! 6. everything else ends the turn.

use std::fmt;

use intake_core::TurnState;
use intake_record::Completeness;
use serde::{Deserialize, Serialize};

/// Nodes of the orchestration graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    Intake,
    Extraction,
    Decision,
    Submission,
    Escalation,
    ErrorRecovery,
    End,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Intake => write!(f, "intake"),
            NodeId::Extraction => write!(f, "extraction"),
            NodeId::Decision => write!(f, "decision"),
            NodeId::Submission => write!(f, "submission"),
            NodeId::Escalation => write!(f, "escalation"),
            NodeId::ErrorRecovery => write!(f, "error_recovery"),
            NodeId::End => write!(f, "end"),
        }
    }
}

/// Choose the node that runs after `current`.
pub fn route(
    current: NodeId,
    state: &TurnState,
    completeness: &Completeness,
    max_retries: u32,
) -> NodeId {
    if matches!(current, NodeId::End | NodeId::Escalation) {
        return NodeId::End;
    }
    if state.error.is_some() {
        return NodeId::ErrorRecovery;
    }
    if current == NodeId::ErrorRecovery {
        return if state.retry_count >= max_retries {
            NodeId::Escalation
        } else {
            NodeId::Decision
        };
    }
    if state.escalation.is_some() || state.retry_count >= max_retries {
        return NodeId::Escalation;
    }

    match current {
        NodeId::Intake if state.record.is_submitted() => NodeId::Decision,
        NodeId::Intake => NodeId::Extraction,
        NodeId::Extraction => NodeId::Decision,
        NodeId::Decision if completeness.is_complete && !state.record.is_submitted() => {
            NodeId::Submission
        }
        _ => NodeId::End,
    }
}

//! Error types for the orchestration graph.

use intake_core::IntakeError;

/// Turn-level failures raised by a node.
///
/// The graph never surfaces these to the user. It records them in the turn
/// state and routes to error recovery.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("Utterance is empty")]
    EmptyUtterance,
    #[error("Utterance exceeds {0} characters")]
    UtteranceTooLong(usize),
    #[error("Record error: {0}")]
    Record(#[from] IntakeError),
}

/// Failures from external collaborators (submission sink, contact lookup).
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Submission rejected: {0}")]
    Rejected(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Timed out after {0}ms")]
    Timeout(u64),
}

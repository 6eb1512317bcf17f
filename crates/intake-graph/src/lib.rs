//! Turn-based orchestration graph for conversational intake.
//!
//! Each user utterance runs through intake, extraction, decision, and, when
//! the record is complete, submission. Escalation and error recovery are
//! reached through the router.

pub mod collab;
pub mod error;
pub mod graph;
pub mod intent;
pub mod nodes;
pub mod router;

pub use collab::{ContactLookup, LoggingSubmissionSink, StaticContactLookup, SubmissionSink};
pub use error::{NodeError, SinkError};
pub use graph::{OrchestrationGraph, TurnOutcome};
pub use intent::EscalationDetector;
pub use router::{route, NodeId};

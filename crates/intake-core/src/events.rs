use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{FieldId, InputModality, PartialRecord, Role, Timestamp};

/// Commands a client sends to its session.
///
/// This is the complete inbound surface of a session; transports (WebSocket,
/// console, tests) translate their own framing into these variants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Begin channel configuration.
    Start,
    /// End the session.
    Stop,
    /// Raw user audio to forward to the speech channel.
    AudioFragment { bytes: Vec<u8> },
    /// Typed user input, treated like a finalized transcript.
    TextFragment { text: String },
    /// An image from the user, described before it enters the conversation.
    ImageFragment { bytes: Vec<u8>, mime: String },
}

/// Events a session emits to its client.
///
/// Emitted in the order they happen within one session; there is no ordering
/// across sessions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The speech channel confirmed its configuration; input is now accepted.
    SessionReady {
        session_id: Uuid,
        timestamp: Timestamp,
    },

    /// A message entered the conversation.
    Transcript {
        role: Role,
        text: String,
        modality: InputModality,
    },

    /// The partial record after a turn.
    RecordUpdate {
        record: PartialRecord,
        is_complete: bool,
        missing: Vec<FieldId>,
    },

    /// Synthesized assistant audio.
    AudioFragment { bytes: Vec<u8> },

    /// The record was submitted.
    SubmissionResult { id: String, status: String },

    /// Something went wrong at the session level.
    Error { message: String },
}

impl SessionEvent {
    /// Short stable name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::SessionReady { .. } => "session_ready",
            SessionEvent::Transcript { .. } => "transcript",
            SessionEvent::RecordUpdate { .. } => "record_update",
            SessionEvent::AudioFragment { .. } => "audio_fragment",
            SessionEvent::SubmissionResult { .. } => "submission_result",
            SessionEvent::Error { .. } => "error",
        }
    }
}

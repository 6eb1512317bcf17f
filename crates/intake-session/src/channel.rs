//! The contract between a session and its remote speech channel.
//!
//! The speech channel (a realtime speech-to-speech service, a console echo,
//! a test double) lives behind a pair of queues. The session pushes
//! [`ChannelCommand`]s and consumes [`ChannelEvent`]s; everything about the
//! transport stays on the other side of [`SpeechRemote`].

use async_trait::async_trait;
use intake_core::config::SpeechConfig;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::SessionError;

/// Sent from the session to the speech channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelCommand {
    /// Negotiate audio format, voice and turn detection.
    Configure(SpeechConfig),
    /// Forward user audio.
    AppendAudio(Vec<u8>),
    /// Speak an assistant reply. Audio chunks come back tagged with `response_id`.
    Synthesize { response_id: Uuid, text: String },
    /// Stop speaking a response (barge-in or superseded reply).
    CancelSynthesis { response_id: Uuid },
    Close,
}

/// Received by the session from the speech channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    ConfigurationAcknowledged,
    /// Voice activity detected on the user's side.
    SpeechStarted,
    SpeechStopped,
    /// A finished user transcript. The same item may be delivered more than once.
    TranscriptFinalized { item_id: String, text: String },
    AudioChunk { response_id: Uuid, bytes: Vec<u8> },
    SynthesisComplete { response_id: Uuid },
    ChannelError(String),
}

/// The session's end of a speech channel.
#[derive(Debug)]
pub struct SpeechLink {
    pub commands: mpsc::Sender<ChannelCommand>,
    pub events: mpsc::Receiver<ChannelEvent>,
}

/// The transport's end of a speech channel.
#[derive(Debug)]
pub struct SpeechRemote {
    pub commands: mpsc::Receiver<ChannelCommand>,
    pub events: mpsc::Sender<ChannelEvent>,
}

impl SpeechLink {
    /// Create a connected link/remote pair with the given queue capacity.
    pub fn pair(buffer: usize) -> (SpeechLink, SpeechRemote) {
        let (command_tx, command_rx) = mpsc::channel(buffer.max(1));
        let (event_tx, event_rx) = mpsc::channel(buffer.max(1));
        (
            SpeechLink {
                commands: command_tx,
                events: event_rx,
            },
            SpeechRemote {
                commands: command_rx,
                events: event_tx,
            },
        )
    }
}

/// Turns an image into text the conversation can use.
#[async_trait]
pub trait ImageDescriber: Send + Sync {
    async fn describe(&self, bytes: &[u8], mime: &str) -> Result<String, SessionError>;
}

//! Realtime session coordination.
//!
//! Each session pairs a client (commands in, events out) with a remote
//! speech channel, gates finalized transcripts into conversation turns, and
//! streams the assistant's replies back out as synthesized audio.

pub mod actor;
pub mod channel;
pub mod error;
pub mod gate;
pub mod manager;
pub mod output;
pub mod state;

pub use channel::{ChannelCommand, ChannelEvent, ImageDescriber, SpeechLink, SpeechRemote};
pub use error::SessionError;
pub use manager::{SessionClient, SessionManager};
pub use state::{SessionState, StateMachine};

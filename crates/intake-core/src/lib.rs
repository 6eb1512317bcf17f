//! Shared data model for the intake orchestrator: messages, the partial
//! record, turn state, session events, configuration, and errors.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::IntakeConfig;
pub use error::{IntakeError, Result};
pub use events::{ClientCommand, SessionEvent};
pub use types::*;

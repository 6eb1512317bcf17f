//! Terminal front end: a text-only speech channel and event rendering.

use intake_core::{Role, SessionEvent};
use intake_session::{ChannelCommand, ChannelEvent, SpeechRemote};

/// Serve a session's speech channel without any audio.
///
/// Configuration is acknowledged immediately and every synthesis completes
/// at once; replies reach the terminal through transcript events.
pub async fn run_text_channel(mut remote: SpeechRemote) {
    while let Some(command) = remote.commands.recv().await {
        let reply = match command {
            ChannelCommand::Configure(speech) => {
                tracing::debug!(voice = %speech.voice, format = %speech.audio_format, "Console channel configured");
                Some(ChannelEvent::ConfigurationAcknowledged)
            }
            ChannelCommand::Synthesize { response_id, .. } => {
                Some(ChannelEvent::SynthesisComplete { response_id })
            }
            ChannelCommand::AppendAudio(_) | ChannelCommand::CancelSynthesis { .. } => None,
            ChannelCommand::Close => break,
        };
        if let Some(event) = reply {
            if remote.events.send(event).await.is_err() {
                break;
            }
        }
    }
    tracing::debug!("Console channel closed");
}

/// One line of terminal output for an event, if it has one.
pub fn render(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::SessionReady { session_id, .. } => Some(format!(
            "Session {} ready. Type your answers, /quit to leave.",
            session_id
        )),
        SessionEvent::Transcript {
            role: Role::Assistant,
            text,
            ..
        } => Some(format!("assistant> {}", text)),
        SessionEvent::Transcript { .. } => None,
        SessionEvent::RecordUpdate {
            is_complete,
            missing,
            ..
        } => {
            tracing::debug!(is_complete, missing = missing.len(), "Record updated");
            None
        }
        SessionEvent::SubmissionResult { id, status } => {
            Some(format!("[submitted: {} ({})]", id, status))
        }
        SessionEvent::AudioFragment { .. } => None,
        SessionEvent::Error { message } => Some(format!("[error] {}", message)),
    }
}

//! One session's event loop.
//!
//! The actor owns everything per-session: the turn state, the speech link,
//! the transcript gate and the output stream. It multiplexes client commands,
//! speech channel events and the completion of the in-flight turn. At most
//! one turn runs at a time; utterances that arrive meanwhile are queued.
//! Image description runs inside the turn task so the loop stays responsive.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use intake_core::config::IntakeConfig;
use intake_core::{ClientCommand, InputModality, Role, SessionEvent, TurnState};
use intake_graph::{OrchestrationGraph, TurnOutcome};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channel::{ChannelCommand, ChannelEvent, ImageDescriber, SpeechLink};
use crate::gate::TranscriptGate;
use crate::output::OutputStream;
use crate::state::{SessionState, StateMachine};

type TurnResult = Result<TurnReport, JoinError>;

/// Input waiting to become a turn.
enum Utterance {
    Said {
        text: String,
        modality: InputModality,
    },
    /// Described at the start of its turn.
    Image {
        bytes: Vec<u8>,
        mime: String,
        describer: Arc<dyn ImageDescriber>,
    },
}

/// What a turn task hands back to the actor.
struct TurnReport {
    state: TurnState,
    /// Text an image was described as.
    described: Option<String>,
    /// `None` when the image could not be described and no turn ran.
    outcome: Option<TurnOutcome>,
}

pub struct SessionActor {
    id: Uuid,
    config: IntakeConfig,
    graph: Arc<OrchestrationGraph>,
    describer: Option<Arc<dyn ImageDescriber>>,
    state: StateMachine,
    client_rx: mpsc::Receiver<ClientCommand>,
    events: mpsc::Sender<SessionEvent>,
    channel_tx: mpsc::Sender<ChannelCommand>,
    channel_rx: mpsc::Receiver<ChannelEvent>,
    /// `None` while a turn task holds it.
    turn_state: Option<TurnState>,
    /// Copy taken when a turn starts, restored if the task dies.
    snapshot: Option<TurnState>,
    in_flight: Option<JoinHandle<TurnReport>>,
    queued: VecDeque<Utterance>,
    gate: TranscriptGate,
    output: OutputStream,
    pending_audio: VecDeque<Vec<u8>>,
    configure_deadline: Option<tokio::time::Instant>,
}

impl SessionActor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: Uuid,
        config: IntakeConfig,
        graph: Arc<OrchestrationGraph>,
        describer: Option<Arc<dyn ImageDescriber>>,
        state: StateMachine,
        link: SpeechLink,
        client_rx: mpsc::Receiver<ClientCommand>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        let dedup_window = Duration::from_millis(config.session.dedup_window_ms);
        Self {
            id,
            config,
            graph,
            describer,
            state,
            client_rx,
            events,
            channel_tx: link.commands,
            channel_rx: link.events,
            turn_state: None,
            snapshot: None,
            in_flight: None,
            queued: VecDeque::new(),
            gate: TranscriptGate::new(dedup_window),
            output: OutputStream::new(),
            pending_audio: VecDeque::new(),
            configure_deadline: None,
        }
    }

    pub async fn run(mut self) {
        debug!(session_id = %self.id, "Session actor started");

        while !self.state.current().is_closing() {
            let deadline = self
                .configure_deadline
                .unwrap_or_else(tokio::time::Instant::now);

            tokio::select! {
                command = self.client_rx.recv() => match command {
                    Some(command) => self.on_client(command).await,
                    None => self.close("client disconnected").await,
                },
                event = self.channel_rx.recv() => match event {
                    Some(event) => self.on_channel(event).await,
                    None => self.close("speech channel closed").await,
                },
                result = wait_turn(&mut self.in_flight), if self.in_flight.is_some() => {
                    self.in_flight = None;
                    self.on_turn_complete(result).await;
                },
                _ = tokio::time::sleep_until(deadline), if self.configure_deadline.is_some() => {
                    self.configure_deadline = None;
                    warn!(session_id = %self.id, "Speech channel did not acknowledge configuration");
                    self.emit(SessionEvent::Error {
                        message: "The speech service did not respond in time.".to_string(),
                    })
                    .await;
                    self.close("configuration timeout").await;
                }
            }
        }

        debug!(session_id = %self.id, "Session actor stopped");
    }

    // =========================================================================
    // Client commands
    // =========================================================================

    async fn on_client(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::Start => self.start().await,
            ClientCommand::Stop => self.close("client stop").await,
            ClientCommand::AudioFragment { bytes } => self.on_audio(bytes).await,
            ClientCommand::TextFragment { text } => {
                if !self.ensure_active().await {
                    return;
                }
                if self.state.current() == SessionState::Speaking {
                    self.barge_in().await;
                }
                self.accept_utterance(text, InputModality::Text).await;
            }
            ClientCommand::ImageFragment { bytes, mime } => {
                if !self.ensure_active().await {
                    return;
                }
                self.on_image(bytes, mime).await;
            }
        }
    }

    async fn start(&mut self) {
        if let Err(e) = self.state.transition(SessionState::Configuring) {
            warn!(session_id = %self.id, error = %e, "Ignoring start");
            return;
        }
        let timeout = Duration::from_millis(self.config.session.configure_timeout_ms);
        self.configure_deadline = Some(tokio::time::Instant::now() + timeout);
        self.send_channel(ChannelCommand::Configure(self.config.speech.clone()))
            .await;
    }

    async fn on_audio(&mut self, bytes: Vec<u8>) {
        match self.state.current() {
            SessionState::Configuring => {
                if self.pending_audio.len() >= self.config.session.max_pending_audio_fragments {
                    self.pending_audio.pop_front();
                    warn!(session_id = %self.id, "Pending audio buffer full, dropping oldest fragment");
                }
                self.pending_audio.push_back(bytes);
            }
            SessionState::Listening | SessionState::Speaking => {
                self.send_channel(ChannelCommand::AppendAudio(bytes)).await;
            }
            state => debug!(session_id = %self.id, state = %state, "Dropping audio fragment"),
        }
    }

    async fn on_image(&mut self, bytes: Vec<u8>, mime: String) {
        let Some(describer) = self.describer.clone() else {
            self.emit(SessionEvent::Error {
                message: "Image input is not supported in this session.".to_string(),
            })
            .await;
            return;
        };
        self.enqueue(Utterance::Image {
            bytes,
            mime,
            describer,
        });
    }

    async fn ensure_active(&mut self) -> bool {
        if self.state.current().is_active() {
            return true;
        }
        self.emit(SessionEvent::Error {
            message: "The session is not ready yet.".to_string(),
        })
        .await;
        false
    }

    // =========================================================================
    // Speech channel events
    // =========================================================================

    async fn on_channel(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::ConfigurationAcknowledged => self.on_configured().await,
            ChannelEvent::SpeechStarted => {
                if self.state.current() == SessionState::Speaking {
                    self.barge_in().await;
                }
            }
            ChannelEvent::SpeechStopped => {
                debug!(session_id = %self.id, "User speech stopped");
            }
            ChannelEvent::TranscriptFinalized { item_id, text } => {
                if !self.state.current().is_active() {
                    debug!(session_id = %self.id, item_id = %item_id, "Transcript before session ready");
                    return;
                }
                if self.gate.admit(&item_id, &text, Instant::now()) {
                    self.accept_utterance(text.trim().to_string(), InputModality::Voice)
                        .await;
                } else {
                    debug!(session_id = %self.id, item_id = %item_id, "Dropping duplicate transcript");
                }
            }
            ChannelEvent::AudioChunk { response_id, bytes } => {
                if self.output.accepts(response_id) {
                    self.emit(SessionEvent::AudioFragment { bytes }).await;
                }
            }
            ChannelEvent::SynthesisComplete { response_id } => {
                if self.output.complete(response_id) {
                    self.transition(SessionState::Listening);
                }
            }
            ChannelEvent::ChannelError(message) => {
                warn!(session_id = %self.id, error = %message, "Speech channel error");
                self.emit(SessionEvent::Error { message }).await;
                self.close("speech channel error").await;
            }
        }
    }

    async fn on_configured(&mut self) {
        if self.state.current() != SessionState::Configuring {
            debug!(session_id = %self.id, "Ignoring repeated configuration acknowledgement");
            return;
        }
        self.configure_deadline = None;
        self.transition(SessionState::Listening);

        while let Some(bytes) = self.pending_audio.pop_front() {
            self.send_channel(ChannelCommand::AppendAudio(bytes)).await;
        }

        info!(session_id = %self.id, "Session ready");
        self.emit(SessionEvent::SessionReady {
            session_id: self.id,
            timestamp: Utc::now(),
        })
        .await;

        let mut turn_state = TurnState::new(self.id);
        let greeting = self.graph.begin(&mut turn_state);
        self.turn_state = Some(turn_state);
        if let Some(greeting) = greeting {
            self.emit(SessionEvent::Transcript {
                role: Role::Assistant,
                text: greeting.clone(),
                modality: InputModality::Voice,
            })
            .await;
            self.speak(greeting).await;
        }
    }

    // =========================================================================
    // Turns
    // =========================================================================

    async fn accept_utterance(&mut self, text: String, modality: InputModality) {
        self.emit(SessionEvent::Transcript {
            role: Role::User,
            text: text.clone(),
            modality,
        })
        .await;
        self.enqueue(Utterance::Said { text, modality });
    }

    fn enqueue(&mut self, utterance: Utterance) {
        if self.in_flight.is_some() {
            debug!(session_id = %self.id, queued = self.queued.len() + 1, "Turn in flight, queueing utterance");
            self.queued.push_back(utterance);
        } else {
            self.start_turn(utterance);
        }
    }

    fn start_turn(&mut self, utterance: Utterance) {
        let Some(mut state) = self.turn_state.take() else {
            warn!(session_id = %self.id, "No conversation state, dropping utterance");
            return;
        };
        self.snapshot = Some(state.clone());
        let graph = self.graph.clone();
        let session_id = self.id;
        let describe_timeout = Duration::from_millis(self.config.conversation.extraction_timeout_ms);

        self.in_flight = Some(tokio::spawn(async move {
            let (text, modality, described) = match utterance {
                Utterance::Said { text, modality } => (text, modality, false),
                Utterance::Image {
                    bytes,
                    mime,
                    describer,
                } => match describe_image(session_id, describer.as_ref(), &bytes, &mime, describe_timeout).await {
                    Some(text) => (text, InputModality::Image, true),
                    None => {
                        return TurnReport {
                            state,
                            described: None,
                            outcome: None,
                        }
                    }
                },
            };
            let outcome = graph.run_turn(&mut state, &text, modality).await;
            TurnReport {
                state,
                described: described.then_some(text),
                outcome: Some(outcome),
            }
        }));
    }

    async fn on_turn_complete(&mut self, result: TurnResult) {
        let report = match result {
            Ok(report) => report,
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Turn task failed");
                self.turn_state = self.snapshot.take();
                self.emit(SessionEvent::Error {
                    message: "Something went wrong handling that. Please try again.".to_string(),
                })
                .await;
                self.start_queued();
                return;
            }
        };
        self.snapshot = None;
        let TurnReport {
            state,
            described,
            outcome,
        } = report;

        if let Some(text) = described {
            self.emit(SessionEvent::Transcript {
                role: Role::User,
                text,
                modality: InputModality::Image,
            })
            .await;
        }
        let Some(outcome) = outcome else {
            self.turn_state = Some(state);
            self.emit(SessionEvent::Error {
                message: "I couldn't read that image.".to_string(),
            })
            .await;
            self.start_queued();
            return;
        };

        let completeness = &outcome.completeness;
        self.emit(SessionEvent::RecordUpdate {
            record: state.record.clone(),
            is_complete: completeness.is_complete,
            missing: completeness.missing.clone(),
        })
        .await;
        if let Some(receipt) = &outcome.submission {
            info!(session_id = %self.id, submission_id = %receipt.id, "Record submitted");
            self.emit(SessionEvent::SubmissionResult {
                id: receipt.id.clone(),
                status: receipt.status.clone(),
            })
            .await;
        }
        self.emit(SessionEvent::Transcript {
            role: Role::Assistant,
            text: outcome.reply.clone(),
            modality: InputModality::Voice,
        })
        .await;

        self.turn_state = Some(state);
        if self.state.current().is_active() {
            self.speak(outcome.reply).await;
        }
        self.start_queued();
    }

    fn start_queued(&mut self) {
        if let Some(utterance) = self.queued.pop_front() {
            self.start_turn(utterance);
        }
    }

    // =========================================================================
    // Output
    // =========================================================================

    async fn speak(&mut self, text: String) {
        let response_id = Uuid::new_v4();
        if let Some(superseded) = self.output.begin(response_id) {
            self.send_channel(ChannelCommand::CancelSynthesis {
                response_id: superseded,
            })
            .await;
        }
        self.send_channel(ChannelCommand::Synthesize { response_id, text })
            .await;
        if self.state.current() == SessionState::Listening {
            self.transition(SessionState::Speaking);
        }
    }

    async fn barge_in(&mut self) {
        if let Some(response_id) = self.output.cancel() {
            debug!(session_id = %self.id, response_id = %response_id, "Barge-in, cancelling response");
            self.send_channel(ChannelCommand::CancelSynthesis { response_id })
                .await;
        }
        if self.state.current() == SessionState::Speaking {
            self.transition(SessionState::Listening);
        }
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    async fn close(&mut self, reason: &str) {
        if self.state.current().is_closing() {
            return;
        }
        info!(session_id = %self.id, reason, "Closing session");
        self.transition(SessionState::Closing);
        self.configure_deadline = None;
        self.output.cancel();
        self.send_channel(ChannelCommand::Close).await;

        if !self.queued.is_empty() {
            debug!(session_id = %self.id, dropped = self.queued.len(), "Dropping queued utterances");
            self.queued.clear();
        }
        if let Some(handle) = self.in_flight.take() {
            let result = handle.await;
            self.on_turn_complete(result).await;
        }

        self.transition(SessionState::Closed);
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    fn transition(&self, target: SessionState) {
        if let Err(e) = self.state.transition(target) {
            warn!(session_id = %self.id, error = %e, "Unexpected state transition");
        }
    }

    async fn send_channel(&self, command: ChannelCommand) {
        if self.channel_tx.send(command).await.is_err() {
            debug!(session_id = %self.id, "Speech channel is gone");
        }
    }

    async fn emit(&self, event: SessionEvent) {
        let kind = event.kind();
        if self.events.send(event).await.is_err() {
            debug!(session_id = %self.id, kind, "Client is gone, event dropped");
        }
    }
}

async fn describe_image(
    session_id: Uuid,
    describer: &dyn ImageDescriber,
    bytes: &[u8],
    mime: &str,
    timeout: Duration,
) -> Option<String> {
    match tokio::time::timeout(timeout, describer.describe(bytes, mime)).await {
        Ok(Ok(description)) => Some(description),
        Ok(Err(e)) => {
            warn!(session_id = %session_id, error = %e, "Image description failed");
            None
        }
        Err(_) => {
            warn!(session_id = %session_id, timeout_ms = timeout.as_millis() as u64, "Image description timed out");
            None
        }
    }
}

async fn wait_turn(in_flight: &mut Option<JoinHandle<TurnReport>>) -> TurnResult {
    match in_flight.as_mut() {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

//! Registry of live sessions.
//!
//! Each session runs as its own actor task; the manager only holds the
//! handles needed to address, observe and stop them. Sessions share the
//! orchestration graph (immutable) and nothing else.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use intake_core::config::IntakeConfig;
use intake_core::{ClientCommand, IntakeError, SessionEvent};
use intake_graph::OrchestrationGraph;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::actor::SessionActor;
use crate::channel::{ImageDescriber, SpeechLink};
use crate::error::SessionError;
use crate::state::{SessionState, StateMachine};

/// The client's end of a session.
#[derive(Debug)]
pub struct SessionClient {
    pub id: Uuid,
    pub commands: mpsc::Sender<ClientCommand>,
    pub events: mpsc::Receiver<SessionEvent>,
}

struct SessionHandle {
    commands: mpsc::Sender<ClientCommand>,
    state: StateMachine,
    task: Option<JoinHandle<()>>,
}

type Registry = Arc<Mutex<HashMap<Uuid, SessionHandle>>>;

pub struct SessionManager {
    sessions: Registry,
    config: IntakeConfig,
    graph: Arc<OrchestrationGraph>,
    describer: Option<Arc<dyn ImageDescriber>>,
    shutting_down: AtomicBool,
}

impl SessionManager {
    pub fn new(config: IntakeConfig, graph: Arc<OrchestrationGraph>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            config,
            graph,
            describer: None,
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn with_image_describer(mut self, describer: Arc<dyn ImageDescriber>) -> Self {
        self.describer = Some(describer);
        self
    }

    fn registry(sessions: &Registry) -> MutexGuard<'_, HashMap<Uuid, SessionHandle>> {
        sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open a session over `link`. The session waits for
    /// [`ClientCommand::Start`] before configuring the channel.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_session(&self, link: SpeechLink) -> Result<SessionClient, SessionError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(IntakeError::ShuttingDown.into());
        }
        let id = Uuid::new_v4();
        let buffer = self.config.session.event_buffer.max(1);
        let (command_tx, command_rx) = mpsc::channel(buffer);
        let (event_tx, event_rx) = mpsc::channel(buffer);
        let state = StateMachine::new();

        {
            let mut sessions = Self::registry(&self.sessions);
            if sessions.len() >= self.config.session.max_sessions {
                warn!(
                    active = sessions.len(),
                    max = self.config.session.max_sessions,
                    "Rejecting session, limit reached"
                );
                return Err(SessionError::CapacityReached(sessions.len()));
            }
            sessions.insert(
                id,
                SessionHandle {
                    commands: command_tx.clone(),
                    state: state.clone(),
                    task: None,
                },
            );
        }

        let actor = SessionActor::new(
            id,
            self.config.clone(),
            self.graph.clone(),
            self.describer.clone(),
            state,
            link,
            command_rx,
            event_tx,
        );
        let registry = self.sessions.clone();
        let task = tokio::spawn(async move {
            actor.run().await;
            Self::registry(&registry).remove(&id);
            info!(session_id = %id, "Session removed");
        });

        // The actor may already have exited and removed itself.
        if let Some(handle) = Self::registry(&self.sessions).get_mut(&id) {
            handle.task = Some(task);
        }

        info!(session_id = %id, "Created session");
        Ok(SessionClient {
            id,
            commands: command_tx,
            events: event_rx,
        })
    }

    /// Ask a session to close. Returns once the stop is queued.
    pub async fn stop_session(&self, id: Uuid) -> Result<(), SessionError> {
        let commands = Self::registry(&self.sessions)
            .get(&id)
            .map(|handle| handle.commands.clone())
            .ok_or(SessionError::NotFound(id))?;
        commands
            .send(ClientCommand::Stop)
            .await
            .map_err(|_| SessionError::ChannelClosed)
    }

    pub fn state(&self, id: Uuid) -> Option<SessionState> {
        Self::registry(&self.sessions)
            .get(&id)
            .map(|handle| handle.state.current())
    }

    pub fn count(&self) -> usize {
        Self::registry(&self.sessions).len()
    }

    pub fn session_ids(&self) -> Vec<Uuid> {
        Self::registry(&self.sessions).keys().copied().collect()
    }

    /// Stop every session and wait for their actors to finish. No new
    /// sessions are accepted afterwards.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let handles: Vec<(Uuid, SessionHandle)> =
            Self::registry(&self.sessions).drain().collect();
        if handles.is_empty() {
            return;
        }
        info!(sessions = handles.len(), "Shutting down sessions");

        for (_, handle) in &handles {
            let _ = handle.commands.send(ClientCommand::Stop).await;
        }
        for (id, handle) in handles {
            if let Some(task) = handle.task {
                if let Err(e) = task.await {
                    warn!(session_id = %id, error = %e, "Session task failed");
                }
            }
        }
    }
}

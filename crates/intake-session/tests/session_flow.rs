//! Session-level flows over an in-memory speech channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use uuid::Uuid;

use intake_core::config::IntakeConfig;
use intake_core::{ClientCommand, InputModality, IntakeError, Role, SessionEvent};
use intake_graph::{LoggingSubmissionSink, OrchestrationGraph, StaticContactLookup};
use intake_record::{RecordSchema, RuleExtractor};
use intake_session::{
    ChannelCommand, ChannelEvent, ImageDescriber, SessionClient, SessionError, SessionManager,
    SessionState, SpeechLink, SpeechRemote,
};

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(300);

// =============================================================================
// Helpers
// =============================================================================

fn make_graph(config: &IntakeConfig) -> Arc<OrchestrationGraph> {
    let schema = Arc::new(RecordSchema::claim_intake());
    let extractor = Arc::new(RuleExtractor::new(&schema).unwrap());
    Arc::new(OrchestrationGraph::new(
        config,
        schema,
        extractor,
        Arc::new(LoggingSubmissionSink::new()),
        Arc::new(StaticContactLookup::new(
            config.escalation.default_contact.clone(),
        )),
    ))
}

fn make_manager(config: IntakeConfig) -> SessionManager {
    let graph = make_graph(&config);
    SessionManager::new(config, graph)
}

fn open(manager: &SessionManager) -> (SessionClient, SpeechRemote) {
    let (link, remote) = SpeechLink::pair(64);
    let client = manager.start_session(link).unwrap();
    (client, remote)
}

async fn next_event(client: &mut SessionClient) -> SessionEvent {
    timeout(WAIT, client.events.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("session event stream closed")
}

async fn next_command(remote: &mut SpeechRemote) -> ChannelCommand {
    timeout(WAIT, remote.commands.recv())
        .await
        .expect("timed out waiting for channel command")
        .expect("channel command stream closed")
}

async fn assert_quiet(client: &mut SessionClient) {
    if let Ok(Some(event)) = timeout(QUIET, client.events.recv()).await {
        panic!("unexpected event: {:?}", event);
    }
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached");
}

/// Start the session, acknowledge configuration, and consume the greeting.
/// Returns the greeting's response id.
async fn make_ready(client: &mut SessionClient, remote: &mut SpeechRemote) -> Uuid {
    client.commands.send(ClientCommand::Start).await.unwrap();
    assert!(matches!(
        next_command(remote).await,
        ChannelCommand::Configure(_)
    ));
    remote
        .events
        .send(ChannelEvent::ConfigurationAcknowledged)
        .await
        .unwrap();

    match next_event(client).await {
        SessionEvent::SessionReady { session_id, .. } => assert_eq!(session_id, client.id),
        other => panic!("expected session_ready, got {:?}", other),
    }
    match next_event(client).await {
        SessionEvent::Transcript { role, .. } => assert_eq!(role, Role::Assistant),
        other => panic!("expected greeting, got {:?}", other),
    }
    match next_command(remote).await {
        ChannelCommand::Synthesize { response_id, .. } => response_id,
        other => panic!("expected synthesize, got {:?}", other),
    }
}

/// Collect events until `replies` assistant transcripts have arrived.
async fn collect_replies(client: &mut SessionClient, replies: usize) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    let mut seen = 0;
    while seen < replies {
        let event = next_event(client).await;
        if matches!(
            event,
            SessionEvent::Transcript {
                role: Role::Assistant,
                ..
            }
        ) {
            seen += 1;
        }
        events.push(event);
    }
    events
}

async fn say(client: &mut SessionClient, text: &str) -> Vec<SessionEvent> {
    client
        .commands
        .send(ClientCommand::TextFragment {
            text: text.to_string(),
        })
        .await
        .unwrap();
    collect_replies(client, 1).await
}

fn user_transcripts(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Transcript {
                role: Role::User,
                text,
                ..
            } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_ready_greets_and_speaks() {
    let manager = make_manager(IntakeConfig::default());
    let (mut client, mut remote) = open(&manager);
    assert_eq!(manager.state(client.id), Some(SessionState::Created));

    make_ready(&mut client, &mut remote).await;
    wait_until(|| manager.state(client.id) == Some(SessionState::Speaking)).await;
}

#[tokio::test]
async fn test_input_before_ready_is_rejected() {
    let manager = make_manager(IntakeConfig::default());
    let (mut client, _remote) = open(&manager);

    client
        .commands
        .send(ClientCommand::TextFragment {
            text: "I'm Jane Doe".to_string(),
        })
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut client).await,
        SessionEvent::Error { .. }
    ));
    assert_eq!(manager.state(client.id), Some(SessionState::Created));
}

#[tokio::test]
async fn test_audio_before_ack_is_flushed_in_order() {
    let manager = make_manager(IntakeConfig::default());
    let (mut client, mut remote) = open(&manager);

    client.commands.send(ClientCommand::Start).await.unwrap();
    assert!(matches!(
        next_command(&mut remote).await,
        ChannelCommand::Configure(_)
    ));
    for bytes in [vec![1u8], vec![2u8]] {
        client
            .commands
            .send(ClientCommand::AudioFragment { bytes })
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    remote
        .events
        .send(ChannelEvent::ConfigurationAcknowledged)
        .await
        .unwrap();

    assert_eq!(
        next_command(&mut remote).await,
        ChannelCommand::AppendAudio(vec![1])
    );
    assert_eq!(
        next_command(&mut remote).await,
        ChannelCommand::AppendAudio(vec![2])
    );
    assert!(matches!(
        next_command(&mut remote).await,
        ChannelCommand::Synthesize { .. }
    ));
}

#[tokio::test]
async fn test_configuration_timeout_closes_session() {
    let mut config = IntakeConfig::default();
    config.session.configure_timeout_ms = 100;
    let manager = make_manager(config);
    let (mut client, mut remote) = open(&manager);

    client.commands.send(ClientCommand::Start).await.unwrap();
    assert!(matches!(
        next_command(&mut remote).await,
        ChannelCommand::Configure(_)
    ));

    assert!(matches!(
        next_event(&mut client).await,
        SessionEvent::Error { .. }
    ));
    assert_eq!(next_command(&mut remote).await, ChannelCommand::Close);
    assert!(timeout(WAIT, client.events.recv()).await.unwrap().is_none());
    wait_until(|| manager.count() == 0).await;
}

#[tokio::test]
async fn test_stop_closes_channel_and_unregisters() {
    let manager = make_manager(IntakeConfig::default());
    let (mut client, mut remote) = open(&manager);
    make_ready(&mut client, &mut remote).await;

    manager.stop_session(client.id).await.unwrap();
    assert_eq!(next_command(&mut remote).await, ChannelCommand::Close);
    assert!(timeout(WAIT, client.events.recv()).await.unwrap().is_none());
    wait_until(|| manager.count() == 0).await;

    let err = manager.stop_session(client.id).await.unwrap_err();
    assert!(matches!(err, SessionError::NotFound(_)));
}

#[tokio::test]
async fn test_channel_error_closes_session() {
    let manager = make_manager(IntakeConfig::default());
    let (mut client, mut remote) = open(&manager);
    make_ready(&mut client, &mut remote).await;

    remote
        .events
        .send(ChannelEvent::ChannelError("upstream reset".to_string()))
        .await
        .unwrap();
    match next_event(&mut client).await {
        SessionEvent::Error { message } => assert_eq!(message, "upstream reset"),
        other => panic!("expected error, got {:?}", other),
    }
    assert!(timeout(WAIT, client.events.recv()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_session_limit() {
    let mut config = IntakeConfig::default();
    config.session.max_sessions = 1;
    let manager = make_manager(config);

    let (first, _first_remote) = open(&manager);
    let (link, _remote) = SpeechLink::pair(8);
    let err = manager.start_session(link).unwrap_err();
    assert!(matches!(err, SessionError::CapacityReached(1)));

    manager.stop_session(first.id).await.unwrap();
    wait_until(|| manager.count() == 0).await;

    let (link, _remote) = SpeechLink::pair(8);
    assert!(manager.start_session(link).is_ok());
}

#[tokio::test]
async fn test_shutdown_stops_every_session() {
    let manager = make_manager(IntakeConfig::default());
    let (mut a, _remote_a) = open(&manager);
    let (mut b, _remote_b) = open(&manager);
    assert_eq!(manager.count(), 2);

    manager.shutdown().await;
    assert_eq!(manager.count(), 0);
    assert!(timeout(WAIT, a.events.recv()).await.unwrap().is_none());
    assert!(timeout(WAIT, b.events.recv()).await.unwrap().is_none());

    let (link, _remote) = SpeechLink::pair(8);
    let err = manager.start_session(link).unwrap_err();
    assert!(matches!(err, SessionError::Core(IntakeError::ShuttingDown)));
}

// =============================================================================
// Conversation
// =============================================================================

#[tokio::test]
async fn test_duplicate_finalized_transcripts_run_one_turn() {
    let manager = make_manager(IntakeConfig::default());
    let (mut client, mut remote) = open(&manager);
    make_ready(&mut client, &mut remote).await;

    for (item_id, text) in [
        ("item_1", "I'm Jane Doe"),
        ("item_1", "I'm Jane Doe"),
        ("item_2", "i'm jane doe."),
    ] {
        remote
            .events
            .send(ChannelEvent::TranscriptFinalized {
                item_id: item_id.to_string(),
                text: text.to_string(),
            })
            .await
            .unwrap();
    }

    let events = collect_replies(&mut client, 1).await;
    assert_eq!(user_transcripts(&events), vec!["I'm Jane Doe".to_string()]);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, SessionEvent::RecordUpdate { .. }))
            .count(),
        1
    );
    assert_quiet(&mut client).await;
}

#[tokio::test]
async fn test_empty_then_corrected_transcript_runs_one_turn() {
    let manager = make_manager(IntakeConfig::default());
    let (mut client, mut remote) = open(&manager);
    make_ready(&mut client, &mut remote).await;

    for text in ["", "I'm Jane Doe", "I'm Jane Doe"] {
        remote
            .events
            .send(ChannelEvent::TranscriptFinalized {
                item_id: "item_1".to_string(),
                text: text.to_string(),
            })
            .await
            .unwrap();
    }

    let events = collect_replies(&mut client, 1).await;
    assert_eq!(user_transcripts(&events), vec!["I'm Jane Doe".to_string()]);
    assert_quiet(&mut client).await;
}

#[tokio::test]
async fn test_barge_in_cancels_assistant_audio() {
    let manager = make_manager(IntakeConfig::default());
    let (mut client, mut remote) = open(&manager);
    let greeting = make_ready(&mut client, &mut remote).await;

    remote
        .events
        .send(ChannelEvent::AudioChunk {
            response_id: greeting,
            bytes: vec![1, 2, 3],
        })
        .await
        .unwrap();
    assert_eq!(
        next_event(&mut client).await,
        SessionEvent::AudioFragment {
            bytes: vec![1, 2, 3]
        }
    );

    remote.events.send(ChannelEvent::SpeechStarted).await.unwrap();
    assert_eq!(
        next_command(&mut remote).await,
        ChannelCommand::CancelSynthesis {
            response_id: greeting
        }
    );
    wait_until(|| manager.state(client.id) == Some(SessionState::Listening)).await;

    // Late audio from the cancelled response is dropped.
    remote
        .events
        .send(ChannelEvent::AudioChunk {
            response_id: greeting,
            bytes: vec![4],
        })
        .await
        .unwrap();
    assert_quiet(&mut client).await;

    // A second speech start has nothing left to cancel.
    remote.events.send(ChannelEvent::SpeechStarted).await.unwrap();
    assert!(timeout(QUIET, remote.commands.recv()).await.is_err());
}

#[tokio::test]
async fn test_synthesis_complete_returns_to_listening() {
    let manager = make_manager(IntakeConfig::default());
    let (mut client, mut remote) = open(&manager);
    let greeting = make_ready(&mut client, &mut remote).await;

    remote
        .events
        .send(ChannelEvent::SynthesisComplete {
            response_id: Uuid::new_v4(),
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(manager.state(client.id), Some(SessionState::Speaking));

    remote
        .events
        .send(ChannelEvent::SynthesisComplete {
            response_id: greeting,
        })
        .await
        .unwrap();
    wait_until(|| manager.state(client.id) == Some(SessionState::Listening)).await;
}

#[tokio::test]
async fn test_text_conversation_submits_claim() {
    let manager = make_manager(IntakeConfig::default());
    let (mut client, mut remote) = open(&manager);
    make_ready(&mut client, &mut remote).await;

    let mut events = Vec::new();
    for utterance in [
        "Hi, I'm Jane Doe and my number is 555-0100",
        "Yesterday afternoon.",
        "At the corner of Main and 5th.",
        "Someone rear-ended me while I was stopped at the light.",
        "No injuries, thankfully.",
        "The rear bumper is dented.",
    ] {
        events = say(&mut client, utterance).await;
    }

    let submission = events.iter().find_map(|e| match e {
        SessionEvent::SubmissionResult { id, .. } => Some(id.clone()),
        _ => None,
    });
    let id = submission.expect("claim was not submitted");
    match events.iter().find(|e| matches!(e, SessionEvent::RecordUpdate { .. })) {
        Some(SessionEvent::RecordUpdate {
            record,
            is_complete,
            missing,
        }) => {
            assert!(is_complete);
            assert!(missing.is_empty());
            assert!(record.is_submitted());
        }
        other => panic!("expected record_update, got {:?}", other),
    }
    match events.last() {
        Some(SessionEvent::Transcript { text, .. }) => assert!(text.contains(&id)),
        other => panic!("expected reply, got {:?}", other),
    }
}

#[tokio::test]
async fn test_utterances_during_a_turn_are_queued_in_order() {
    let manager = make_manager(IntakeConfig::default());
    let (mut client, mut remote) = open(&manager);
    make_ready(&mut client, &mut remote).await;

    for text in ["I'm Jane Doe", "555-0100"] {
        client
            .commands
            .send(ClientCommand::TextFragment {
                text: text.to_string(),
            })
            .await
            .unwrap();
    }

    let events = collect_replies(&mut client, 2).await;
    assert_eq!(
        user_transcripts(&events),
        vec!["I'm Jane Doe".to_string(), "555-0100".to_string()]
    );
    match events.last() {
        Some(SessionEvent::Transcript { text, .. }) => {
            assert!(text.ends_with("When did the incident happen?"))
        }
        other => panic!("expected reply, got {:?}", other),
    }
}

// =============================================================================
// Images
// =============================================================================

struct FixedDescriber;

#[async_trait]
impl ImageDescriber for FixedDescriber {
    async fn describe(&self, _bytes: &[u8], mime: &str) -> Result<String, SessionError> {
        assert_eq!(mime, "image/jpeg");
        Ok("Photo of a dented rear bumper".to_string())
    }
}

#[tokio::test]
async fn test_image_without_describer_is_an_error() {
    let manager = make_manager(IntakeConfig::default());
    let (mut client, mut remote) = open(&manager);
    make_ready(&mut client, &mut remote).await;

    client
        .commands
        .send(ClientCommand::ImageFragment {
            bytes: vec![0xff, 0xd8],
            mime: "image/jpeg".to_string(),
        })
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut client).await,
        SessionEvent::Error { .. }
    ));
    assert_eq!(manager.state(client.id), Some(SessionState::Speaking));
}

#[tokio::test]
async fn test_described_image_enters_conversation() {
    let config = IntakeConfig::default();
    let graph = make_graph(&config);
    let manager = SessionManager::new(config, graph).with_image_describer(Arc::new(FixedDescriber));
    let (mut client, mut remote) = open(&manager);
    make_ready(&mut client, &mut remote).await;

    client
        .commands
        .send(ClientCommand::ImageFragment {
            bytes: vec![0xff, 0xd8],
            mime: "image/jpeg".to_string(),
        })
        .await
        .unwrap();

    match next_event(&mut client).await {
        SessionEvent::Transcript {
            role,
            text,
            modality,
        } => {
            assert_eq!(role, Role::User);
            assert_eq!(modality, InputModality::Image);
            assert_eq!(text, "Photo of a dented rear bumper");
        }
        other => panic!("expected transcript, got {:?}", other),
    }
    collect_replies(&mut client, 1).await;
}

struct SlowDescriber;

#[async_trait]
impl ImageDescriber for SlowDescriber {
    async fn describe(&self, _bytes: &[u8], _mime: &str) -> Result<String, SessionError> {
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok("Photo of a cracked windscreen".to_string())
    }
}

struct BrokenDescriber;

#[async_trait]
impl ImageDescriber for BrokenDescriber {
    async fn describe(&self, _bytes: &[u8], _mime: &str) -> Result<String, SessionError> {
        Err(SessionError::ImageDescription(
            "vision service unavailable".to_string(),
        ))
    }
}

#[tokio::test]
async fn test_barge_in_is_not_held_up_by_image_description() {
    let config = IntakeConfig::default();
    let graph = make_graph(&config);
    let manager = SessionManager::new(config, graph).with_image_describer(Arc::new(SlowDescriber));
    let (mut client, mut remote) = open(&manager);
    let greeting = make_ready(&mut client, &mut remote).await;

    client
        .commands
        .send(ClientCommand::ImageFragment {
            bytes: vec![0xff, 0xd8],
            mime: "image/jpeg".to_string(),
        })
        .await
        .unwrap();
    remote.events.send(ChannelEvent::SpeechStarted).await.unwrap();

    let cancel = timeout(QUIET, remote.commands.recv())
        .await
        .expect("barge-in waited for the image description")
        .unwrap();
    assert!(matches!(
        cancel,
        ChannelCommand::CancelSynthesis { response_id } if response_id == greeting
    ));

    let events = collect_replies(&mut client, 1).await;
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::Transcript { role: Role::User, modality: InputModality::Image, text }
            if text == "Photo of a cracked windscreen"
    )));
}

#[tokio::test]
async fn test_unreadable_image_keeps_the_conversation_going() {
    let config = IntakeConfig::default();
    let graph = make_graph(&config);
    let manager =
        SessionManager::new(config, graph).with_image_describer(Arc::new(BrokenDescriber));
    let (mut client, mut remote) = open(&manager);
    make_ready(&mut client, &mut remote).await;

    client
        .commands
        .send(ClientCommand::ImageFragment {
            bytes: vec![0xff, 0xd8],
            mime: "image/jpeg".to_string(),
        })
        .await
        .unwrap();
    match next_event(&mut client).await {
        SessionEvent::Error { message } => assert_eq!(message, "I couldn't read that image."),
        other => panic!("expected error, got {:?}", other),
    }

    let events = say(&mut client, "I'm Jane Doe").await;
    assert_eq!(user_transcripts(&events), vec!["I'm Jane Doe".to_string()]);
}

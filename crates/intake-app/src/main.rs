//! Intake application binary - composition root.
//!
//! 1. Load configuration from TOML
//! 2. Build the record schema, extractor and orchestration graph
//! 3. Open one session over a text-only speech channel
//! 4. Relay stdin lines into the session and print its events

mod cli;
mod console;

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use intake_core::config::IntakeConfig;
use intake_core::{ClientCommand, SessionEvent};
use intake_graph::{LoggingSubmissionSink, OrchestrationGraph, StaticContactLookup};
use intake_record::{RecordSchema, RuleExtractor};
use intake_session::{SessionManager, SpeechLink};

use cli::CliArgs;

/// Forward stdin lines as text fragments until EOF or `/quit`.
async fn stdin_loop(commands: tokio::sync::mpsc::Sender<ClientCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stdin");
                break;
            }
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "/quit" {
            break;
        }
        let command = ClientCommand::TextFragment {
            text: text.to_string(),
        };
        if commands.send(command).await.is_err() {
            return;
        }
    }
    let _ = commands.send(ClientCommand::Stop).await;
}

fn load_schema(args: &CliArgs) -> Result<RecordSchema, Box<dyn std::error::Error>> {
    match &args.schema {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            let schema = RecordSchema::from_toml_str(&content)?;
            tracing::info!(path = %path.display(), fields = schema.fields.len(), "Record schema loaded");
            Ok(schema)
        }
        None => Ok(RecordSchema::claim_intake()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    if args.init_config {
        IntakeConfig::default().save(&config_file)?;
        println!("Wrote default configuration to {}", config_file.display());
        return Ok(());
    }
    let config = IntakeConfig::load_or_default(&config_file);

    // Tracing. Logs go to stderr so the transcript stays readable.
    let log_level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting intake v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Conversation.
    let schema = Arc::new(load_schema(&args)?);
    let extractor = Arc::new(RuleExtractor::new(&schema)?);
    let graph = Arc::new(OrchestrationGraph::new(
        &config,
        schema,
        extractor,
        Arc::new(LoggingSubmissionSink::new()),
        Arc::new(StaticContactLookup::new(
            config.escalation.default_contact.clone(),
        )),
    ));

    // Session.
    let manager = SessionManager::new(config.clone(), graph);
    let (link, remote) = SpeechLink::pair(config.session.event_buffer);
    tokio::spawn(console::run_text_channel(remote));

    let mut client = manager.start_session(link)?;
    client.commands.send(ClientCommand::Start).await?;
    tokio::spawn(stdin_loop(client.commands.clone()));

    loop {
        tokio::select! {
            event = client.events.recv() => {
                let Some(event) = event else { break };
                print_event(&event, args.json)?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    manager.shutdown().await;
    tracing::info!("Intake stopped");
    Ok(())
}

fn print_event(event: &SessionEvent, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string(event)?);
    } else if let Some(line) = console::render(event) {
        println!("{}", line);
    }
    Ok(())
}

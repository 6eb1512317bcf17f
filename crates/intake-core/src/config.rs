use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{IntakeError, Result};
use crate::types::HumanContact;

/// Top-level configuration for the intake orchestrator.
///
/// Loaded from `~/.intake/config.toml` by default. Each section corresponds
/// to one layer of the system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntakeConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
}

impl IntakeConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: IntakeConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| IntakeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Turn-level conversation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Number of most recent messages handed to the record merger.
    pub context_window: usize,
    /// Maximum characters in a single user utterance.
    pub max_message_length: usize,
    /// Consecutive turn-level errors tolerated before escalating.
    pub max_error_retries: u32,
    /// Upper bound on one extraction call.
    pub extraction_timeout_ms: u64,
    /// Upper bound on one submission call.
    pub submission_timeout_ms: u64,
    /// First assistant message of every conversation.
    pub greeting: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            context_window: 12,
            max_message_length: 2000,
            max_error_retries: 3,
            extraction_timeout_ms: 8_000,
            submission_timeout_ms: 10_000,
            greeting: "Hi, I'm here to help you report your claim. Could I get your full name?"
                .to_string(),
        }
    }
}

/// Session coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum concurrent sessions.
    pub max_sessions: usize,
    /// How long to wait for the speech channel to acknowledge configuration.
    pub configure_timeout_ms: u64,
    /// Window in which a repeated finalized transcript is treated as a duplicate.
    pub dedup_window_ms: u64,
    /// Audio fragments buffered while the channel is still configuring.
    pub max_pending_audio_fragments: usize,
    /// Capacity of the per-session command and event queues.
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            configure_timeout_ms: 5_000,
            dedup_window_ms: 2_000,
            max_pending_audio_fragments: 64,
            event_buffer: 256,
        }
    }
}

/// Parameters negotiated with the remote speech service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Audio encoding: "pcm16", "g711_ulaw", "g711_alaw".
    pub audio_format: String,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Synthesis voice name.
    pub voice: String,
    /// Server-side VAD activation threshold (0.0 to 1.0).
    pub vad_threshold: f32,
    /// Audio kept before detected speech start.
    pub prefix_padding_ms: u32,
    /// Silence that ends a user turn.
    pub silence_duration_ms: u32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            audio_format: "pcm16".to_string(),
            sample_rate: 24_000,
            voice: "alloy".to_string(),
            vad_threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
        }
    }
}

/// Escalation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Contact used when the lookup service is unavailable.
    pub default_contact: HumanContact,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            default_contact: HumanContact {
                name: "our claims support team".to_string(),
                phone: "1-800-555-0199".to_string(),
                email: Some("claims@example.com".to_string()),
                hours: Some("Monday to Friday, 8am to 8pm".to_string()),
            },
        }
    }
}

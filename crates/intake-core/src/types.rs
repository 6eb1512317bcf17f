use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IntakeError;

/// UTC timestamp used on messages, receipts, and events.
pub type Timestamp = DateTime<Utc>;

// =============================================================================
// Enums
// =============================================================================

/// Author of a conversation message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Channel a message arrived on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputModality {
    #[default]
    Voice,
    Text,
    Image,
}

impl fmt::Display for InputModality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputModality::Voice => write!(f, "voice"),
            InputModality::Text => write!(f, "text"),
            InputModality::Image => write!(f, "image"),
        }
    }
}

/// What the Decision node wants to happen after the current turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnAction {
    /// Keep collecting; wait for the next utterance.
    #[default]
    Continue,
    /// The record is complete and has not been submitted yet.
    Submit,
    /// Hand the conversation to a human.
    Escalate,
}

impl fmt::Display for TurnAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnAction::Continue => write!(f, "continue"),
            TurnAction::Submit => write!(f, "submit"),
            TurnAction::Escalate => write!(f, "escalate"),
        }
    }
}

/// Why a conversation was handed to a human.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// The user asked for a person.
    UserRequested,
    /// The submission sink rejected or timed out on the completed record.
    SubmissionFailed,
    /// Too many consecutive turn-level errors.
    RetriesExhausted,
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscalationReason::UserRequested => write!(f, "user_requested"),
            EscalationReason::SubmissionFailed => write!(f, "submission_failed"),
            EscalationReason::RetriesExhausted => write!(f, "retries_exhausted"),
        }
    }
}

// =============================================================================
// Messages
// =============================================================================

/// A single entry in the conversation history.
///
/// Messages are immutable once appended; `TurnState` only hands out shared
/// references to its history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub modality: InputModality,
    pub timestamp: Timestamp,
}

impl Message {
    /// Create a user message received over the given modality.
    pub fn user(content: impl Into<String>, modality: InputModality) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            content: content.into(),
            modality,
            timestamp: Utc::now(),
        }
    }

    /// Create an assistant message. Assistant output is always spoken, so it
    /// is tagged as voice.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            content: content.into(),
            modality: InputModality::Voice,
            timestamp: Utc::now(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

// =============================================================================
// Record
// =============================================================================

/// Dotted path (`section.field`) naming one field of the partial record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldId {
    section: String,
    name: String,
}

impl FieldId {
    pub fn new(section: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            name: name.into(),
        }
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section, self.name)
    }
}

impl FromStr for FieldId {
    type Err = IntakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('.') {
            Some((section, name))
                if !section.is_empty() && !name.is_empty() && !name.contains('.') =>
            {
                Ok(FieldId::new(section, name))
            }
            _ => Err(IntakeError::InvalidFieldId(s.to_string())),
        }
    }
}

impl TryFrom<String> for FieldId {
    type Error = IntakeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FieldId> for String {
    fn from(id: FieldId) -> Self {
        id.to_string()
    }
}

/// Content held by one record field.
///
/// A field absent from the record is "unknown / not yet asked".
/// `ExplicitNone` means the user addressed the field and said there is
/// nothing to report ("no injuries").
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Provided(String),
    ExplicitNone,
}

impl FieldValue {
    pub fn provided(text: impl Into<String>) -> Self {
        FieldValue::Provided(text.into())
    }

    /// Whether this value counts as content. Blank text does not.
    pub fn is_addressed(&self) -> bool {
        match self {
            FieldValue::Provided(text) => !text.trim().is_empty(),
            FieldValue::ExplicitNone => true,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Provided(text) => Some(text.as_str()),
            FieldValue::ExplicitNone => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Provided(text) => write!(f, "{}", text),
            FieldValue::ExplicitNone => write!(f, "none"),
        }
    }
}

/// Identifier and status returned by the submission sink.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub id: String,
    pub status: String,
    pub submitted_at: Timestamp,
}

/// The structured entity being built over the conversation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialRecord {
    #[serde(default)]
    sections: BTreeMap<String, BTreeMap<String, FieldValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    submission: Option<SubmissionReceipt>,
}

impl PartialRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &FieldId) -> Option<&FieldValue> {
        self.sections.get(id.section()).and_then(|s| s.get(id.name()))
    }

    /// Whether the field holds any content, including an explicit none.
    pub fn is_addressed(&self, id: &FieldId) -> bool {
        self.get(id).map(FieldValue::is_addressed).unwrap_or(false)
    }

    /// Write a field value. Returns `true` if the stored value changed.
    ///
    /// Blank `Provided` values are ignored so a write can never clear a field.
    pub fn set(&mut self, id: &FieldId, value: FieldValue) -> bool {
        if !value.is_addressed() {
            return false;
        }
        let section = self.sections.entry(id.section().to_string()).or_default();
        match section.get(id.name()) {
            Some(existing) if *existing == value => false,
            _ => {
                section.insert(id.name().to_string(), value);
                true
            }
        }
    }

    /// Iterate over every stored field in `section.field` order.
    pub fn fields(&self) -> impl Iterator<Item = (FieldId, &FieldValue)> + '_ {
        self.sections.iter().flat_map(|(section, fields)| {
            fields
                .iter()
                .map(move |(name, value)| (FieldId::new(section.as_str(), name.as_str()), value))
        })
    }

    pub fn field_count(&self) -> usize {
        self.sections.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.field_count() == 0
    }

    pub fn submission(&self) -> Option<&SubmissionReceipt> {
        self.submission.as_ref()
    }

    pub fn is_submitted(&self) -> bool {
        self.submission.is_some()
    }

    /// Attach the submission receipt. A record is submitted at most once.
    pub fn attach_submission(&mut self, receipt: SubmissionReceipt) -> Result<(), IntakeError> {
        if let Some(existing) = &self.submission {
            return Err(IntakeError::AlreadySubmitted(existing.id.clone()));
        }
        self.submission = Some(receipt);
        Ok(())
    }
}

// =============================================================================
// Escalation contact
// =============================================================================

/// Human-contact metadata used in handoff messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanContact {
    pub name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<String>,
}

// =============================================================================
// Turn state
// =============================================================================

/// Per-conversation state threaded through every orchestration turn.
///
/// The message history is append-only: callers can push and read, never
/// edit or remove.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TurnState {
    pub conversation_id: Uuid,
    history: Vec<Message>,
    pub record: PartialRecord,
    pub pending_action: TurnAction,
    pub retry_count: u32,
    pub error: Option<String>,
    /// Pending escalation signal, consumed by the Escalation node.
    pub escalation: Option<EscalationReason>,
    /// Set by Error Recovery so the next response apologizes and re-asks.
    pub recovering: bool,
}

impl TurnState {
    pub fn new(conversation_id: Uuid) -> Self {
        Self {
            conversation_id,
            history: Vec::new(),
            record: PartialRecord::new(),
            pending_action: TurnAction::Continue,
            retry_count: 0,
            error: None,
            escalation: None,
            recovering: false,
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn push_message(&mut self, message: Message) {
        self.history.push(message);
    }

    /// The last `n` messages (or fewer), oldest first.
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    /// Messages after the most recent assistant message.
    pub fn since_last_assistant(&self) -> &[Message] {
        let start = self
            .history
            .iter()
            .rposition(|m| m.role == Role::Assistant)
            .map(|i| i + 1)
            .unwrap_or(0);
        &self.history[start..]
    }

    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.history.iter().rev().find(|m| m.role == Role::Assistant)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(id: &str) -> SubmissionReceipt {
        SubmissionReceipt {
            id: id.to_string(),
            status: "received".to_string(),
            submitted_at: Utc::now(),
        }
    }

    // ---- FieldId ----

    #[test]
    fn test_field_id_parse_and_display() {
        let id: FieldId = "claimant.phone".parse().unwrap();
        assert_eq!(id.section(), "claimant");
        assert_eq!(id.name(), "phone");
        assert_eq!(id.to_string(), "claimant.phone");
    }

    #[test]
    fn test_field_id_rejects_malformed() {
        assert!("claimant".parse::<FieldId>().is_err());
        assert!(".phone".parse::<FieldId>().is_err());
        assert!("claimant.".parse::<FieldId>().is_err());
        assert!("a.b.c".parse::<FieldId>().is_err());
    }

    #[test]
    fn test_field_id_serde_as_string() {
        let id = FieldId::new("incident", "date");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"incident.date\"");
        let back: FieldId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<FieldId>("\"nodot\"").is_err());
    }

    // ---- FieldValue ----

    #[test]
    fn test_field_value_addressed() {
        assert!(FieldValue::provided("Jane").is_addressed());
        assert!(FieldValue::ExplicitNone.is_addressed());
        assert!(!FieldValue::provided("   ").is_addressed());
    }

    #[test]
    fn test_field_value_display() {
        assert_eq!(FieldValue::provided("555-0100").to_string(), "555-0100");
        assert_eq!(FieldValue::ExplicitNone.to_string(), "none");
    }

    // ---- PartialRecord ----

    #[test]
    fn test_record_set_and_get() {
        let mut record = PartialRecord::new();
        let id = FieldId::new("claimant", "full_name");
        assert!(record.set(&id, FieldValue::provided("Jane Doe")));
        assert_eq!(record.get(&id), Some(&FieldValue::provided("Jane Doe")));
        assert!(record.is_addressed(&id));
        assert_eq!(record.field_count(), 1);
    }

    #[test]
    fn test_record_set_same_value_is_not_a_change() {
        let mut record = PartialRecord::new();
        let id = FieldId::new("claimant", "full_name");
        record.set(&id, FieldValue::provided("Jane Doe"));
        assert!(!record.set(&id, FieldValue::provided("Jane Doe")));
    }

    #[test]
    fn test_record_blank_write_never_clears() {
        let mut record = PartialRecord::new();
        let id = FieldId::new("claimant", "full_name");
        record.set(&id, FieldValue::provided("Jane Doe"));
        assert!(!record.set(&id, FieldValue::provided("")));
        assert_eq!(record.get(&id), Some(&FieldValue::provided("Jane Doe")));
    }

    #[test]
    fn test_record_fields_iteration_order() {
        let mut record = PartialRecord::new();
        record.set(&FieldId::new("incident", "date"), FieldValue::provided("yesterday"));
        record.set(&FieldId::new("claimant", "phone"), FieldValue::provided("555-0100"));
        let ids: Vec<String> = record.fields().map(|(id, _)| id.to_string()).collect();
        assert_eq!(ids, vec!["claimant.phone", "incident.date"]);
    }

    #[test]
    fn test_record_submitted_at_most_once() {
        let mut record = PartialRecord::new();
        assert!(!record.is_submitted());
        record.attach_submission(receipt("CLM-1")).unwrap();
        assert!(record.is_submitted());
        let err = record.attach_submission(receipt("CLM-2")).unwrap_err();
        assert!(matches!(err, IntakeError::AlreadySubmitted(ref id) if id == "CLM-1"));
        assert_eq!(record.submission().unwrap().id, "CLM-1");
    }

    #[test]
    fn test_record_serde_roundtrip() {
        let mut record = PartialRecord::new();
        record.set(&FieldId::new("injuries", "details"), FieldValue::ExplicitNone);
        let json = serde_json::to_string(&record).unwrap();
        let back: PartialRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    // ---- TurnState ----

    #[test]
    fn test_turn_state_history_append_only_views() {
        let mut state = TurnState::new(Uuid::new_v4());
        state.push_message(Message::assistant("What's your name?"));
        state.push_message(Message::user("Jane Doe", InputModality::Voice));
        assert_eq!(state.history().len(), 2);
        assert_eq!(state.since_last_assistant().len(), 1);
        assert_eq!(state.since_last_assistant()[0].content, "Jane Doe");
        assert_eq!(
            state.last_assistant_message().unwrap().content,
            "What's your name?"
        );
    }

    #[test]
    fn test_turn_state_recent_window() {
        let mut state = TurnState::new(Uuid::new_v4());
        for i in 0..10 {
            state.push_message(Message::user(format!("m{}", i), InputModality::Text));
        }
        let recent = state.recent(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "m7");
        assert_eq!(state.recent(50).len(), 10);
        assert_eq!(state.history().len(), 10);
    }

    #[test]
    fn test_turn_state_since_last_assistant_without_assistant() {
        let mut state = TurnState::new(Uuid::new_v4());
        state.push_message(Message::user("hello", InputModality::Text));
        assert_eq!(state.since_last_assistant().len(), 1);
    }

    #[test]
    fn test_display_impls() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(InputModality::Image.to_string(), "image");
        assert_eq!(TurnAction::Submit.to_string(), "submit");
        assert_eq!(
            EscalationReason::RetriesExhausted.to_string(),
            "retries_exhausted"
        );
    }
}

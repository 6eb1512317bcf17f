//! Record schema: which fields exist, how they are asked for, and which of
//! them must be addressed before a record counts as complete.

use std::collections::HashSet;

use intake_core::{FieldId, IntakeError};
use serde::{Deserialize, Serialize};

use crate::patterns::last_question;

/// Shape of the value a field holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    PersonName,
    Phone,
    Email,
    Date,
    Location,
    /// Free text captured sentence by sentence using cue words.
    Narrative,
    /// An identifier such as a police report number.
    Reference,
}

fn default_true() -> bool {
    true
}

/// One field of the record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub id: FieldId,
    /// Short name used in acknowledgements ("your phone number").
    pub label: String,
    /// Question asked when the field is the next one missing.
    pub prompt: String,
    pub kind: FieldKind,
    #[serde(default = "default_true")]
    pub required: bool,
    /// Counts toward the "at least one genuinely valid field" rule.
    #[serde(default)]
    pub strict: bool,
    /// May be addressed with an explicit "none".
    #[serde(default)]
    pub negatable: bool,
    /// Words that attribute a sentence to this field.
    #[serde(default)]
    pub cues: Vec<String>,
    /// Phrases that mark this field as explicitly none.
    #[serde(default)]
    pub negation_cues: Vec<String>,
}

impl FieldSpec {
    fn new(id: FieldId, label: &str, prompt: &str, kind: FieldKind) -> Self {
        Self {
            id,
            label: label.to_string(),
            prompt: prompt.to_string(),
            kind,
            required: true,
            strict: false,
            negatable: false,
            cues: Vec::new(),
            negation_cues: Vec::new(),
        }
    }

    fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    fn cues(mut self, cues: &[&str]) -> Self {
        self.cues = cues.iter().map(|c| c.to_string()).collect();
        self
    }

    fn negation_cues(mut self, cues: &[&str]) -> Self {
        self.negatable = true;
        self.negation_cues = cues.iter().map(|c| c.to_string()).collect();
        self
    }
}

/// Ordered list of fields. Order is the order missing fields are asked in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordSchema {
    pub fields: Vec<FieldSpec>,
}

impl Default for RecordSchema {
    fn default() -> Self {
        Self::claim_intake()
    }
}

impl RecordSchema {
    /// Build a schema, rejecting empty or duplicate field lists.
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, IntakeError> {
        if fields.is_empty() {
            return Err(IntakeError::Config("schema has no fields".to_string()));
        }
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(&field.id) {
                return Err(IntakeError::Config(format!(
                    "duplicate schema field {}",
                    field.id
                )));
            }
            if field.prompt.trim().is_empty() {
                return Err(IntakeError::Config(format!(
                    "schema field {} has no prompt",
                    field.id
                )));
            }
        }
        Ok(Self { fields })
    }

    /// Parse a schema from TOML (`[[fields]]` tables).
    pub fn from_toml_str(content: &str) -> Result<Self, IntakeError> {
        let parsed: RecordSchema = toml::from_str(content)?;
        Self::new(parsed.fields)
    }

    /// The built-in insurance claim intake schema.
    pub fn claim_intake() -> Self {
        let fields = vec![
            FieldSpec::new(
                FieldId::new("claimant", "full_name"),
                "full name",
                "Could I get your full name?",
                FieldKind::PersonName,
            )
            .strict(),
            FieldSpec::new(
                FieldId::new("claimant", "phone"),
                "phone number",
                "What's the best phone number to reach you?",
                FieldKind::Phone,
            )
            .strict(),
            FieldSpec::new(
                FieldId::new("incident", "date"),
                "date of the incident",
                "When did the incident happen?",
                FieldKind::Date,
            ),
            FieldSpec::new(
                FieldId::new("incident", "location"),
                "location",
                "Where did it happen?",
                FieldKind::Location,
            ),
            FieldSpec::new(
                FieldId::new("incident", "description"),
                "description of what happened",
                "Can you briefly describe what happened?",
                FieldKind::Narrative,
            )
            .cues(&[
                "rear-ended", "rear ended", "hit", "crashed", "collided", "backed into",
                "ran into", "sideswiped", "swerved", "slid", "accident", "collision",
                "t-boned", "ran a red light", "ran the red light",
            ]),
            FieldSpec::new(
                FieldId::new("injuries", "details"),
                "injuries",
                "Was anyone injured?",
                FieldKind::Narrative,
            )
            .cues(&[
                "hurt", "injured", "injury", "injuries", "whiplash", "sprained", "broke",
                "broken", "bruised", "bleeding", "pain", "concussion", "sore",
            ])
            .negation_cues(&[
                "no injuries", "no one was hurt", "nobody was hurt", "no one was injured",
                "nobody was injured", "nobody got hurt", "no one got hurt", "not injured",
                "not hurt", "wasn't hurt", "weren't hurt", "wasn't injured", "weren't injured",
                "everyone is fine", "everyone's fine", "everyone is okay", "we're fine",
                "we are fine", "i'm fine", "i am fine", "i'm okay", "unhurt", "uninjured",
            ]),
            FieldSpec::new(
                FieldId::new("vehicle", "damage"),
                "vehicle damage",
                "What damage was done to the vehicle?",
                FieldKind::Narrative,
            )
            .cues(&[
                "bumper", "fender", "door", "windshield", "hood", "trunk", "dent", "dented",
                "scratch", "scratched", "smashed", "cracked", "totaled", "damage", "damaged",
                "headlight", "taillight", "mirror",
            ])
            .negation_cues(&[
                "no damage", "not damaged", "wasn't damaged", "car is fine", "car's fine",
                "vehicle is fine", "no visible damage",
            ]),
            FieldSpec::new(
                FieldId::new("claimant", "email"),
                "email address",
                "What's your email address?",
                FieldKind::Email,
            )
            .strict()
            .optional(),
            FieldSpec::new(
                FieldId::new("incident", "witnesses"),
                "witnesses",
                "Were there any witnesses?",
                FieldKind::Narrative,
            )
            .optional()
            .cues(&["witness", "witnesses", "saw it", "saw the accident", "bystander"])
            .negation_cues(&["no witnesses", "nobody saw", "no one saw"]),
            FieldSpec::new(
                FieldId::new("incident", "police_report"),
                "police report number",
                "Was a police report filed?",
                FieldKind::Reference,
            )
            .optional()
            .cues(&["police", "report", "case"])
            .negation_cues(&[
                "no police report", "didn't call the police", "did not call the police",
                "police weren't called", "police were not called", "no report",
            ]),
        ];
        Self { fields }
    }

    pub fn field(&self, id: &FieldId) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| &f.id == id)
    }

    /// Required fields in asking order.
    pub fn required(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.required)
    }

    pub fn fields_of_kind(&self, kind: FieldKind) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(move |f| f.kind == kind)
    }

    /// The field an assistant message was asking about, judged from its last
    /// question. Exact prompts win over label mentions.
    pub fn field_asked_in(&self, assistant_text: &str) -> Option<&FieldSpec> {
        let question = last_question(assistant_text)?.to_lowercase();
        self.fields
            .iter()
            .find(|f| question.contains(&f.prompt.to_lowercase()))
            .or_else(|| {
                self.fields
                    .iter()
                    .find(|f| question.contains(&f.label.to_lowercase()))
            })
    }
}

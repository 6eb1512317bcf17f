//! Field extraction from recent conversation text.
//!
//! The [`Extractor`] trait is the seam for swapping in other extraction
//! backends (for example a hosted language model returning JSON). The
//! built-in [`RuleExtractor`] works purely from patterns and cue words.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use intake_core::{FieldId, FieldValue};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ExtractionError, Result};
use crate::patterns::{split_sentences, PatternSet};
use crate::schema::{FieldKind, FieldSpec, RecordSchema};
use crate::window::{ExtractionWindow, UserTurn};

/// One proposed field value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub field: FieldId,
    pub value: FieldValue,
    /// The user corrected an earlier answer.
    #[serde(default)]
    pub explicit: bool,
}

/// Everything an extractor proposes for one window, in chronological order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    #[serde(default)]
    pub updates: Vec<FieldUpdate>,
}

impl Extraction {
    /// Parse extractor output given as JSON.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw.trim())?)
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

/// Proposes field values from a window of recent messages.
#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;

    async fn extract(&self, window: &ExtractionWindow, schema: &RecordSchema) -> Result<Extraction>;
}

/// Pattern and cue-word extractor.
///
/// Each user message is read against the question it answered, so a bare
/// "Jane Doe" after "Could I get your full name?" lands in the name field
/// and a bare "no" after "Was anyone injured?" becomes an explicit none.
pub struct RuleExtractor {
    patterns: &'static PatternSet,
    cues: HashMap<FieldId, Regex>,
    negations: HashMap<FieldId, Regex>,
}

impl RuleExtractor {
    /// Compile cue matchers for every field of the schema.
    pub fn new(schema: &RecordSchema) -> Result<Self> {
        let mut cues = HashMap::new();
        let mut negations = HashMap::new();
        for field in &schema.fields {
            if let Some(re) = phrase_regex(&field.cues)? {
                cues.insert(field.id.clone(), re);
            }
            if let Some(re) = phrase_regex(&field.negation_cues)? {
                negations.insert(field.id.clone(), re);
            }
        }
        Ok(Self {
            patterns: PatternSet::global(),
            cues,
            negations,
        })
    }

    /// Synchronous core of [`Extractor::extract`].
    pub fn extract_window(&self, window: &ExtractionWindow, schema: &RecordSchema) -> Extraction {
        let mut updates = Vec::new();
        for turn in window.user_turns() {
            updates.extend(self.extract_turn(&turn, schema));
        }
        debug!(updates = updates.len(), "Rule extraction complete");
        Extraction { updates }
    }

    fn extract_turn(&self, turn: &UserTurn<'_>, schema: &RecordSchema) -> Vec<FieldUpdate> {
        let text = turn.message.content.trim();
        if text.is_empty() {
            return Vec::new();
        }
        let asked = turn
            .prompt
            .and_then(|p| schema.field_asked_in(&p.content));
        let explicit = self.patterns.is_correction(text)
            || turn
                .prompt
                .map(|p| self.patterns.is_reask(&p.content))
                .unwrap_or(false);

        let mut found: Vec<(FieldId, FieldValue)> = Vec::new();

        // Typed values with a surface pattern.
        for kind in [
            FieldKind::PersonName,
            FieldKind::Phone,
            FieldKind::Email,
            FieldKind::Date,
            FieldKind::Location,
            FieldKind::Reference,
        ] {
            let Some(value) = self.patterns.find(kind, text) else {
                continue;
            };
            let candidates: Vec<&FieldSpec> = schema
                .fields_of_kind(kind)
                .filter(|f| self.cue_allows(f, text))
                .collect();
            if let Some(target) = prefer_asked(&candidates, asked) {
                upsert(&mut found, &target.id, FieldValue::Provided(value));
            }
        }

        // Narrative fields and explicit nones, sentence by sentence.
        let mut narrative: BTreeMap<FieldId, Vec<&str>> = BTreeMap::new();
        for sentence in split_sentences(text) {
            let mut negated = Vec::new();
            for field in schema.fields.iter().filter(|f| f.negatable) {
                if self
                    .negations
                    .get(&field.id)
                    .map(|re| re.is_match(sentence))
                    .unwrap_or(false)
                {
                    negated.push(field.id.clone());
                    upsert(&mut found, &field.id, FieldValue::ExplicitNone);
                }
            }

            let hits: Vec<&FieldSpec> = schema
                .fields_of_kind(FieldKind::Narrative)
                .filter(|f| !negated.contains(&f.id))
                .filter(|f| {
                    self.cues
                        .get(&f.id)
                        .map(|re| re.is_match(sentence))
                        .unwrap_or(false)
                })
                .collect();
            let hits: Vec<&FieldSpec> = match asked {
                Some(a) if hits.len() > 1 && hits.iter().any(|f| f.id == a.id) => {
                    hits.into_iter().filter(|f| f.id == a.id).collect()
                }
                _ => hits,
            };
            for field in hits {
                narrative.entry(field.id.clone()).or_default().push(sentence);
            }
        }
        for (field, sentences) in narrative {
            let negated = found
                .iter()
                .any(|(id, v)| *id == field && *v == FieldValue::ExplicitNone);
            if !negated {
                upsert(&mut found, &field, FieldValue::Provided(sentences.join(". ")));
            }
        }

        // A bare answer to the question that was just asked.
        if found.is_empty() {
            if let Some(field) = asked {
                if field.negatable && self.patterns.is_bare_negation(text) {
                    upsert(&mut found, &field.id, FieldValue::ExplicitNone);
                } else if self.patterns.accepts_bare_answer(field.kind, text) {
                    upsert(&mut found, &field.id, FieldValue::Provided(clean_bare(text)));
                }
            }
        }

        found
            .into_iter()
            .map(|(field, value)| FieldUpdate {
                field,
                value,
                explicit,
            })
            .collect()
    }

    /// Fields with cue words only take a pattern match when a cue is present.
    fn cue_allows(&self, field: &FieldSpec, text: &str) -> bool {
        match self.cues.get(&field.id) {
            Some(re) if field.kind != FieldKind::Narrative => re.is_match(text),
            _ => true,
        }
    }
}

#[async_trait]
impl Extractor for RuleExtractor {
    fn name(&self) -> &str {
        "rules"
    }

    async fn extract(&self, window: &ExtractionWindow, schema: &RecordSchema) -> Result<Extraction> {
        Ok(self.extract_window(window, schema))
    }
}

/// Replace an earlier value for the same field, keeping first-seen order.
fn upsert(found: &mut Vec<(FieldId, FieldValue)>, field: &FieldId, value: FieldValue) {
    match found.iter_mut().find(|(id, _)| id == field) {
        Some(slot) => slot.1 = value,
        None => found.push((field.clone(), value)),
    }
}

/// When several fields could take a value, prefer the one just asked about.
fn prefer_asked<'a>(candidates: &[&'a FieldSpec], asked: Option<&FieldSpec>) -> Option<&'a FieldSpec> {
    asked
        .and_then(|a| candidates.iter().find(|f| f.id == a.id).copied())
        .or_else(|| candidates.first().copied())
}

/// Word-bounded, case-insensitive alternation of the given phrases.
fn phrase_regex(phrases: &[String]) -> Result<Option<Regex>> {
    let escaped: Vec<String> = phrases
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(regex::escape)
        .collect();
    if escaped.is_empty() {
        return Ok(None);
    }
    let re = Regex::new(&format!(r"(?i)\b(?:{})\b", escaped.join("|")))
        .map_err(|e| ExtractionError::Schema(e.to_string()))?;
    Ok(Some(re))
}

fn clean_bare(text: &str) -> String {
    text.trim()
        .trim_end_matches(['.', '!', ','])
        .trim()
        .to_string()
}

//! Regex patterns for pulling typed values out of conversational text.
//!
//! All patterns are compiled once into a [`PatternSet`] and shared through
//! [`PatternSet::global`].

use std::sync::OnceLock;

use regex::Regex;

use crate::schema::FieldKind;

/// Words that end a captured name ("My name is Jane Doe I'm calling...").
const NAME_STOP_WORDS: &[&str] = &[
    "i", "i'm", "i’m", "and", "but", "so", "my", "from", "calling", "here", "the",
];

/// Words that never appear in a bare name answer.
const NOT_A_NAME: &[&str] = &[
    "i", "im", "i'm", "my", "me", "the", "a", "an", "is", "it", "its", "it's", "was", "what",
    "why", "who", "how", "sorry", "yes", "no", "okay", "ok", "sure", "not", "don't", "dont",
    "know", "name", "hello", "hi", "hey", "there", "please", "thanks", "help", "person",
    "human", "agent", "someone", "wait", "um", "uh", "well", "just", "can", "you", "we",
    "they", "he", "she", "this", "that", "happened", "accident", "car",
];

/// Collection of value and marker patterns, compiled once and reused.
pub struct PatternSet {
    person_name: Regex,
    phone: Regex,
    email: Regex,
    date: Regex,
    location: Regex,
    reference: Regex,
    correction: Regex,
    reask: Regex,
    filler: Regex,
    unsure: Regex,
    bare_negation: Regex,
}

impl Default for PatternSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternSet {
    /// Compile every pattern.
    pub fn new() -> Self {
        Self {
            // Case-insensitive lead-in, case-sensitive capitalized name.
            person_name: Regex::new(
                r"(?i:\b(?:i'm|i’m|i am|my name is|my name's|my name’s|name is|this is|call me)\s+)([A-Z][A-Za-z'’-]+(?:\s+[A-Z][A-Za-z'’-]+){0,3})",
            )
            .expect("Invalid person name regex"),

            phone: Regex::new(
                r"(?:\+?1[\s.-]?)?(?:\(\d{3}\)\s?|\d{3}[\s.-])?\d{3}[\s.-]\d{4}\b|\b\d{10}\b",
            )
            .expect("Invalid phone regex"),

            email: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
                .expect("Invalid email regex"),

            date: Regex::new(concat!(
                r"(?i)\b(?:",
                r"\d{4}-\d{2}-\d{2}",
                r"|\d{1,2}/\d{1,2}(?:/\d{2,4})?",
                r"|(?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?\s+\d{1,2}(?:st|nd|rd|th)?(?:,?\s+\d{4})?",
                r"|(?:earlier\s+)?today|tonight|yesterday|last night|this morning|this afternoon|this evening",
                r"|(?:(?:last|this|past|on)\s+)?(?:monday|tuesday|wednesday|thursday|friday|saturday|sunday)",
                r"|(?:last|this|past)\s+(?:week|weekend|month|year)",
                r"|(?:\d+|an?|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|a few|a couple(?:\s+of)?|several)",
                r"\s+(?:minutes?|hours?|days?|weeks?|months?|years?)\s+ago",
                r")\b",
            ))
            .expect("Invalid date regex"),

            location: Regex::new(concat!(
                r"(?i)\b(?:at|on|near)\s+(",
                r"(?:the\s+)?(?:corner|intersection)\s+of\s+[^.,!?]{3,60}",
                r"|[^.,!?]{0,40}?\b(?:street|st|avenue|ave|road|rd|boulevard|blvd|highway|hwy|lane|ln|drive|dr|parkway|freeway|interstate|parking lot|parking garage|mall)\b",
                r"(?:\s+(?:and|&)\s+[^.,!?]{1,30}?\b(?:street|st|avenue|ave|road|rd|\d+(?:st|nd|rd|th)))?",
                r")",
            ))
            .expect("Invalid location regex"),

            reference: Regex::new(
                r"(?i)\b(?:report|case|reference)\s+(?:number|no\.?|#)\s*(?:is\s+)?([a-z0-9][a-z0-9-]{3,})",
            )
            .expect("Invalid reference regex"),

            correction: Regex::new(
                r"(?i)\b(?:actually|correction|i meant|i mean|scratch that|no wait|let me correct|that's wrong|that was wrong|that's not right|change (?:my|the|that|it)|update (?:my|the|that|it))\b",
            )
            .expect("Invalid correction regex"),

            reask: Regex::new(r"(?i)\b(?:again|confirm|double-check|correct)\b")
                .expect("Invalid re-ask regex"),

            filler: Regex::new(
                r"(?i)^\s*(?:yes|yeah|yep|ok|okay|sure|um+|uh+|hmm+|hello|hi|hey|thanks|thank you|right|alright|got it|go ahead)[\s.!?,]*$",
            )
            .expect("Invalid filler regex"),

            unsure: Regex::new(
                r"(?i)^\s*(?:i\s+)?(?:don't|dont|do not|can't|cant|cannot)\s+(?:know|remember|recall|say)\b|^\s*(?:not sure|no idea|i'm not sure|i am not sure)\b",
            )
            .expect("Invalid unsure regex"),

            bare_negation: Regex::new(
                r"(?i)^\s*(?:no|nope|none|nothing|nobody|no one|not really|nah|n/a|there (?:weren't|were not|wasn't|was not) any)(?:[\s,]+(?:none|nothing|nobody|no one|there (?:weren't|wasn't) any))?[\s.!?,]*$",
            )
            .expect("Invalid negation regex"),
        }
    }

    /// Process-wide shared instance.
    pub fn global() -> &'static PatternSet {
        static PATTERNS: OnceLock<PatternSet> = OnceLock::new();
        PATTERNS.get_or_init(PatternSet::new)
    }

    /// Find the first value of the given kind anywhere in `text`.
    ///
    /// Narrative kinds have no surface pattern and always return `None`.
    pub fn find(&self, kind: FieldKind, text: &str) -> Option<String> {
        match kind {
            FieldKind::PersonName => self
                .person_name
                .captures(text)
                .and_then(|c| c.get(1))
                .map(|m| trim_name(m.as_str()))
                .filter(|name| !name.is_empty()),
            FieldKind::Phone => self.phone.find(text).map(|m| m.as_str().trim().to_string()),
            FieldKind::Email => self.email.find(text).map(|m| m.as_str().to_string()),
            FieldKind::Date => self.date.find(text).map(|m| m.as_str().to_string()),
            FieldKind::Location => self
                .location
                .captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string()),
            FieldKind::Reference => self
                .reference
                .captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_uppercase()),
            FieldKind::Narrative => None,
        }
    }

    /// Whether `value` is genuinely valid data for the kind.
    pub fn validate(&self, kind: FieldKind, value: &str) -> bool {
        let value = value.trim();
        match kind {
            FieldKind::PersonName => {
                let words: Vec<&str> = value.split_whitespace().collect();
                words.len() >= 2
                    && value.len() <= 80
                    && words.iter().all(|w| {
                        w.chars().any(char::is_alphabetic)
                            && w.chars()
                                .all(|c| c.is_alphabetic() || matches!(c, '\'' | '’' | '-' | '.'))
                    })
            }
            FieldKind::Phone => {
                let digits = value.chars().filter(char::is_ascii_digit).count();
                (7..=15).contains(&digits)
                    && value
                        .chars()
                        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '(' | ')' | '-' | '.' | '+'))
            }
            FieldKind::Email => self
                .email
                .find(value)
                .map(|m| m.start() == 0 && m.end() == value.len())
                .unwrap_or(false),
            FieldKind::Date => self.date.is_match(value),
            FieldKind::Location | FieldKind::Narrative => {
                value.chars().count() >= 3 && value.chars().any(char::is_alphabetic)
            }
            FieldKind::Reference => value.chars().filter(char::is_ascii_alphanumeric).count() >= 3,
        }
    }

    /// Whether the utterance reads as a correction of something said earlier.
    pub fn is_correction(&self, text: &str) -> bool {
        self.correction.is_match(text)
    }

    /// Whether an assistant message's last question asks the user to repeat
    /// or confirm something already given.
    pub fn is_reask(&self, assistant_text: &str) -> bool {
        last_question(assistant_text)
            .map(|q| self.reask.is_match(q))
            .unwrap_or(false)
    }

    /// Acknowledgements and hesitations that carry no field content.
    pub fn is_filler(&self, text: &str) -> bool {
        text.trim().is_empty() || self.filler.is_match(text)
    }

    /// A whole-utterance "no" / "none" / "nobody".
    pub fn is_bare_negation(&self, text: &str) -> bool {
        self.bare_negation.is_match(text)
    }

    /// Whether an utterance with no recognizable pattern can stand as the
    /// answer to a question about a field of this kind.
    pub fn accepts_bare_answer(&self, kind: FieldKind, text: &str) -> bool {
        let text = text.trim();
        if self.is_filler(text)
            || self.is_bare_negation(text)
            || self.unsure.is_match(text)
            || text.ends_with('?')
        {
            return false;
        }
        match kind {
            FieldKind::PersonName => {
                let words: Vec<&str> = text.split_whitespace().collect();
                (1..=4).contains(&words.len())
                    && words.iter().all(|w| {
                        let w = w.trim_matches(|c: char| matches!(c, '.' | ',' | '!'));
                        !w.is_empty()
                            && w.chars().all(|c| c.is_alphabetic() || matches!(c, '\'' | '’' | '-'))
                            && !NOT_A_NAME.contains(&w.to_lowercase().as_str())
                    })
            }
            FieldKind::Location => text.chars().count() >= 3 && text.len() <= 160,
            // Content is enough; validity is judged separately.
            FieldKind::Date => {
                text.split_whitespace().count() <= 12 && text.chars().any(char::is_alphanumeric)
            }
            FieldKind::Narrative => text.chars().any(char::is_alphabetic),
            FieldKind::Phone => text.chars().filter(char::is_ascii_digit).count() >= 7,
            FieldKind::Email | FieldKind::Reference => false,
        }
    }
}

/// Drop anything after the first stop word in a captured name.
fn trim_name(raw: &str) -> String {
    raw.split_whitespace()
        .take_while(|w| !NAME_STOP_WORDS.contains(&w.to_lowercase().as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split text into sentences on `.`, `!`, or `?` followed by whitespace or
/// the end of input. Terminators are dropped and pieces trimmed.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().map(|(_, n)| n.is_whitespace()).unwrap_or(true);
            if at_boundary {
                let piece = text[start..i].trim();
                if !piece.is_empty() {
                    sentences.push(piece);
                }
                start = i + c.len_utf8();
            }
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// The last question in an assistant message, or its last sentence when
/// nothing ends in `?`.
pub fn last_question(text: &str) -> Option<&str> {
    let text = text.trim();
    if let Some(end) = text.rfind('?') {
        let head = &text[..end];
        let start = head
            .rfind(['.', '!', '?'])
            .map(|i| i + 1)
            .unwrap_or(0);
        let question = text[start..=end].trim();
        return (!question.is_empty()).then_some(question);
    }
    split_sentences(text).last().copied()
}

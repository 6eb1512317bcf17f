//! Escalation-intent detection.
//!
//! This is the only place a user utterance is checked for a request to talk
//! to a person. The Intake node runs it once per turn and stores the result
//! in the turn state; later nodes read that signal instead of re-detecting.

use regex::Regex;

/// Detects requests to be handed to a human.
pub struct EscalationDetector {
    request: Regex,
    declined: Regex,
}

impl Default for EscalationDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl EscalationDetector {
    pub fn new() -> Self {
        Self {
            request: Regex::new(concat!(
                r"(?i)\b(?:",
                r"(?:talk|speak|chat)\s+(?:to|with)\s+(?:a\s+|an\s+|some\s+|the\s+|your\s+)?(?:real\s+|live\s+|actual\s+)?(?:person|human|agent|representative|rep|someone|somebody|operator|adjuster|manager|supervisor)",
                r"|(?:transfer|connect)\s+me(?:\s+(?:to|with)\s+(?:a\s+)?(?:person|human|agent|someone|representative))?",
                r"|real\s+person|live\s+agent|human\s+agent|customer\s+service|operator",
                r")\b",
            ))
            .expect("Invalid escalation regex"),
            declined: Regex::new(
                r"(?i)\b(?:don'?t|do not|no need to|not)\s+(?:want\s+to\s+|need\s+to\s+|have\s+to\s+)?(?:talk|speak|chat|transfer|connect)\b",
            )
            .expect("Invalid declined-escalation regex"),
        }
    }

    /// Whether the utterance asks for a human.
    pub fn is_escalation_request(&self, text: &str) -> bool {
        self.request.is_match(text) && !self.declined.is_match(text)
    }
}

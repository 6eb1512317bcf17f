//! Duplicate suppression for finalized transcripts.
//!
//! Speech channels occasionally deliver the same finalized item twice, or
//! re-finalize identical text under a new item id. Either would run a second
//! turn for one utterance.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

/// Item ids remembered per session.
const MAX_REMEMBERED_ITEMS: usize = 512;

pub struct TranscriptGate {
    window: Duration,
    seen: HashSet<String>,
    seen_order: VecDeque<String>,
    recent: VecDeque<(String, Instant)>,
}

impl TranscriptGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashSet::new(),
            seen_order: VecDeque::new(),
            recent: VecDeque::new(),
        }
    }

    /// Returns `true` if the transcript should become a turn.
    ///
    /// Rejects empty text, an item id already admitted, and text identical
    /// (ignoring case and punctuation) to one admitted within the window.
    pub fn admit(&mut self, item_id: &str, text: &str, now: Instant) -> bool {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return false;
        }
        if self.seen.contains(item_id) {
            return false;
        }

        let window = self.window;
        self.recent
            .retain(|(_, at)| now.saturating_duration_since(*at) < window);
        if self.recent.iter().any(|(seen, _)| *seen == normalized) {
            return false;
        }

        self.remember(item_id);
        self.recent.push_back((normalized, now));
        true
    }

    fn remember(&mut self, item_id: &str) {
        if self.seen_order.len() >= MAX_REMEMBERED_ITEMS {
            if let Some(oldest) = self.seen_order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(item_id.to_string());
        self.seen_order.push_back(item_id.to_string());
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> TranscriptGate {
        TranscriptGate::new(Duration::from_secs(2))
    }

    #[test]
    fn test_admits_fresh_transcript() {
        let mut gate = gate();
        assert!(gate.admit("item_1", "I'm Jane Doe", Instant::now()));
    }

    #[test]
    fn test_rejects_empty() {
        let mut gate = gate();
        let now = Instant::now();
        assert!(!gate.admit("item_1", "", now));
        assert!(!gate.admit("item_2", "  ...  ", now));
    }

    #[test]
    fn test_empty_item_can_be_finalized_again_with_text() {
        let mut gate = gate();
        let now = Instant::now();
        assert!(!gate.admit("item_1", "", now));
        assert!(gate.admit("item_1", "I'm Jane Doe", now + Duration::from_millis(100)));
        assert!(!gate.admit("item_1", "I'm Jane Doe", now + Duration::from_millis(200)));
        assert!(!gate.admit("item_1", "Jane Doe", now + Duration::from_secs(10)));
    }

    #[test]
    fn test_rejects_repeated_item() {
        let mut gate = gate();
        let now = Instant::now();
        assert!(gate.admit("item_1", "Yesterday.", now));
        assert!(!gate.admit("item_1", "Yesterday.", now + Duration::from_secs(10)));
    }

    #[test]
    fn test_rejects_same_text_within_window() {
        let mut gate = gate();
        let now = Instant::now();
        assert!(gate.admit("item_1", "I'm Jane Doe.", now));
        assert!(!gate.admit("item_2", "i'm jane doe", now + Duration::from_millis(500)));
    }

    #[test]
    fn test_same_text_after_window_is_admitted() {
        let mut gate = gate();
        let now = Instant::now();
        assert!(gate.admit("item_1", "Yes", now));
        assert!(gate.admit("item_2", "Yes", now + Duration::from_secs(3)));
    }

    #[test]
    fn test_item_memory_is_bounded() {
        let mut gate = TranscriptGate::new(Duration::ZERO);
        let now = Instant::now();
        for i in 0..(MAX_REMEMBERED_ITEMS + 10) {
            assert!(gate.admit(&format!("item_{}", i), &format!("utterance {}", i), now));
        }
        assert_eq!(gate.seen.len(), MAX_REMEMBERED_ITEMS);
        // The oldest ids were forgotten.
        assert!(gate.admit("item_0", "utterance zero", now));
    }
}

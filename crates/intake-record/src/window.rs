use intake_core::{Message, Role};

/// The recent messages an extraction pass works from.
#[derive(Clone, Debug, Default)]
pub struct ExtractionWindow {
    messages: Vec<Message>,
    user_compact: String,
    user_tokens: Vec<String>,
}

/// A user message together with the assistant message it answered.
#[derive(Clone, Copy, Debug)]
pub struct UserTurn<'a> {
    pub message: &'a Message,
    pub prompt: Option<&'a Message>,
}

impl ExtractionWindow {
    pub fn new(messages: Vec<Message>) -> Self {
        let user_text = messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            user_compact: compact(&user_text),
            user_tokens: tokens(&user_text),
            messages,
        }
    }

    pub fn has_user_messages(&self) -> bool {
        self.messages.iter().any(Message::is_user)
    }

    /// User messages in chronological order, each paired with the closest
    /// preceding assistant message.
    pub fn user_turns(&self) -> Vec<UserTurn<'_>> {
        let mut prompt = None;
        let mut turns = Vec::new();
        for message in &self.messages {
            match message.role {
                Role::Assistant => prompt = Some(message),
                Role::User => turns.push(UserTurn { message, prompt }),
            }
        }
        turns
    }

    /// Whether `value` can be traced back to something the user said in
    /// this window.
    ///
    /// Accepts either a case and punctuation insensitive substring, or a
    /// value whose every word appears in the user's messages.
    pub fn grounds(&self, value: &str) -> bool {
        let needle = compact(value);
        if needle.is_empty() {
            return false;
        }
        if self.user_compact.contains(&needle) {
            return true;
        }
        tokens(value)
            .iter()
            .all(|t| self.user_tokens.iter().any(|u| u == t))
    }
}

fn compact(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_core::InputModality;

    fn window(msgs: &[(&str, bool)]) -> ExtractionWindow {
        ExtractionWindow::new(
            msgs.iter()
                .map(|(text, user)| {
                    if *user {
                        Message::user(*text, InputModality::Voice)
                    } else {
                        Message::assistant(*text)
                    }
                })
                .collect(),
        )
    }

    #[test]
    fn test_user_turns_pair_with_prompt() {
        let w = window(&[
            ("hello", true),
            ("Could I get your full name?", false),
            ("Jane Doe", true),
            ("and my phone is 555-0100", true),
        ]);
        let turns = w.user_turns();
        assert_eq!(turns.len(), 3);
        assert!(turns[0].prompt.is_none());
        assert_eq!(turns[1].prompt.unwrap().content, "Could I get your full name?");
        assert_eq!(turns[2].prompt.unwrap().content, "Could I get your full name?");
    }

    #[test]
    fn test_grounding() {
        let w = window(&[
            ("What's your phone?", false),
            ("It's 555-0100. I hurt my neck. My wife has whiplash.", true),
        ]);
        assert!(w.grounds("555-0100"));
        assert!(w.grounds("5550100"));
        assert!(w.grounds("I hurt my neck. My wife has whiplash"));
        assert!(w.grounds("my neck"));
        assert!(!w.grounds("broken arm"));
        assert!(!w.grounds("   "));
    }

    #[test]
    fn test_assistant_text_does_not_ground() {
        let w = window(&[("Could I get your full name?", false), ("sure", true)]);
        assert!(!w.grounds("full name"));
        assert!(w.has_user_messages());
        assert!(!window(&[("Hi", false)]).has_user_messages());
    }
}

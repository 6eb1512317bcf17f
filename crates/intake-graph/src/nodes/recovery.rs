use intake_core::TurnState;
use tracing::warn;

/// Counts the error, clears it, and flags the next reply to apologize.
pub struct RecoveryNode;

impl RecoveryNode {
    pub fn run(&self, state: &mut TurnState) {
        if let Some(error) = state.error.take() {
            state.retry_count += 1;
            state.recovering = true;
            warn!(
                conversation_id = %state.conversation_id,
                retry_count = state.retry_count,
                error = %error,
                "Recovering from turn error"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_counts_and_clears_error() {
        let mut state = TurnState::new(Uuid::new_v4());
        state.error = Some("Utterance is empty".to_string());
        RecoveryNode.run(&mut state);
        assert!(state.error.is_none());
        assert_eq!(state.retry_count, 1);
        assert!(state.recovering);
    }

    #[test]
    fn test_no_error_is_a_no_op() {
        let mut state = TurnState::new(Uuid::new_v4());
        RecoveryNode.run(&mut state);
        assert_eq!(state.retry_count, 0);
        assert!(!state.recovering);
    }
}

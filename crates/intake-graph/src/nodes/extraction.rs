use intake_core::TurnState;
use intake_record::RecordMerger;
use tracing::debug;

use crate::nodes::TurnContext;

/// Merges the recent conversation window into the partial record.
pub struct ExtractionNode {
    merger: RecordMerger,
    context_window: usize,
}

impl ExtractionNode {
    pub fn new(merger: RecordMerger, context_window: usize) -> Self {
        Self {
            merger,
            context_window,
        }
    }

    /// Never fails; the merger keeps the existing record on any extractor
    /// problem.
    pub async fn run(&self, state: &mut TurnState, ctx: &mut TurnContext) {
        let outcome = self
            .merger
            .merge(&state.record, state.recent(self.context_window))
            .await;
        if !outcome.changed.is_empty() {
            debug!(
                conversation_id = %state.conversation_id,
                changed = outcome.changed.len(),
                "Record updated"
            );
        }
        state.record = outcome.record;
        ctx.changed = outcome.changed;
    }
}

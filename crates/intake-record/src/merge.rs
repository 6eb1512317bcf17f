//! Merging extracted values into the partial record.
//!
//! A merge never loses information: values must be grounded in what the user
//! actually said, an addressed field only changes on an explicit correction,
//! and any extractor failure leaves the record exactly as it was.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use intake_core::{FieldId, FieldValue, Message, PartialRecord};
use tracing::{debug, warn};

use crate::error::ExtractionError;
use crate::extract::{Extraction, Extractor};
use crate::patterns::PatternSet;
use crate::schema::RecordSchema;
use crate::window::ExtractionWindow;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// Result of one merge: the new record and the fields whose value changed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergeOutcome {
    pub record: PartialRecord,
    pub changed: BTreeSet<FieldId>,
}

impl MergeOutcome {
    fn unchanged(record: &PartialRecord) -> Self {
        Self {
            record: record.clone(),
            changed: BTreeSet::new(),
        }
    }
}

/// Runs an [`Extractor`] over recent messages and folds its output into the
/// record.
pub struct RecordMerger {
    extractor: Arc<dyn Extractor>,
    schema: Arc<RecordSchema>,
    timeout: Duration,
}

impl RecordMerger {
    pub fn new(extractor: Arc<dyn Extractor>, schema: Arc<RecordSchema>) -> Self {
        Self {
            extractor,
            schema,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    /// Merge what the user said in `recent` into `existing`.
    ///
    /// Never fails: extractor errors, timeouts, and unusable output all
    /// return the existing record with no changes.
    pub async fn merge(&self, existing: &PartialRecord, recent: &[Message]) -> MergeOutcome {
        if existing.is_submitted() {
            debug!("Record already submitted; skipping merge");
            return MergeOutcome::unchanged(existing);
        }

        let window = ExtractionWindow::new(recent.to_vec());
        if !window.has_user_messages() {
            return MergeOutcome::unchanged(existing);
        }

        let result = tokio::time::timeout(self.timeout, self.extractor.extract(&window, &self.schema))
            .await
            .unwrap_or_else(|_| Err(ExtractionError::Timeout(self.timeout.as_millis() as u64)));
        let extraction = match result {
            Ok(extraction) => extraction,
            Err(e) => {
                warn!(extractor = self.extractor.name(), error = %e, "Extraction failed, keeping record");
                return MergeOutcome::unchanged(existing);
            }
        };

        apply_extraction(existing, &extraction, &window, &self.schema)
    }
}

/// Fold an extraction into a copy of `existing`.
///
/// Updates apply in order. An update is dropped when its field is not in the
/// schema, when its text is not grounded in the window, or when it would
/// overwrite an addressed field without being an explicit, valid correction.
pub fn apply_extraction(
    existing: &PartialRecord,
    extraction: &Extraction,
    window: &ExtractionWindow,
    schema: &RecordSchema,
) -> MergeOutcome {
    if existing.is_submitted() {
        return MergeOutcome::unchanged(existing);
    }

    let patterns = PatternSet::global();
    let mut record = existing.clone();
    let mut usable = 0usize;

    for update in &extraction.updates {
        let Some(spec) = schema.field(&update.field) else {
            warn!(field = %update.field, "Dropping update for unknown field");
            continue;
        };

        match &update.value {
            FieldValue::ExplicitNone if !spec.negatable => {
                debug!(field = %update.field, "Dropping explicit none for non-negatable field");
                continue;
            }
            FieldValue::Provided(text) if !window.grounds(text) => {
                warn!(field = %update.field, "Dropping ungrounded value");
                continue;
            }
            _ => {}
        }
        usable += 1;

        if let Some(current) = record.get(&update.field) {
            if current.is_addressed() && *current != update.value {
                let valid = match &update.value {
                    FieldValue::Provided(text) => patterns.validate(spec.kind, text),
                    FieldValue::ExplicitNone => true,
                };
                if !(update.explicit && valid) {
                    debug!(field = %update.field, "Keeping previously captured value");
                    continue;
                }
            }
        }

        record.set(&update.field, update.value.clone());
    }

    if !extraction.is_empty() && usable == 0 {
        warn!(
            proposed = extraction.updates.len(),
            "Extraction produced no usable updates"
        );
    }

    let changed = record
        .fields()
        .filter(|(id, value)| existing.get(id) != Some(*value))
        .map(|(id, _)| id)
        .collect();

    MergeOutcome { record, changed }
}

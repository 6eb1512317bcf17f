use intake_core::{FieldId, PartialRecord};
use serde::{Deserialize, Serialize};

use crate::patterns::PatternSet;
use crate::schema::RecordSchema;

/// Whether a record is ready to submit, and what it still lacks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completeness {
    pub is_complete: bool,
    /// Required fields not yet addressed, in asking order.
    pub missing: Vec<FieldId>,
}

impl Completeness {
    pub fn next_missing(&self) -> Option<&FieldId> {
        self.missing.first()
    }
}

/// Evaluate a record against the schema.
///
/// Complete means every required field is addressed (an explicit none counts)
/// and at least one strict field holds a value that passes validation. A
/// schema without strict fields only needs the required ones.
pub fn check_completeness(record: &PartialRecord, schema: &RecordSchema) -> Completeness {
    let missing: Vec<FieldId> = schema
        .required()
        .filter(|f| !record.is_addressed(&f.id))
        .map(|f| f.id.clone())
        .collect();

    let patterns = PatternSet::global();
    let mut strict = schema.fields.iter().filter(|f| f.strict).peekable();
    let has_valid_strict = strict.peek().is_none()
        || strict.any(|f| {
            record
                .get(&f.id)
                .and_then(|v| v.as_text())
                .map(|text| patterns.validate(f.kind, text))
                .unwrap_or(false)
        });

    Completeness {
        is_complete: missing.is_empty() && has_valid_strict,
        missing,
    }
}

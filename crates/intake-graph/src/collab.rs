//! External collaborators of the graph: where finished records go, and who
//! to hand the user to.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use intake_core::{HumanContact, PartialRecord, SubmissionReceipt};

use crate::error::SinkError;

/// Accepts a completed record and returns its reference.
#[async_trait]
pub trait SubmissionSink: Send + Sync {
    async fn submit(&self, record: &PartialRecord) -> Result<SubmissionReceipt, SinkError>;
}

/// Supplies the human contact used in handoff messages.
#[async_trait]
pub trait ContactLookup: Send + Sync {
    async fn lookup(&self) -> Result<HumanContact, SinkError>;
}

/// Run a collaborator call under a deadline. An elapsed deadline becomes
/// [`SinkError::Timeout`].
pub(crate) async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, SinkError>
where
    F: Future<Output = Result<T, SinkError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(SinkError::Timeout(timeout.as_millis() as u64)),
    }
}

/// Always returns the same contact.
pub struct StaticContactLookup {
    contact: HumanContact,
}

impl StaticContactLookup {
    pub fn new(contact: HumanContact) -> Self {
        Self { contact }
    }
}

#[async_trait]
impl ContactLookup for StaticContactLookup {
    async fn lookup(&self) -> Result<HumanContact, SinkError> {
        Ok(self.contact.clone())
    }
}

/// Sink that accepts every record, logs it, and issues sequential
/// `CLM-` references. Used by the console app.
pub struct LoggingSubmissionSink {
    next: AtomicU64,
}

impl Default for LoggingSubmissionSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingSubmissionSink {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl SubmissionSink for LoggingSubmissionSink {
    async fn submit(&self, record: &PartialRecord) -> Result<SubmissionReceipt, SinkError> {
        let body = serde_json::to_string(record).map_err(|e| SinkError::Rejected(e.to_string()))?;
        let id = format!("CLM-{:06}", self.next.fetch_add(1, Ordering::SeqCst));
        tracing::info!(submission_id = %id, fields = record.field_count(), record = %body, "Record submitted");
        Ok(SubmissionReceipt {
            id,
            status: "received".to_string(),
            submitted_at: Utc::now(),
        })
    }
}

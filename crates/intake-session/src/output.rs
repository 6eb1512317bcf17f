//! Tracks the assistant response currently being spoken.

use uuid::Uuid;

/// At most one response is audible at a time. Chunks for any other response
/// (cancelled, superseded, or finished) are dropped.
#[derive(Debug, Default)]
pub struct OutputStream {
    active: Option<Uuid>,
}

impl OutputStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start speaking `response_id`. Returns the response it replaces, if any,
    /// so the caller can cancel it on the channel.
    pub fn begin(&mut self, response_id: Uuid) -> Option<Uuid> {
        self.active.replace(response_id)
    }

    pub fn accepts(&self, response_id: Uuid) -> bool {
        self.active == Some(response_id)
    }

    /// Mark `response_id` finished. Returns `false` for a stale response.
    pub fn complete(&mut self, response_id: Uuid) -> bool {
        if self.accepts(response_id) {
            self.active = None;
            true
        } else {
            false
        }
    }

    /// Cut off the active response. Returns it the first time; `None` after.
    pub fn cancel(&mut self) -> Option<Uuid> {
        self.active.take()
    }
}

//! Event Batch Validation
//! Mission: Reject malformed batches before any event touches the log

use super::models::{EventBatch, EventEnvelope};

pub const ALLOWED_EVENT_CATEGORIES: [&str; 5] =
    ["system", "security", "process", "file", "network"];

/// Raised when event payload validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventValidationError {
    pub reason: &'static str,
}

impl EventValidationError {
    pub fn new(reason: &'static str) -> Self {
        Self { reason }
    }
}

impl std::fmt::Display for EventValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl std::error::Error for EventValidationError {}

fn validate_event_payload(event: &EventEnvelope) -> Result<(), EventValidationError> {
    if !ALLOWED_EVENT_CATEGORIES.contains(&event.event_category.as_str()) {
        return Err(EventValidationError::new("unsupported_event_category"));
    }
    let payload = event
        .payload
        .as_object()
        .ok_or_else(|| EventValidationError::new("payload_not_json"))?;
    if payload.is_empty() {
        return Err(EventValidationError::new("payload_required"));
    }
    Ok(())
}

/// Validate a full batch against schema, size, and per-event shape.
pub fn validate_batch(batch: &EventBatch, event_limit: usize) -> Result<(), EventValidationError> {
    if batch.schema_version != "v1" {
        return Err(EventValidationError::new("schema_version_unsupported"));
    }
    if batch.events.is_empty() {
        return Err(EventValidationError::new("events_required"));
    }
    if batch.events.len() > event_limit {
        return Err(EventValidationError::new("event_batch_too_large"));
    }
    for event in &batch.events {
        validate_event_payload(event)?;
    }
    Ok(())
}

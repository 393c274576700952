//! Signed event ingestion with ordering, drift, and replay guarantees.

pub mod api;
pub mod models;
pub mod store;
pub mod validate;

pub use models::{
    EventBatch, EventClockDrift, EventEnvelope, EventGapReport, EventIngestLogRecord,
    EventIngestResponse, EventRecord,
};
pub use store::EventStore;
pub use validate::{validate_batch, EventValidationError};

//! Telemetry ingestion: taxonomy validation, baselines, anomaly detection.

pub mod api;
pub mod baseline;
pub mod models;
pub mod store;
pub mod taxonomy;

pub use baseline::BaselineState;
pub use models::{
    TelemetryAnomaly, TelemetryBaseline, TelemetryMetricSummary, TelemetryPayload, TelemetrySample,
    TelemetrySeries, TelemetrySeriesPoint,
};
pub use store::TelemetryStore;
pub use taxonomy::{metric_unit, normalise_samples, TelemetryValidationError};

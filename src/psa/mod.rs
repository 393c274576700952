//! PSA workflow: priority, SLA, ticket lifecycle, evidence linkage.

pub mod api;
pub mod engine;
pub mod evidence;
pub mod models;
pub mod store;

pub use engine::{compute_priority, compute_sla_deadline};
pub use evidence::build_evidence_hash;
pub use models::{
    ActionRecord, ActionType, AssetCriticality, EvidenceRecord, ExposureLevel, PriorityLevel,
    SourceType, TicketRecord, TicketStatus, TimeSensitivity,
};
pub use store::PsaStore;

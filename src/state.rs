//! Application State
//! Mission: Construct every store once at startup and inject it everywhere
//!
//! No module-level singletons: each registry is built here, owned by the
//! state, and handed to request handlers through axum's `State` extractor.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::Settings;
use crate::detection::store::DetectionStores;
use crate::detection::rules::default_rules;
use crate::events::store::EventStore;
use crate::identity::agents::{AgentRegistry, HeartbeatStore};
use crate::identity::certificates::CertificateRegistry;
use crate::identity::tasks::TaskStore;
use crate::inventory::store::InventoryStore;
use crate::patch::store::PatchStore;
use crate::psa::store::PsaStore;
use crate::telemetry::store::TelemetryStore;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub trust: Arc<CertificateRegistry>,
    pub agents: Arc<AgentRegistry>,
    pub heartbeats: Arc<HeartbeatStore>,
    pub tasks: Arc<TaskStore>,
    pub inventory: Arc<InventoryStore>,
    pub telemetry: Arc<TelemetryStore>,
    pub events: Arc<EventStore>,
    pub patch: Arc<PatchStore>,
    pub detection: Arc<DetectionStores>,
    pub psa: Arc<PsaStore>,
}

impl AppState {
    /// Build all stores against the configured database path.
    pub fn new(settings: Settings) -> Result<Self> {
        if let Some(parent) = Path::new(&settings.database_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create database directory")?;
            }
        }

        let inventory = InventoryStore::new(&settings.database_path)?;
        let telemetry = TelemetryStore::new(&settings.database_path)?;
        let events = EventStore::new(&settings.database_path)?;

        let detection = DetectionStores::new(
            settings.detection.retention_events,
            settings.detection.retention_findings,
        );
        for rule in default_rules() {
            detection.rules.add(rule);
        }

        info!(
            database = %settings.database_path,
            service = %settings.service_name,
            "application state initialised"
        );

        Ok(Self {
            settings: Arc::new(settings),
            trust: Arc::new(CertificateRegistry::new()),
            agents: Arc::new(AgentRegistry::new()),
            heartbeats: Arc::new(HeartbeatStore::new(1000)),
            tasks: Arc::new(TaskStore::new()),
            inventory: Arc::new(inventory),
            telemetry: Arc::new(telemetry),
            events: Arc::new(events),
            patch: Arc::new(PatchStore::new()),
            detection: Arc::new(detection),
            psa: Arc::new(PsaStore::new()),
        })
    }
}

//! Sentra Backend
//! Mission: Multi-tenant endpoint security and compliance core
//!
//! One binary hosts the five hardened subsystems behind a single gateway:
//! transport identity, inventory/telemetry/event ingestion, patch
//! orchestration, detection & correlation, and the PSA ticket workflow.

use anyhow::{Context, Result};
use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sentra_backend::config::Settings;
use sentra_backend::gateway::request_logging;
use sentra_backend::state::AppState;
use sentra_backend::{detection, events, identity, inventory, patch, psa, telemetry};

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Identity: check-in, certificates, presence
        .route("/hello", post(identity::api::hello))
        .route("/certificates/issue", post(identity::api::issue_certificate))
        .route("/certificates/revoke", post(identity::api::revoke_certificate))
        .route("/agents", get(identity::api::list_agents))
        .route("/agents/presence", get(identity::api::list_agent_presence))
        .route("/heartbeats", get(identity::api::list_heartbeats))
        // Remote tasks
        .route("/tasks", post(identity::api::create_task))
        .route("/tasks/poll", post(identity::api::poll_tasks))
        .route("/tasks/:task_id/start", post(identity::api::start_task))
        .route("/tasks/:task_id/results", post(identity::api::record_task_result))
        // Inventory
        .route("/inventory/hardware", post(inventory::api::ingest_hardware))
        .route("/inventory/os", post(inventory::api::ingest_os))
        .route("/inventory/software", post(inventory::api::ingest_software))
        .route("/inventory/users", post(inventory::api::ingest_users))
        .route("/inventory/groups", post(inventory::api::ingest_groups))
        .route("/inventory/assets", get(inventory::api::list_assets))
        .route("/inventory/assets/overview", get(inventory::api::list_asset_overviews))
        .route("/inventory/:asset_id", get(inventory::api::get_inventory))
        .route("/inventory/:asset_id/state", get(inventory::api::get_inventory_state))
        // Telemetry
        .route("/telemetry", post(telemetry::api::ingest_telemetry))
        .route("/telemetry/:asset_id/metrics", get(telemetry::api::list_telemetry_metrics))
        .route("/telemetry/:asset_id/series", get(telemetry::api::get_telemetry_series))
        .route("/telemetry/:asset_id/baselines", get(telemetry::api::list_telemetry_baselines))
        .route("/telemetry/:asset_id/anomalies", get(telemetry::api::list_telemetry_anomalies))
        // Events
        .route("/events", post(events::api::ingest_events))
        .route("/events/recent", get(events::api::list_recent_events))
        .route("/events/ingest-log", get(events::api::list_event_ingest_log))
        .route("/events/assets/:asset_id/timeline", get(events::api::get_asset_timeline))
        .route("/events/assets/:asset_id/gaps", get(events::api::list_event_gaps))
        .route("/events/assets/:asset_id/clock-drifts", get(events::api::list_event_drifts))
        // Patch orchestration
        .route("/detections", post(patch::api::record_detection))
        .route("/detections/:detection_id", get(patch::api::get_detection))
        .route("/policies", post(patch::api::record_policy))
        .route("/policies/:policy_id", get(patch::api::get_policy))
        .route("/plans", post(patch::api::create_plan))
        .route("/plans/:plan_id", get(patch::api::get_plan))
        .route("/plans/:plan_id/results", post(patch::api::record_results))
        .route("/plans/:plan_id/tasks", get(patch::api::get_task_manifest))
        .route("/evidence/:plan_id", get(patch::api::get_evidence))
        .route("/assets/patch-state", get(patch::api::get_asset_patch_state))
        // Detection & correlation
        .route("/rules", get(detection::api::list_rules).post(detection::api::add_rule))
        .route("/detection/events", post(detection::api::ingest_detection_event))
        .route("/findings", get(detection::api::list_findings))
        .route("/findings/:finding_id", get(detection::api::get_finding))
        .route("/findings/:finding_id/dismiss", post(detection::api::dismiss_finding))
        .route("/suppressions", get(detection::api::list_suppressions))
        // PSA workflow
        .route("/intake", post(psa::api::intake_ticket))
        .route("/intake/resolve", post(psa::api::resolve_ticket))
        .route("/tickets", get(psa::api::list_tickets))
        .route("/tickets/:ticket_id", get(psa::api::get_ticket))
        .route("/tickets/:ticket_id/actions", get(psa::api::list_actions).post(psa::api::record_action))
        .route("/tickets/:ticket_id/evidence", get(psa::api::list_evidence))
        .layer(axum_mw::from_fn(request_logging))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env();
    let bind_address = settings.bind_address.clone();
    let service_name = settings.service_name.clone();
    let state = AppState::new(settings).context("Failed to initialise application state")?;

    let router = build_router(state);
    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;

    info!(service = %service_name, address = %bind_address, "🛡️  Sentra backend listening");
    axum::serve(listener, router)
        .await
        .context("Server terminated")?;
    Ok(())
}

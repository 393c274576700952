//! Identity API
//! Mission: Signed agent check-in, certificate lifecycle, and task dispatch

use axum::{
    extract::{Path, State},
    http::{HeaderMap, Method},
    response::Json,
};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::TaskSettings;
use crate::gateway::{
    enforce_https, require_mtls, require_signature_headers, require_transport_identity, ApiError,
};
use crate::security::verify_signature;
use crate::state::AppState;

use super::agents::{evaluate_presence, AgentPresence, AgentState, HeartbeatEvent};
use super::certificates::CertificateRecord;
use super::tasks::{Task, TaskError, TaskResult, TaskState};

impl From<TaskError> for ApiError {
    fn from(error: TaskError) -> Self {
        match error {
            TaskError::Exists | TaskError::AlreadyRecorded | TaskError::Expired => {
                ApiError::conflict(error.code())
            }
            TaskError::NotFound => ApiError::not_found(error.code()),
            TaskError::AgentMismatch => ApiError::forbidden(error.code()),
            TaskError::InvalidTiming => ApiError::bad_request(error.code()),
        }
    }
}

/// Signed hello payload emitted by agents via the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloRequest {
    pub tenant_id: String,
    pub asset_id: String,
    pub identity_id: String,
    pub event_id: String,
    pub agent_version: String,
    pub hostname: String,
    pub os: String,
    pub uptime_seconds: i64,
    pub trust_state: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HelloResponse {
    pub status: String,
    pub received_at: DateTime<Utc>,
    pub service: String,
}

#[derive(Debug, Deserialize)]
pub struct CertificateIssueRequest {
    pub identity_id: String,
    pub fingerprint_sha256: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CertificateIssueResponse {
    pub status: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CertificateRevokeRequest {
    pub fingerprint_sha256: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct CertificateRevokeResponse {
    pub status: String,
    pub revoked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCreateRequest {
    pub tenant_id: String,
    pub asset_id: String,
    pub task_id: String,
    pub issued_by: String,
    pub policy_reference: String,
    pub execution_context: String,
    pub interpreter: String,
    pub command_payload: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TaskCreateResponse {
    pub status: String,
    pub task_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPollRequest {
    pub tenant_id: String,
    pub asset_id: String,
    pub agent_id: String,
}

#[derive(Debug, Serialize)]
pub struct TaskRecordResponse {
    pub task_id: String,
    pub tenant_id: String,
    pub asset_id: String,
    pub issued_by: String,
    pub policy_reference: String,
    pub execution_context: String,
    pub interpreter: String,
    pub command_payload: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TaskPollResponse {
    pub status: String,
    pub tasks: Vec<TaskRecordResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStartRequest {
    pub tenant_id: String,
    pub asset_id: String,
    pub agent_id: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TaskStartResponse {
    pub status: String,
    pub task_id: String,
    pub state: TaskState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResultRequest {
    pub task_id: String,
    pub tenant_id: String,
    pub asset_id: String,
    pub status: String,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Serialize)]
pub struct TaskResultResponse {
    pub status: String,
    pub recorded_at: DateTime<Utc>,
}

fn require_execution_enabled(settings: &TaskSettings) -> Result<(), ApiError> {
    if !settings.tasks_enabled {
        return Err(ApiError::forbidden("execution_disabled"));
    }
    Ok(())
}

fn require_scope_enabled(
    settings: &TaskSettings,
    tenant_id: &str,
    asset_id: &str,
) -> Result<(), ApiError> {
    if settings.disabled_tenants.iter().any(|t| t == tenant_id) {
        return Err(ApiError::forbidden("tenant_execution_disabled"));
    }
    if settings.disabled_assets.iter().any(|a| a == asset_id) {
        return Err(ApiError::forbidden("asset_execution_disabled"));
    }
    Ok(())
}

fn validate_allowlist(settings: &TaskSettings, command_payload: &str) -> Result<(), ApiError> {
    if command_payload.len() > settings.max_payload_bytes {
        return Err(ApiError::too_large("payload_too_large"));
    }
    if settings.allowlist_patterns.is_empty() {
        return Ok(());
    }
    for pattern in &settings.allowlist_patterns {
        // Full-match semantics: the whole command must match the pattern.
        let anchored = format!("^(?:{pattern})$");
        match Regex::new(&anchored) {
            Ok(regex) if regex.is_match(command_payload) => return Ok(()),
            Ok(_) => {}
            Err(error) => {
                warn!(pattern, %error, "skipping invalid allowlist pattern");
            }
        }
    }
    Err(ApiError::forbidden("command_not_allowlisted"))
}

fn validate_expiry(settings: &TaskSettings, expires_at: DateTime<Utc>) -> Result<(), ApiError> {
    let now = Utc::now();
    if expires_at <= now {
        return Err(ApiError::bad_request("expiry_in_past"));
    }
    if expires_at > now + Duration::seconds(settings.max_ttl_seconds) {
        return Err(ApiError::bad_request("expiry_exceeds_max_ttl"));
    }
    Ok(())
}

fn validate_result_timing(
    settings: &TaskSettings,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    duration_ms: i64,
) -> Result<(), ApiError> {
    if finished_at < started_at {
        return Err(ApiError::bad_request("invalid_result_timing"));
    }
    let elapsed_ms = (finished_at - started_at).num_milliseconds();
    // TTL bound is a secondary sanity clamp; the 1s elapsed check is primary.
    let max_duration_ms = settings.max_ttl_seconds * 1000;
    if duration_ms < 0 || duration_ms > max_duration_ms {
        return Err(ApiError::bad_request("invalid_result_duration"));
    }
    if (duration_ms - elapsed_ms).abs() > 1000 {
        return Err(ApiError::bad_request("duration_mismatch"));
    }
    Ok(())
}

fn validate_output_limit(
    settings: &TaskSettings,
    value: Option<&str>,
    field_name: &str,
) -> Result<(), ApiError> {
    if let Some(value) = value {
        if value.len() > settings.max_output_bytes {
            return Err(ApiError::too_large(format!("{field_name}_too_large")));
        }
    }
    Ok(())
}

fn verify_signed_payload<T: Serialize>(
    state: &AppState,
    headers: &HeaderMap,
    payload: &T,
) -> Result<(), ApiError> {
    let signed = require_signature_headers(headers, "invalid_timestamp")?;
    let raw_body = serde_json::to_vec(payload)
        .map_err(|_| ApiError::unprocessable("invalid_payload"))?;
    verify_signature(
        &state.settings.signing,
        &raw_body,
        &signed.signature,
        signed.timestamp,
    )
    .map_err(ApiError::from)
}

/// Accept a signed hello payload and verify its authenticity.
pub async fn hello(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<HelloRequest>,
) -> Result<Json<HelloResponse>, ApiError> {
    enforce_https(&Method::POST, &headers)?;
    let signed = require_signature_headers(&headers, "invalid_timestamp")?;
    let identity = require_transport_identity(&headers)?;
    require_mtls(&headers)?;

    if !state.trust.is_known(&identity.cert_fingerprint) {
        return Err(ApiError::unauthorized("unknown_certificate"));
    }
    if state.trust.is_revoked(&identity.cert_fingerprint) {
        return Err(ApiError::unauthorized("revoked_certificate"));
    }

    let raw_body = serde_json::to_vec(&payload)
        .map_err(|_| ApiError::unprocessable("invalid_payload"))?;
    verify_signature(
        &state.settings.signing,
        &raw_body,
        &signed.signature,
        signed.timestamp,
    )?;

    state.heartbeats.record(HeartbeatEvent {
        event_id: payload.event_id.clone(),
        agent_id: payload.identity_id.clone(),
        hostname: payload.hostname.clone(),
        os: payload.os.clone(),
        uptime_seconds: payload.uptime_seconds,
        trust_state: payload.trust_state.clone(),
        received_at: Utc::now(),
    });
    state.agents.upsert(
        &payload.identity_id,
        &payload.hostname,
        &payload.os,
        &payload.trust_state,
    );

    Ok(Json(HelloResponse {
        status: "verified".to_string(),
        received_at: Utc::now(),
        service: state.settings.service_name.clone(),
    }))
}

/// Register a new client certificate fingerprint for an identity.
pub async fn issue_certificate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CertificateIssueRequest>,
) -> Result<Json<CertificateIssueResponse>, ApiError> {
    enforce_https(&Method::POST, &headers)?;
    let record = state.trust.issue(
        &payload.identity_id,
        &payload.fingerprint_sha256,
        payload.expires_at,
    );
    Ok(Json(CertificateIssueResponse {
        status: "issued".to_string(),
        issued_at: record.issued_at,
        expires_at: record.expires_at,
    }))
}

/// Revoke a client certificate fingerprint.
pub async fn revoke_certificate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CertificateRevokeRequest>,
) -> Result<Json<CertificateRevokeResponse>, ApiError> {
    enforce_https(&Method::POST, &headers)?;
    let record: CertificateRecord = state
        .trust
        .revoke(&payload.fingerprint_sha256, &payload.reason)
        .ok_or_else(|| ApiError::not_found("certificate_not_found"))?;
    let revoked_at = record
        .revoked_at
        .ok_or_else(|| ApiError::not_found("certificate_not_found"))?;
    Ok(Json(CertificateRevokeResponse {
        status: "revoked".to_string(),
        revoked_at,
    }))
}

/// Return recent heartbeat events.
pub async fn list_heartbeats(State(state): State<AppState>) -> Json<Vec<HeartbeatEvent>> {
    Json(state.heartbeats.list_recent(100))
}

/// Return current agent states.
pub async fn list_agents(State(state): State<AppState>) -> Json<Vec<AgentState>> {
    Json(state.agents.list_all())
}

/// Return agent online/offline presence based on last seen timestamp.
pub async fn list_agent_presence(State(state): State<AppState>) -> Json<Vec<AgentPresence>> {
    let agents = state.agents.list_all();
    Json(evaluate_presence(
        &agents,
        state.settings.heartbeat_offline_threshold_seconds,
    ))
}

/// Create a signed, immutable task for remote execution.
pub async fn create_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<TaskCreateRequest>,
) -> Result<Json<TaskCreateResponse>, ApiError> {
    enforce_https(&Method::POST, &headers)?;
    require_execution_enabled(&state.settings.tasks)?;
    require_scope_enabled(&state.settings.tasks, &payload.tenant_id, &payload.asset_id)?;

    let signed = require_signature_headers(&headers, "invalid_timestamp")?;
    let raw_body = serde_json::to_vec(&payload)
        .map_err(|_| ApiError::unprocessable("invalid_payload"))?;
    verify_signature(
        &state.settings.signing,
        &raw_body,
        &signed.signature,
        signed.timestamp,
    )?;

    if !matches!(
        payload.execution_context.to_lowercase().as_str(),
        "system" | "root"
    ) {
        return Err(ApiError::bad_request("invalid_execution_context"));
    }
    if !matches!(
        payload.interpreter.to_lowercase().as_str(),
        "bash" | "powershell"
    ) {
        return Err(ApiError::bad_request("invalid_interpreter"));
    }

    validate_allowlist(&state.settings.tasks, &payload.command_payload)?;
    validate_expiry(&state.settings.tasks, payload.expires_at)?;

    let task = state.tasks.create(Task {
        task_id: payload.task_id.clone(),
        tenant_id: payload.tenant_id,
        asset_id: payload.asset_id,
        issued_by: payload.issued_by,
        policy_reference: payload.policy_reference,
        execution_context: payload.execution_context,
        interpreter: payload.interpreter,
        command_payload: payload.command_payload,
        expires_at: payload.expires_at,
        signature: signed.signature,
        created_at: Utc::now(),
        state: TaskState::Pending,
        delivered_at: None,
        started_at: None,
        finished_at: None,
        last_error: None,
    })?;

    Ok(Json(TaskCreateResponse {
        status: "created".to_string(),
        task_id: task.task_id,
        created_at: task.created_at,
    }))
}

/// Poll for pending tasks for an asset.
pub async fn poll_tasks(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<TaskPollRequest>,
) -> Result<Json<TaskPollResponse>, ApiError> {
    enforce_https(&Method::POST, &headers)?;
    require_execution_enabled(&state.settings.tasks)?;
    require_scope_enabled(&state.settings.tasks, &payload.tenant_id, &payload.asset_id)?;
    verify_signed_payload(&state, &headers, &payload)?;

    let tasks = state
        .tasks
        .deliver_pending(&payload.tenant_id, &payload.asset_id);

    Ok(Json(TaskPollResponse {
        status: "ok".to_string(),
        tasks: tasks
            .into_iter()
            .map(|task| TaskRecordResponse {
                task_id: task.task_id,
                tenant_id: task.tenant_id,
                asset_id: task.asset_id,
                issued_by: task.issued_by,
                policy_reference: task.policy_reference,
                execution_context: task.execution_context,
                interpreter: task.interpreter,
                command_payload: task.command_payload,
                expires_at: task.expires_at,
            })
            .collect(),
    }))
}

/// Mark a delivered task as executing.
pub async fn start_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<TaskStartRequest>,
) -> Result<Json<TaskStartResponse>, ApiError> {
    enforce_https(&Method::POST, &headers)?;
    require_execution_enabled(&state.settings.tasks)?;
    require_scope_enabled(&state.settings.tasks, &payload.tenant_id, &payload.asset_id)?;
    verify_signed_payload(&state, &headers, &payload)?;

    let task = state.tasks.mark_executing(
        &task_id,
        &payload.tenant_id,
        &payload.asset_id,
        payload.started_at,
    )?;

    Ok(Json(TaskStartResponse {
        status: "started".to_string(),
        task_id: task.task_id,
        state: task.state,
    }))
}

/// Record the outcome of a task execution.
pub async fn record_task_result(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<TaskResultRequest>,
) -> Result<Json<TaskResultResponse>, ApiError> {
    enforce_https(&Method::POST, &headers)?;
    require_execution_enabled(&state.settings.tasks)?;
    require_scope_enabled(&state.settings.tasks, &payload.tenant_id, &payload.asset_id)?;
    verify_signed_payload(&state, &headers, &payload)?;

    if !matches!(payload.status.as_str(), "completed" | "failed") {
        return Err(ApiError::bad_request("invalid_result_status"));
    }
    if payload.task_id != task_id {
        return Err(ApiError::bad_request("task_id_mismatch"));
    }

    validate_result_timing(
        &state.settings.tasks,
        payload.started_at,
        payload.finished_at,
        payload.duration_ms,
    )?;
    validate_output_limit(&state.settings.tasks, payload.stdout.as_deref(), "stdout")?;
    validate_output_limit(&state.settings.tasks, payload.stderr.as_deref(), "stderr")?;

    let result = TaskResult {
        task_id: task_id.clone(),
        status: payload.status,
        stdout: payload.stdout,
        stderr: payload.stderr,
        exit_code: payload.exit_code,
        started_at: payload.started_at,
        finished_at: payload.finished_at,
        duration_ms: payload.duration_ms,
        truncated: payload.truncated,
        recorded_at: Utc::now(),
    };
    let recorded_at = result.recorded_at;
    state
        .tasks
        .record_result(result, &payload.tenant_id, &payload.asset_id)?;

    Ok(Json(TaskResultResponse {
        status: "recorded".to_string(),
        recorded_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaskSettings;

    fn task_settings() -> TaskSettings {
        TaskSettings {
            tasks_enabled: true,
            allowlist_patterns: vec![r"apply-patch --id [A-Za-z0-9.-]+".to_string()],
            max_payload_bytes: 4096,
            max_output_bytes: 8192,
            max_ttl_seconds: 900,
            disabled_tenants: vec!["tenant-frozen".to_string()],
            disabled_assets: vec![],
        }
    }

    #[test]
    fn test_allowlist_full_match() {
        let settings = task_settings();
        assert!(validate_allowlist(&settings, "apply-patch --id KB5034441").is_ok());

        // Prefix match alone must not pass.
        let error =
            validate_allowlist(&settings, "apply-patch --id KB5034441; rm -rf /").unwrap_err();
        assert_eq!(error.code, "command_not_allowlisted");
    }

    #[test]
    fn test_allowlist_empty_permits_all() {
        let mut settings = task_settings();
        settings.allowlist_patterns.clear();
        assert!(validate_allowlist(&settings, "arbitrary command").is_ok());
    }

    #[test]
    fn test_payload_size_cap() {
        let settings = task_settings();
        let oversized = "x".repeat(4097);
        let error = validate_allowlist(&settings, &oversized).unwrap_err();
        assert_eq!(error.code, "payload_too_large");
    }

    #[test]
    fn test_expiry_bounds() {
        let settings = task_settings();
        let error = validate_expiry(&settings, Utc::now()).unwrap_err();
        assert_eq!(error.code, "expiry_in_past");

        let error =
            validate_expiry(&settings, Utc::now() + Duration::seconds(901)).unwrap_err();
        assert_eq!(error.code, "expiry_exceeds_max_ttl");

        assert!(validate_expiry(&settings, Utc::now() + Duration::seconds(600)).is_ok());
    }

    #[test]
    fn test_result_timing_duration_mismatch() {
        let settings = task_settings();
        let started = Utc::now();
        let finished = started + Duration::seconds(10);

        assert!(validate_result_timing(&settings, started, finished, 10_000).is_ok());
        assert!(validate_result_timing(&settings, started, finished, 10_900).is_ok());

        let error = validate_result_timing(&settings, started, finished, 12_000).unwrap_err();
        assert_eq!(error.code, "duration_mismatch");
    }

    #[test]
    fn test_result_timing_orders() {
        let settings = task_settings();
        let started = Utc::now();
        let error =
            validate_result_timing(&settings, started, started - Duration::seconds(1), 0)
                .unwrap_err();
        assert_eq!(error.code, "invalid_result_timing");
    }

    #[test]
    fn test_result_duration_ttl_clamp() {
        let settings = task_settings();
        let started = Utc::now();
        let finished = started + Duration::seconds(1000);
        let error =
            validate_result_timing(&settings, started, finished, 1_000_000).unwrap_err();
        assert_eq!(error.code, "invalid_result_duration");
    }

    #[test]
    fn test_output_limit() {
        let settings = task_settings();
        let oversized = "y".repeat(8193);
        let error =
            validate_output_limit(&settings, Some(&oversized), "stdout").unwrap_err();
        assert_eq!(error.code, "stdout_too_large");
        assert!(validate_output_limit(&settings, None, "stderr").is_ok());
    }

    #[test]
    fn test_scope_kill_switches() {
        let settings = task_settings();
        let error =
            require_scope_enabled(&settings, "tenant-frozen", "asset-01").unwrap_err();
        assert_eq!(error.code, "tenant_execution_disabled");
        assert!(require_scope_enabled(&settings, "tenant-aa", "asset-01").is_ok());
    }
}

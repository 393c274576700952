//! Runtime Configuration
//! Mission: Source every tunable from the environment with secure defaults

use std::env;

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(default)
}

fn env_list(key: &str) -> Vec<String> {
    env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// HMAC signing configuration shared by all signed intake paths.
#[derive(Debug, Clone)]
pub struct SigningSettings {
    pub hmac_shared_key: String,
    pub signature_ttl_seconds: i64,
}

/// Remote task execution limits and kill switches.
#[derive(Debug, Clone)]
pub struct TaskSettings {
    pub tasks_enabled: bool,
    pub allowlist_patterns: Vec<String>,
    pub max_payload_bytes: usize,
    pub max_output_bytes: usize,
    pub max_ttl_seconds: i64,
    pub disabled_tenants: Vec<String>,
    pub disabled_assets: Vec<String>,
}

/// Telemetry intake bounds and baseline tuning.
#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub sample_limit: usize,
    pub stale_seconds: i64,
    pub future_seconds: i64,
    pub baseline_window: usize,
    pub anomaly_stddev_threshold: f64,
}

/// Event batch intake bounds.
#[derive(Debug, Clone)]
pub struct EventSettings {
    pub batch_limit: usize,
    pub stale_seconds: i64,
    pub future_seconds: i64,
    pub clock_drift_seconds: i64,
}

/// Patch orchestration limits.
#[derive(Debug, Clone)]
pub struct PatchSettings {
    pub max_patches_per_batch: usize,
    pub max_log_bytes: usize,
}

/// Detection engine tuning.
#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub max_event_age_seconds: i64,
    pub correlation_time_window_seconds: i64,
    pub max_supporting_events: usize,
    pub max_findings_per_request: usize,
    pub allow_findings_without_context: bool,
    pub retention_events: usize,
    pub retention_findings: usize,
    pub allowed_explanation_variables: Vec<String>,
}

/// PSA workflow thresholds and caps.
#[derive(Debug, Clone)]
pub struct PsaSettings {
    pub risk_threshold: f64,
    pub max_evidence_per_ticket: usize,
    pub max_actions_per_ticket: usize,
}

/// Top-level runtime settings for the backend.
#[derive(Debug, Clone)]
pub struct Settings {
    pub environment: String,
    pub service_name: String,
    pub bind_address: String,
    pub database_path: String,
    pub heartbeat_offline_threshold_seconds: i64,
    pub signing: SigningSettings,
    pub tasks: TaskSettings,
    pub telemetry: TelemetrySettings,
    pub events: EventSettings,
    pub patch: PatchSettings,
    pub detection: DetectionSettings,
    pub psa: PsaSettings,
}

impl Settings {
    /// Load all settings from the environment.
    pub fn from_env() -> Self {
        Self {
            environment: env_string("SENTRA_ENV", "development"),
            service_name: env_string("SENTRA_SERVICE_NAME", "sentra-backend"),
            bind_address: env_string("SENTRA_BIND_ADDRESS", "0.0.0.0:8080"),
            database_path: env_string("SENTRA_DATABASE_PATH", "data/sentra.db"),
            heartbeat_offline_threshold_seconds: env_i64("SENTRA_OFFLINE_THRESHOLD", 120),
            signing: SigningSettings {
                hmac_shared_key: env_string("SENTRA_HMAC_SHARED_KEY", ""),
                signature_ttl_seconds: env_i64("SENTRA_SIGNATURE_TTL", 120),
            },
            tasks: TaskSettings {
                tasks_enabled: env_bool("SENTRA_TASKS_ENABLED", false),
                allowlist_patterns: env_list("SENTRA_TASK_ALLOWLIST"),
                max_payload_bytes: env_u64("SENTRA_TASK_MAX_PAYLOAD", 4096) as usize,
                max_output_bytes: env_u64("SENTRA_TASK_MAX_OUTPUT", 8192) as usize,
                max_ttl_seconds: env_i64("SENTRA_TASK_MAX_TTL", 900),
                disabled_tenants: env_list("SENTRA_TASKS_DISABLED_TENANTS"),
                disabled_assets: env_list("SENTRA_TASKS_DISABLED_ASSETS"),
            },
            telemetry: TelemetrySettings {
                sample_limit: env_u64("SENTRA_TELEMETRY_SAMPLE_LIMIT", 500) as usize,
                stale_seconds: env_i64("SENTRA_TELEMETRY_STALE_SECONDS", 600),
                future_seconds: env_i64("SENTRA_TELEMETRY_FUTURE_SECONDS", 120),
                baseline_window: env_u64("SENTRA_TELEMETRY_BASELINE_WINDOW", 20) as usize,
                anomaly_stddev_threshold: env_f64("SENTRA_TELEMETRY_ANOMALY_THRESHOLD", 3.0),
            },
            events: EventSettings {
                batch_limit: env_u64("SENTRA_EVENT_BATCH_LIMIT", 200) as usize,
                stale_seconds: env_i64("SENTRA_EVENT_STALE_SECONDS", 900),
                future_seconds: env_i64("SENTRA_EVENT_FUTURE_SECONDS", 120),
                clock_drift_seconds: env_i64("SENTRA_EVENT_CLOCK_DRIFT_SECONDS", 300),
            },
            patch: PatchSettings {
                max_patches_per_batch: env_u64("SENTRA_PATCH_MAX_BATCH", 250) as usize,
                max_log_bytes: env_u64("SENTRA_PATCH_MAX_LOG_BYTES", 8192) as usize,
            },
            detection: DetectionSettings {
                max_event_age_seconds: env_i64("SENTRA_DETECTION_MAX_EVENT_AGE", 3600),
                correlation_time_window_seconds: env_i64("SENTRA_DETECTION_CORRELATION_WINDOW", 1800),
                max_supporting_events: env_u64("SENTRA_DETECTION_MAX_SUPPORTING_EVENTS", 50) as usize,
                max_findings_per_request: env_u64("SENTRA_DETECTION_MAX_FINDINGS", 25) as usize,
                allow_findings_without_context: env_bool("SENTRA_DETECTION_ALLOW_NO_CONTEXT", false),
                retention_events: env_u64("SENTRA_DETECTION_RETENTION_EVENTS", 5000) as usize,
                retention_findings: env_u64("SENTRA_DETECTION_RETENTION_FINDINGS", 2000) as usize,
                allowed_explanation_variables: default_explanation_variables(),
            },
            psa: PsaSettings {
                risk_threshold: env_f64("SENTRA_PSA_RISK_THRESHOLD", 10.0),
                max_evidence_per_ticket: env_u64("SENTRA_PSA_MAX_EVIDENCE", 200) as usize,
                max_actions_per_ticket: env_u64("SENTRA_PSA_MAX_ACTIONS", 200) as usize,
            },
        }
    }
}

fn default_explanation_variables() -> Vec<String> {
    [
        "event_type",
        "asset_id",
        "identity_id",
        "metric_name",
        "metric_value",
        "baseline_value",
        "time_window",
        "missing_patches",
        "network_destination",
        "process_name",
        "multiplier",
    ]
    .iter()
    .map(|name| (*name).to_string())
    .collect()
}

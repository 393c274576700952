//! Inventory payloads and projections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareInventory {
    pub tenant_id: String,
    pub asset_id: String,
    pub collected_at: DateTime<Utc>,
    pub hostname: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub cpu_model: Option<String>,
    pub cpu_cores: Option<i64>,
    pub memory_mb: Option<i64>,
    pub storage_gb: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsInventory {
    pub tenant_id: String,
    pub asset_id: String,
    pub collected_at: DateTime<Utc>,
    pub hostname: Option<String>,
    pub os_name: String,
    pub os_version: String,
    pub kernel_version: Option<String>,
    pub architecture: Option<String>,
    pub install_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftwareItem {
    pub name: String,
    pub vendor: Option<String>,
    pub version: Option<String>,
    pub install_date: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftwareInventory {
    pub tenant_id: String,
    pub asset_id: String,
    pub collected_at: DateTime<Utc>,
    pub hostname: Option<String>,
    pub items: Vec<SoftwareItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalUser {
    pub username: String,
    pub display_name: Option<String>,
    pub uid: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalUsersInventory {
    pub tenant_id: String,
    pub asset_id: String,
    pub collected_at: DateTime<Utc>,
    pub hostname: Option<String>,
    pub users: Vec<LocalUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalGroup {
    pub name: String,
    pub gid: Option<String>,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalGroupsInventory {
    pub tenant_id: String,
    pub asset_id: String,
    pub collected_at: DateTime<Utc>,
    pub hostname: Option<String>,
    pub groups: Vec<LocalGroup>,
}

/// Full per-asset snapshot assembled from all five categories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub hardware: Option<HardwareInventory>,
    pub os: Option<OsInventory>,
    pub software: Option<SoftwareInventory>,
    pub users: Option<LocalUsersInventory>,
    pub groups: Option<LocalGroupsInventory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub asset_id: String,
    pub tenant_id: String,
    pub hostname: String,
    pub asset_type: String,
    pub trust_state: String,
    pub risk_score: Option<f64>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetStateResponse {
    pub asset_id: String,
    pub hostname: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub software_count: i64,
    pub users_count: i64,
    pub groups_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetInventoryOverview {
    pub asset_id: String,
    pub tenant_id: String,
    pub hostname: String,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub hardware_model: Option<String>,
    pub software_count: i64,
    pub users_count: i64,
    pub groups_count: i64,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

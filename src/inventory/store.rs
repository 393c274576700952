//! Inventory Storage
//! Mission: Authoritative per-asset inventory with SQLite persistence
//!
//! Hardware and OS rows are upserted last-writer-wins. Software, users, and
//! groups are full authoritative snapshots: within one transaction all prior
//! rows for the asset are deleted and the payload re-inserted, so no partial
//! merges can survive.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use super::models::{
    AssetInventoryOverview, AssetRecord, AssetStateResponse, HardwareInventory, InventorySnapshot,
    LocalGroup, LocalGroupsInventory, LocalUser, LocalUsersInventory, OsInventory,
    SoftwareInventory, SoftwareItem,
};

fn to_db_time(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn from_db_time(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn opt_db_time(value: Option<String>) -> Option<DateTime<Utc>> {
    value.as_deref().map(from_db_time)
}

/// Inventory storage with SQLite backend.
pub struct InventoryStore {
    db_path: String,
}

impl InventoryStore {
    /// Create a new inventory store and initialize the schema.
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path).context("Failed to open inventory database")
    }

    fn init_db(&self) -> Result<()> {
        let conn = self.open()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tenants (
                tenant_id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS assets (
                asset_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                hostname TEXT NOT NULL,
                asset_type TEXT NOT NULL,
                trust_state TEXT NOT NULL DEFAULT 'unknown',
                risk_score REAL,
                last_seen_at TEXT,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (tenant_id) REFERENCES tenants(tenant_id)
            );
            CREATE TABLE IF NOT EXISTS hardware_inventory (
                asset_id TEXT PRIMARY KEY,
                manufacturer TEXT,
                model TEXT,
                serial_number TEXT,
                cpu_model TEXT,
                cpu_cores INTEGER,
                memory_mb INTEGER,
                storage_gb INTEGER,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS os_inventory (
                asset_id TEXT PRIMARY KEY,
                os_name TEXT NOT NULL,
                os_version TEXT NOT NULL,
                kernel_version TEXT,
                architecture TEXT,
                install_date TEXT,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS software_inventory (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                asset_id TEXT NOT NULL,
                name TEXT NOT NULL,
                vendor TEXT,
                version TEXT,
                install_date TEXT,
                source TEXT,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_software_asset
                ON software_inventory(asset_id);
            CREATE TABLE IF NOT EXISTS local_users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                asset_id TEXT NOT NULL,
                username TEXT NOT NULL,
                display_name TEXT,
                uid TEXT,
                is_admin INTEGER NOT NULL DEFAULT 0,
                last_login_at TEXT,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_asset ON local_users(asset_id);
            CREATE TABLE IF NOT EXISTS local_groups (
                group_id INTEGER PRIMARY KEY AUTOINCREMENT,
                asset_id TEXT NOT NULL,
                name TEXT NOT NULL,
                gid TEXT,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_groups_asset ON local_groups(asset_id);
            CREATE TABLE IF NOT EXISTS local_group_members (
                group_id INTEGER NOT NULL,
                member_name TEXT NOT NULL,
                PRIMARY KEY (group_id, member_name)
            );",
        )
        .context("Failed to initialize inventory schema")?;

        Ok(())
    }

    fn ensure_tenant(conn: &Connection, tenant_id: &str) -> Result<()> {
        conn.execute(
            "INSERT INTO tenants (tenant_id, name) VALUES (?1, ?2)
             ON CONFLICT (tenant_id) DO NOTHING",
            params![tenant_id, format!("tenant-{tenant_id}")],
        )?;
        Ok(())
    }

    /// Create the minimal asset row if missing and advance its last-seen time.
    pub fn ensure_asset(
        &self,
        tenant_id: &str,
        asset_id: &str,
        hostname: Option<&str>,
        collected_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.open()?;
        Self::ensure_asset_on(&conn, tenant_id, asset_id, hostname, collected_at)
    }

    fn ensure_asset_on(
        conn: &Connection,
        tenant_id: &str,
        asset_id: &str,
        hostname: Option<&str>,
        collected_at: DateTime<Utc>,
    ) -> Result<()> {
        Self::ensure_tenant(conn, tenant_id)?;
        let resolved_hostname = hostname.unwrap_or(asset_id);
        conn.execute(
            "INSERT INTO assets (asset_id, tenant_id, hostname, asset_type, last_seen_at, updated_at)
             VALUES (?1, ?2, ?3, 'unknown', ?4, ?5)
             ON CONFLICT (asset_id) DO UPDATE
             SET hostname = excluded.hostname,
                 last_seen_at = excluded.last_seen_at,
                 updated_at = excluded.updated_at",
            params![
                asset_id,
                tenant_id,
                resolved_hostname,
                to_db_time(collected_at),
                to_db_time(Utc::now()),
            ],
        )?;
        Ok(())
    }

    pub fn upsert_hardware(&self, payload: &HardwareInventory) -> Result<()> {
        let conn = self.open()?;
        Self::ensure_asset_on(
            &conn,
            &payload.tenant_id,
            &payload.asset_id,
            payload.hostname.as_deref(),
            payload.collected_at,
        )?;
        conn.execute(
            "INSERT INTO hardware_inventory (
                asset_id, manufacturer, model, serial_number, cpu_model,
                cpu_cores, memory_mb, storage_gb, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (asset_id) DO UPDATE
             SET manufacturer = excluded.manufacturer,
                 model = excluded.model,
                 serial_number = excluded.serial_number,
                 cpu_model = excluded.cpu_model,
                 cpu_cores = excluded.cpu_cores,
                 memory_mb = excluded.memory_mb,
                 storage_gb = excluded.storage_gb,
                 updated_at = excluded.updated_at",
            params![
                payload.asset_id,
                payload.manufacturer,
                payload.model,
                payload.serial_number,
                payload.cpu_model,
                payload.cpu_cores,
                payload.memory_mb,
                payload.storage_gb,
                to_db_time(payload.collected_at),
            ],
        )
        .context("Failed to upsert hardware inventory")?;
        Ok(())
    }

    pub fn upsert_os(&self, payload: &OsInventory) -> Result<()> {
        let conn = self.open()?;
        Self::ensure_asset_on(
            &conn,
            &payload.tenant_id,
            &payload.asset_id,
            payload.hostname.as_deref(),
            payload.collected_at,
        )?;
        conn.execute(
            "INSERT INTO os_inventory (
                asset_id, os_name, os_version, kernel_version, architecture,
                install_date, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (asset_id) DO UPDATE
             SET os_name = excluded.os_name,
                 os_version = excluded.os_version,
                 kernel_version = excluded.kernel_version,
                 architecture = excluded.architecture,
                 install_date = excluded.install_date,
                 updated_at = excluded.updated_at",
            params![
                payload.asset_id,
                payload.os_name,
                payload.os_version,
                payload.kernel_version,
                payload.architecture,
                payload.install_date,
                to_db_time(payload.collected_at),
            ],
        )
        .context("Failed to upsert OS inventory")?;
        Ok(())
    }

    /// Replace the software snapshot for an asset atomically.
    pub fn upsert_software(&self, payload: &SoftwareInventory) -> Result<()> {
        let mut conn = self.open()?;
        Self::ensure_asset_on(
            &conn,
            &payload.tenant_id,
            &payload.asset_id,
            payload.hostname.as_deref(),
            payload.collected_at,
        )?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM software_inventory WHERE asset_id = ?1",
            params![payload.asset_id],
        )?;
        for item in &payload.items {
            tx.execute(
                "INSERT INTO software_inventory (
                    asset_id, name, vendor, version, install_date, source, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    payload.asset_id,
                    item.name,
                    item.vendor,
                    item.version,
                    item.install_date,
                    item.source,
                    to_db_time(payload.collected_at),
                ],
            )?;
        }
        tx.commit().context("Failed to commit software snapshot")?;
        info!(
            asset_id = %payload.asset_id,
            items = payload.items.len(),
            "software snapshot replaced"
        );
        Ok(())
    }

    /// Replace the local-user snapshot for an asset atomically.
    pub fn upsert_users(&self, payload: &LocalUsersInventory) -> Result<()> {
        let mut conn = self.open()?;
        Self::ensure_asset_on(
            &conn,
            &payload.tenant_id,
            &payload.asset_id,
            payload.hostname.as_deref(),
            payload.collected_at,
        )?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM local_users WHERE asset_id = ?1",
            params![payload.asset_id],
        )?;
        for user in &payload.users {
            tx.execute(
                "INSERT INTO local_users (
                    asset_id, username, display_name, uid, is_admin, last_login_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    payload.asset_id,
                    user.username,
                    user.display_name,
                    user.uid,
                    user.is_admin as i64,
                    user.last_login_at.map(to_db_time),
                    to_db_time(payload.collected_at),
                ],
            )?;
        }
        tx.commit().context("Failed to commit users snapshot")?;
        Ok(())
    }

    /// Replace the local-group snapshot (and memberships) atomically.
    pub fn upsert_groups(&self, payload: &LocalGroupsInventory) -> Result<()> {
        let mut conn = self.open()?;
        Self::ensure_asset_on(
            &conn,
            &payload.tenant_id,
            &payload.asset_id,
            payload.hostname.as_deref(),
            payload.collected_at,
        )?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM local_group_members
             WHERE group_id IN (SELECT group_id FROM local_groups WHERE asset_id = ?1)",
            params![payload.asset_id],
        )?;
        tx.execute(
            "DELETE FROM local_groups WHERE asset_id = ?1",
            params![payload.asset_id],
        )?;
        for group in &payload.groups {
            tx.execute(
                "INSERT INTO local_groups (asset_id, name, gid, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    payload.asset_id,
                    group.name,
                    group.gid,
                    to_db_time(payload.collected_at),
                ],
            )?;
            let group_id = tx.last_insert_rowid();
            for member in &group.members {
                tx.execute(
                    "INSERT INTO local_group_members (group_id, member_name)
                     VALUES (?1, ?2)
                     ON CONFLICT (group_id, member_name) DO NOTHING",
                    params![group_id, member],
                )?;
            }
        }
        tx.commit().context("Failed to commit groups snapshot")?;
        Ok(())
    }

    /// Assemble the full snapshot for an asset across all five categories.
    pub fn snapshot(&self, asset_id: &str) -> Result<InventorySnapshot> {
        let conn = self.open()?;
        let context = conn
            .query_row(
                "SELECT tenant_id, hostname FROM assets WHERE asset_id = ?1",
                params![asset_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                    ))
                },
            )
            .optional()?;
        let (tenant_id, hostname) = context.unwrap_or((String::new(), None));

        Ok(InventorySnapshot {
            hardware: self.fetch_hardware(&conn, asset_id, &tenant_id, hostname.as_deref())?,
            os: self.fetch_os(&conn, asset_id, &tenant_id, hostname.as_deref())?,
            software: self.fetch_software(&conn, asset_id, &tenant_id, hostname.as_deref())?,
            users: self.fetch_users(&conn, asset_id, &tenant_id, hostname.as_deref())?,
            groups: self.fetch_groups(&conn, asset_id, &tenant_id, hostname.as_deref())?,
        })
    }

    /// Derive the count-based asset state from the snapshot.
    pub fn asset_state(&self, asset_id: &str) -> Result<AssetStateResponse> {
        let snapshot = self.snapshot(asset_id)?;
        Ok(AssetStateResponse {
            asset_id: asset_id.to_string(),
            hostname: snapshot
                .hardware
                .as_ref()
                .and_then(|hardware| hardware.model.clone()),
            os_name: snapshot.os.as_ref().map(|os| os.os_name.clone()),
            os_version: snapshot.os.as_ref().map(|os| os.os_version.clone()),
            software_count: snapshot
                .software
                .as_ref()
                .map_or(0, |software| software.items.len() as i64),
            users_count: snapshot
                .users
                .as_ref()
                .map_or(0, |users| users.users.len() as i64),
            groups_count: snapshot
                .groups
                .as_ref()
                .map_or(0, |groups| groups.groups.len() as i64),
        })
    }

    pub fn list_assets(
        &self,
        tenant_id: Option<&str>,
        limit: usize,
        offset: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<AssetRecord>> {
        let conn = self.open()?;
        let mut sql = String::from(
            "SELECT asset_id, tenant_id, hostname, asset_type, trust_state,
                    risk_score, last_seen_at, updated_at
             FROM assets WHERE 1=1",
        );
        let mut args: Vec<rusqlite::types::Value> = Vec::new();
        if let Some(tenant_id) = tenant_id {
            sql.push_str(" AND tenant_id = ?");
            args.push(rusqlite::types::Value::Text(tenant_id.to_string()));
        }
        if let Some(since) = since {
            sql.push_str(" AND updated_at >= ?");
            args.push(rusqlite::types::Value::Text(to_db_time(since)));
        }
        sql.push_str(" ORDER BY updated_at DESC LIMIT ? OFFSET ?");
        args.push(rusqlite::types::Value::Integer(limit as i64));
        args.push(rusqlite::types::Value::Integer(offset as i64));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args), |row| {
                Ok(AssetRecord {
                    asset_id: row.get(0)?,
                    tenant_id: row.get(1)?,
                    hostname: row.get(2)?,
                    asset_type: row.get(3)?,
                    trust_state: row.get(4)?,
                    risk_score: row.get(5)?,
                    last_seen_at: opt_db_time(row.get(6)?),
                    updated_at: from_db_time(&row.get::<_, String>(7)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_asset_overviews(
        &self,
        tenant_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AssetInventoryOverview>> {
        let conn = self.open()?;
        let mut sql = String::from(
            "SELECT a.asset_id, a.tenant_id, a.hostname, a.last_seen_at, a.updated_at,
                    os.os_name, os.os_version, hw.model,
                    COALESCE(sw.software_count, 0),
                    COALESCE(u.user_count, 0),
                    COALESCE(g.group_count, 0)
             FROM assets a
             LEFT JOIN os_inventory os ON os.asset_id = a.asset_id
             LEFT JOIN hardware_inventory hw ON hw.asset_id = a.asset_id
             LEFT JOIN (
                 SELECT asset_id, COUNT(*) AS software_count
                 FROM software_inventory GROUP BY asset_id
             ) sw ON sw.asset_id = a.asset_id
             LEFT JOIN (
                 SELECT asset_id, COUNT(*) AS user_count
                 FROM local_users GROUP BY asset_id
             ) u ON u.asset_id = a.asset_id
             LEFT JOIN (
                 SELECT asset_id, COUNT(*) AS group_count
                 FROM local_groups GROUP BY asset_id
             ) g ON g.asset_id = a.asset_id
             WHERE 1=1",
        );
        let mut args: Vec<rusqlite::types::Value> = Vec::new();
        if let Some(tenant_id) = tenant_id {
            sql.push_str(" AND a.tenant_id = ?");
            args.push(rusqlite::types::Value::Text(tenant_id.to_string()));
        }
        sql.push_str(" ORDER BY a.updated_at DESC LIMIT ? OFFSET ?");
        args.push(rusqlite::types::Value::Integer(limit as i64));
        args.push(rusqlite::types::Value::Integer(offset as i64));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args), |row| {
                Ok(AssetInventoryOverview {
                    asset_id: row.get(0)?,
                    tenant_id: row.get(1)?,
                    hostname: row.get(2)?,
                    last_seen_at: opt_db_time(row.get(3)?),
                    updated_at: from_db_time(&row.get::<_, String>(4)?),
                    os_name: row.get(5)?,
                    os_version: row.get(6)?,
                    hardware_model: row.get(7)?,
                    software_count: row.get(8)?,
                    users_count: row.get(9)?,
                    groups_count: row.get(10)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn fetch_hardware(
        &self,
        conn: &Connection,
        asset_id: &str,
        tenant_id: &str,
        hostname: Option<&str>,
    ) -> Result<Option<HardwareInventory>> {
        let row = conn
            .query_row(
                "SELECT manufacturer, model, serial_number, cpu_model, cpu_cores,
                        memory_mb, storage_gb, updated_at
                 FROM hardware_inventory WHERE asset_id = ?1",
                params![asset_id],
                |row| {
                    Ok(HardwareInventory {
                        tenant_id: tenant_id.to_string(),
                        asset_id: asset_id.to_string(),
                        collected_at: from_db_time(&row.get::<_, String>(7)?),
                        hostname: hostname.map(|value| value.to_string()),
                        manufacturer: row.get(0)?,
                        model: row.get(1)?,
                        serial_number: row.get(2)?,
                        cpu_model: row.get(3)?,
                        cpu_cores: row.get(4)?,
                        memory_mb: row.get(5)?,
                        storage_gb: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn fetch_os(
        &self,
        conn: &Connection,
        asset_id: &str,
        tenant_id: &str,
        hostname: Option<&str>,
    ) -> Result<Option<OsInventory>> {
        let row = conn
            .query_row(
                "SELECT os_name, os_version, kernel_version, architecture,
                        install_date, updated_at
                 FROM os_inventory WHERE asset_id = ?1",
                params![asset_id],
                |row| {
                    Ok(OsInventory {
                        tenant_id: tenant_id.to_string(),
                        asset_id: asset_id.to_string(),
                        collected_at: from_db_time(&row.get::<_, String>(5)?),
                        hostname: hostname.map(|value| value.to_string()),
                        os_name: row.get(0)?,
                        os_version: row.get(1)?,
                        kernel_version: row.get(2)?,
                        architecture: row.get(3)?,
                        install_date: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn fetch_software(
        &self,
        conn: &Connection,
        asset_id: &str,
        tenant_id: &str,
        hostname: Option<&str>,
    ) -> Result<Option<SoftwareInventory>> {
        let mut stmt = conn.prepare(
            "SELECT name, vendor, version, install_date, source, updated_at
             FROM software_inventory WHERE asset_id = ?1 ORDER BY name",
        )?;
        let mut collected_at: Option<DateTime<Utc>> = None;
        let items = stmt
            .query_map(params![asset_id], |row| {
                Ok((
                    SoftwareItem {
                        name: row.get(0)?,
                        vendor: row.get(1)?,
                        version: row.get(2)?,
                        install_date: row.get(3)?,
                        source: row.get(4)?,
                    },
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        if items.is_empty() {
            return Ok(None);
        }
        let items: Vec<SoftwareItem> = items
            .into_iter()
            .map(|(item, updated_at)| {
                let updated_at = from_db_time(&updated_at);
                collected_at = Some(collected_at.map_or(updated_at, |ts| ts.max(updated_at)));
                item
            })
            .collect();
        Ok(Some(SoftwareInventory {
            tenant_id: tenant_id.to_string(),
            asset_id: asset_id.to_string(),
            collected_at: collected_at.unwrap_or_else(Utc::now),
            hostname: hostname.map(|value| value.to_string()),
            items,
        }))
    }

    fn fetch_users(
        &self,
        conn: &Connection,
        asset_id: &str,
        tenant_id: &str,
        hostname: Option<&str>,
    ) -> Result<Option<LocalUsersInventory>> {
        let mut stmt = conn.prepare(
            "SELECT username, display_name, uid, is_admin, last_login_at, updated_at
             FROM local_users WHERE asset_id = ?1 ORDER BY username",
        )?;
        let mut collected_at: Option<DateTime<Utc>> = None;
        let rows = stmt
            .query_map(params![asset_id], |row| {
                Ok((
                    LocalUser {
                        username: row.get(0)?,
                        display_name: row.get(1)?,
                        uid: row.get(2)?,
                        is_admin: row.get::<_, i64>(3)? != 0,
                        last_login_at: opt_db_time(row.get(4)?),
                    },
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        if rows.is_empty() {
            return Ok(None);
        }
        let users: Vec<LocalUser> = rows
            .into_iter()
            .map(|(user, updated_at)| {
                let updated_at = from_db_time(&updated_at);
                collected_at = Some(collected_at.map_or(updated_at, |ts| ts.max(updated_at)));
                user
            })
            .collect();
        Ok(Some(LocalUsersInventory {
            tenant_id: tenant_id.to_string(),
            asset_id: asset_id.to_string(),
            collected_at: collected_at.unwrap_or_else(Utc::now),
            hostname: hostname.map(|value| value.to_string()),
            users,
        }))
    }

    fn fetch_groups(
        &self,
        conn: &Connection,
        asset_id: &str,
        tenant_id: &str,
        hostname: Option<&str>,
    ) -> Result<Option<LocalGroupsInventory>> {
        let mut stmt = conn.prepare(
            "SELECT group_id, name, gid, updated_at
             FROM local_groups WHERE asset_id = ?1 ORDER BY name",
        )?;
        let rows = stmt
            .query_map(params![asset_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        if rows.is_empty() {
            return Ok(None);
        }

        let mut collected_at: Option<DateTime<Utc>> = None;
        let mut groups = Vec::with_capacity(rows.len());
        for (group_id, name, gid, updated_at) in rows {
            let mut member_stmt = conn.prepare(
                "SELECT member_name FROM local_group_members
                 WHERE group_id = ?1 ORDER BY member_name",
            )?;
            let members = member_stmt
                .query_map(params![group_id], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            let updated_at = from_db_time(&updated_at);
            collected_at = Some(collected_at.map_or(updated_at, |ts| ts.max(updated_at)));
            groups.push(LocalGroup { name, gid, members });
        }
        Ok(Some(LocalGroupsInventory {
            tenant_id: tenant_id.to_string(),
            asset_id: asset_id.to_string(),
            collected_at: collected_at.unwrap_or_else(Utc::now),
            hostname: hostname.map(|value| value.to_string()),
            groups,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_store() -> (InventoryStore, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();
        let store = InventoryStore::new(db_path).unwrap();
        (store, temp_file)
    }

    fn software_payload(items: &[&str]) -> SoftwareInventory {
        SoftwareInventory {
            tenant_id: "tenant-aabbccdd".to_string(),
            asset_id: "asset-01234567".to_string(),
            collected_at: Utc::now(),
            hostname: Some("web-01".to_string()),
            items: items
                .iter()
                .map(|name| SoftwareItem {
                    name: (*name).to_string(),
                    vendor: Some("vendor".to_string()),
                    version: Some("1.0".to_string()),
                    install_date: None,
                    source: Some("apt".to_string()),
                })
                .collect(),
        }
    }

    #[test]
    fn test_hardware_upsert_last_writer_wins() {
        let (store, _temp) = create_test_store();
        let mut payload = HardwareInventory {
            tenant_id: "tenant-aabbccdd".to_string(),
            asset_id: "asset-01234567".to_string(),
            collected_at: Utc::now(),
            hostname: Some("web-01".to_string()),
            manufacturer: Some("Dell".to_string()),
            model: Some("R740".to_string()),
            serial_number: Some("SN-1".to_string()),
            cpu_model: Some("Xeon".to_string()),
            cpu_cores: Some(16),
            memory_mb: Some(65536),
            storage_gb: Some(2048),
        };
        store.upsert_hardware(&payload).unwrap();

        payload.memory_mb = Some(131_072);
        store.upsert_hardware(&payload).unwrap();

        let snapshot = store.snapshot("asset-01234567").unwrap();
        assert_eq!(snapshot.hardware.unwrap().memory_mb, Some(131_072));
    }

    #[test]
    fn test_software_snapshot_fully_replaced() {
        let (store, _temp) = create_test_store();
        store
            .upsert_software(&software_payload(&["openssl", "nginx"]))
            .unwrap();
        store
            .upsert_software(&software_payload(&["openssl", "nginx"]))
            .unwrap();

        // Identical consecutive uploads yield an identical snapshot.
        let snapshot = store.snapshot("asset-01234567").unwrap();
        assert_eq!(snapshot.software.as_ref().unwrap().items.len(), 2);

        // A different set fully replaces the previous one, no residuals.
        store.upsert_software(&software_payload(&["curl"])).unwrap();
        let snapshot = store.snapshot("asset-01234567").unwrap();
        let software = snapshot.software.unwrap();
        assert_eq!(software.items.len(), 1);
        assert_eq!(software.items[0].name, "curl");
    }

    #[test]
    fn test_groups_replace_members() {
        let (store, _temp) = create_test_store();
        let payload = LocalGroupsInventory {
            tenant_id: "tenant-aabbccdd".to_string(),
            asset_id: "asset-01234567".to_string(),
            collected_at: Utc::now(),
            hostname: None,
            groups: vec![LocalGroup {
                name: "sudo".to_string(),
                gid: Some("27".to_string()),
                members: vec!["alice".to_string(), "bob".to_string()],
            }],
        };
        store.upsert_groups(&payload).unwrap();

        let replacement = LocalGroupsInventory {
            groups: vec![LocalGroup {
                name: "sudo".to_string(),
                gid: Some("27".to_string()),
                members: vec!["carol".to_string()],
            }],
            ..payload
        };
        store.upsert_groups(&replacement).unwrap();

        let snapshot = store.snapshot("asset-01234567").unwrap();
        let groups = snapshot.groups.unwrap();
        assert_eq!(groups.groups[0].members, vec!["carol".to_string()]);
    }

    #[test]
    fn test_ensure_asset_creates_minimal_row() {
        let (store, _temp) = create_test_store();
        store
            .ensure_asset("tenant-aabbccdd", "asset-01234567", None, Utc::now())
            .unwrap();

        let assets = store.list_assets(None, 10, 0, None).unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].asset_type, "unknown");
        // Hostname defaults to the asset id when absent.
        assert_eq!(assets[0].hostname, "asset-01234567");
        assert!(assets[0].last_seen_at.is_some());
    }

    #[test]
    fn test_asset_state_counts() {
        let (store, _temp) = create_test_store();
        store
            .upsert_software(&software_payload(&["openssl", "nginx", "curl"]))
            .unwrap();
        store
            .upsert_users(&LocalUsersInventory {
                tenant_id: "tenant-aabbccdd".to_string(),
                asset_id: "asset-01234567".to_string(),
                collected_at: Utc::now(),
                hostname: None,
                users: vec![LocalUser {
                    username: "alice".to_string(),
                    display_name: None,
                    uid: Some("1000".to_string()),
                    is_admin: true,
                    last_login_at: None,
                }],
            })
            .unwrap();

        let state = store.asset_state("asset-01234567").unwrap();
        assert_eq!(state.software_count, 3);
        assert_eq!(state.users_count, 1);
        assert_eq!(state.groups_count, 0);
    }

    #[test]
    fn test_tenant_filter_on_listing() {
        let (store, _temp) = create_test_store();
        store
            .ensure_asset("tenant-aabbccdd", "asset-01234567", None, Utc::now())
            .unwrap();
        store
            .ensure_asset("tenant-eeff0011", "asset-89abcdef", None, Utc::now())
            .unwrap();

        let filtered = store
            .list_assets(Some("tenant-aabbccdd"), 10, 0, None)
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].asset_id, "asset-01234567");
    }
}

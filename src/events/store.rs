//! Event Log Storage
//! Mission: Append-only event log with sequence gap and drift bookkeeping
//!
//! Ordering within a (asset_id, source_module) stream comes from the agent's
//! `sequence_number`, never from receive order. Gaps are recorded as data,
//! not rejected. A batch log row is written for every submission outcome.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, warn};
use uuid::Uuid;

use crate::security::canonical_hash;

use super::models::{
    EventBatch, EventClockDrift, EventGapReport, EventIngestLogRecord, EventRecord,
};

fn to_db_time(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn from_db_time(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Outcome of a batch ingest.
#[derive(Debug)]
pub struct BatchIngestOutcome {
    pub accepted: usize,
    pub rejected: usize,
    pub gaps: Vec<EventGapReport>,
    pub drifts: Vec<EventClockDrift>,
}

/// Event log storage with SQLite backend.
pub struct EventStore {
    db_path: String,
}

impl EventStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path).context("Failed to open event database")
    }

    fn init_db(&self) -> Result<()> {
        let conn = self.open()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS event_batches (
                payload_id TEXT PRIMARY KEY,
                received_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS events (
                event_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                asset_id TEXT NOT NULL,
                event_category TEXT NOT NULL,
                event_type TEXT NOT NULL,
                source_module TEXT NOT NULL,
                trust_level TEXT NOT NULL,
                severity TEXT NOT NULL,
                sequence_number INTEGER NOT NULL,
                timestamp_local TEXT NOT NULL,
                timestamp_received TEXT NOT NULL,
                payload TEXT NOT NULL,
                payload_hash TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_asset
                ON events(asset_id, timestamp_local);
            CREATE INDEX IF NOT EXISTS idx_events_tenant
                ON events(tenant_id, timestamp_local);
            CREATE TABLE IF NOT EXISTS event_sequences (
                asset_id TEXT NOT NULL,
                source_module TEXT NOT NULL,
                last_sequence INTEGER NOT NULL,
                PRIMARY KEY (asset_id, source_module)
            );
            CREATE TABLE IF NOT EXISTS event_gaps (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                asset_id TEXT NOT NULL,
                source_module TEXT NOT NULL,
                last_seen_sequence INTEGER NOT NULL,
                new_sequence INTEGER NOT NULL,
                gap_size INTEGER NOT NULL,
                recorded_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS event_drifts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                asset_id TEXT NOT NULL,
                source_module TEXT NOT NULL,
                event_id TEXT NOT NULL,
                drift_seconds INTEGER NOT NULL,
                recorded_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS event_ingest_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                payload_id TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                asset_id TEXT NOT NULL,
                status TEXT NOT NULL,
                signature_verified INTEGER NOT NULL,
                event_count INTEGER NOT NULL,
                accepted_count INTEGER NOT NULL,
                rejected_count INTEGER NOT NULL,
                reject_reason TEXT,
                schema_version TEXT NOT NULL,
                received_at TEXT NOT NULL
            );",
        )
        .context("Failed to initialize event schema")?;
        Ok(())
    }

    /// Whether a payload id has already been accepted.
    pub fn payload_exists(&self, payload_id: Uuid) -> Result<bool> {
        let conn = self.open()?;
        let found: Option<String> = conn
            .query_row(
                "SELECT payload_id FROM event_batches WHERE payload_id = ?1",
                params![payload_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Write a batch log row. Best-effort: logging must never fail intake.
    #[allow(clippy::too_many_arguments)]
    pub fn record_batch_log(
        &self,
        batch: &EventBatch,
        status: &str,
        signature_verified: bool,
        accepted: usize,
        rejected: usize,
        reject_reason: Option<&str>,
    ) {
        let result = self.open().and_then(|conn| {
            conn.execute(
                "INSERT INTO event_ingest_log
                    (payload_id, tenant_id, asset_id, status, signature_verified,
                     event_count, accepted_count, rejected_count, reject_reason,
                     schema_version, received_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    batch.payload_id.to_string(),
                    batch.tenant_id,
                    batch.asset_id,
                    status,
                    signature_verified as i64,
                    batch.events.len() as i64,
                    accepted as i64,
                    rejected as i64,
                    reject_reason,
                    batch.schema_version,
                    to_db_time(Utc::now()),
                ],
            )
            .context("Failed to record batch log")
        });
        if let Err(error) = result {
            warn!(%error, payload_id = %batch.payload_id, "batch log write failed");
        }
    }

    /// Ingest a verified batch.
    ///
    /// Events within the batch are processed in submission order. An event
    /// failing its hash or timestamp check is dropped and counted rejected;
    /// the batch continues. Everything runs in one transaction, including
    /// the batch log row.
    pub fn ingest_batch(
        &self,
        batch: &EventBatch,
        stale_seconds: i64,
        future_seconds: i64,
        drift_threshold_seconds: i64,
    ) -> Result<BatchIngestOutcome> {
        let now = Utc::now();
        let oldest_allowed = now - Duration::seconds(stale_seconds);
        let newest_allowed = now + Duration::seconds(future_seconds);

        let mut conn = self.open()?;
        let tx = conn
            .transaction()
            .context("Failed to begin event transaction")?;

        tx.execute(
            "INSERT INTO event_batches (payload_id, received_at) VALUES (?1, ?2)",
            params![batch.payload_id.to_string(), to_db_time(now)],
        )
        .context("Failed to record event batch")?;

        let mut outcome = BatchIngestOutcome {
            accepted: 0,
            rejected: 0,
            gaps: Vec::new(),
            drifts: Vec::new(),
        };

        for event in &batch.events {
            // The canonical hash is the integrity contract with the agent.
            if canonical_hash(&event.payload) != event.payload_hash {
                outcome.rejected += 1;
                continue;
            }
            if event.timestamp_local < oldest_allowed || event.timestamp_local > newest_allowed {
                outcome.rejected += 1;
                continue;
            }

            let drift_seconds = (now - event.timestamp_local).num_seconds().abs();
            if drift_seconds > drift_threshold_seconds {
                tx.execute(
                    "INSERT INTO event_drifts
                        (asset_id, source_module, event_id, drift_seconds, recorded_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        batch.asset_id,
                        event.source_module,
                        event.event_id.to_string(),
                        drift_seconds,
                        to_db_time(now),
                    ],
                )?;
                outcome.drifts.push(EventClockDrift {
                    asset_id: batch.asset_id.clone(),
                    source_module: event.source_module.clone(),
                    event_id: event.event_id,
                    drift_seconds,
                    recorded_at: now,
                });
            }

            let last_sequence: Option<i64> = tx
                .query_row(
                    "SELECT last_sequence FROM event_sequences
                     WHERE asset_id = ?1 AND source_module = ?2",
                    params![batch.asset_id, event.source_module],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(last_sequence) = last_sequence {
                if event.sequence_number > last_sequence + 1 {
                    let gap = EventGapReport {
                        asset_id: batch.asset_id.clone(),
                        source_module: event.source_module.clone(),
                        last_seen_sequence: last_sequence,
                        new_sequence: event.sequence_number,
                        gap_size: event.sequence_number - last_sequence - 1,
                    };
                    tx.execute(
                        "INSERT INTO event_gaps
                            (asset_id, source_module, last_seen_sequence,
                             new_sequence, gap_size, recorded_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            gap.asset_id,
                            gap.source_module,
                            gap.last_seen_sequence,
                            gap.new_sequence,
                            gap.gap_size,
                            to_db_time(now),
                        ],
                    )?;
                    outcome.gaps.push(gap);
                }
            }
            tx.execute(
                "INSERT INTO event_sequences (asset_id, source_module, last_sequence)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (asset_id, source_module) DO UPDATE
                 SET last_sequence = MAX(last_sequence, excluded.last_sequence)",
                params![batch.asset_id, event.source_module, event.sequence_number],
            )?;

            tx.execute(
                "INSERT OR IGNORE INTO events
                    (event_id, tenant_id, asset_id, event_category, event_type,
                     source_module, trust_level, severity, sequence_number,
                     timestamp_local, timestamp_received, payload, payload_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    event.event_id.to_string(),
                    batch.tenant_id,
                    batch.asset_id,
                    event.event_category,
                    event.event_type,
                    event.source_module,
                    event.trust_level,
                    event.severity,
                    event.sequence_number,
                    to_db_time(event.timestamp_local),
                    to_db_time(now),
                    event.payload.to_string(),
                    event.payload_hash,
                ],
            )?;
            outcome.accepted += 1;
        }

        let status = if outcome.rejected == 0 {
            "accepted"
        } else {
            "partial"
        };
        tx.execute(
            "INSERT INTO event_ingest_log
                (payload_id, tenant_id, asset_id, status, signature_verified,
                 event_count, accepted_count, rejected_count, reject_reason,
                 schema_version, received_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6, ?7, NULL, ?8, ?9)",
            params![
                batch.payload_id.to_string(),
                batch.tenant_id,
                batch.asset_id,
                status,
                batch.events.len() as i64,
                outcome.accepted as i64,
                outcome.rejected as i64,
                batch.schema_version,
                to_db_time(now),
            ],
        )?;

        tx.commit().context("Failed to commit event batch")?;
        info!(
            payload_id = %batch.payload_id,
            accepted = outcome.accepted,
            rejected = outcome.rejected,
            gaps = outcome.gaps.len(),
            drifts = outcome.drifts.len(),
            "event batch ingested"
        );
        Ok(outcome)
    }

    pub fn list_recent(
        &self,
        tenant_id: Option<&str>,
        since: Option<DateTime<Utc>>,
        event_category: Option<&str>,
        event_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<EventRecord>> {
        let conn = self.open()?;
        let tenant = tenant_id.unwrap_or("%").to_string();
        let category = event_category.unwrap_or("%").to_string();
        let kind = event_type.unwrap_or("%").to_string();
        let since = since.map(to_db_time).unwrap_or_else(|| "0000".to_string());
        let mut stmt = conn.prepare(
            "SELECT event_id, tenant_id, asset_id, event_category, event_type,
                    source_module, trust_level, severity, sequence_number,
                    timestamp_local, timestamp_received, payload, payload_hash
             FROM events
             WHERE tenant_id LIKE ?1 AND event_category LIKE ?2
               AND event_type LIKE ?3 AND timestamp_local >= ?4
             ORDER BY timestamp_local DESC LIMIT ?5",
        )?;
        let rows = stmt
            .query_map(params![tenant, category, kind, since, limit as i64], Self::map_event)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn asset_timeline(
        &self,
        asset_id: &str,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        event_category: Option<&str>,
        event_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<EventRecord>> {
        let conn = self.open()?;
        let category = event_category.unwrap_or("%").to_string();
        let kind = event_type.unwrap_or("%").to_string();
        let since = since.map(to_db_time).unwrap_or_else(|| "0000".to_string());
        let until = until.map(to_db_time).unwrap_or_else(|| "9999".to_string());
        let mut stmt = conn.prepare(
            "SELECT event_id, tenant_id, asset_id, event_category, event_type,
                    source_module, trust_level, severity, sequence_number,
                    timestamp_local, timestamp_received, payload, payload_hash
             FROM events
             WHERE asset_id = ?1 AND event_category LIKE ?2 AND event_type LIKE ?3
               AND timestamp_local >= ?4 AND timestamp_local <= ?5
             ORDER BY timestamp_local ASC LIMIT ?6",
        )?;
        let rows = stmt
            .query_map(
                params![asset_id, category, kind, since, until, limit as i64],
                Self::map_event,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_gaps(&self, asset_id: &str, limit: usize) -> Result<Vec<EventGapReport>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT source_module, last_seen_sequence, new_sequence, gap_size
             FROM event_gaps WHERE asset_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![asset_id, limit as i64], |row| {
                Ok(EventGapReport {
                    asset_id: asset_id.to_string(),
                    source_module: row.get(0)?,
                    last_seen_sequence: row.get(1)?,
                    new_sequence: row.get(2)?,
                    gap_size: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_drifts(&self, asset_id: &str, limit: usize) -> Result<Vec<EventClockDrift>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT source_module, event_id, drift_seconds, recorded_at
             FROM event_drifts WHERE asset_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![asset_id, limit as i64], |row| {
                Ok(EventClockDrift {
                    asset_id: asset_id.to_string(),
                    source_module: row.get(0)?,
                    event_id: Uuid::parse_str(&row.get::<_, String>(1)?)
                        .unwrap_or_else(|_| Uuid::nil()),
                    drift_seconds: row.get(2)?,
                    recorded_at: from_db_time(&row.get::<_, String>(3)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_ingest_log(
        &self,
        tenant_id: Option<&str>,
        asset_id: Option<&str>,
        status: Option<&str>,
        limit: usize,
    ) -> Result<Vec<EventIngestLogRecord>> {
        let conn = self.open()?;
        let tenant = tenant_id.unwrap_or("%").to_string();
        let asset = asset_id.unwrap_or("%").to_string();
        let status = status.unwrap_or("%").to_string();
        let mut stmt = conn.prepare(
            "SELECT payload_id, tenant_id, asset_id, status, signature_verified,
                    event_count, accepted_count, rejected_count, reject_reason,
                    schema_version, received_at
             FROM event_ingest_log
             WHERE tenant_id LIKE ?1 AND asset_id LIKE ?2 AND status LIKE ?3
             ORDER BY id DESC LIMIT ?4",
        )?;
        let rows = stmt
            .query_map(params![tenant, asset, status, limit as i64], |row| {
                Ok(EventIngestLogRecord {
                    payload_id: Uuid::parse_str(&row.get::<_, String>(0)?)
                        .unwrap_or_else(|_| Uuid::nil()),
                    tenant_id: row.get(1)?,
                    asset_id: row.get(2)?,
                    status: row.get(3)?,
                    signature_verified: row.get::<_, i64>(4)? != 0,
                    event_count: row.get::<_, i64>(5)? as usize,
                    accepted_count: row.get::<_, i64>(6)? as usize,
                    rejected_count: row.get::<_, i64>(7)? as usize,
                    reject_reason: row.get(8)?,
                    schema_version: row.get(9)?,
                    received_at: from_db_time(&row.get::<_, String>(10)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRecord> {
        Ok(EventRecord {
            event_id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap_or_else(|_| Uuid::nil()),
            tenant_id: row.get(1)?,
            asset_id: row.get(2)?,
            event_category: row.get(3)?,
            event_type: row.get(4)?,
            source_module: row.get(5)?,
            trust_level: row.get(6)?,
            severity: row.get(7)?,
            sequence_number: row.get(8)?,
            timestamp_local: from_db_time(&row.get::<_, String>(9)?),
            timestamp_received: from_db_time(&row.get::<_, String>(10)?),
            payload: serde_json::from_str(&row.get::<_, String>(11)?)
                .unwrap_or(serde_json::Value::Null),
            payload_hash: row.get(12)?,
        })
    }
}

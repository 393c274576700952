//! Telemetry Storage
//! Mission: Append-only samples with replay protection and baseline upkeep

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, warn};
use uuid::Uuid;

use super::baseline::BaselineState;
use super::models::{
    TelemetryAnomaly, TelemetryBaseline, TelemetryMetricSummary, TelemetryPayload, TelemetrySample,
    TelemetrySeries, TelemetrySeriesPoint,
};

fn to_db_time(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn from_db_time(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Ingest failure split into replayed payloads and storage faults.
#[derive(Debug)]
pub enum TelemetryIngestError {
    Replay,
    Storage(anyhow::Error),
}

impl From<anyhow::Error> for TelemetryIngestError {
    fn from(error: anyhow::Error) -> Self {
        TelemetryIngestError::Storage(error)
    }
}

/// Telemetry storage with SQLite backend.
pub struct TelemetryStore {
    db_path: String,
}

impl TelemetryStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path).context("Failed to open telemetry database")
    }

    fn init_db(&self) -> Result<()> {
        let conn = self.open()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS telemetry_payloads (
                payload_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                asset_id TEXT NOT NULL,
                collected_at TEXT NOT NULL,
                schema_version TEXT NOT NULL,
                sample_count INTEGER NOT NULL,
                received_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS telemetry_samples (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                asset_id TEXT NOT NULL,
                metric_name TEXT NOT NULL,
                unit TEXT NOT NULL,
                value REAL NOT NULL,
                observed_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_samples_asset_metric
                ON telemetry_samples(asset_id, metric_name, observed_at);
            CREATE TABLE IF NOT EXISTS telemetry_baselines (
                asset_id TEXT NOT NULL,
                metric_name TEXT NOT NULL,
                window_size INTEGER NOT NULL,
                window_values TEXT NOT NULL,
                mean REAL NOT NULL,
                stddev REAL NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (asset_id, metric_name)
            );
            CREATE TABLE IF NOT EXISTS telemetry_anomalies (
                anomaly_id INTEGER PRIMARY KEY AUTOINCREMENT,
                asset_id TEXT NOT NULL,
                metric_name TEXT NOT NULL,
                observed_at TEXT NOT NULL,
                value REAL NOT NULL,
                deviation_multiplier REAL NOT NULL,
                status TEXT NOT NULL DEFAULT 'open'
            );
            CREATE INDEX IF NOT EXISTS idx_anomalies_asset
                ON telemetry_anomalies(asset_id, observed_at);
            CREATE TABLE IF NOT EXISTS telemetry_rejections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                payload_id TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                asset_id TEXT NOT NULL,
                reason TEXT NOT NULL,
                rejected_at TEXT NOT NULL
            );",
        )
        .context("Failed to initialize telemetry schema")?;
        Ok(())
    }

    /// Record a rejected payload for audit. Best-effort by contract: a
    /// failure here must never mask the original rejection.
    pub fn record_rejection(&self, payload_id: Uuid, tenant_id: &str, asset_id: &str, reason: &str) {
        let result = self.open().and_then(|conn| {
            conn.execute(
                "INSERT INTO telemetry_rejections
                    (payload_id, tenant_id, asset_id, reason, rejected_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    payload_id.to_string(),
                    tenant_id,
                    asset_id,
                    reason,
                    to_db_time(Utc::now()),
                ],
            )
            .context("Failed to record telemetry rejection")
        });
        if let Err(error) = result {
            warn!(%error, %payload_id, reason, "telemetry rejection audit write failed");
        }
    }

    /// Ingest a validated payload: replay check, sample append, baseline
    /// update, anomaly emission. Runs in one transaction so baseline updates
    /// stay linearised per (asset, metric).
    pub fn ingest(
        &self,
        payload: &TelemetryPayload,
        samples: &[TelemetrySample],
        baseline_window: usize,
        anomaly_threshold: f64,
    ) -> Result<usize, TelemetryIngestError> {
        let mut conn = self.open()?;
        let tx = conn
            .transaction()
            .context("Failed to begin telemetry transaction")?;

        let inserted = tx
            .execute(
                "INSERT OR IGNORE INTO telemetry_payloads
                    (payload_id, tenant_id, asset_id, collected_at, schema_version,
                     sample_count, received_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    payload.payload_id.to_string(),
                    payload.tenant_id,
                    payload.asset_id,
                    to_db_time(payload.collected_at),
                    payload.schema_version,
                    samples.len() as i64,
                    to_db_time(Utc::now()),
                ],
            )
            .context("Failed to record telemetry payload")?;
        if inserted == 0 {
            return Err(TelemetryIngestError::Replay);
        }

        let mut anomalies = 0usize;
        for sample in samples {
            let unit = sample.unit.as_deref().unwrap_or("");
            tx.execute(
                "INSERT INTO telemetry_samples
                    (asset_id, metric_name, unit, value, observed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    payload.asset_id,
                    sample.name,
                    unit,
                    sample.value,
                    to_db_time(sample.observed_at),
                ],
            )
            .context("Failed to append telemetry sample")?;

            let stored: Option<String> = tx
                .query_row(
                    "SELECT window_values FROM telemetry_baselines
                     WHERE asset_id = ?1 AND metric_name = ?2",
                    params![payload.asset_id, sample.name],
                    |row| row.get(0),
                )
                .optional()
                .context("Failed to load baseline")?;
            let mut baseline = match stored {
                Some(raw) => {
                    let values: Vec<f64> = serde_json::from_str(&raw).unwrap_or_default();
                    BaselineState::from_values(baseline_window, values)
                }
                None => BaselineState::new(baseline_window),
            };

            if let Some(deviation) = baseline.observe(sample.value, anomaly_threshold) {
                anomalies += 1;
                tx.execute(
                    "INSERT INTO telemetry_anomalies
                        (asset_id, metric_name, observed_at, value,
                         deviation_multiplier, status)
                     VALUES (?1, ?2, ?3, ?4, ?5, 'open')",
                    params![
                        payload.asset_id,
                        sample.name,
                        to_db_time(sample.observed_at),
                        sample.value,
                        deviation,
                    ],
                )
                .context("Failed to record anomaly")?;
                warn!(
                    asset_id = %payload.asset_id,
                    metric = %sample.name,
                    value = sample.value,
                    deviation,
                    "telemetry anomaly flagged"
                );
            }

            let window_values = serde_json::to_string(&baseline.values())
                .context("Failed to serialise baseline window")?;
            tx.execute(
                "INSERT INTO telemetry_baselines
                    (asset_id, metric_name, window_size, window_values, mean,
                     stddev, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (asset_id, metric_name) DO UPDATE
                 SET window_size = excluded.window_size,
                     window_values = excluded.window_values,
                     mean = excluded.mean,
                     stddev = excluded.stddev,
                     updated_at = excluded.updated_at",
                params![
                    payload.asset_id,
                    sample.name,
                    baseline_window as i64,
                    window_values,
                    baseline.mean(),
                    baseline.stddev(),
                    to_db_time(Utc::now()),
                ],
            )
            .context("Failed to persist baseline")?;
        }

        tx.commit().context("Failed to commit telemetry ingest")?;
        info!(
            asset_id = %payload.asset_id,
            samples = samples.len(),
            anomalies,
            "telemetry payload ingested"
        );
        Ok(anomalies)
    }

    pub fn list_metrics(&self, asset_id: &str) -> Result<Vec<TelemetryMetricSummary>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT metric_name, unit, COUNT(*), MAX(observed_at)
             FROM telemetry_samples WHERE asset_id = ?1
             GROUP BY metric_name, unit ORDER BY metric_name",
        )?;
        let rows = stmt
            .query_map(params![asset_id], |row| {
                Ok(TelemetryMetricSummary {
                    metric_name: row.get(0)?,
                    unit: row.get(1)?,
                    sample_count: row.get(2)?,
                    last_observed_at: from_db_time(&row.get::<_, String>(3)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn series(
        &self,
        asset_id: &str,
        metric_name: &str,
        unit: &str,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<TelemetrySeries> {
        let conn = self.open()?;
        let since = since.map(to_db_time).unwrap_or_else(|| "0000".to_string());
        let until = until.map(to_db_time).unwrap_or_else(|| "9999".to_string());
        let mut stmt = conn.prepare(
            "SELECT observed_at, value FROM telemetry_samples
             WHERE asset_id = ?1 AND metric_name = ?2
               AND observed_at >= ?3 AND observed_at <= ?4
             ORDER BY observed_at ASC LIMIT ?5",
        )?;
        let points = stmt
            .query_map(
                params![asset_id, metric_name, since, until, limit as i64],
                |row| {
                    Ok(TelemetrySeriesPoint {
                        observed_at: from_db_time(&row.get::<_, String>(0)?),
                        value: row.get(1)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TelemetrySeries {
            asset_id: asset_id.to_string(),
            metric_name: metric_name.to_string(),
            unit: unit.to_string(),
            points,
        })
    }

    pub fn list_baselines(&self, asset_id: &str) -> Result<Vec<TelemetryBaseline>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT metric_name, window_size, window_values, mean, stddev, updated_at
             FROM telemetry_baselines WHERE asset_id = ?1 ORDER BY metric_name",
        )?;
        let rows = stmt
            .query_map(params![asset_id], |row| {
                let window_values: String = row.get(2)?;
                let values: Vec<f64> = serde_json::from_str(&window_values).unwrap_or_default();
                Ok(TelemetryBaseline {
                    asset_id: asset_id.to_string(),
                    metric_name: row.get(0)?,
                    window_size: row.get::<_, i64>(1)? as usize,
                    sample_count: values.len(),
                    mean: row.get(3)?,
                    stddev: row.get(4)?,
                    updated_at: from_db_time(&row.get::<_, String>(5)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_anomalies(
        &self,
        asset_id: &str,
        status: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<TelemetryAnomaly>> {
        let conn = self.open()?;
        let status = status.unwrap_or("%").to_string();
        let since = since.map(to_db_time).unwrap_or_else(|| "0000".to_string());
        let mut stmt = conn.prepare(
            "SELECT anomaly_id, metric_name, observed_at, value,
                    deviation_multiplier, status
             FROM telemetry_anomalies
             WHERE asset_id = ?1 AND status LIKE ?2 AND observed_at >= ?3
             ORDER BY observed_at DESC LIMIT ?4",
        )?;
        let rows = stmt
            .query_map(params![asset_id, status, since, limit as i64], |row| {
                Ok(TelemetryAnomaly {
                    anomaly_id: row.get(0)?,
                    asset_id: asset_id.to_string(),
                    metric_name: row.get(1)?,
                    observed_at: from_db_time(&row.get::<_, String>(2)?),
                    value: row.get(3)?,
                    deviation_multiplier: row.get(4)?,
                    status: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_rejections(&self, asset_id: &str, limit: usize) -> Result<Vec<(String, String)>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT payload_id, reason FROM telemetry_rejections
             WHERE asset_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![asset_id, limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_store() -> (TelemetryStore, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let store = TelemetryStore::new(temp_file.path().to_str().unwrap()).unwrap();
        (store, temp_file)
    }

    fn payload_with(values: &[f64]) -> (TelemetryPayload, Vec<TelemetrySample>) {
        let samples: Vec<TelemetrySample> = values
            .iter()
            .map(|value| TelemetrySample {
                name: "cpu.total.percent".to_string(),
                unit: Some("percent".to_string()),
                value: *value,
                observed_at: Utc::now(),
            })
            .collect();
        let payload = TelemetryPayload {
            payload_id: Uuid::new_v4(),
            tenant_id: "tenant-aabbccdd".to_string(),
            asset_id: "asset-01234567".to_string(),
            collected_at: Utc::now(),
            schema_version: "v1".to_string(),
            samples: samples.clone(),
        };
        (payload, samples)
    }

    #[test]
    fn test_replay_rejected() {
        let (store, _temp) = create_test_store();
        let (payload, samples) = payload_with(&[10.0]);

        store.ingest(&payload, &samples, 20, 3.0).unwrap();
        match store.ingest(&payload, &samples, 20, 3.0) {
            Err(TelemetryIngestError::Replay) => {}
            other => panic!("expected replay rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_steady_run_then_spike_emits_one_anomaly() {
        let (store, _temp) = create_test_store();

        // 20 steady payloads of cpu.total.percent = 10.0.
        for _ in 0..20 {
            let (payload, samples) = payload_with(&[10.0]);
            let anomalies = store.ingest(&payload, &samples, 20, 3.0).unwrap();
            assert_eq!(anomalies, 0);
        }

        // The spike to 95.0 must flag exactly one anomaly.
        let (payload, samples) = payload_with(&[95.0]);
        let anomalies = store.ingest(&payload, &samples, 20, 3.0).unwrap();
        assert_eq!(anomalies, 1);

        let recorded = store
            .list_anomalies("asset-01234567", Some("open"), None, 10)
            .unwrap();
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].deviation_multiplier >= 3.0);
        assert_eq!(recorded[0].value, 95.0);
    }

    #[test]
    fn test_baseline_persisted_across_payloads() {
        let (store, _temp) = create_test_store();
        for value in [10.0, 12.0, 14.0] {
            let (payload, samples) = payload_with(&[value]);
            store.ingest(&payload, &samples, 20, 3.0).unwrap();
        }
        let baselines = store.list_baselines("asset-01234567").unwrap();
        assert_eq!(baselines.len(), 1);
        assert_eq!(baselines[0].sample_count, 3);
        assert!((baselines[0].mean - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejection_audit_recorded() {
        let (store, _temp) = create_test_store();
        let payload_id = Uuid::new_v4();
        store.record_rejection(payload_id, "tenant-aabbccdd", "asset-01234567", "payload_stale");

        let rejections = store.list_rejections("asset-01234567", 10).unwrap();
        assert_eq!(rejections.len(), 1);
        assert_eq!(rejections[0].1, "payload_stale");
    }

    #[test]
    fn test_series_and_metric_summaries() {
        let (store, _temp) = create_test_store();
        for value in [10.0, 20.0, 30.0] {
            let (payload, samples) = payload_with(&[value]);
            store.ingest(&payload, &samples, 20, 3.0).unwrap();
        }
        let metrics = store.list_metrics("asset-01234567").unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].sample_count, 3);

        let series = store
            .series("asset-01234567", "cpu.total.percent", "percent", None, None, 100)
            .unwrap();
        assert_eq!(series.points.len(), 3);
        assert_eq!(series.points[0].value, 10.0);
    }
}

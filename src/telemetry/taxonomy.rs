//! Metric Taxonomy
//! Mission: Normalise incoming samples against the fixed metric catalogue
//!
//! Metric names are drawn from a closed taxonomy. Each entry fixes the unit
//! and validity range; a sample that does not match exactly is rejected.

use lazy_static::lazy_static;
use regex::Regex;

use super::models::TelemetrySample;

#[derive(Debug)]
pub struct MetricRule {
    pub pattern: Regex,
    pub unit: &'static str,
    pub description: &'static str,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub integer_only: bool,
}

impl MetricRule {
    fn new(
        pattern: &str,
        unit: &'static str,
        description: &'static str,
        min_value: Option<f64>,
        max_value: Option<f64>,
        integer_only: bool,
    ) -> Self {
        Self {
            // Patterns are compile-time constants; a bad one is a programmer error.
            pattern: Regex::new(pattern).expect("invalid metric taxonomy pattern"),
            unit,
            description,
            min_value,
            max_value,
            integer_only,
        }
    }
}

lazy_static! {
    pub static ref METRIC_RULES: Vec<MetricRule> = vec![
        MetricRule::new(
            r"^cpu\.total\.percent$",
            "percent",
            "Total CPU usage across all cores",
            Some(0.0),
            Some(100.0),
            false,
        ),
        MetricRule::new(
            r"^cpu\.core\.\d+\.percent$",
            "percent",
            "Per-core CPU usage percentage",
            Some(0.0),
            Some(100.0),
            false,
        ),
        MetricRule::new(
            r"^cpu\.load\.(1m|5m|15m)$",
            "load",
            "System load average",
            Some(0.0),
            None,
            false,
        ),
        MetricRule::new(
            r"^cpu\.context_switches\.per_sec$",
            "count_per_sec",
            "Context switches per second",
            Some(0.0),
            None,
            false,
        ),
        MetricRule::new(
            r"^memory\.(total|used|available)\.bytes$",
            "bytes",
            "Memory usage in bytes",
            Some(0.0),
            None,
            true,
        ),
        MetricRule::new(
            r"^memory\.swap\.used\.bytes$",
            "bytes",
            "Swap usage in bytes",
            Some(0.0),
            None,
            true,
        ),
        MetricRule::new(
            r"^disk\.[a-zA-Z0-9_.-]+\.(total|used|free)\.bytes$",
            "bytes",
            "Disk usage in bytes",
            Some(0.0),
            None,
            true,
        ),
        MetricRule::new(
            r"^disk\.[a-zA-Z0-9_.-]+\.percent$",
            "percent",
            "Disk usage percentage",
            Some(0.0),
            Some(100.0),
            false,
        ),
        MetricRule::new(
            r"^disk\.[a-zA-Z0-9_.-]+\.io_wait\.percent$",
            "percent",
            "Disk IO wait percentage",
            Some(0.0),
            Some(100.0),
            false,
        ),
        MetricRule::new(
            r"^network\.bytes\.(sent|received)$",
            "bytes",
            "Network throughput in bytes",
            Some(0.0),
            None,
            true,
        ),
        MetricRule::new(
            r"^network\.packets\.(sent|received)$",
            "count",
            "Network packets per interval",
            Some(0.0),
            None,
            true,
        ),
        MetricRule::new(
            r"^network\.errors\.(dropped|retransmit)$",
            "count",
            "Network error counters",
            Some(0.0),
            None,
            true,
        ),
        MetricRule::new(
            r"^system\.uptime\.seconds$",
            "seconds",
            "System uptime in seconds",
            Some(0.0),
            None,
            true,
        ),
        MetricRule::new(
            r"^system\.boot\.unix_seconds$",
            "unix_seconds",
            "System boot time as Unix epoch seconds",
            Some(0.0),
            None,
            true,
        ),
        MetricRule::new(
            r"^system\.clock\.skew\.seconds$",
            "seconds",
            "Clock skew between agent and ingestion service",
            None,
            None,
            false,
        ),
        MetricRule::new(
            r"^agent\.process\.healthy$",
            "bool",
            "Agent process health flag",
            Some(0.0),
            Some(1.0),
            true,
        ),
    ];
}

/// Raised when telemetry fails schema or unit validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryValidationError {
    pub reason: &'static str,
}

impl TelemetryValidationError {
    pub fn new(reason: &'static str) -> Self {
        Self { reason }
    }
}

impl std::fmt::Display for TelemetryValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl std::error::Error for TelemetryValidationError {}

fn match_rule(metric_name: &str) -> Result<&'static MetricRule, TelemetryValidationError> {
    METRIC_RULES
        .iter()
        .find(|rule| rule.pattern.is_match(metric_name))
        .ok_or_else(|| TelemetryValidationError::new("unknown_metric"))
}

/// Validate and normalise a batch of samples against the taxonomy.
pub fn normalise_samples(
    samples: &[TelemetrySample],
) -> Result<Vec<TelemetrySample>, TelemetryValidationError> {
    let mut normalised = Vec::with_capacity(samples.len());
    for sample in samples {
        let rule = match_rule(&sample.name)?;
        let unit = sample.unit.as_deref().unwrap_or(rule.unit);
        if unit != rule.unit {
            return Err(TelemetryValidationError::new("unit_mismatch"));
        }
        let mut value = sample.value;
        if !value.is_finite() {
            return Err(TelemetryValidationError::new("value_not_finite"));
        }
        if rule.integer_only {
            value = value.trunc();
        }
        if let Some(min_value) = rule.min_value {
            if value < min_value {
                return Err(TelemetryValidationError::new("value_below_min"));
            }
        }
        if let Some(max_value) = rule.max_value {
            if value > max_value {
                return Err(TelemetryValidationError::new("value_above_max"));
            }
        }
        normalised.push(TelemetrySample {
            name: sample.name.clone(),
            unit: Some(rule.unit.to_string()),
            value,
            observed_at: sample.observed_at,
        });
    }
    Ok(normalised)
}

/// Resolve the canonical unit for a metric name.
pub fn metric_unit(metric_name: &str) -> Result<&'static str, TelemetryValidationError> {
    Ok(match_rule(metric_name)?.unit)
}

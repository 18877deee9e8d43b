//! Throttler configuration and TOML loading.
//!
//! ```toml
//! enabled = true
//! dry_run = false
//! healthcheck_cells = ["zone1", "zone2"]
//! tablet_types = ["replica", "rdonly"]
//! topo_refresh_interval = "5m"
//!
//! [throttler]
//! target_replication_lag_sec = 2
//! max_replication_lag_sec = 10
//! ```

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::types::TabletType;

/// Default interval between topology cell refreshes.
pub const DEFAULT_TOPO_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Longest accepted interval between topology cell refreshes.
pub const MAX_TOPO_REFRESH_INTERVAL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Immutable configuration of a transaction throttler.
///
/// A disabled configuration turns every throttler operation into a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxThrottlerConfig {
    pub enabled: bool,
    /// Count what would have been throttled without ever rejecting.
    pub dry_run: bool,
    /// Cells whose tablets are health-checked. Empty means every cell
    /// known to the topology, re-read every `topo_refresh_interval`.
    pub healthcheck_cells: Vec<String>,
    /// Roles whose replication lag is fed to the decision engine.
    pub tablet_types: BTreeSet<TabletType>,
    #[serde(with = "duration_str")]
    pub topo_refresh_interval: Duration,
    /// Passed through verbatim to the lag decision engine.
    pub throttler: LagConfig,
}

impl Default for TxThrottlerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dry_run: false,
            healthcheck_cells: Vec::new(),
            tablet_types: BTreeSet::from([TabletType::Replica]),
            topo_refresh_interval: DEFAULT_TOPO_REFRESH_INTERVAL,
            throttler: LagConfig::default(),
        }
    }
}

impl TxThrottlerConfig {
    /// The inert configuration.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Default settings with the throttler switched on.
    pub fn enabled_default() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_healthcheck_cells<I, S>(mut self, cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.healthcheck_cells = cells.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tablet_types<I>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = TabletType>,
    {
        self.tablet_types = types.into_iter().collect();
        self
    }

    pub fn with_topo_refresh_interval(mut self, interval: Duration) -> Self {
        self.topo_refresh_interval = interval;
        self
    }

    pub fn with_lag_config(mut self, throttler: LagConfig) -> Self {
        self.throttler = throttler;
        self
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.enabled && self.topo_refresh_interval.is_zero() {
            return Err("topo_refresh_interval must be greater than zero".to_string());
        }
        if self.topo_refresh_interval > MAX_TOPO_REFRESH_INTERVAL {
            return Err(format!(
                "topo_refresh_interval must not exceed {}s",
                MAX_TOPO_REFRESH_INTERVAL.as_secs()
            ));
        }
        if self.healthcheck_cells.iter().any(|c| c.trim().is_empty()) {
            return Err("healthcheck_cells must not contain empty cell names".to_string());
        }
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: TxThrottlerConfig = toml::from_str(content)?;
        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Parameters of the replication-lag decision engine.
///
/// The throttler never interprets these; they are pushed into the engine
/// right after it is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LagConfig {
    pub target_replication_lag_sec: i64,
    pub max_replication_lag_sec: i64,
    pub initial_rate: i64,
    pub max_increase: f64,
    pub emergency_decrease: f64,
    pub min_duration_between_increases_sec: i64,
    pub max_duration_between_increases_sec: i64,
    pub min_duration_between_decreases_sec: i64,
    pub spread_backlog_across_sec: i64,
    pub ignore_n_slowest_replicas: i32,
    pub ignore_n_slowest_rdonlys: i32,
    pub age_bad_rate_after_sec: i64,
    pub bad_rate_increase: f64,
    pub max_rate_approach_threshold: f64,
}

impl Default for LagConfig {
    fn default() -> Self {
        Self {
            target_replication_lag_sec: 2,
            max_replication_lag_sec: 10,
            initial_rate: 100,
            max_increase: 1.0,
            emergency_decrease: 0.5,
            min_duration_between_increases_sec: 40,
            max_duration_between_increases_sec: 62,
            min_duration_between_decreases_sec: 20,
            spread_backlog_across_sec: 20,
            ignore_n_slowest_replicas: 0,
            ignore_n_slowest_rdonlys: 0,
            age_bad_rate_after_sec: 3 * 60,
            bad_rate_increase: 0.10,
            max_rate_approach_threshold: 0.90,
        }
    }
}

/// Parse a duration string like "5s", "500ms", "2m", "1h".
///
/// A bare number is read as seconds. Values that overflow yield `None`.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        scaled_secs(mins, 60)
    } else if let Some(hours) = s.strip_suffix('h') {
        scaled_secs(hours, 3600)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

fn scaled_secs(value: &str, unit: u64) -> Option<Duration> {
    let n = value.trim().parse::<u64>().ok()?;
    n.checked_mul(unit).map(Duration::from_secs)
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        if d.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", d.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", d.as_millis()))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid duration: {raw:?}")))
    }
}

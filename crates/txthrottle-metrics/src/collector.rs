//! Metrics registry: labelled atomic counters and gauges.
//!
//! Label maps sit behind a `parking_lot::RwLock`; the hot path only takes
//! the read side once a label set exists.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use txthrottle_core::TabletType;

/// Label key for per-(cell, role) sample counters.
pub type CellTypeKey = (String, TabletType);

/// Monotonic counters keyed by a label value.
struct Counters<K: Ord> {
    values: RwLock<BTreeMap<K, AtomicU64>>,
}

impl<K: Ord + Clone> Counters<K> {
    fn new() -> Self {
        Self {
            values: RwLock::new(BTreeMap::new()),
        }
    }

    fn add(&self, key: &K, n: u64) {
        {
            let values = self.values.read();
            if let Some(v) = values.get(key) {
                v.fetch_add(n, Ordering::Relaxed);
                return;
            }
        }
        let mut values = self.values.write();
        values
            .entry(key.clone())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(n, Ordering::Relaxed);
    }

    fn get(&self, key: &K) -> u64 {
        self.values
            .read()
            .get(key)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn snapshot(&self) -> Vec<(K, u64)> {
        self.values
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect()
    }
}

/// All throttler metrics for one facade.
pub struct ThrottlerMetrics {
    running: AtomicI64,
    /// cell → number of live topology watchers.
    topo_watchers: RwLock<BTreeMap<String, AtomicI64>>,
    healthchecks_read: Counters<CellTypeKey>,
    healthchecks_recorded: Counters<CellTypeKey>,
    requests: Counters<String>,
    throttled: Counters<String>,
}

impl Default for ThrottlerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ThrottlerMetrics {
    pub fn new() -> Self {
        Self {
            running: AtomicI64::new(0),
            topo_watchers: RwLock::new(BTreeMap::new()),
            healthchecks_read: Counters::new(),
            healthchecks_recorded: Counters::new(),
            requests: Counters::new(),
            throttled: Counters::new(),
        }
    }

    // ── Running gauge ──────────────────────────────────────────────

    pub fn set_running(&self, running: bool) {
        self.running.store(i64::from(running), Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed) != 0
    }

    // ── Topology watcher gauges ────────────────────────────────────

    pub fn add_topo_watcher(&self, cell: &str, delta: i64) {
        {
            let watchers = self.topo_watchers.read();
            if let Some(v) = watchers.get(cell) {
                v.fetch_add(delta, Ordering::Relaxed);
                return;
            }
        }
        let mut watchers = self.topo_watchers.write();
        watchers
            .entry(cell.to_string())
            .or_insert_with(|| AtomicI64::new(0))
            .fetch_add(delta, Ordering::Relaxed);
    }

    /// Drop the gauge for `cell` entirely.
    pub fn reset_topo_watcher(&self, cell: &str) {
        if self.topo_watchers.write().remove(cell).is_some() {
            debug!(%cell, "topology watcher gauge reset");
        }
    }

    pub fn topo_watchers(&self, cell: &str) -> Option<i64> {
        self.topo_watchers
            .read()
            .get(cell)
            .map(|v| v.load(Ordering::Relaxed))
    }

    /// Cells that currently have a watcher gauge, in sorted order.
    pub fn watched_cells(&self) -> Vec<String> {
        self.topo_watchers.read().keys().cloned().collect()
    }

    pub fn topo_watcher_snapshot(&self) -> Vec<(String, i64)> {
        self.topo_watchers
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect()
    }

    // ── Health sample counters ─────────────────────────────────────

    pub fn add_healthcheck_read(&self, cell: &str, tablet_type: TabletType) {
        self.healthchecks_read.add(&(cell.to_string(), tablet_type), 1);
    }

    pub fn add_healthcheck_recorded(&self, cell: &str, tablet_type: TabletType) {
        self.healthchecks_recorded
            .add(&(cell.to_string(), tablet_type), 1);
    }

    pub fn healthchecks_read(&self, cell: &str, tablet_type: TabletType) -> u64 {
        self.healthchecks_read.get(&(cell.to_string(), tablet_type))
    }

    pub fn healthchecks_recorded(&self, cell: &str, tablet_type: TabletType) -> u64 {
        self.healthchecks_recorded
            .get(&(cell.to_string(), tablet_type))
    }

    pub fn healthchecks_read_snapshot(&self) -> Vec<(CellTypeKey, u64)> {
        self.healthchecks_read.snapshot()
    }

    pub fn healthchecks_recorded_snapshot(&self) -> Vec<(CellTypeKey, u64)> {
        self.healthchecks_recorded.snapshot()
    }

    // ── Request counters ───────────────────────────────────────────

    pub fn add_request(&self, workload: &str) {
        self.requests.add(&workload.to_string(), 1);
    }

    pub fn add_throttled(&self, workload: &str) {
        self.throttled.add(&workload.to_string(), 1);
    }

    pub fn requests(&self, workload: &str) -> u64 {
        self.requests.get(&workload.to_string())
    }

    pub fn throttled(&self, workload: &str) -> u64 {
        self.throttled.get(&workload.to_string())
    }

    pub fn requests_snapshot(&self) -> Vec<(String, u64)> {
        self.requests.snapshot()
    }

    pub fn throttled_snapshot(&self) -> Vec<(String, u64)> {
        self.throttled.snapshot()
    }
}

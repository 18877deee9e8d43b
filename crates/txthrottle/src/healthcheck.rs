//! Health feed and per-cell topology watcher interfaces.
//!
//! A `HealthStream` pairs one health-check subscription with one topology
//! watcher per watched cell. The pair is always built and torn down
//! together, including when the stream is dropped without an explicit
//! `close` (for example while a panicking task unwinds).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use txthrottle_core::{TabletHealth, Target};
use txthrottle_metrics::ThrottlerMetrics;

/// How often a topology watcher re-reads tablet membership.
pub const DEFAULT_TOPOLOGY_WATCHER_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Concurrent topology reads allowed per watcher.
pub const DEFAULT_TOPO_READ_CONCURRENCY: usize = 32;

/// A streaming source of tablet health samples.
///
/// Topology watchers add and remove tablets on it; subscribers receive a
/// sample whenever a watched tablet reports.
pub trait HealthCheck: Send + Sync {
    /// Open a delivery queue of health samples.
    fn subscribe(&self) -> mpsc::Receiver<TabletHealth>;

    /// Stop health-checking and drop all subscribers.
    fn close(&self);
}

/// Creates health checks.
pub trait HealthCheckFactory: Send + Sync {
    /// Open a health check owned by `local_cell` that watches tablets in
    /// `cells_to_watch`.
    fn new_health_check(&self, local_cell: &str, cells_to_watch: &[String]) -> Arc<dyn HealthCheck>;
}

/// Keeps a health check's tablet set in sync with one cell's topology.
pub trait TopologyWatcher: Send {
    fn start(&mut self);
    fn stop(&mut self);
}

/// Where and how a topology watcher looks.
#[derive(Debug, Clone, Copy)]
pub struct WatcherSpec<'a> {
    pub cell: &'a str,
    /// Only tablets of this keyspace are tracked.
    pub keyspace: &'a str,
    pub shard: &'a str,
    pub refresh_interval: Duration,
    pub topo_read_concurrency: usize,
}

/// Creates one topology watcher per watched cell.
pub trait TopologyWatcherFactory: Send + Sync {
    fn new_watcher(
        &self,
        health_check: Arc<dyn HealthCheck>,
        spec: WatcherSpec<'_>,
    ) -> Box<dyn TopologyWatcher>;
}

/// A live health-check subscription plus its per-cell watchers.
pub(crate) struct HealthStream {
    health_check: Arc<dyn HealthCheck>,
    pub(crate) samples: mpsc::Receiver<TabletHealth>,
    watchers: BTreeMap<String, Box<dyn TopologyWatcher>>,
    metrics: Arc<ThrottlerMetrics>,
    /// The delivery queue reported end-of-stream.
    pub(crate) drained: bool,
    closed: bool,
}

impl HealthStream {
    /// Subscribe to a new health check over `cells` and start one watcher
    /// per cell.
    pub(crate) fn open(
        health_checks: &dyn HealthCheckFactory,
        watchers: &dyn TopologyWatcherFactory,
        target: &Target,
        cells: &[String],
        metrics: Arc<ThrottlerMetrics>,
    ) -> Self {
        let health_check = health_checks.new_health_check(&target.cell, cells);
        let samples = health_check.subscribe();

        let mut started = BTreeMap::new();
        for cell in cells {
            let mut watcher = watchers.new_watcher(
                Arc::clone(&health_check),
                WatcherSpec {
                    cell,
                    keyspace: &target.keyspace,
                    shard: &target.shard,
                    refresh_interval: DEFAULT_TOPOLOGY_WATCHER_REFRESH_INTERVAL,
                    topo_read_concurrency: DEFAULT_TOPO_READ_CONCURRENCY,
                },
            );
            watcher.start();
            metrics.add_topo_watcher(cell, 1);
            debug!(%cell, keyspace = %target.keyspace, "topology watcher started");
            started.insert(cell.clone(), watcher);
        }

        Self {
            health_check,
            samples,
            watchers: started,
            metrics,
            drained: false,
            closed: false,
        }
    }

    /// Cells with a running watcher.
    pub(crate) fn cells(&self) -> Vec<String> {
        self.watchers.keys().cloned().collect()
    }

    /// Stop every watcher, then close the subscription. Idempotent.
    pub(crate) fn close(&mut self) {
        if self.closed {
            return;
        }
        for (cell, mut watcher) in std::mem::take(&mut self.watchers) {
            watcher.stop();
            self.metrics.reset_topo_watcher(&cell);
            debug!(%cell, "topology watcher stopped");
        }
        self.samples.close();
        self.health_check.close();
        self.closed = true;
    }
}

impl Drop for HealthStream {
    fn drop(&mut self) {
        self.close();
    }
}

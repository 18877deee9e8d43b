//! Health check processor: the background task of an open throttler.
//!
//! Waits on three sources and handles whichever is ready first:
//! - shutdown signal → exit and hand the health stream back to the owner
//! - cell refresh tick (only for topology-derived cells) → re-read the
//!   topology and rebuild the health stream if the cell set changed
//! - health sample → `stats_update`
//!
//! No ordering is promised between sources that are ready at the same
//! time. A rebuild replaces the whole stream, so samples from the new
//! subscription are only processed after the rebuild has finished.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use txthrottle_core::{TabletHealth, Target};

use crate::healthcheck::HealthStream;
use crate::state::StateInner;
use crate::throttler::Collaborators;
use crate::topo::{REMOTE_OPERATION_TIMEOUT, fetch_known_cells};

enum Event {
    Shutdown,
    RefreshCells,
    Sample(Option<TabletHealth>),
}

pub(crate) struct HealthCheckProcessor {
    inner: Arc<StateInner>,
    deps: Collaborators,
    target: Target,
    /// Sorted set of cells currently watched.
    cells: Vec<String>,
    cells_from_topo: bool,
    stream: HealthStream,
}

impl HealthCheckProcessor {
    pub(crate) fn new(
        inner: Arc<StateInner>,
        deps: Collaborators,
        target: Target,
        cells: Vec<String>,
        cells_from_topo: bool,
        stream: HealthStream,
    ) -> Self {
        Self {
            inner,
            deps,
            target,
            cells,
            cells_from_topo,
            stream,
        }
    }

    /// Run until `shutdown` fires. Returns the live health stream so the
    /// owner can close it.
    pub(crate) async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> HealthStream {
        let mut refresh = if self.cells_from_topo {
            refresh_ticker(self.inner.config().topo_refresh_interval)
        } else {
            None
        };

        debug!(cells = ?self.cells, cells_from_topo = self.cells_from_topo, "health check processor starting");

        loop {
            let event = tokio::select! {
                _ = shutdown.changed() => Event::Shutdown,
                _ = next_tick(&mut refresh) => Event::RefreshCells,
                sample = self.stream.samples.recv(), if !self.stream.drained => Event::Sample(sample),
            };

            match event {
                Event::Shutdown => break,
                Event::RefreshCells => {
                    if !self.update_health_check_cells(&mut shutdown).await {
                        break;
                    }
                }
                Event::Sample(Some(health)) => self.inner.stats_update(&health),
                Event::Sample(None) => {
                    warn!(cells = ?self.cells, "txThrottler: health check delivery queue closed");
                    self.stream.drained = true;
                }
            }
        }

        debug!("health check processor stopped");
        self.stream
    }

    /// Re-read the known cells and rebuild the stream on change.
    ///
    /// Returns `false` if shutdown was signalled while waiting on the
    /// topology.
    async fn update_health_check_cells(&mut self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let known_cells = tokio::select! {
            cells = fetch_known_cells(self.deps.topo.as_ref(), &self.target, REMOTE_OPERATION_TIMEOUT) => cells,
            _ = shutdown.changed() => return false,
        };

        if known_cells != self.cells {
            info!(
                old = ?self.cells,
                new = ?known_cells,
                "txThrottler: restarting healthcheck stream due to topology cells update"
            );
            // Old pair fully down before the new one comes up.
            self.stream.close();
            self.stream = HealthStream::open(
                self.deps.health_checks.as_ref(),
                self.deps.watchers.as_ref(),
                &self.target,
                &known_cells,
                self.inner.metrics_handle(),
            );
            self.cells = known_cells;
            debug_assert_eq!(self.stream.cells(), self.cells);
        }
        true
    }
}

/// Ticker for periodic cell refreshes. `None` if the first deadline is
/// not representable, in which case the cell set is never re-read.
fn refresh_ticker(period: Duration) -> Option<Interval> {
    let Some(start) = Instant::now().checked_add(period) else {
        warn!(?period, "txThrottler: topology refresh interval out of range, cells will not be refreshed");
        return None;
    };
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(ticker)
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

//! Transaction throttler facade.
//!
//! Intended usage:
//!
//! ```text
//! let throttler = TxThrottler::new(config, collaborators);
//! throttler.init_target(&target);
//! throttler.open().await?;
//!
//! // Before every transaction:
//! if throttler.throttle(priority, "oltp") {
//!     // back off
//! }
//!
//! throttler.close().await;
//! ```
//!
//! `open` and `close` are serialized against each other. `throttle` may be
//! called from any number of threads at once and never blocks on I/O.

use std::sync::Arc;

use parking_lot::RwLock;
use rand::Rng;
use tracing::info;

use txthrottle_core::{Target, TxThrottlerConfig};
use txthrottle_metrics::ThrottlerMetrics;

use crate::engine::LagThrottlerFactory;
use crate::error::{ThrottlerError, ThrottlerResult};
use crate::healthcheck::{HealthCheckFactory, TopologyWatcherFactory};
use crate::state::ThrottlerState;
use crate::topo::TopoServer;

/// Exclusive upper bound of the caller priority range.
pub const MAX_PRIORITY_VALUE: i32 = 100;

/// External services the throttler consumes.
#[derive(Clone)]
pub struct Collaborators {
    pub topo: Arc<dyn TopoServer>,
    pub health_checks: Arc<dyn HealthCheckFactory>,
    pub watchers: Arc<dyn TopologyWatcherFactory>,
    pub engines: Arc<dyn LagThrottlerFactory>,
}

enum Lifecycle {
    Closed,
    Open(ThrottlerState),
}

/// Throttles transactions based on replica replication lag.
pub struct TxThrottler {
    config: Arc<TxThrottlerConfig>,
    deps: Collaborators,
    target: RwLock<Option<Target>>,
    lifecycle: RwLock<Lifecycle>,
    /// Serializes `open` and `close`.
    transition: tokio::sync::Mutex<()>,
    metrics: Arc<ThrottlerMetrics>,
}

impl TxThrottler {
    pub fn new(config: TxThrottlerConfig, deps: Collaborators) -> Self {
        if config.enabled {
            info!(?config, "initialized transaction throttler");
        }
        Self {
            config: Arc::new(config),
            deps,
            target: RwLock::new(None),
            lifecycle: RwLock::new(Lifecycle::Closed),
            transition: tokio::sync::Mutex::new(()),
            metrics: Arc::new(ThrottlerMetrics::new()),
        }
    }

    /// Record the identity of the local node. Must precede `open`.
    pub fn init_target(&self, target: &Target) {
        *self.target.write() = Some(target.clone());
    }

    pub fn target(&self) -> Option<Target> {
        self.target.read().clone()
    }

    pub fn config(&self) -> &TxThrottlerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &ThrottlerMetrics {
        &self.metrics
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.lifecycle.read(), Lifecycle::Open(_))
    }

    /// Start watching replica health. No-op when disabled or already open.
    ///
    /// On error the throttler stays closed and `open` may be retried.
    pub async fn open(&self) -> ThrottlerResult<()> {
        if !self.config.enabled {
            return Ok(());
        }
        let _transition = self.transition.lock().await;
        if self.is_open() {
            return Ok(());
        }

        self.config.validate().map_err(ThrottlerError::Config)?;
        let target = self.target().ok_or(ThrottlerError::TargetNotInitialized)?;

        info!(%target, "txThrottler: opening");
        let state = ThrottlerState::new(
            Arc::clone(&self.config),
            target,
            self.deps.clone(),
            Arc::clone(&self.metrics),
        )
        .await?;

        *self.lifecycle.write() = Lifecycle::Open(state);
        self.metrics.set_running(true);
        Ok(())
    }

    /// Release all resources. No-op when disabled or already closed.
    ///
    /// Returns only after watchers, the health subscription and the
    /// engine have all been shut down.
    pub async fn close(&self) {
        if !self.config.enabled {
            return;
        }
        let _transition = self.transition.lock().await;

        let previous = {
            let mut lifecycle = self.lifecycle.write();
            std::mem::replace(&mut *lifecycle, Lifecycle::Closed)
        };
        let state = match previous {
            Lifecycle::Open(state) => state,
            Lifecycle::Closed => return,
        };

        state.deallocate_resources().await;
        self.metrics.set_running(false);
        info!("txThrottler: closed");
    }

    /// Whether a transaction of `priority` should back off.
    ///
    /// Throttled only if the engine asks for it and a uniform draw from
    /// `[0, MAX_PRIORITY_VALUE)` is below `priority`. In dry-run mode the
    /// counters still see the verdict but `false` is returned.
    pub fn throttle(&self, priority: i32, workload: &str) -> bool {
        if !self.config.enabled {
            return false;
        }
        let engine_verdict = {
            let lifecycle = self.lifecycle.read();
            match &*lifecycle {
                Lifecycle::Open(state) => state.throttle(),
                Lifecycle::Closed => return false,
            }
        };

        let result =
            engine_verdict && rand::thread_rng().gen_range(0..MAX_PRIORITY_VALUE) < priority;

        self.metrics.add_request(workload);
        if result {
            self.metrics.add_throttled(workload);
        }

        result && !self.config.dry_run
    }
}

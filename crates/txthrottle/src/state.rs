//! Throttler state: the live resources of an open throttler.
//!
//! Construction creates and configures the lag engine, resolves the cell
//! set, opens the health stream and spawns the processor task. Teardown
//! runs in the reverse order: processor, watchers, subscription, engine.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use txthrottle_core::{TabletHealth, Target, TxThrottlerConfig};
use txthrottle_metrics::ThrottlerMetrics;

use crate::engine::{EngineSpec, LagThrottler, THREAD_ID};
use crate::error::{ThrottlerError, ThrottlerResult};
use crate::healthcheck::HealthStream;
use crate::processor::HealthCheckProcessor;
use crate::throttler::Collaborators;
use crate::topo::{REMOTE_OPERATION_TIMEOUT, fetch_known_cells, normalize_cells};

/// State shared between the facade and the processor task.
pub(crate) struct StateInner {
    config: Arc<TxThrottlerConfig>,
    metrics: Arc<ThrottlerMetrics>,
    /// `None` once released. The mutex also serializes `throttle` calls,
    /// which the engine requires per slot.
    engine: Mutex<Option<Arc<dyn LagThrottler>>>,
}

impl StateInner {
    pub(crate) fn new(
        config: Arc<TxThrottlerConfig>,
        metrics: Arc<ThrottlerMetrics>,
        engine: Arc<dyn LagThrottler>,
    ) -> Self {
        Self {
            config,
            metrics,
            engine: Mutex::new(Some(engine)),
        }
    }

    pub(crate) fn metrics(&self) -> &ThrottlerMetrics {
        &self.metrics
    }

    pub(crate) fn metrics_handle(&self) -> Arc<ThrottlerMetrics> {
        Arc::clone(&self.metrics)
    }

    pub(crate) fn config(&self) -> &TxThrottlerConfig {
        &self.config
    }

    /// Whether the engine currently asks for a back-off.
    pub(crate) fn throttle(&self) -> bool {
        let engine = self.engine.lock();
        match engine.as_ref() {
            Some(engine) => !engine.throttle(THREAD_ID).is_zero(),
            None => {
                error!("txThrottler: throttle called after resources were deallocated");
                false
            }
        }
    }

    /// Count a health sample and feed it to the engine if its role is
    /// one we throttle on.
    pub(crate) fn stats_update(&self, health: &TabletHealth) {
        if self.config.tablet_types.is_empty() {
            return;
        }

        let cell = &health.target.cell;
        let tablet_type = health.target.tablet_type;
        self.metrics.add_healthcheck_read(cell, tablet_type);

        if !self.config.tablet_types.contains(&tablet_type) {
            return;
        }
        let engine = self.engine.lock().clone();
        match engine {
            Some(engine) => {
                engine.record_replication_lag(health.observed_at, health);
                self.metrics.add_healthcheck_recorded(cell, tablet_type);
            }
            None => warn!(
                tablet = %health.tablet_alias,
                "txThrottler: dropping health sample, engine already released"
            ),
        }
    }

    fn release_engine(&self) {
        if let Some(engine) = self.engine.lock().take() {
            engine.close();
            debug!("lag throttler released");
        }
    }
}

/// Closes an engine unless construction finishes and takes it over.
///
/// Covers both an early error return and the `open` future being dropped
/// while the topology read is pending.
struct EngineGuard {
    engine: Arc<dyn LagThrottler>,
    armed: bool,
}

impl EngineGuard {
    fn new(engine: Arc<dyn LagThrottler>) -> Self {
        Self { engine, armed: true }
    }

    fn disarm(mut self) -> Arc<dyn LagThrottler> {
        self.armed = false;
        Arc::clone(&self.engine)
    }
}

impl Drop for EngineGuard {
    fn drop(&mut self) {
        if self.armed {
            self.engine.close();
            debug!("lag throttler closed, throttler state not constructed");
        }
    }
}

/// Resources owned by an open throttler.
pub(crate) struct ThrottlerState {
    inner: Arc<StateInner>,
    shutdown_tx: watch::Sender<bool>,
    processor: JoinHandle<HealthStream>,
}

impl ThrottlerState {
    /// Build the state and start its processor.
    ///
    /// Fails only if the engine cannot be created or configured, in which
    /// case nothing has been started.
    pub(crate) async fn new(
        config: Arc<TxThrottlerConfig>,
        target: Target,
        deps: Collaborators,
        metrics: Arc<ThrottlerMetrics>,
    ) -> ThrottlerResult<Self> {
        let engine = deps
            .engines
            .new_throttler(EngineSpec::transaction_throttler(&config.throttler))
            .map_err(ThrottlerError::EngineCreate)?;
        let guard = EngineGuard::new(engine);
        guard
            .engine
            .update_configuration(&config.throttler, true)
            .map_err(ThrottlerError::EngineConfig)?;

        let cells_from_topo = config.healthcheck_cells.is_empty();
        let cells = if cells_from_topo {
            fetch_known_cells(deps.topo.as_ref(), &target, REMOTE_OPERATION_TIMEOUT).await
        } else {
            normalize_cells(config.healthcheck_cells.iter().cloned())
        };
        info!(?cells, cells_from_topo, %target, "txThrottler: watching cells");

        let inner = Arc::new(StateInner::new(config, metrics, guard.disarm()));
        let stream = HealthStream::open(
            deps.health_checks.as_ref(),
            deps.watchers.as_ref(),
            &target,
            &cells,
            inner.metrics_handle(),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let processor = HealthCheckProcessor::new(
            Arc::clone(&inner),
            deps,
            target,
            cells,
            cells_from_topo,
            stream,
        );
        let processor = tokio::spawn(processor.run(shutdown_rx));

        Ok(Self {
            inner,
            shutdown_tx,
            processor,
        })
    }

    pub(crate) fn throttle(&self) -> bool {
        self.inner.throttle()
    }

    /// Stop the processor, close the health stream, then release the
    /// engine. Returns once everything is down.
    ///
    /// If the processor panicked, its stream was closed while the task
    /// unwound, before the join handle resolved.
    pub(crate) async fn deallocate_resources(self) {
        let _ = self.shutdown_tx.send(true);

        match self.processor.await {
            Ok(mut stream) => stream.close(),
            Err(e) => error!(error = %e, "txThrottler: health check processor failed"),
        }

        // The processor has exited, so no sample can reach the engine now.
        self.inner.release_engine();
    }
}

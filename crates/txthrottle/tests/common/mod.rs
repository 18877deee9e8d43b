//! Recording test doubles for the throttler's collaborators.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use txthrottle::topo::KnownCellsFuture;
use txthrottle::{
    Collaborators, EngineSpec, HealthCheck, HealthCheckFactory, LagConfig, LagThrottler,
    LagThrottlerFactory, TabletHealth, TabletType, Target, TopoServer, TopologyWatcher,
    TopologyWatcherFactory, WatcherSpec,
};

/// Calls observed on the doubles, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    EngineCreated,
    EngineConfigured,
    EngineClosed,
    HealthCheckOpened(Vec<String>),
    HealthCheckClosed(Vec<String>),
    WatcherStarted(String),
    WatcherStopped(String),
}

#[derive(Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Recorder {
    pub fn push(&self, call: Call) {
        self.calls.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    /// Forget everything seen so far.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

// ── Topology ───────────────────────────────────────────────────────

pub struct FakeTopology {
    cells: Mutex<Option<Vec<String>>>,
    queries: AtomicUsize,
    hanging: AtomicBool,
}

impl FakeTopology {
    pub fn new(cells: &[&str]) -> Self {
        Self {
            cells: Mutex::new(Some(cells.iter().map(|c| c.to_string()).collect())),
            queries: AtomicUsize::new(0),
            hanging: AtomicBool::new(false),
        }
    }

    pub fn set_cells(&self, cells: &[&str]) {
        *self.cells.lock() = Some(cells.iter().map(|c| c.to_string()).collect());
    }

    /// Make every following query fail.
    pub fn fail(&self) {
        *self.cells.lock() = None;
    }

    /// Make every following query wait forever.
    pub fn hang(&self) {
        self.hanging.store(true, Ordering::SeqCst);
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl TopoServer for FakeTopology {
    fn known_cells(&self) -> KnownCellsFuture<'_> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.hanging.load(Ordering::SeqCst) {
            return Box::pin(std::future::pending::<anyhow::Result<Vec<String>>>());
        }
        let cells = self.cells.lock().clone();
        Box::pin(async move { cells.ok_or_else(|| anyhow::anyhow!("topo server unavailable")) })
    }
}

// ── Health feed ────────────────────────────────────────────────────

pub struct FakeHealthCheck {
    cells: Vec<String>,
    sender: Mutex<Option<mpsc::Sender<TabletHealth>>>,
    closed: AtomicBool,
    recorder: Recorder,
}

impl FakeHealthCheck {
    pub fn cells(&self) -> Vec<String> {
        self.cells.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sender side of the current subscription.
    pub fn sender(&self) -> Option<mpsc::Sender<TabletHealth>> {
        self.sender.lock().clone()
    }

    /// Drop the sender so the subscriber sees end-of-stream.
    pub fn hang_up(&self) {
        self.sender.lock().take();
    }
}

impl HealthCheck for FakeHealthCheck {
    fn subscribe(&self) -> mpsc::Receiver<TabletHealth> {
        let (tx, rx) = mpsc::channel(64);
        *self.sender.lock() = Some(tx);
        rx
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.sender.lock().take();
        self.recorder.push(Call::HealthCheckClosed(self.cells.clone()));
    }
}

pub struct FakeHealthCheckFactory {
    recorder: Recorder,
    opened: Mutex<Vec<(String, Arc<FakeHealthCheck>)>>,
}

impl FakeHealthCheckFactory {
    pub fn new(recorder: Recorder) -> Self {
        Self {
            recorder,
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Every health check opened so far with its owner cell.
    pub fn opened(&self) -> Vec<(String, Arc<FakeHealthCheck>)> {
        self.opened.lock().clone()
    }

    pub fn latest(&self) -> Arc<FakeHealthCheck> {
        Arc::clone(&self.opened.lock().last().expect("no health check opened").1)
    }
}

impl HealthCheckFactory for FakeHealthCheckFactory {
    fn new_health_check(&self, local_cell: &str, cells_to_watch: &[String]) -> Arc<dyn HealthCheck> {
        let hc = Arc::new(FakeHealthCheck {
            cells: cells_to_watch.to_vec(),
            sender: Mutex::new(None),
            closed: AtomicBool::new(false),
            recorder: self.recorder.clone(),
        });
        self.recorder.push(Call::HealthCheckOpened(cells_to_watch.to_vec()));
        self.opened.lock().push((local_cell.to_string(), Arc::clone(&hc)));
        hc
    }
}

// ── Topology watchers ──────────────────────────────────────────────

/// What a watcher was created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherArgs {
    pub cell: String,
    pub keyspace: String,
    pub shard: String,
    pub refresh_interval: Duration,
    pub topo_read_concurrency: usize,
}

struct FakeWatcher {
    cell: String,
    recorder: Recorder,
}

impl TopologyWatcher for FakeWatcher {
    fn start(&mut self) {
        self.recorder.push(Call::WatcherStarted(self.cell.clone()));
    }

    fn stop(&mut self) {
        self.recorder.push(Call::WatcherStopped(self.cell.clone()));
    }
}

pub struct FakeWatcherFactory {
    recorder: Recorder,
    created: Mutex<Vec<WatcherArgs>>,
}

impl FakeWatcherFactory {
    pub fn new(recorder: Recorder) -> Self {
        Self {
            recorder,
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn created(&self) -> Vec<WatcherArgs> {
        self.created.lock().clone()
    }
}

impl TopologyWatcherFactory for FakeWatcherFactory {
    fn new_watcher(
        &self,
        _health_check: Arc<dyn HealthCheck>,
        spec: WatcherSpec<'_>,
    ) -> Box<dyn TopologyWatcher> {
        self.created.lock().push(WatcherArgs {
            cell: spec.cell.to_string(),
            keyspace: spec.keyspace.to_string(),
            shard: spec.shard.to_string(),
            refresh_interval: spec.refresh_interval,
            topo_read_concurrency: spec.topo_read_concurrency,
        });
        Box::new(FakeWatcher {
            cell: spec.cell.to_string(),
            recorder: self.recorder.clone(),
        })
    }
}

// ── Lag engine ─────────────────────────────────────────────────────

pub struct FakeEngine {
    throttling: AtomicBool,
    panic_on_record: AtomicBool,
    recorded: Mutex<Vec<(SystemTime, TabletHealth)>>,
    recorder: Recorder,
}

impl FakeEngine {
    pub fn set_throttling(&self, on: bool) {
        self.throttling.store(on, Ordering::SeqCst);
    }

    /// Make the next `record_replication_lag` call panic.
    pub fn panic_on_record(&self) {
        self.panic_on_record.store(true, Ordering::SeqCst);
    }

    pub fn recorded(&self) -> Vec<(SystemTime, TabletHealth)> {
        self.recorded.lock().clone()
    }
}

impl LagThrottler for FakeEngine {
    fn throttle(&self, thread_id: usize) -> Duration {
        assert_eq!(thread_id, 0, "transaction throttler uses a single slot");
        if self.throttling.load(Ordering::SeqCst) {
            Duration::from_millis(50)
        } else {
            Duration::ZERO
        }
    }

    fn record_replication_lag(&self, at: SystemTime, health: &TabletHealth) {
        if self.panic_on_record.load(Ordering::SeqCst) {
            panic!("lag engine failed on {}", health.tablet_alias);
        }
        self.recorded.lock().push((at, health.clone()));
    }

    fn update_configuration(&self, _config: &LagConfig, copy_zero_values: bool) -> anyhow::Result<()> {
        assert!(copy_zero_values);
        self.recorder.push(Call::EngineConfigured);
        Ok(())
    }

    fn close(&self) {
        self.recorder.push(Call::EngineClosed);
    }
}

/// Engine whose configuration push always fails.
struct MisconfiguredEngine {
    recorder: Recorder,
}

impl LagThrottler for MisconfiguredEngine {
    fn throttle(&self, _thread_id: usize) -> Duration {
        Duration::ZERO
    }

    fn record_replication_lag(&self, _at: SystemTime, _health: &TabletHealth) {}

    fn update_configuration(&self, _config: &LagConfig, _copy: bool) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("max_replication_lag_sec must be >= target"))
    }

    fn close(&self) {
        self.recorder.push(Call::EngineClosed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    Healthy,
    FailCreate,
    FailConfigure,
}

pub struct FakeEngineFactory {
    recorder: Recorder,
    mode: Mutex<EngineMode>,
    engines: Mutex<Vec<Arc<FakeEngine>>>,
    specs: Mutex<Vec<(String, String, usize, i64)>>,
}

impl FakeEngineFactory {
    pub fn new(recorder: Recorder) -> Self {
        Self {
            recorder,
            mode: Mutex::new(EngineMode::Healthy),
            engines: Mutex::new(Vec::new()),
            specs: Mutex::new(Vec::new()),
        }
    }

    pub fn set_mode(&self, mode: EngineMode) {
        *self.mode.lock() = mode;
    }

    pub fn latest(&self) -> Arc<FakeEngine> {
        Arc::clone(self.engines.lock().last().expect("no engine created"))
    }

    /// (name, unit, thread_count, max_rate) for every construction.
    pub fn specs(&self) -> Vec<(String, String, usize, i64)> {
        self.specs.lock().clone()
    }
}

impl LagThrottlerFactory for FakeEngineFactory {
    fn new_throttler(&self, spec: EngineSpec<'_>) -> anyhow::Result<Arc<dyn LagThrottler>> {
        self.specs.lock().push((
            spec.name.to_string(),
            spec.unit.to_string(),
            spec.thread_count,
            spec.max_rate,
        ));
        match *self.mode.lock() {
            EngineMode::FailCreate => Err(anyhow::anyhow!("invalid max rate")),
            EngineMode::FailConfigure => {
                self.recorder.push(Call::EngineCreated);
                Ok(Arc::new(MisconfiguredEngine {
                    recorder: self.recorder.clone(),
                }))
            }
            EngineMode::Healthy => {
                self.recorder.push(Call::EngineCreated);
                let engine = Arc::new(FakeEngine {
                    throttling: AtomicBool::new(false),
                    panic_on_record: AtomicBool::new(false),
                    recorded: Mutex::new(Vec::new()),
                    recorder: self.recorder.clone(),
                });
                self.engines.lock().push(Arc::clone(&engine));
                Ok(engine)
            }
        }
    }
}

// ── Harness ────────────────────────────────────────────────────────

pub struct Harness {
    pub recorder: Recorder,
    pub topo: Arc<FakeTopology>,
    pub health_checks: Arc<FakeHealthCheckFactory>,
    pub watchers: Arc<FakeWatcherFactory>,
    pub engines: Arc<FakeEngineFactory>,
}

impl Harness {
    pub fn new(topology_cells: &[&str]) -> Self {
        let recorder = Recorder::default();
        Self {
            topo: Arc::new(FakeTopology::new(topology_cells)),
            health_checks: Arc::new(FakeHealthCheckFactory::new(recorder.clone())),
            watchers: Arc::new(FakeWatcherFactory::new(recorder.clone())),
            engines: Arc::new(FakeEngineFactory::new(recorder.clone())),
            recorder,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            topo: self.topo.clone(),
            health_checks: self.health_checks.clone(),
            watchers: self.watchers.clone(),
            engines: self.engines.clone(),
        }
    }
}

pub fn local_target() -> Target {
    Target::new("zone1", "commerce", "-80", TabletType::Primary)
}

pub fn sample(alias: &str, cell: &str, tablet_type: TabletType, lag: Duration) -> TabletHealth {
    TabletHealth::new(alias, Target::new(cell, "commerce", "-80", tablet_type), lag)
}

/// Let spawned tasks run until they are idle again.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

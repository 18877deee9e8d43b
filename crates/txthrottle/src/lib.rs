//! txthrottle: replication-lag admission control for transactions.
//!
//! A `TxThrottler` is consulted before every transaction starts. While
//! open it streams tablet health samples from the served cells into an
//! injected lag decision engine and answers `throttle()` from the
//! engine's verdict, weighted by the caller's priority.
//!
//! # Architecture
//!
//! ```text
//! TxThrottler (facade: Closed | Open)
//!   └── ThrottlerState
//!       ├── LagThrottler (engine, calls serialized by a mutex)
//!       └── HealthCheckProcessor (background task)
//!           ├── HealthStream
//!           │   ├── HealthCheck subscription → sample queue
//!           │   └── TopologyWatcher per cell
//!           ├── sample    → stats_update() → engine
//!           └── refresh   → TopoServer::known_cells() → rebuild stream
//! ```
//!
//! All collaborators are injected through [`Collaborators`], so tests run
//! against recording doubles and never touch process-wide state.

pub mod engine;
pub mod error;
pub mod healthcheck;
pub mod processor;
pub mod state;
pub mod throttler;
pub mod topo;

pub use engine::{EngineSpec, LagThrottler, LagThrottlerFactory};
pub use error::{ThrottlerError, ThrottlerResult};
pub use healthcheck::{
    HealthCheck, HealthCheckFactory, TopologyWatcher, TopologyWatcherFactory, WatcherSpec,
};
pub use throttler::{Collaborators, MAX_PRIORITY_VALUE, TxThrottler};
pub use topo::{StaticTopology, TopoServer};

pub use txthrottle_core::{LagConfig, TabletHealth, TabletType, Target, TxThrottlerConfig};
pub use txthrottle_metrics::ThrottlerMetrics;

//! txthrottle-metrics: observability for the transaction throttler.
//!
//! Every counter and gauge is an atomic, so the facade, the background
//! health processor and any number of caller threads update them without
//! extra locking. Label maps grow on first use.
//!
//! # Architecture
//!
//! ```text
//! ThrottlerMetrics
//!   ├── running                      ← set by open/close
//!   ├── topo_watchers{cell}          ← one per live topology watcher
//!   ├── healthchecks_read{cell,type} ← every health sample
//!   ├── healthchecks_recorded{...}   ← samples fed to the lag engine
//!   ├── requests{workload}           ← every throttle() call
//!   └── throttled{workload}          ← calls with a positive verdict
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for a /metrics endpoint
//! ```

pub mod collector;
pub mod prometheus;

pub use collector::ThrottlerMetrics;
pub use prometheus::render_prometheus;

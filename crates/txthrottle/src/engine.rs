//! Lag decision engine interface.
//!
//! The engine turns replication-lag samples into a delay. How it does so
//! (rate limits, moving averages) is its own business; the
//! throttler only decides when to feed it and when to ask it.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use txthrottle_core::{LagConfig, TabletHealth};

/// Name the engine is registered under.
pub const TX_THROTTLER_NAME: &str = "TransactionThrottler";

/// Unit the engine's rate is expressed in.
pub const TX_THROTTLER_UNIT: &str = "TPS";

/// The throttler uses exactly one logical slot.
pub const THREAD_COUNT: usize = 1;

/// Slot id passed to every `throttle` call.
pub const THREAD_ID: usize = 0;

/// Max rate that disables the engine's fixed-rate module.
pub const MAX_RATE_MODULE_DISABLED: i64 = i64::MAX;

/// A replication-lag driven rate limiter.
///
/// `throttle` must be called sequentially per slot; the throttler state
/// holds a mutex around it. The other methods may be called from the
/// health processor task concurrently with `throttle`.
pub trait LagThrottler: Send + Sync {
    /// Ask for a verdict on `thread_id`. A positive delay means back off.
    fn throttle(&self, thread_id: usize) -> Duration;

    /// Feed one lag observation.
    fn record_replication_lag(&self, at: SystemTime, health: &TabletHealth);

    fn update_configuration(
        &self,
        config: &LagConfig,
        copy_zero_values: bool,
    ) -> anyhow::Result<()>;

    /// Release everything the engine holds. No calls follow.
    fn close(&self);
}

/// Construction parameters for a `LagThrottler`.
#[derive(Debug, Clone, Copy)]
pub struct EngineSpec<'a> {
    pub name: &'a str,
    pub unit: &'a str,
    pub thread_count: usize,
    pub max_rate: i64,
    pub config: &'a LagConfig,
}

impl<'a> EngineSpec<'a> {
    /// Parameters every transaction throttler engine is built with.
    pub fn transaction_throttler(config: &'a LagConfig) -> Self {
        Self {
            name: TX_THROTTLER_NAME,
            unit: TX_THROTTLER_UNIT,
            thread_count: THREAD_COUNT,
            max_rate: MAX_RATE_MODULE_DISABLED,
            config,
        }
    }
}

/// Builds a lag engine per open throttler.
pub trait LagThrottlerFactory: Send + Sync {
    fn new_throttler(&self, spec: EngineSpec<'_>) -> anyhow::Result<Arc<dyn LagThrottler>>;
}

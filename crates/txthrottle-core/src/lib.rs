//! txthrottle-core: shared types for the transaction throttler.
//!
//! Holds the node identity (`Target`), replica roles (`TabletType`), the
//! health samples streamed in from the health feed (`TabletHealth`), and
//! the immutable throttler configuration together with the opaque
//! parameter block handed to the lag decision engine.

pub mod config;
pub mod types;

pub use config::{LagConfig, TxThrottlerConfig, parse_duration};
pub use types::*;

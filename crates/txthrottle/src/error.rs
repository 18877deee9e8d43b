//! Throttler error types.

use thiserror::Error;

/// Errors returned by `TxThrottler::open`.
///
/// Any of these leaves the throttler closed; the caller retries `open`.
#[derive(Debug, Error)]
pub enum ThrottlerError {
    #[error("throttler target not initialized")]
    TargetNotInitialized,

    #[error("invalid throttler config: {0}")]
    Config(String),

    #[error("failed to create lag throttler: {0}")]
    EngineCreate(#[source] anyhow::Error),

    #[error("failed to configure lag throttler: {0}")]
    EngineConfig(#[source] anyhow::Error),
}

pub type ThrottlerResult<T> = Result<T, ThrottlerError>;

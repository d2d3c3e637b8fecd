use thiserror::Error;

/// Everything that can abort a tick. All variants are raised before any
/// write to the state store or block log (fail-closed); retry is the
/// scheduler's job, not ours.
#[derive(Debug, Error, Clone)]
pub enum TickError {
    #[error("controller state missing: {0}")]
    ConfigMissing(String),
    #[error("controller state malformed: {0}")]
    ConfigMalformed(String),
    #[error("od source unavailable: {0}")]
    OdSourceUnavailable(String),
    #[error("invalid od reading: {0}")]
    OdInvalid(String),
    #[error("block log unavailable: {0}")]
    LogStoreUnavailable(String),
    #[error("inconsistent controller state: {0}")]
    InconsistentState(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

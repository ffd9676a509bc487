//! Error taxonomy shared across the workspace.

use thiserror::Error;

/// Errors surfaced by the Rollcall library crates.
///
/// Per-recipient delivery failures never take this shape — they are
/// converted into delivery-log rows and batch error entries by the
/// dispatcher. Only infrastructure-level problems (store unreachable,
/// broken config) propagate as `RollcallError`.
#[derive(Debug, Error)]
pub enum RollcallError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Schedule error: {0}")]
    Schedule(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RollcallError>;

use std::collections::TryReserveError;
use std::fmt;

use thiserror::Error;

/// Which half of the job a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Map,
    Reduce,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Map => write!(f, "map"),
            Phase::Reduce => write!(f, "reduce"),
        }
    }
}

/// Errors surfaced by the engine.
///
/// - [`Error::Configuration`] and [`Error::Allocation`] are reported before
///   any worker thread runs user code.
/// - [`Error::InvalidRecord`] comes from loading serialized records.
/// - [`Error::Callback`] wraps the first mapper/reducer failure of a phase,
///   after every worker already started in that phase has been joined.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("resource allocation failed: {0}")]
    Allocation(String),

    #[error("invalid record at index {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error("{phase} callback failed in task {task_id}")]
    Callback {
        phase: Phase,
        task_id: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl Error {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    pub fn is_callback(&self) -> bool {
        matches!(self, Error::Callback { .. })
    }
}

impl From<TryReserveError> for Error {
    fn from(e: TryReserveError) -> Self {
        Error::Allocation(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

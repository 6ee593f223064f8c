use std::time::Duration;

use thiserror::Error;

use crate::retry::{self, Classification, Classify};

/// Failures reported by the remote content service.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The service demands a cooldown before the next call.
    #[error("Rate limited, retry after {:.0}s", .wait.as_secs_f64())]
    RateLimited { wait: Duration },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The source forbids relaying its content directly.
    #[error("Relay restricted: {0}")]
    RelayRestricted(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Network or server-side blip.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The service answered with something we could not interpret.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Local file handling around a transfer failed.
    #[error("Local I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Classify for RemoteError {
    fn classify(&self) -> Classification {
        match self {
            RemoteError::RateLimited { wait } => Classification::RateLimited(*wait),
            RemoteError::Transient(_) => Classification::Retryable,
            RemoteError::Io(e) => retry::classify_io(e),
            RemoteError::Forbidden(_)
            | RemoteError::RelayRestricted(_)
            | RemoteError::NotFound(_)
            | RemoteError::Protocol(_) => Classification::Fatal,
        }
    }
}

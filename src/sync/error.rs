use thiserror::Error;

use crate::remote::RemoteError;
use crate::state::StateError;

/// Unrecoverable failures of a sync job. Per-item failures never surface
/// here; they are counted in the report.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Source {identifier} is inaccessible: {error}")]
    SourceInaccessible {
        identifier: String,
        #[source]
        error: RemoteError,
    },

    #[error("Destination {identifier} is inaccessible: {error}")]
    DestinationInaccessible {
        identifier: String,
        #[source]
        error: RemoteError,
    },

    #[error("Could not create destination for {title}: {error}")]
    DestinationCreate {
        title: String,
        #[source]
        error: RemoteError,
    },

    #[error("Checkpoint store error: {0}")]
    State(#[from] StateError),
}

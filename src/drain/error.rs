use thiserror::Error;

use crate::remote::RemoteError;
use crate::state::StateError;

#[derive(Debug, Error)]
pub enum DrainError {
    #[error("Source {identifier} is inaccessible: {error}")]
    SourceInaccessible {
        identifier: String,
        #[source]
        error: RemoteError,
    },

    #[error("Could not prepare output directory: {0}")]
    Output(#[from] std::io::Error),

    #[error("Checkpoint store error: {0}")]
    State(#[from] StateError),
}

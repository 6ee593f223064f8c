use std::path::PathBuf;

use thiserror::Error;

use crate::media::MediaError;
use crate::remote::RemoteError;
use crate::state::StateError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Not a project directory: {}", .0.display())]
    InvalidProject(PathBuf),

    #[error("Missing artifact {}: run the step that produces it first", .0.display())]
    MissingArtifact(PathBuf),

    #[error("Media tool failed: {0}")]
    Media(#[from] MediaError),

    #[error("Remote call failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("Checkpoint store error: {0}")]
    State(#[from] StateError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

use thiserror::Error;

use crate::retry::{self, Classification, Classify};

/// Failures of local media tooling.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{tool} not found on PATH")]
    MissingTool { tool: String },

    #[error("{tool} exited with status {status:?}: {stderr}")]
    ToolFailed {
        tool: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("Could not parse {what}: {detail}")]
    Parse { what: String, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

impl Classify for MediaError {
    /// Only I/O hiccups are worth repeating; a tool that rejected its input
    /// will reject it again.
    fn classify(&self) -> Classification {
        match self {
            MediaError::Io(e) => retry::classify_io(e),
            MediaError::MissingTool { .. }
            | MediaError::ToolFailed { .. }
            | MediaError::Parse { .. }
            | MediaError::Walk(_) => Classification::Fatal,
        }
    }
}

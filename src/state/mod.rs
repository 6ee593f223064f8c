//! Persistent checkpoint store.
//!
//! SQLite-backed records for the three job kinds:
//! - transfer tasks (channel cloning position and strategy)
//! - download tasks (drain position and counters)
//! - pipeline tasks (per-step completion flags and the publish resume marker)

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{CheckpointStore, SqliteCheckpointStore};
pub use error::StateError;
pub use types::{
    DownloadTask, DownloadUpdate, PipelineFlag, PipelineStep, PipelineTask, PipelineUpdate,
    TransferStrategy, TransferTask, TransferUpdate,
};

//! Record types for the checkpoint store.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;

use crate::types::ChatId;

/// How items move from a source to a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStrategy {
    /// Not probed yet.
    Unknown,
    /// The remote service relays items between containers itself.
    Direct,
    /// Items are downloaded locally, optionally transformed, then uploaded.
    StageAndRelay,
}

impl TransferStrategy {
    /// Convert to the string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Direct => "direct",
            Self::StageAndRelay => "stage_and_relay",
        }
    }

    /// Parse from the string stored in the database.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(Self::Unknown),
            "direct" => Some(Self::Direct),
            "stage_and_relay" | "stage-and-relay" => Some(Self::StageAndRelay),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransferStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One source-to-destination cloning job.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferTask {
    /// Canonical handle of the source container.
    pub source_id: ChatId,
    /// Display name of the source at creation time.
    pub source_title: String,
    /// Destination container, once resolved or created.
    pub destination_id: Option<ChatId>,
    pub strategy: TransferStrategy,
    /// Last source position that was fully handled.
    pub last_position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransferTask {
    /// A fresh task with an unprobed strategy and position 0.
    pub fn new(source_id: ChatId, source_title: String, destination_id: Option<ChatId>) -> Self {
        let now = Utc::now();
        Self {
            source_id,
            source_title,
            destination_id,
            strategy: TransferStrategy::Unknown,
            last_position: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A single-field change to a [`TransferTask`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransferUpdate {
    DestinationId(Option<ChatId>),
    Strategy(TransferStrategy),
    Position(i64),
}

impl TransferUpdate {
    pub(crate) fn column_value(&self) -> (&'static str, Value) {
        match self {
            Self::DestinationId(id) => ("destination_id", opt_int(*id)),
            Self::Strategy(s) => ("strategy", Value::Text(s.as_str().to_string())),
            Self::Position(p) => ("last_position", Value::Integer(*p)),
        }
    }
}

/// One source container being drained of its video payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadTask {
    pub source_id: ChatId,
    pub source_title: String,
    pub last_position: i64,
    /// Estimated once when the task is created.
    pub total_items: u64,
    pub completed_items: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DownloadTask {
    pub fn new(source_id: ChatId, source_title: String, total_items: u64) -> Self {
        let now = Utc::now();
        Self {
            source_id,
            source_title,
            last_position: 0,
            total_items,
            completed_items: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A change to a [`DownloadTask`].
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadUpdate {
    Position(i64),
    /// A video landed on disk: count and position move together.
    Fetched { completed_items: u64, position: i64 },
}

impl DownloadUpdate {
    pub(crate) fn column_values(&self) -> Vec<(&'static str, Value)> {
        match self {
            Self::Position(p) => vec![("last_position", Value::Integer(*p))],
            Self::Fetched {
                completed_items,
                position,
            } => vec![
                ("completed_items", Value::Integer(*completed_items as i64)),
                ("last_position", Value::Integer(*position)),
            ],
        }
    }
}

/// The eight completion flags of a pipeline task, in column order.
///
/// Six gate a pipeline step. The two `*Authorized` flags are reserved
/// for manual approval gates and are persisted but not consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PipelineFlag {
    Archived = 0,
    Reported = 1,
    TransformAuthorized = 2,
    Transformed = 3,
    Finalized = 4,
    Annotated = 5,
    PublishAuthorized = 6,
    Published = 7,
}

impl PipelineFlag {
    pub const ALL: [Self; 8] = [
        Self::Archived,
        Self::Reported,
        Self::TransformAuthorized,
        Self::Transformed,
        Self::Finalized,
        Self::Annotated,
        Self::PublishAuthorized,
        Self::Published,
    ];

    /// Column backing this flag. Only these static names reach SQL.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Archived => "is_archived",
            Self::Reported => "is_reported",
            Self::TransformAuthorized => "is_transform_authorized",
            Self::Transformed => "is_transformed",
            Self::Finalized => "is_finalized",
            Self::Annotated => "is_annotated",
            Self::PublishAuthorized => "is_publish_authorized",
            Self::Published => "is_published",
        }
    }
}

/// The six ordered pipeline steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStep {
    Archive,
    Report,
    Transform,
    Finalize,
    Annotate,
    Publish,
}

impl PipelineStep {
    /// Execution order. Never reordered.
    pub const ALL: [Self; 6] = [
        Self::Archive,
        Self::Report,
        Self::Transform,
        Self::Finalize,
        Self::Annotate,
        Self::Publish,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Archive => "archive",
            Self::Report => "report",
            Self::Transform => "transform",
            Self::Finalize => "finalize",
            Self::Annotate => "annotate",
            Self::Publish => "publish",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|step| step.as_str() == s)
    }

    /// The flag that gates this step.
    pub fn flag(&self) -> PipelineFlag {
        match self {
            Self::Archive => PipelineFlag::Archived,
            Self::Report => PipelineFlag::Reported,
            Self::Transform => PipelineFlag::Transformed,
            Self::Finalize => PipelineFlag::Finalized,
            Self::Annotate => PipelineFlag::Annotated,
            Self::Publish => PipelineFlag::Published,
        }
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Completion flags indexed by [`PipelineFlag`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineFlags([bool; 8]);

impl PipelineFlags {
    pub fn get(&self, flag: PipelineFlag) -> bool {
        self.0[flag as usize]
    }

    pub fn set(&mut self, flag: PipelineFlag, value: bool) {
        self.0[flag as usize] = value;
    }

    pub fn is_done(&self, step: PipelineStep) -> bool {
        self.get(step.flag())
    }
}

/// One local project directory being processed and published.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineTask {
    /// Absolute project directory; the record key.
    pub project_path: PathBuf,
    pub project_name: String,
    /// Destination container, once the publish step resolves it.
    pub destination_id: Option<ChatId>,
    /// Informational name of the step last started.
    pub current_step: String,
    /// Last artifact handled inside a step (publish resume marker).
    pub last_artifact: Option<PathBuf>,
    pub flags: PipelineFlags,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineTask {
    pub fn new(project_path: PathBuf, project_name: String) -> Self {
        let now = Utc::now();
        Self {
            project_path,
            project_name,
            destination_id: None,
            current_step: String::new(),
            last_artifact: None,
            flags: PipelineFlags::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A single-field change to a [`PipelineTask`].
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineUpdate {
    DestinationId(Option<ChatId>),
    CurrentStep(String),
    LastArtifact(Option<PathBuf>),
    Flag(PipelineFlag, bool),
}

impl PipelineUpdate {
    pub(crate) fn column_value(&self) -> (&'static str, Value) {
        match self {
            Self::DestinationId(id) => ("destination_id", opt_int(*id)),
            Self::CurrentStep(s) => ("current_step", Value::Text(s.clone())),
            Self::LastArtifact(p) => (
                "last_artifact",
                p.as_ref()
                    .map_or(Value::Null, |p| Value::Text(p.to_string_lossy().into_owned())),
            ),
            Self::Flag(flag, v) => (flag.column(), Value::Integer(i64::from(*v))),
        }
    }

    /// Mirror the update onto an in-memory copy.
    pub fn apply(&self, task: &mut PipelineTask) {
        match self {
            Self::DestinationId(id) => task.destination_id = *id,
            Self::CurrentStep(s) => task.current_step.clone_from(s),
            Self::LastArtifact(p) => task.last_artifact.clone_from(p),
            Self::Flag(flag, v) => task.flags.set(*flag, *v),
        }
    }
}

fn opt_int(v: Option<i64>) -> Value {
    v.map_or(Value::Null, Value::Integer)
}

//! Media transform service: local archiving and video tooling behind a trait.

pub mod error;
pub mod ffmpeg;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::MediaError;
pub use ffmpeg::FfmpegTransform;

/// One video found under a project directory.
///
/// This is also the row type of the persisted inventory report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoEntry {
    /// 1-based position in traversal order.
    pub order: usize,
    /// Absolute path of the source video.
    pub path: PathBuf,
    /// Folder relative to the project root, `/`-separated; empty at the root.
    pub folder: String,
    pub file_name: String,
    pub duration_secs: f64,
    pub size_bytes: u64,
    pub codec: String,
    /// Recommendation: re-encode before publishing.
    pub needs_reencode: bool,
    /// Join key used by the group finalize plan.
    pub group: String,
}

impl VideoEntry {
    /// File stem without extension.
    pub fn stem(&self) -> &str {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.file_name)
    }
}

/// Operations consumed from local media tooling. Calls are slow and run one
/// at a time.
#[async_trait]
pub trait MediaTransform: Send + Sync {
    /// Archive every file under `source` except the excluded extensions into
    /// volumes of at most `volume_limit_bytes`. Returns volumes in order.
    async fn compress_directory(
        &self,
        source: &Path,
        output_dir: &Path,
        volume_limit_bytes: u64,
        exclude_extensions: &[String],
    ) -> Result<Vec<PathBuf>, MediaError>;

    /// Inventory the videos under `source` with re-encode recommendations.
    async fn inventory(
        &self,
        source: &Path,
        video_extensions: &[String],
    ) -> Result<Vec<VideoEntry>, MediaError>;

    async fn reencode(&self, input: &Path, output: &Path) -> Result<(), MediaError>;

    /// Rewrite container timestamps so players report the right duration.
    async fn correct_duration(&self, path: &Path) -> Result<(), MediaError>;

    /// Cut `input` into parts of at most `max_bytes`, written to `output_dir`.
    async fn split(
        &self,
        input: &Path,
        output_dir: &Path,
        max_bytes: u64,
    ) -> Result<Vec<PathBuf>, MediaError>;

    /// Concatenate `inputs` in order into `output`.
    async fn join(&self, inputs: &[PathBuf], output: &Path) -> Result<(), MediaError>;

    async fn probe_duration(&self, path: &Path) -> Result<Duration, MediaError>;

    /// Write the audio track of `video` to `output` as mp3.
    async fn extract_audio(&self, video: &Path, output: &Path) -> Result<PathBuf, MediaError>;
}

/// True when `path` has one of `extensions` (case-insensitive, no dot).
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|v| v.eq_ignore_ascii_case(ext)))
}

//! Project pipeline: six ordered steps over a local project directory,
//! each gated by a persisted completion flag.
//!
//! Steps run strictly in [`PipelineStep::ALL`] order. A step whose flag is
//! set is skipped; the first failing step ends the run and leaves every later
//! flag untouched. Only `publish` checkpoints inside the step, through the
//! task's last-artifact marker.

pub mod error;
mod finalize;
pub mod layout;
mod manifest;
mod publish;
mod report;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

pub use error::PipelineError;
pub use layout::WorkLayout;

use crate::media::{has_extension, MediaTransform, VideoEntry};
use crate::progress::format_duration;
use crate::remote::RemoteContent;
use crate::retry::{self, RetryPolicy};
use crate::state::{CheckpointStore, PipelineStep, PipelineTask, PipelineUpdate, StateError};
use crate::types::FinalizePlan;

/// Injected settings of a [`PipelineOrchestrator`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Upper bound for archive volumes and uploaded videos.
    pub file_size_limit_bytes: u64,
    /// Extensions (no dot) treated as video.
    pub video_extensions: Vec<String>,
    pub plan: FinalizePlan,
    /// First number of the video hashtag sequence.
    pub start_index: u32,
    pub hashtag_index: String,
    pub document_hashtag: String,
    pub document_title: String,
    pub title_prefix: Option<String>,
    /// Existing destination identifier; created when absent.
    pub destination: Option<String>,
    pub no_progress_bar: bool,
}

/// Outcome of one [`PipelineOrchestrator::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub project: PathBuf,
    pub executed: Vec<PipelineStep>,
    pub skipped: Vec<PipelineStep>,
    /// The step that failed, with its error message.
    pub failed: Option<(PipelineStep, String)>,
    pub interrupted: bool,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_none() && !self.interrupted
    }
}

pub struct PipelineOrchestrator {
    remote: Arc<dyn RemoteContent>,
    media: Arc<dyn MediaTransform>,
    store: Arc<dyn CheckpointStore>,
    remote_policy: RetryPolicy,
    local_policy: RetryPolicy,
    options: PipelineOptions,
}

impl PipelineOrchestrator {
    pub fn new(
        remote: Arc<dyn RemoteContent>,
        media: Arc<dyn MediaTransform>,
        store: Arc<dyn CheckpointStore>,
        remote_policy: RetryPolicy,
        local_policy: RetryPolicy,
        options: PipelineOptions,
    ) -> Self {
        Self {
            remote,
            media,
            store,
            remote_policy,
            local_policy,
            options,
        }
    }

    /// Run the remaining steps for `project`. With `restart` the task record
    /// and the work directory are removed first.
    pub async fn run(
        &self,
        project: &Path,
        restart: bool,
        shutdown: &CancellationToken,
    ) -> Result<PipelineReport, PipelineError> {
        let started = Instant::now();
        if !project.is_dir() {
            return Err(PipelineError::InvalidProject(project.to_path_buf()));
        }
        let project = tokio::fs::canonicalize(project).await?;
        let layout = WorkLayout::for_project(&project);

        if restart {
            tracing::info!("Restart requested, discarding pipeline state for {}", project.display());
            self.store.delete_pipeline(&project).await?;
            remove_dir_if_exists(layout.root()).await?;
        }

        let mut task = match self.store.get_pipeline(&project).await? {
            Some(task) => task,
            None => {
                let task = PipelineTask::new(project.clone(), layout::project_name(&project));
                self.store.create_pipeline(&task).await?
            }
        };
        tokio::fs::create_dir_all(layout.root()).await?;

        let mut report = PipelineReport {
            project: project.clone(),
            executed: Vec::new(),
            skipped: Vec::new(),
            failed: None,
            interrupted: false,
        };

        for step in PipelineStep::ALL {
            if task.flags.is_done(step) {
                tracing::info!("Skipping {}: already done", step);
                report.skipped.push(step);
                continue;
            }
            if shutdown.is_cancelled() {
                tracing::info!("Shutdown requested, stopping before {}", step);
                report.interrupted = true;
                break;
            }

            tracing::info!("Running step {}", step);
            self.persist(&mut task, PipelineUpdate::CurrentStep(step.to_string()))
                .await?;
            match self.execute_step(step, &mut task, &layout).await {
                Ok(()) => {
                    self.persist(&mut task, PipelineUpdate::Flag(step.flag(), true))
                        .await?;
                    report.executed.push(step);
                }
                Err(e) => {
                    tracing::error!("Step {} failed: {}", step, e);
                    report.failed = Some((step, e.to_string()));
                    break;
                }
            }
        }

        tracing::info!("── Summary ──");
        tracing::info!("  project: {}", task.project_name);
        tracing::info!(
            "  {} executed, {} skipped",
            report.executed.len(),
            report.skipped.len()
        );
        if let Some((step, _)) = &report.failed {
            tracing::info!("  failed at: {}", step);
        }
        tracing::info!("  artifacts: {}", layout.root().display());
        tracing::info!("  elapsed: {}", format_duration(started.elapsed()));
        Ok(report)
    }

    async fn execute_step(
        &self,
        step: PipelineStep,
        task: &mut PipelineTask,
        layout: &WorkLayout,
    ) -> Result<(), PipelineError> {
        match step {
            PipelineStep::Archive => self.archive(&task.project_path, layout).await,
            PipelineStep::Report => self.report(&task.project_path, layout).await,
            PipelineStep::Transform => self.transform(layout).await,
            PipelineStep::Finalize => self.finalize(layout).await,
            PipelineStep::Annotate => self.annotate(&task.project_name, layout).await,
            PipelineStep::Publish => self.publish(task, layout).await,
        }
    }

    /// Write one field through the store, then mirror it in memory.
    async fn persist(
        &self,
        task: &mut PipelineTask,
        update: PipelineUpdate,
    ) -> Result<(), StateError> {
        match self.store.update_pipeline(&task.project_path, update.clone()).await {
            Err(e) if e.is_not_found() => {
                tracing::warn!("Pipeline task {} vanished", task.project_path.display());
            }
            other => other?,
        }
        update.apply(task);
        Ok(())
    }

    async fn archive(&self, project: &Path, layout: &WorkLayout) -> Result<(), PipelineError> {
        let out = layout.archives_dir();
        remove_dir_if_exists(&out).await?;
        tokio::fs::create_dir_all(&out).await?;
        let volumes = retry::execute(&self.local_policy, || {
            self.media.compress_directory(
                project,
                &out,
                self.options.file_size_limit_bytes,
                &self.options.video_extensions,
            )
        })
        .await?;
        tracing::info!("Archived non-video files into {} volume(s)", volumes.len());
        Ok(())
    }

    async fn report(&self, project: &Path, layout: &WorkLayout) -> Result<(), PipelineError> {
        let entries = retry::execute(&self.local_policy, || {
            self.media.inventory(project, &self.options.video_extensions)
        })
        .await?;
        let flagged = entries.iter().filter(|e| e.needs_reencode).count();
        report::write_rows(&layout.report_csv(), &entries)?;
        tracing::info!(
            "Inventoried {} video(s), {} flagged for re-encoding",
            entries.len(),
            flagged
        );
        Ok(())
    }

    /// Re-encode flagged videos, then fix duration metadata that drifted
    /// more than a second from the source.
    async fn transform(&self, layout: &WorkLayout) -> Result<(), PipelineError> {
        let entries: Vec<VideoEntry> = report::read_rows(&layout.report_csv())?;
        tokio::fs::create_dir_all(layout.reencoded_dir()).await?;

        for entry in entries.iter().filter(|e| e.needs_reencode) {
            let output = layout.reencoded_path(entry);
            if output.exists() {
                tracing::debug!("Already re-encoded: {}", output.display());
                continue;
            }
            let partial = output.with_extension("partial.mp4");
            tracing::info!("Re-encoding {}", entry.path.display());
            retry::execute(&self.local_policy, || self.media.reencode(&entry.path, &partial))
                .await?;

            let probed = retry::execute(&self.local_policy, || self.media.probe_duration(&partial))
                .await?;
            if (probed.as_secs_f64() - entry.duration_secs).abs() > 1.0 {
                tracing::info!(
                    "Correcting duration of {} ({:.1}s, expected {:.1}s)",
                    entry.file_name,
                    probed.as_secs_f64(),
                    entry.duration_secs
                );
                retry::execute(&self.local_policy, || self.media.correct_duration(&partial))
                    .await?;
            }
            tokio::fs::rename(&partial, &output).await?;
        }
        Ok(())
    }
}

/// Clear one step's flag so the next run executes it again. Resetting
/// `publish` also drops the last-artifact marker, so every manifest entry
/// and the summary are uploaded again.
pub async fn reset_step(
    store: &dyn CheckpointStore,
    project: &Path,
    step: PipelineStep,
) -> Result<(), StateError> {
    store
        .update_pipeline(project, PipelineUpdate::Flag(step.flag(), false))
        .await?;
    if step == PipelineStep::Publish {
        store
            .update_pipeline(project, PipelineUpdate::LastArtifact(None))
            .await?;
    }
    Ok(())
}

async fn remove_dir_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Files directly in `dir` with one of `extensions`, or all files when
/// `extensions` is empty, sorted by name.
async fn list_files(dir: &Path, extensions: &[String]) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file()
            && (extensions.is_empty() || has_extension(&path, extensions))
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

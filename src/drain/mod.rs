//! Drains the video payloads of a source container to local disk, one
//! position at a time, under a [`DownloadTask`] checkpoint.

pub mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

pub use error::DrainError;

use crate::media::MediaTransform;
use crate::progress::{create_progress_bar, format_duration};
use crate::remote::{RemoteContent, RemoteError, RemoteItem};
use crate::retry::{self, RetryPolicy};
use crate::state::{CheckpointStore, DownloadTask, DownloadUpdate, StateError};
use crate::types::{ChatId, ItemId};

#[derive(Debug, Clone)]
pub struct DrainOptions {
    pub output_dir: PathBuf,
    /// Stop after this many videos.
    pub limit: Option<u64>,
    /// Pause after each download.
    pub item_delay: Duration,
    pub extract_audio: bool,
    pub no_progress_bar: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrainReport {
    pub source_id: ChatId,
    pub downloaded: u64,
    pub skipped: u64,
    pub failed: Vec<ItemId>,
    pub interrupted: bool,
}

pub struct DrainEngine {
    remote: Arc<dyn RemoteContent>,
    media: Arc<dyn MediaTransform>,
    store: Arc<dyn CheckpointStore>,
    policy: RetryPolicy,
    options: DrainOptions,
}

impl DrainEngine {
    pub fn new(
        remote: Arc<dyn RemoteContent>,
        media: Arc<dyn MediaTransform>,
        store: Arc<dyn CheckpointStore>,
        policy: RetryPolicy,
        options: DrainOptions,
    ) -> Self {
        Self {
            remote,
            media,
            store,
            policy,
            options,
        }
    }

    pub async fn run(
        &self,
        identifier: &str,
        restart: bool,
        shutdown: &CancellationToken,
    ) -> Result<DrainReport, DrainError> {
        let started = Instant::now();
        let inaccessible = |error| DrainError::SourceInaccessible {
            identifier: identifier.to_string(),
            error,
        };

        let source = retry::execute(&self.policy, || self.remote.resolve(identifier))
            .await
            .map_err(inaccessible)?;
        if restart {
            tracing::info!("Restart requested, discarding download checkpoint for {}", source);
            self.store.delete_download(source).await?;
        }

        let mut task = match self.store.get_download(source).await? {
            Some(task) => task,
            None => {
                let info = retry::execute(&self.policy, || self.remote.container(source))
                    .await
                    .map_err(inaccessible)?;
                let videos = retry::execute(&self.policy, || self.remote.count_videos(source))
                    .await
                    .map_err(inaccessible)?;
                let total = self.options.limit.map_or(videos, |limit| videos.min(limit));
                tracing::info!("Estimated {} videos in \"{}\"", total, info.title);
                self.store
                    .create_download(&DownloadTask::new(source, info.title, total))
                    .await?
            }
        };

        let bound = retry::execute(&self.policy, || self.remote.latest_item(source))
            .await
            .map_err(inaccessible)?
            .map_or(task.last_position, |item| item.id);

        tokio::fs::create_dir_all(&self.options.output_dir).await?;

        let mut report = DrainReport {
            source_id: source,
            downloaded: 0,
            skipped: 0,
            failed: Vec::new(),
            interrupted: false,
        };
        let pb = create_progress_bar(
            self.options.no_progress_bar,
            "download",
            task.total_items.saturating_sub(task.completed_items),
        );

        let mut position = task.last_position + 1;
        while position <= bound {
            if shutdown.is_cancelled() {
                pb.suspend(|| tracing::info!("Shutdown requested, stopping downloads"));
                report.interrupted = true;
                break;
            }
            if self
                .options
                .limit
                .is_some_and(|limit| task.completed_items >= limit)
            {
                tracing::info!("Download limit reached");
                break;
            }

            let item = retry::execute(&self.policy, || self.remote.item(source, position)).await;
            match item {
                Ok(Some(item)) if item.content.is_video() => match self.fetch_video(&item).await {
                    Ok(path) => {
                        task.completed_items += 1;
                        task.last_position = position;
                        self.checkpoint(
                            source,
                            DownloadUpdate::Fetched {
                                completed_items: task.completed_items,
                                position,
                            },
                        )
                        .await?;
                        if task.completed_items > task.total_items {
                            pb.suspend(|| {
                                tracing::warn!(
                                    "Completed {} of an estimated {} videos",
                                    task.completed_items,
                                    task.total_items
                                )
                            });
                        }
                        pb.suspend(|| tracing::debug!("Downloaded {}", path.display()));
                        pb.inc(1);
                        report.downloaded += 1;
                        if !self.options.item_delay.is_zero() {
                            tokio::select! {
                                _ = tokio::time::sleep(self.options.item_delay) => {}
                                _ = shutdown.cancelled() => {}
                            }
                        }
                    }
                    Err(e) => {
                        pb.suspend(|| tracing::error!("Download of item {} failed: {}", position, e));
                        report.failed.push(position);
                    }
                },
                Ok(_) => {
                    task.last_position = position;
                    self.checkpoint(source, DownloadUpdate::Position(position))
                        .await?;
                    report.skipped += 1;
                }
                Err(e) => {
                    pb.suspend(|| tracing::error!("Could not fetch item {}: {}", position, e));
                    report.failed.push(position);
                }
            }
            position += 1;
        }
        pb.finish_and_clear();

        tracing::info!("── Summary ──");
        tracing::info!(
            "  {} downloaded, {} failed, {} of {} total",
            report.downloaded,
            report.failed.len(),
            task.completed_items,
            task.total_items
        );
        tracing::info!("  destination: {}", self.options.output_dir.display());
        tracing::info!("  elapsed: {}", format_duration(started.elapsed()));
        Ok(report)
    }

    async fn checkpoint(&self, source: ChatId, update: DownloadUpdate) -> Result<(), StateError> {
        match self.store.update_download(source, update).await {
            Err(e) if e.is_not_found() => {
                tracing::warn!("Download task {} vanished, checkpoint not saved", source);
                Ok(())
            }
            other => other,
        }
    }

    /// Download one video and, best effort, its audio track.
    async fn fetch_video(&self, item: &RemoteItem) -> Result<PathBuf, RemoteError> {
        let (video_path, audio_path) = drain_paths(&self.options.output_dir, item);
        let path = retry::execute(&self.policy, || self.remote.download(item, &video_path)).await?;
        if self.options.extract_audio {
            if let Err(e) = self.media.extract_audio(&path, &audio_path).await {
                tracing::warn!("Audio extraction failed for {}: {}", path.display(), e);
            }
        }
        Ok(path)
    }
}

/// `<dir>/<yyyy-mm-dd>_<id>_video.<ext>` and the matching `_audio.mp3`.
fn drain_paths(dir: &Path, item: &RemoteItem) -> (PathBuf, PathBuf) {
    let date = item
        .date
        .map_or_else(|| "undated".to_string(), |d| d.format("%Y-%m-%d").to_string());
    let ext = item
        .content
        .media()
        .and_then(|m| m.file_name.as_deref())
        .and_then(|name| Path::new(name).extension())
        .and_then(|e| e.to_str())
        .unwrap_or("mp4");
    let prefix = format!("{date}_{}", item.id);
    (
        dir.join(format!("{prefix}_video.{ext}")),
        dir.join(format!("{prefix}_audio.mp3")),
    )
}

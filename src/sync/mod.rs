//! Sequential sync engine: replays a source container's items into a
//! destination one at a time, checkpointing after each.
//!
//! A job moves through `Resolving → Probing → Replaying → PostProcessing →
//! Done`. Initialization failures (source or destination unreachable) end
//! the job with a [`SyncError`]; per-item failures are logged, left
//! unrecorded and the job continues with the next position.

pub mod error;
mod handler;
mod post;
pub mod strategy;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

pub use error::SyncError;
pub use strategy::StrategyResolver;

use crate::media::MediaTransform;
use crate::progress::{create_progress_bar, format_duration};
use crate::remote::{ContainerInfo, RemoteContent, RemoteError};
use crate::retry::{self, RetryPolicy};
use crate::state::{CheckpointStore, StateError, TransferStrategy, TransferTask, TransferUpdate};
use crate::types::{ChatId, ItemId};
use handler::ItemHandler;

/// Chat (and optional forum topic) that receives the destination link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishTarget {
    pub chat: ChatId,
    pub topic: Option<ItemId>,
}

/// Injected settings of a [`SyncEngine`].
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Pause after each replayed item.
    pub item_delay: Duration,
    /// Skip probing and use this strategy.
    pub force_strategy: Option<TransferStrategy>,
    /// Existing destination identifier; created from the source when absent.
    pub destination: Option<String>,
    pub publish_link_to: Option<PublishTarget>,
    pub leave_source: bool,
    pub extract_audio: bool,
    pub staging_dir: PathBuf,
    pub links_file: PathBuf,
    pub no_progress_bar: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Resolving,
    Probing,
    Replaying,
    PostProcessing,
    Done,
}

/// Outcome of one [`SyncEngine::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub source_id: ChatId,
    pub destination_id: ChatId,
    pub strategy: TransferStrategy,
    pub replayed: u64,
    /// Empty or absent positions checkpointed without work.
    pub skipped: u64,
    /// Positions that failed and were left out of the checkpoint.
    pub failed: Vec<ItemId>,
    pub post_failures: usize,
    pub interrupted: bool,
    /// Last phase reached.
    pub phase: SyncPhase,
}

impl SyncReport {
    fn new(source_id: ChatId, destination_id: ChatId, strategy: TransferStrategy) -> Self {
        Self {
            source_id,
            destination_id,
            strategy,
            replayed: 0,
            skipped: 0,
            failed: Vec::new(),
            post_failures: 0,
            interrupted: false,
            phase: SyncPhase::Resolving,
        }
    }

    /// The job reached `Done`. Failed items do not change this; they are
    /// missing from the destination and reported separately.
    pub fn is_success(&self) -> bool {
        self.phase == SyncPhase::Done
    }
}

enum ItemOutcome {
    Replayed(Option<ItemId>),
    Skipped,
}

pub struct SyncEngine {
    remote: Arc<dyn RemoteContent>,
    store: Arc<dyn CheckpointStore>,
    resolver: StrategyResolver,
    handler: ItemHandler,
    policy: RetryPolicy,
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(
        remote: Arc<dyn RemoteContent>,
        media: Arc<dyn MediaTransform>,
        store: Arc<dyn CheckpointStore>,
        policy: RetryPolicy,
        options: SyncOptions,
    ) -> Self {
        let resolver = StrategyResolver::new(remote.clone(), policy.clone());
        let handler = ItemHandler::new(
            remote.clone(),
            media,
            options.staging_dir.clone(),
            options.extract_audio,
        );
        Self {
            remote,
            store,
            resolver,
            handler,
            policy,
            options,
        }
    }

    /// Run or resume the job for `identifier`. With `restart` the stored
    /// checkpoint and strategy are discarded first.
    pub async fn run(
        &self,
        identifier: &str,
        restart: bool,
        shutdown: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let started = Instant::now();

        tracing::info!("Resolving source {}", identifier);
        let source = retry::execute(&self.policy, || self.remote.resolve(identifier))
            .await
            .map_err(|error| SyncError::SourceInaccessible {
                identifier: identifier.to_string(),
                error,
            })?;
        if restart {
            tracing::info!("Restart requested, discarding checkpoint for {}", source);
            self.store.delete_transfer(source).await?;
        }
        let info = retry::execute(&self.policy, || self.remote.container(source))
            .await
            .map_err(|error| SyncError::SourceInaccessible {
                identifier: identifier.to_string(),
                error,
            })?;

        let (mut task, fresh) = match self.store.get_transfer(source).await? {
            Some(task) => {
                tracing::info!(
                    "Resuming \"{}\" after position {}",
                    task.source_title,
                    task.last_position
                );
                (task, false)
            }
            None => {
                let dest = self.ensure_destination(&info).await?;
                let task = TransferTask::new(source, info.title.clone(), Some(dest));
                let task = self.store.create_transfer(&task).await?;
                tracing::info!("Created transfer task for \"{}\"", task.source_title);
                (task, true)
            }
        };

        let dest = match task.destination_id {
            Some(dest) => dest,
            None => {
                let dest = self.ensure_destination(&info).await?;
                self.update_task(source, TransferUpdate::DestinationId(Some(dest)))
                    .await?;
                task.destination_id = Some(dest);
                dest
            }
        };
        retry::execute(&self.policy, || self.remote.container(dest))
            .await
            .map_err(|error| SyncError::DestinationInaccessible {
                identifier: dest.to_string(),
                error,
            })?;

        let mut report = SyncReport::new(source, dest, task.strategy);
        report.phase = SyncPhase::Probing;
        let forced_change = self
            .options
            .force_strategy
            .is_some_and(|s| s != task.strategy);
        if fresh || task.strategy == TransferStrategy::Unknown || forced_change {
            let strategy = self
                .resolver
                .resolve(source, self.options.force_strategy)
                .await;
            self.update_task(source, TransferUpdate::Strategy(strategy))
                .await?;
            task.strategy = strategy;
            report.strategy = strategy;
        }

        let mapping = self.replay(&task, dest, shutdown, &mut report).await?;

        if !report.interrupted {
            report.phase = SyncPhase::PostProcessing;
            report.post_failures = self
                .post_process(source, &task.source_title, dest, &mapping)
                .await;
            report.phase = SyncPhase::Done;
        }

        log_summary(&task.source_title, &report, started.elapsed());
        Ok(report)
    }

    async fn ensure_destination(&self, info: &ContainerInfo) -> Result<ChatId, SyncError> {
        match &self.options.destination {
            Some(identifier) => retry::execute(&self.policy, || self.remote.resolve(identifier))
                .await
                .map_err(|error| SyncError::DestinationInaccessible {
                    identifier: identifier.clone(),
                    error,
                }),
            None => {
                let description = info.description.as_deref().unwrap_or_default();
                let dest = retry::execute(&self.policy, || {
                    self.remote.create_container(&info.title, description)
                })
                .await
                .map_err(|error| SyncError::DestinationCreate {
                    title: info.title.clone(),
                    error,
                })?;
                tracing::info!("Created destination {} for \"{}\"", dest, info.title);
                Ok(dest)
            }
        }
    }

    /// Persist one field. A record deleted underneath us is logged, not fatal.
    async fn update_task(&self, source: ChatId, update: TransferUpdate) -> Result<(), StateError> {
        match self.store.update_transfer(source, update).await {
            Err(e) if e.is_not_found() => {
                tracing::warn!("Transfer task {} vanished, checkpoint not saved", source);
                Ok(())
            }
            other => other,
        }
    }

    /// Replay every position after the checkpoint up to the source's latest
    /// item as it stands now. Returns the source → destination id mapping.
    async fn replay(
        &self,
        task: &TransferTask,
        dest: ChatId,
        shutdown: &CancellationToken,
        report: &mut SyncReport,
    ) -> Result<HashMap<ItemId, ItemId>, SyncError> {
        report.phase = SyncPhase::Replaying;
        let source = task.source_id;
        let mut mapping = HashMap::new();

        let bound = retry::execute(&self.policy, || self.remote.latest_item(source))
            .await
            .map_err(|error| SyncError::SourceInaccessible {
                identifier: source.to_string(),
                error,
            })?
            .map_or(task.last_position, |item| item.id);
        if bound <= task.last_position {
            tracing::info!("Nothing new to replay (checkpoint at {})", task.last_position);
            return Ok(mapping);
        }

        tracing::info!(
            "Replaying positions {}..={} with strategy {}",
            task.last_position + 1,
            bound,
            task.strategy
        );
        let pb = create_progress_bar(
            self.options.no_progress_bar,
            "sync",
            (bound - task.last_position) as u64,
        );

        let mut position = task.last_position + 1;
        while position <= bound {
            if shutdown.is_cancelled() {
                pb.suspend(|| tracing::info!("Shutdown requested, stopping before position {}", position));
                report.interrupted = true;
                break;
            }

            match self.replay_one(task, dest, position).await {
                Ok(ItemOutcome::Replayed(new_id)) => {
                    if let Some(new_id) = new_id {
                        mapping.insert(position, new_id);
                    }
                    self.update_task(source, TransferUpdate::Position(position))
                        .await?;
                    report.replayed += 1;
                    if !self.options.item_delay.is_zero() {
                        pause(self.options.item_delay, shutdown).await;
                    }
                }
                Ok(ItemOutcome::Skipped) => {
                    self.update_task(source, TransferUpdate::Position(position))
                        .await?;
                    report.skipped += 1;
                }
                Err(RemoteError::RateLimited { wait }) => {
                    pb.suspend(|| {
                        tracing::warn!(
                            "Rate limited at position {}, waiting {}s",
                            position,
                            wait.as_secs()
                        )
                    });
                    pause(wait, shutdown).await;
                    continue;
                }
                Err(e) => {
                    pb.suspend(|| tracing::error!("Position {} failed, skipping: {}", position, e));
                    report.failed.push(position);
                }
            }
            pb.inc(1);
            position += 1;
        }
        pb.finish_and_clear();
        Ok(mapping)
    }

    async fn replay_one(
        &self,
        task: &TransferTask,
        dest: ChatId,
        position: ItemId,
    ) -> Result<ItemOutcome, RemoteError> {
        let source = task.source_id;
        let item = retry::execute(&self.policy, || self.remote.item(source, position)).await?;
        let Some(item) = item.filter(|i| !i.content.is_skippable()) else {
            return Ok(ItemOutcome::Skipped);
        };
        tracing::debug!("Replaying {} item {}", item.content.kind(), item.id);
        let new_id = retry::execute(&self.policy, || {
            self.handler.handle(task.strategy, source, dest, &item)
        })
        .await?;
        Ok(ItemOutcome::Replayed(new_id))
    }
}

async fn pause(duration: Duration, shutdown: &CancellationToken) {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = shutdown.cancelled() => {}
    }
}

fn log_summary(title: &str, report: &SyncReport, elapsed: Duration) {
    tracing::info!("── Summary ──");
    tracing::info!("  source: \"{}\" ({})", title, report.source_id);
    tracing::info!(
        "  destination: {} via {}",
        report.destination_id,
        report.strategy
    );
    tracing::info!(
        "  {} replayed, {} skipped, {} failed",
        report.replayed,
        report.skipped,
        report.failed.len()
    );
    if !report.failed.is_empty() {
        tracing::warn!("  failed positions: {:?}", report.failed);
    }
    if report.post_failures > 0 {
        tracing::warn!("  {} post-processing step(s) failed", report.post_failures);
    }
    if report.interrupted {
        tracing::info!("  interrupted; re-run to resume");
    }
    tracing::info!("  elapsed: {}", format_duration(elapsed));
}

//! chatsync: resumable channel cloning and media publishing.
//!
//! Three checkpointed jobs run against a rate-limited messaging gateway:
//! cloning a source channel into a destination, draining a channel's videos
//! to disk, and packaging a local folder of videos into an upload pipeline.
//! Every unit of progress is recorded in SQLite so an interrupted run
//! resumes where it stopped.

#![warn(clippy::all)]

mod cli;
mod config;
mod drain;
mod inspect;
mod media;
mod pipeline;
mod progress;
mod remote;
pub mod retry;
mod shutdown;
mod state;
mod sync;
#[cfg(test)]
mod testutil;
mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use config::{Config, Job};
use drain::{DrainEngine, DrainOptions};
use media::{FfmpegTransform, MediaTransform};
use pipeline::{PipelineOptions, PipelineOrchestrator};
use remote::{GatewayClient, RemoteContent};
use retry::RetryPolicy;
use state::{CheckpointStore, PipelineStep, SqliteCheckpointStore};
use sync::{SyncEngine, SyncOptions};

/// Per-request timeout of the gateway client. Uploads of large videos
/// stream for a long time.
const GATEWAY_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Handles shared by the engines of one command.
struct Services {
    remote: Arc<dyn RemoteContent>,
    media: Arc<dyn MediaTransform>,
    store: Arc<dyn CheckpointStore>,
}

impl Services {
    async fn connect(config: &Config) -> anyhow::Result<Self> {
        let store = open_store(&config.db_path).await?;
        Ok(Self {
            remote: Arc::new(connect_gateway(config)?),
            media: Arc::new(FfmpegTransform::default()),
            store,
        })
    }
}

fn connect_gateway(config: &Config) -> anyhow::Result<GatewayClient> {
    let (Some(url), Some(token)) = (&config.gateway_url, &config.gateway_token) else {
        anyhow::bail!("Gateway URL and token are required");
    };
    let client =
        GatewayClient::new(url, token, GATEWAY_TIMEOUT).context("Failed to build gateway client")?;
    tracing::debug!("Gateway at {}", url);
    Ok(client)
}

async fn open_store(path: &Path) -> anyhow::Result<Arc<dyn CheckpointStore>> {
    let store = SqliteCheckpointStore::open(path)
        .await
        .with_context(|| format!("Failed to open state database at {}", path.display()))?;
    tracing::debug!("State database opened at {}", store.path().display());
    Ok(Arc::new(store))
}

/// Run the sync command for one source or a batch.
///
/// A job that fails to initialize is logged and the batch moves on; the
/// command fails if any job did not reach the end.
async fn run_sync(
    services: Services,
    sources: Vec<String>,
    restart: bool,
    options: SyncOptions,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let engine = SyncEngine::new(
        services.remote,
        services.media,
        services.store,
        RetryPolicy::remote_operation(),
        options,
    );

    let total = sources.len();
    let mut succeeded = 0usize;
    let mut failed: Vec<&str> = Vec::new();
    for (i, source) in sources.iter().enumerate() {
        if shutdown.is_cancelled() {
            tracing::info!("Shutdown requested, skipping remaining sources");
            break;
        }
        if total > 1 {
            tracing::info!("Source {}/{}: {}", i + 1, total, source);
        }
        match engine.run(source, restart, &shutdown).await {
            Ok(report) if report.is_success() => succeeded += 1,
            Ok(report) if report.interrupted => break,
            Ok(_) => failed.push(source),
            Err(e) => {
                tracing::error!("Sync of {} failed: {:#}", source, anyhow::Error::from(e));
                failed.push(source);
            }
        }
    }

    if total > 1 {
        tracing::info!("── Batch Summary ──");
        tracing::info!("  {} of {} source(s) synced", succeeded, total);
        if !failed.is_empty() {
            tracing::warn!("  failed: {}", failed.join(", "));
        }
    }
    if !failed.is_empty() {
        anyhow::bail!("{} source(s) failed to sync", failed.len());
    }
    Ok(())
}

async fn run_download(
    services: Services,
    source: String,
    restart: bool,
    options: DrainOptions,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let engine = DrainEngine::new(
        services.remote,
        services.media,
        services.store,
        RetryPolicy::remote_operation(),
        options,
    );
    let report = engine
        .run(&source, restart, &shutdown)
        .await
        .with_context(|| format!("Download of {source} failed"))?;
    if !report.failed.is_empty() {
        anyhow::bail!(
            "{} video(s) failed to download; re-run to retry",
            report.failed.len()
        );
    }
    Ok(())
}

async fn run_publish(
    services: Services,
    project: PathBuf,
    restart: bool,
    options: PipelineOptions,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let orchestrator = PipelineOrchestrator::new(
        services.remote,
        services.media,
        services.store,
        RetryPolicy::remote_operation(),
        RetryPolicy::local_file_operation(),
        options,
    );
    let report = orchestrator
        .run(&project, restart, &shutdown)
        .await
        .with_context(|| format!("Pipeline for {} failed", project.display()))?;
    if let Some((step, error)) = report.failed {
        anyhow::bail!("Step {} failed: {}", step, error);
    }
    Ok(())
}

/// Run the status command.
async fn run_status(db_path: &Path) -> anyhow::Result<()> {
    if !db_path.exists() {
        println!("No state database found at {}", db_path.display());
        println!("Run a sync, download or publish first to create the database.");
        return Ok(());
    }
    let store = open_store(db_path).await?;

    println!("State Database: {}", config::describe_db(db_path));
    println!();

    let transfers = store.list_transfers().await?;
    println!("Transfers: {}", transfers.len());
    for t in &transfers {
        let dest = t
            .destination_id
            .map_or_else(|| "-".to_string(), |d| d.to_string());
        println!(
            "  \"{}\" ({}) -> {}  strategy: {}  position: {}  updated: {}",
            t.source_title,
            t.source_id,
            dest,
            t.strategy,
            t.last_position,
            t.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    println!();

    let downloads = store.list_downloads().await?;
    println!("Downloads: {}", downloads.len());
    for d in &downloads {
        println!(
            "  \"{}\" ({})  {}/{} video(s)  position: {}  updated: {}",
            d.source_title,
            d.source_id,
            d.completed_items,
            d.total_items,
            d.last_position,
            d.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    println!();

    let pipelines = store.list_pipelines().await?;
    println!("Pipelines: {}", pipelines.len());
    for p in &pipelines {
        let done: Vec<&str> = PipelineStep::ALL
            .iter()
            .filter(|s| p.flags.is_done(**s))
            .map(|s| s.as_str())
            .collect();
        let next = PipelineStep::ALL
            .iter()
            .find(|s| !p.flags.is_done(**s))
            .map_or("complete", |s| s.as_str());
        println!("  {} ({})", p.project_name, p.project_path.display());
        println!(
            "    done: [{}]  next: {}  updated: {}",
            done.join(", "),
            next,
            p.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        if let Some(marker) = &p.last_artifact {
            println!("    last upload: {}", marker.display());
        }
    }
    Ok(())
}

/// Run the reset-step command.
async fn run_reset_step(db_path: &Path, project: &Path, step: PipelineStep) -> anyhow::Result<()> {
    if !db_path.exists() {
        anyhow::bail!("No state database found at {}", db_path.display());
    }
    let store = open_store(db_path).await?;
    pipeline::reset_step(store.as_ref(), project, step)
        .await
        .with_context(|| format!("No pipeline recorded for {}", project.display()))?;
    tracing::info!("Step {} of {} will run again", step, project.display());
    Ok(())
}

/// Run one of the read-only lookup commands.
async fn run_lookup(config: &Config) -> anyhow::Result<()> {
    let remote = connect_gateway(config)?;
    let policy = RetryPolicy::remote_operation();
    match &config.job {
        Job::TestResolve { identifier } => {
            let line = inspect::describe_resolution(&remote, &policy, identifier)
                .await
                .with_context(|| format!("Cannot resolve {identifier}"))?;
            println!("{line}");
        }
        Job::ListChats => {
            let lines = inspect::chat_lines(&remote, &policy)
                .await
                .context("Failed to list chats")?;
            for line in &lines {
                println!("{line}");
            }
            println!("{} chat(s)", lines.len());
        }
        Job::ListTopics { identifier } => {
            let table = inspect::topic_table(&remote, &policy, identifier)
                .await
                .with_context(|| format!("Failed to list topics of {identifier}"))?;
            match table {
                Some(lines) => lines.iter().for_each(|line| println!("{line}")),
                None => println!("{identifier} has no forum topics"),
            }
        }
        _ => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    let level = cli.log_level.as_str();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("chatsync={level}"))),
        )
        .init();

    let config = Config::from_cli(cli)?;
    tracing::debug!(?config, "Resolved configuration");

    match config.job {
        Job::Status => return run_status(&config.db_path).await,
        Job::ResetStep { ref project, step } => {
            return run_reset_step(&config.db_path, project, step).await
        }
        Job::Version => {
            println!("chatsync v{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Job::TestResolve { .. } | Job::ListChats | Job::ListTopics { .. } => {
            return run_lookup(&config).await
        }
        _ => {}
    }

    let services = Services::connect(&config).await?;
    let shutdown_token = shutdown::install_signal_handler();
    tracing::info!("Starting chatsync");

    match config.job {
        Job::Sync {
            sources,
            restart,
            options,
        } => run_sync(services, sources, restart, options, shutdown_token).await,
        Job::Download {
            source,
            restart,
            options,
        } => run_download(services, source, restart, options, shutdown_token).await,
        Job::Publish {
            project,
            restart,
            options,
        } => run_publish(services, project, restart, options, shutdown_token).await,
        Job::Status
        | Job::ResetStep { .. }
        | Job::Version
        | Job::TestResolve { .. }
        | Job::ListChats
        | Job::ListTopics { .. } => Ok(()),
    }
}

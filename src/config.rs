use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use crate::cli::{Cli, Command, DownloadArgs, PublishArgs, ResetStepArgs, SyncArgs};
use crate::drain::DrainOptions;
use crate::pipeline::PipelineOptions;
use crate::state::{PipelineStep, TransferStrategy};
use crate::sync::{PublishTarget, SyncOptions};
use crate::types::LogLevel;

/// Pause between drained downloads.
const DRAIN_DELAY: Duration = Duration::from_secs(1);

/// Application configuration resolved from the CLI.
///
/// Paths are tilde-expanded, command arguments are validated, and each
/// engine receives its own option struct through [`Job`].
pub struct Config {
    pub db_path: PathBuf,
    pub gateway_url: Option<String>,
    pub gateway_token: Option<String>,
    pub log_level: LogLevel,
    pub job: Job,
}

/// The command to run, with its engine options already built.
#[derive(Debug)]
pub enum Job {
    Sync {
        sources: Vec<String>,
        restart: bool,
        options: SyncOptions,
    },
    Download {
        source: String,
        restart: bool,
        options: DrainOptions,
    },
    Publish {
        project: PathBuf,
        restart: bool,
        options: PipelineOptions,
    },
    Status,
    ResetStep {
        project: PathBuf,
        step: PipelineStep,
    },
    TestResolve {
        identifier: String,
    },
    ListChats,
    ListTopics {
        identifier: String,
    },
    Version,
}

impl Job {
    /// Whether the command talks to the gateway.
    pub fn needs_gateway(&self) -> bool {
        matches!(
            self,
            Job::Sync { .. }
                | Job::Download { .. }
                | Job::Publish { .. }
                | Job::TestResolve { .. }
                | Job::ListChats
                | Job::ListTopics { .. }
        )
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("db_path", &self.db_path)
            .field("gateway_url", &self.gateway_url)
            .field(
                "gateway_token",
                &self.gateway_token.as_ref().map(|_| "<redacted>"),
            )
            .field("log_level", &self.log_level)
            .field("job", &self.job)
            .finish()
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Config {
    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        let no_progress_bar = cli.no_progress_bar;
        let job = match cli.command {
            Command::Sync(args) => sync_job(args, no_progress_bar)?,
            Command::Download(args) => download_job(args, no_progress_bar),
            Command::Publish(args) => publish_job(args, no_progress_bar)?,
            Command::Status => Job::Status,
            Command::ResetStep(args) => reset_step_job(args)?,
            Command::TestResolve(args) => Job::TestResolve {
                identifier: args.id.trim().to_string(),
            },
            Command::ListChats => Job::ListChats,
            Command::ListTopics(args) => Job::ListTopics {
                identifier: args.id.trim().to_string(),
            },
            Command::Version => Job::Version,
        };

        let gateway_url = cli.gateway_url.filter(|s| !s.trim().is_empty());
        let gateway_token = cli.gateway_token.filter(|s| !s.trim().is_empty());
        if job.needs_gateway() {
            if gateway_url.is_none() {
                anyhow::bail!("--gateway-url (or CHATSYNC_GATEWAY_URL) is required");
            }
            if gateway_token.is_none() {
                anyhow::bail!("--gateway-token (or CHATSYNC_GATEWAY_TOKEN) is required");
            }
        }

        Ok(Self {
            db_path: expand_tilde(&cli.db_path),
            gateway_url,
            gateway_token,
            log_level: cli.log_level,
            job,
        })
    }
}

fn sync_job(args: SyncArgs, no_progress_bar: bool) -> anyhow::Result<Job> {
    let sources = match (args.origin, args.batch) {
        (Some(origin), None) => vec![origin],
        (None, Some(batch)) => {
            let path = expand_tilde(&batch);
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Cannot read batch file {}", path.display()))?;
            let sources = parse_batch(&text);
            if sources.is_empty() {
                anyhow::bail!("Batch file {} lists no sources", path.display());
            }
            sources
        }
        _ => anyhow::bail!("sync needs exactly one of --origin or --batch"),
    };

    let force_strategy =
        (args.force_staging || args.extract_audio).then_some(TransferStrategy::StageAndRelay);
    let options = SyncOptions {
        item_delay: Duration::from_secs(args.delay_seconds),
        force_strategy,
        destination: args.dest,
        publish_link_to: args.publish_link_to.map(|chat| PublishTarget {
            chat,
            topic: args.topic_id,
        }),
        leave_source: args.leave_origin,
        extract_audio: args.extract_audio,
        staging_dir: expand_tilde(&args.staging_dir),
        links_file: expand_tilde(&args.links_file),
        no_progress_bar,
    };
    Ok(Job::Sync {
        sources,
        restart: args.restart,
        options,
    })
}

fn download_job(args: DownloadArgs, no_progress_bar: bool) -> Job {
    Job::Download {
        source: args.origin,
        restart: args.restart,
        options: DrainOptions {
            output_dir: expand_tilde(&args.output),
            limit: args.limit,
            item_delay: DRAIN_DELAY,
            extract_audio: true,
            no_progress_bar,
        },
    }
}

fn publish_job(args: PublishArgs, no_progress_bar: bool) -> anyhow::Result<Job> {
    let project = project_dir(&args.folder)?;
    if args.file_size_limit_mb == 0 {
        anyhow::bail!("--file-size-limit-mb must be greater than zero");
    }
    let video_extensions: Vec<String> = args
        .video_extensions
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect();
    if video_extensions.is_empty() {
        anyhow::bail!("--video-extensions lists no extensions");
    }

    let options = PipelineOptions {
        file_size_limit_bytes: args.file_size_limit_mb * 1024 * 1024,
        video_extensions,
        plan: args.plan,
        start_index: args.start_index,
        hashtag_index: args.hashtag_index,
        document_hashtag: args.document_hashtag,
        document_title: args.document_title,
        title_prefix: args.title_prefix.filter(|p| !p.trim().is_empty()),
        destination: args.dest,
        no_progress_bar,
    };
    Ok(Job::Publish {
        project,
        restart: args.restart,
        options,
    })
}

fn reset_step_job(args: ResetStepArgs) -> anyhow::Result<Job> {
    let step = PipelineStep::from_str(&args.step).with_context(|| {
        let names: Vec<&str> = PipelineStep::ALL.iter().map(|s| s.as_str()).collect();
        format!(
            "Unknown step '{}'. Expected one of: {}",
            args.step,
            names.join(", ")
        )
    })?;
    Ok(Job::ResetStep {
        project: project_dir(&args.folder)?,
        step,
    })
}

/// Canonical path of an existing project directory. Pipeline records are
/// keyed by this path.
fn project_dir(folder: &str) -> anyhow::Result<PathBuf> {
    let path = expand_tilde(folder);
    if !path.is_dir() {
        anyhow::bail!("Project folder {} is not a directory", path.display());
    }
    std::fs::canonicalize(&path)
        .with_context(|| format!("Cannot resolve project folder {}", path.display()))
}

/// Source identifiers of a batch file: one per line, blank lines and
/// `#` comments ignored.
pub(crate) fn parse_batch(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Where the `status` command expects the database, for messages.
pub(crate) fn describe_db(path: &Path) -> String {
    match std::fs::canonicalize(path) {
        Ok(p) => p.display().to_string(),
        Err(_) => path.display().to_string(),
    }
}

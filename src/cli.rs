use clap::{Args, Parser, Subcommand};

use crate::types::{FinalizePlan, LogLevel};

const DEFAULT_VIDEO_EXTENSIONS: &str = "mp4,avi,webm,ts,vob,mov,mkv,wmv,3gp,flv,ogv,ogg,rrc,gifv,\
mng,qt,yuv,rm,asf,amv,m4p,m4v,mpg,mp2,mpeg,mpe,mpv,svi,3g2,mxf,roq,nsv,f4v,f4p,f4a,f4b";

#[derive(Parser, Debug)]
#[command(
    name = "chatsync",
    version,
    about = "Resumable channel cloning and media publishing"
)]
pub struct Cli {
    /// Checkpoint database location
    #[arg(long, global = true, env = "CHATSYNC_DB", default_value = "./data/chatsync.db")]
    pub db_path: String,

    /// Base URL of the messaging gateway
    #[arg(long, global = true, env = "CHATSYNC_GATEWAY_URL")]
    pub gateway_url: Option<String>,

    /// Gateway access token.
    /// WARNING: passing via --gateway-token is visible in process listings.
    /// Prefer the CHATSYNC_GATEWAY_TOKEN environment variable instead.
    #[arg(long, global = true, env = "CHATSYNC_GATEWAY_TOKEN", hide_env_values = true)]
    pub gateway_token: Option<String>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Disable progress bar
    #[arg(long, global = true)]
    pub no_progress_bar: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Clone a source channel into a destination, resuming from the last checkpoint
    Sync(SyncArgs),
    /// Download every video of a source channel to disk
    Download(DownloadArgs),
    /// Package a local folder of videos and publish it to a channel
    Publish(PublishArgs),
    /// Show every recorded job and its progress
    Status,
    /// Clear one completed pipeline step so it runs again
    ResetStep(ResetStepArgs),
    /// Check that an identifier resolves, and show the chat it names
    TestResolve(ChatArgs),
    /// List every chat the account can see
    ListChats,
    /// List the forum topics of a group (ids for --topic-id)
    ListTopics(ChatArgs),
    /// Print the version
    Version,
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Source channel (id, @username or invite link)
    #[arg(long, conflicts_with = "batch", allow_negative_numbers = true)]
    pub origin: Option<String>,

    /// File listing one source per line (`#` starts a comment)
    #[arg(long)]
    pub batch: Option<String>,

    /// Existing destination channel; created from the source when omitted
    #[arg(long, allow_negative_numbers = true)]
    pub dest: Option<String>,

    /// Discard the checkpoint and start from the first item
    #[arg(long)]
    pub restart: bool,

    /// Always download and re-upload instead of relaying
    #[arg(long)]
    pub force_staging: bool,

    /// Keep an mp3 of every staged video (implies --force-staging)
    #[arg(long)]
    pub extract_audio: bool,

    /// Chat that receives the destination link once cloning finishes
    #[arg(long, allow_negative_numbers = true)]
    pub publish_link_to: Option<i64>,

    /// Topic of --publish-link-to to post into
    #[arg(long, requires = "publish_link_to")]
    pub topic_id: Option<i64>,

    /// Leave the source channel after cloning
    #[arg(long)]
    pub leave_origin: bool,

    /// Pause between replayed items, in seconds
    #[arg(long, default_value_t = 2)]
    pub delay_seconds: u64,

    /// Directory for staged payloads
    #[arg(long, default_value = "./data/downloads/")]
    pub staging_dir: String,

    /// File that collects destination titles and links
    #[arg(long, default_value = "./data/links.txt")]
    pub links_file: String,
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Source channel (id, @username or invite link)
    #[arg(long, allow_negative_numbers = true)]
    pub origin: String,

    /// Stop after this many videos
    #[arg(long)]
    pub limit: Option<u64>,

    /// Directory for downloaded videos and extracted audio
    #[arg(long, default_value = "./data/downloads/")]
    pub output: String,

    /// Discard the checkpoint and start from the first item
    #[arg(long)]
    pub restart: bool,
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Project folder holding the videos
    #[arg(long)]
    pub folder: String,

    /// Discard progress and generated files, then run every step again
    #[arg(long)]
    pub restart: bool,

    /// Largest file uploaded as-is, in MB; bigger videos are split
    #[arg(long, default_value_t = 1000)]
    pub file_size_limit_mb: u64,

    /// Comma-separated extensions treated as video
    #[arg(long, value_delimiter = ',', default_value = DEFAULT_VIDEO_EXTENSIONS)]
    pub video_extensions: Vec<String>,

    /// One upload per video, or one per folder group
    #[arg(long, value_enum, default_value = "single")]
    pub plan: FinalizePlan,

    /// First number of the video hashtag sequence
    #[arg(long, default_value_t = 1)]
    pub start_index: u32,

    /// Prefix of the numbered video hashtag
    #[arg(long, default_value = "F")]
    pub hashtag_index: String,

    /// Hashtag of archive uploads
    #[arg(long, default_value = "Materiais")]
    pub document_hashtag: String,

    /// Caption title of archive uploads
    #[arg(long, default_value = "Materiais")]
    pub document_title: String,

    /// Prefix of the created destination's title
    #[arg(long)]
    pub title_prefix: Option<String>,

    /// Existing destination channel; created when omitted
    #[arg(long, allow_negative_numbers = true)]
    pub dest: Option<String>,
}

#[derive(Args, Debug)]
pub struct ResetStepArgs {
    /// Project folder of the pipeline
    #[arg(long)]
    pub folder: String,

    /// Step to clear (archive, report, transform, finalize, annotate, publish)
    #[arg(long)]
    pub step: String,
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Chat id, @username or invite link
    #[arg(long, allow_negative_numbers = true)]
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_defaults() {
        let cli = Cli::try_parse_from(["chatsync", "sync", "--origin", "@src"]).unwrap();
        assert_eq!(cli.db_path, "./data/chatsync.db");
        assert_eq!(cli.log_level, LogLevel::Info);
        let Command::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        assert_eq!(args.origin.as_deref(), Some("@src"));
        assert_eq!(args.delay_seconds, 2);
        assert_eq!(args.staging_dir, "./data/downloads/");
        assert_eq!(args.links_file, "./data/links.txt");
        assert!(!args.force_staging);
    }

    #[test]
    fn test_origin_conflicts_with_batch() {
        let result =
            Cli::try_parse_from(["chatsync", "sync", "--origin", "@a", "--batch", "list.txt"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_topic_requires_publish_target() {
        let result = Cli::try_parse_from(["chatsync", "sync", "--origin", "@a", "--topic-id", "4"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_publish_defaults() {
        let cli = Cli::try_parse_from(["chatsync", "publish", "--folder", "/videos/course"]).unwrap();
        let Command::Publish(args) = cli.command else {
            panic!("expected publish");
        };
        assert_eq!(args.file_size_limit_mb, 1000);
        assert_eq!(args.plan, FinalizePlan::Single);
        assert_eq!(args.start_index, 1);
        assert_eq!(args.hashtag_index, "F");
        assert_eq!(args.video_extensions.len(), 36);
        assert_eq!(args.video_extensions[0], "mp4");
        assert_eq!(args.video_extensions[35], "f4b");
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "chatsync",
            "status",
            "--log-level",
            "debug",
            "--no-progress-bar",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Status));
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert!(cli.no_progress_bar);
    }

    #[test]
    fn test_negative_chat_ids_parse() {
        let cli = Cli::try_parse_from([
            "chatsync",
            "sync",
            "--origin",
            "-1001234567",
            "--dest",
            "-1009",
            "--publish-link-to",
            "-1008",
        ])
        .unwrap();
        let Command::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        assert_eq!(args.origin.as_deref(), Some("-1001234567"));
        assert_eq!(args.dest.as_deref(), Some("-1009"));
        assert_eq!(args.publish_link_to, Some(-1008));

        let cli = Cli::try_parse_from(["chatsync", "download", "--origin", "-1001234567"]).unwrap();
        let Command::Download(args) = cli.command else {
            panic!("expected download");
        };
        assert_eq!(args.origin, "-1001234567");

        let cli = Cli::try_parse_from([
            "chatsync",
            "publish",
            "--folder",
            "/videos",
            "--dest",
            "-1001234567",
        ])
        .unwrap();
        let Command::Publish(args) = cli.command else {
            panic!("expected publish");
        };
        assert_eq!(args.dest.as_deref(), Some("-1001234567"));

        let cli = Cli::try_parse_from(["chatsync", "list-topics", "--id", "-1009"]).unwrap();
        let Command::ListTopics(args) = cli.command else {
            panic!("expected list-topics");
        };
        assert_eq!(args.id, "-1009");
    }

    #[test]
    fn test_utility_commands_parse() {
        let cli = Cli::try_parse_from(["chatsync", "test-resolve", "--id", "@news"]).unwrap();
        assert!(matches!(cli.command, Command::TestResolve(ChatArgs { ref id }) if id == "@news"));
        let cli = Cli::try_parse_from(["chatsync", "list-chats"]).unwrap();
        assert!(matches!(cli.command, Command::ListChats));
        let cli = Cli::try_parse_from(["chatsync", "version"]).unwrap();
        assert!(matches!(cli.command, Command::Version));
        assert!(Cli::try_parse_from(["chatsync", "list-topics"]).is_err());
    }
}

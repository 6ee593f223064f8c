/// Canonical handle of a remote container (channel, group, private chat).
pub type ChatId = i64;

/// Position of an item inside a container. Positions start at 1.
pub type ItemId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// How the finalize step turns transformed videos into upload artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FinalizePlan {
    /// One artifact (or its split parts) per source video.
    Single,
    /// Videos of the same group are joined, then split if oversized.
    Group,
}

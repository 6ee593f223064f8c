//! Remote content service: the messaging platform behind a trait.
//!
//! Engines only talk to [`RemoteContent`]. Items are decoded once, at fetch
//! time, into the [`ItemContent`] tagged union so handlers can dispatch with an
//! exhaustive `match` instead of probing which media field happens to be set.

pub mod error;
pub mod http;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use error::RemoteError;
pub use http::GatewayClient;

use crate::types::{ChatId, ItemId};

/// Metadata of a container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerInfo {
    pub id: ChatId,
    pub title: String,
    pub description: Option<String>,
    /// Item currently pinned in the container, if any.
    pub pinned_item: Option<ItemId>,
}

/// One entry of the account's chat list.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSummary {
    pub id: ChatId,
    pub title: String,
    /// Service-reported type: `channel`, `supergroup`, `group` or `private`.
    pub kind: String,
}

/// A forum topic of a group.
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    pub id: ItemId,
    pub title: String,
}

/// Handle to a binary payload held by the service.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRef {
    pub file_id: String,
    pub file_name: Option<String>,
    pub size: Option<u64>,
}

/// What an item carries.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemContent {
    /// Deleted or otherwise absent content.
    Empty,
    /// Service notice (member joined, title changed, ...). Not replayed.
    Service,
    Text(String),
    Photo(MediaRef),
    Video(MediaRef),
    Audio(MediaRef),
    Voice(MediaRef),
    Document(MediaRef),
    Animation(MediaRef),
    Sticker(MediaRef),
    VideoNote(MediaRef),
    Poll { question: String, options: Vec<String> },
}

impl ItemContent {
    /// The binary payload, for media variants.
    pub fn media(&self) -> Option<&MediaRef> {
        match self {
            ItemContent::Photo(m)
            | ItemContent::Video(m)
            | ItemContent::Audio(m)
            | ItemContent::Voice(m)
            | ItemContent::Document(m)
            | ItemContent::Animation(m)
            | ItemContent::Sticker(m)
            | ItemContent::VideoNote(m) => Some(m),
            ItemContent::Empty
            | ItemContent::Service
            | ItemContent::Text(_)
            | ItemContent::Poll { .. } => None,
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, ItemContent::Video(_))
    }

    /// Nothing to replay: checkpoint and move on.
    pub fn is_skippable(&self) -> bool {
        matches!(self, ItemContent::Empty | ItemContent::Service)
    }

    /// File name used when the payload arrives without one.
    pub fn fallback_file_name(&self) -> &'static str {
        match self {
            ItemContent::Photo(_) => "photo.jpg",
            ItemContent::Video(_) => "video.mp4",
            ItemContent::Audio(_) => "audio.mp3",
            ItemContent::Voice(_) => "voice.ogg",
            ItemContent::Animation(_) => "animation.mp4",
            ItemContent::Sticker(_) => "sticker.webp",
            ItemContent::VideoNote(_) => "video_note.mp4",
            _ => "document.bin",
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ItemContent::Empty => "empty",
            ItemContent::Service => "service",
            ItemContent::Text(_) => "text",
            ItemContent::Photo(_) => "photo",
            ItemContent::Video(_) => "video",
            ItemContent::Audio(_) => "audio",
            ItemContent::Voice(_) => "voice",
            ItemContent::Document(_) => "document",
            ItemContent::Animation(_) => "animation",
            ItemContent::Sticker(_) => "sticker",
            ItemContent::VideoNote(_) => "video_note",
            ItemContent::Poll { .. } => "poll",
        }
    }
}

/// One item of a container.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteItem {
    pub id: ItemId,
    pub date: Option<DateTime<Utc>>,
    pub caption: Option<String>,
    pub content: ItemContent,
}

impl RemoteItem {
    /// Local file name for a staged copy: `<id>-<original name>`.
    pub fn staged_file_name(&self) -> String {
        let name = self
            .content
            .media()
            .and_then(|m| m.file_name.as_deref())
            .unwrap_or_else(|| self.content.fallback_file_name());
        format!("{}-{}", self.id, sanitize_file_name(name))
    }
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '_',
            c => c,
        })
        .collect()
}

/// Item type used when uploading a local file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Document,
    Video,
    Photo,
    Audio,
}

impl UploadKind {
    /// Pick the upload type from the file extension.
    pub fn for_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "jpg" | "jpeg" | "png" => UploadKind::Photo,
            "mp4" | "mkv" | "avi" | "mov" => UploadKind::Video,
            "mp3" | "ogg" | "wav" | "flac" => UploadKind::Audio,
            _ => UploadKind::Document,
        }
    }
}

/// Where a relayed item lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayTarget {
    Chat(ChatId),
    /// The account's private scratch chat, used for probing.
    Scratch,
}

/// Operations consumed from the messaging service.
///
/// Every call may fail with `RateLimited`, `Forbidden`, `NotFound` or
/// `Transient`; [`crate::retry`] classifies them.
#[async_trait]
pub trait RemoteContent: Send + Sync {
    /// Resolve a username, link or numeric string to a canonical handle.
    async fn resolve(&self, identifier: &str) -> Result<ChatId, RemoteError>;

    async fn container(&self, chat: ChatId) -> Result<ContainerInfo, RemoteError>;

    /// Most recent item, or `None` for an empty container.
    async fn latest_item(&self, chat: ChatId) -> Result<Option<RemoteItem>, RemoteError>;

    /// Item at a position, or `None` when nothing is there.
    async fn item(&self, chat: ChatId, id: ItemId) -> Result<Option<RemoteItem>, RemoteError>;

    /// Number of video items in a container.
    async fn count_videos(&self, chat: ChatId) -> Result<u64, RemoteError>;

    /// Every chat the account can see, in the service's order.
    async fn list_chats(&self) -> Result<Vec<ChatSummary>, RemoteError>;

    /// Forum topics of a group. Empty when the group has no forum.
    async fn list_topics(&self, chat: ChatId) -> Result<Vec<Topic>, RemoteError>;

    /// Relay an item server-side. Returns the new item's id when known.
    async fn relay(
        &self,
        from: ChatId,
        item: ItemId,
        to: RelayTarget,
    ) -> Result<Option<ItemId>, RemoteError>;

    /// Download an item's payload to exactly `dest`.
    async fn download(
        &self,
        item: &RemoteItem,
        dest: &Path,
    ) -> Result<PathBuf, RemoteError>;

    async fn upload(
        &self,
        chat: ChatId,
        path: &Path,
        kind: UploadKind,
        caption: Option<&str>,
    ) -> Result<ItemId, RemoteError>;

    async fn create_container(&self, title: &str, description: &str)
        -> Result<ChatId, RemoteError>;

    async fn set_description(&self, chat: ChatId, description: &str) -> Result<(), RemoteError>;

    async fn export_invite_link(&self, chat: ChatId) -> Result<String, RemoteError>;

    async fn post_text(
        &self,
        chat: ChatId,
        text: &str,
        reply_to: Option<ItemId>,
    ) -> Result<ItemId, RemoteError>;

    async fn pin(&self, chat: ChatId, item: ItemId) -> Result<(), RemoteError>;

    async fn leave(&self, chat: ChatId) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(name: Option<&str>) -> MediaRef {
        MediaRef {
            file_id: "f".into(),
            file_name: name.map(String::from),
            size: None,
        }
    }

    #[test]
    fn test_upload_kind_by_extension() {
        assert_eq!(UploadKind::for_path(Path::new("a.JPG")), UploadKind::Photo);
        assert_eq!(UploadKind::for_path(Path::new("a.mkv")), UploadKind::Video);
        assert_eq!(UploadKind::for_path(Path::new("a.flac")), UploadKind::Audio);
        assert_eq!(UploadKind::for_path(Path::new("a.zip")), UploadKind::Document);
        assert_eq!(UploadKind::for_path(Path::new("noext")), UploadKind::Document);
    }

    #[test]
    fn test_staged_file_name_prefixes_id() {
        let item = RemoteItem {
            id: 17,
            date: None,
            caption: None,
            content: ItemContent::Document(media(Some("notes/v1.pdf"))),
        };
        assert_eq!(item.staged_file_name(), "17-notes_v1.pdf");

        let item = RemoteItem {
            id: 3,
            date: None,
            caption: None,
            content: ItemContent::Video(media(None)),
        };
        assert_eq!(item.staged_file_name(), "3-video.mp4");
    }

    #[test]
    fn test_skippable_variants() {
        assert!(ItemContent::Empty.is_skippable());
        assert!(ItemContent::Service.is_skippable());
        assert!(!ItemContent::Text("hi".into()).is_skippable());
        assert!(ItemContent::Text("hi".into()).media().is_none());
        assert!(ItemContent::Sticker(media(None)).media().is_some());
    }
}

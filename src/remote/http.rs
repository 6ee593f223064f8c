//! JSON-over-HTTP gateway client for the messaging service.
//!
//! Every method is `POST {base}/{method}` with a JSON body. Responses use a
//! uniform envelope:
//!
//! ```text
//! {"ok": true,  "result": ...}
//! {"ok": false, "error_code": 429, "description": "...", "parameters": {"retry_after": 30}}
//! ```
//!
//! File payloads are fetched from `GET {base}/file/{file_path}` after a
//! `getFile` lookup and streamed to disk through a `.part` file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use super::{
    ChatSummary, ContainerInfo, ItemContent, MediaRef, RelayTarget, RemoteContent, RemoteError, RemoteItem,
    Topic, UploadKind,
};
use crate::types::{ChatId, ItemId};

/// Scratch chat alias understood by the gateway.
const SCRATCH_CHAT: &str = "me";

/// Descriptions the gateway uses when a source forbids relaying.
const RELAY_RESTRICTED_MARKERS: &[&str] = &[
    "protected",
    "restricted",
    "forwards_restricted",
    "can't be forwarded",
];

/// Descriptions of a missing message, as opposed to a missing chat.
const MISSING_ITEM_MARKERS: &[&str] = &["message to get not found", "message not found"];

/// Descriptions of a group without forum topics.
const FORUM_MISSING_MARKERS: &[&str] = &["forum_missing", "not a forum"];

/// Forum topics fetched per listing.
const TOPIC_PAGE_LIMIT: u32 = 100;

pub struct GatewayClient {
    http: Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl GatewayClient {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RemoteError::Protocol(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> Result<T, RemoteError> {
        tracing::debug!(method, "Gateway call");
        let response = self
            .http
            .post(self.url(method))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(map_transport)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(map_transport)?;
        decode_envelope(method, status, &text)
    }

    async fn call_multipart<T: DeserializeOwned>(
        &self,
        method: &str,
        form: Form,
    ) -> Result<T, RemoteError> {
        tracing::debug!(method, "Gateway upload");
        let response = self
            .http
            .post(self.url(method))
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await
            .map_err(map_transport)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(map_transport)?;
        decode_envelope(method, status, &text)
    }

    /// Stream a payload into `part_path`, then rename it to `dest`.
    async fn fetch_file(&self, file_path: &str, dest: &Path) -> Result<(), RemoteError> {
        let part_path = part_path_for(dest);
        let response = self
            .http
            .get(self.url(&format!("file/{file_path}")))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(map_transport)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(map_status(
                "file",
                status,
                format!("HTTP {status} fetching {file_path}"),
                None,
            ));
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&part_path)
            .await?;

        let mut bytes_written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                tracing::warn!(
                    "Body error for {} after {} bytes: {}",
                    dest.display(),
                    bytes_written,
                    e
                );
                map_transport(e)
            })?;
            file.write_all(&chunk).await?;
            bytes_written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        fs::rename(&part_path, dest).await?;
        Ok(())
    }
}

fn part_path_for(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

#[async_trait]
impl RemoteContent for GatewayClient {
    async fn resolve(&self, identifier: &str) -> Result<ChatId, RemoteError> {
        let chat: WireChat = self
            .call("resolveChat", json!({ "identifier": identifier }))
            .await?;
        Ok(chat.id)
    }

    async fn container(&self, chat: ChatId) -> Result<ContainerInfo, RemoteError> {
        let chat: WireChat = self.call("getChat", json!({ "chat_id": chat })).await?;
        Ok(chat.into())
    }

    async fn latest_item(&self, chat: ChatId) -> Result<Option<RemoteItem>, RemoteError> {
        let item: Option<WireItem> = self
            .call("getLatestMessage", json!({ "chat_id": chat }))
            .await?;
        Ok(item.map(RemoteItem::from))
    }

    async fn item(&self, chat: ChatId, id: ItemId) -> Result<Option<RemoteItem>, RemoteError> {
        let result: Result<Option<WireItem>, _> = self
            .call("getMessage", json!({ "chat_id": chat, "message_id": id }))
            .await;
        match result {
            Ok(item) => Ok(item.map(RemoteItem::from)),
            // An unknown chat must surface; only a missing position is a gap.
            Err(RemoteError::NotFound(desc)) if contains_any(&desc, MISSING_ITEM_MARKERS) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn count_videos(&self, chat: ChatId) -> Result<u64, RemoteError> {
        let count: WireCount = self
            .call(
                "countMessages",
                json!({ "chat_id": chat, "filter": "video" }),
            )
            .await?;
        Ok(count.count)
    }

    async fn list_chats(&self) -> Result<Vec<ChatSummary>, RemoteError> {
        let chats: Vec<WireChat> = self.call("getChats", json!({})).await?;
        Ok(chats.into_iter().map(ChatSummary::from).collect())
    }

    async fn list_topics(&self, chat: ChatId) -> Result<Vec<Topic>, RemoteError> {
        let result: Result<Vec<WireTopic>, _> = self
            .call(
                "getForumTopics",
                json!({ "chat_id": chat, "limit": TOPIC_PAGE_LIMIT }),
            )
            .await;
        match result {
            Ok(topics) => Ok(topics.into_iter().map(Topic::from).collect()),
            Err(RemoteError::Protocol(desc)) if contains_any(&desc, FORUM_MISSING_MARKERS) => {
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn relay(
        &self,
        from: ChatId,
        item: ItemId,
        to: RelayTarget,
    ) -> Result<Option<ItemId>, RemoteError> {
        let target = match to {
            RelayTarget::Chat(id) => json!(id),
            RelayTarget::Scratch => json!(SCRATCH_CHAT),
        };
        let result: Result<WireMessageId, _> = self
            .call(
                "copyMessage",
                json!({ "from_chat_id": from, "message_id": item, "chat_id": target }),
            )
            .await;
        match result {
            Ok(sent) => Ok(Some(sent.message_id)),
            Err(RemoteError::Forbidden(desc)) if is_relay_restriction(&desc) => {
                Err(RemoteError::RelayRestricted(desc))
            }
            Err(RemoteError::Protocol(desc)) if is_relay_restriction(&desc) => {
                Err(RemoteError::RelayRestricted(desc))
            }
            Err(e) => Err(e),
        }
    }

    async fn download(&self, item: &RemoteItem, dest: &Path) -> Result<PathBuf, RemoteError> {
        let media = item.content.media().ok_or_else(|| {
            RemoteError::NotFound(format!(
                "item {} ({}) has no payload",
                item.id,
                item.content.kind()
            ))
        })?;
        let file: WireFilePath = self
            .call("getFile", json!({ "file_id": media.file_id }))
            .await?;
        self.fetch_file(&file.file_path, dest).await?;
        Ok(dest.to_path_buf())
    }

    async fn upload(
        &self,
        chat: ChatId,
        path: &Path,
        kind: UploadKind,
        caption: Option<&str>,
    ) -> Result<ItemId, RemoteError> {
        let (method, field) = upload_method(kind);
        let file = fs::File::open(path).await?;
        let len = file.metadata().await?.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, len).file_name(file_name);

        let mut form = Form::new().text("chat_id", chat.to_string()).part(field, part);
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }
        let sent: WireMessageId = self.call_multipart(method, form).await?;
        Ok(sent.message_id)
    }

    async fn create_container(
        &self,
        title: &str,
        description: &str,
    ) -> Result<ChatId, RemoteError> {
        let chat: WireChat = self
            .call(
                "createChannel",
                json!({ "title": title, "description": description }),
            )
            .await?;
        Ok(chat.id)
    }

    async fn set_description(&self, chat: ChatId, description: &str) -> Result<(), RemoteError> {
        let _: bool = self
            .call(
                "setChatDescription",
                json!({ "chat_id": chat, "description": description }),
            )
            .await?;
        Ok(())
    }

    async fn export_invite_link(&self, chat: ChatId) -> Result<String, RemoteError> {
        self.call("exportChatInviteLink", json!({ "chat_id": chat }))
            .await
    }

    async fn post_text(
        &self,
        chat: ChatId,
        text: &str,
        reply_to: Option<ItemId>,
    ) -> Result<ItemId, RemoteError> {
        let sent: WireMessageId = self
            .call(
                "sendMessage",
                json!({ "chat_id": chat, "text": text, "reply_to_message_id": reply_to }),
            )
            .await?;
        Ok(sent.message_id)
    }

    async fn pin(&self, chat: ChatId, item: ItemId) -> Result<(), RemoteError> {
        let _: bool = self
            .call(
                "pinChatMessage",
                json!({ "chat_id": chat, "message_id": item }),
            )
            .await?;
        Ok(())
    }

    async fn leave(&self, chat: ChatId) -> Result<(), RemoteError> {
        let _: bool = self.call("leaveChat", json!({ "chat_id": chat })).await?;
        Ok(())
    }
}

fn upload_method(kind: UploadKind) -> (&'static str, &'static str) {
    match kind {
        UploadKind::Document => ("sendDocument", "document"),
        UploadKind::Video => ("sendVideo", "video"),
        UploadKind::Photo => ("sendPhoto", "photo"),
        UploadKind::Audio => ("sendAudio", "audio"),
    }
}

fn contains_any(description: &str, markers: &[&str]) -> bool {
    let lower = description.to_ascii_lowercase();
    markers.iter().any(|m| lower.contains(m))
}

fn is_relay_restriction(description: &str) -> bool {
    contains_any(description, RELAY_RESTRICTED_MARKERS)
}

fn map_transport(err: reqwest::Error) -> RemoteError {
    if err.is_decode() {
        RemoteError::Protocol(err.to_string())
    } else {
        // Timeouts, refused connections, truncated bodies.
        RemoteError::Transient(err.to_string())
    }
}

fn map_status(
    method: &str,
    status: u16,
    description: String,
    retry_after: Option<u64>,
) -> RemoteError {
    if let Some(secs) = retry_after {
        return RemoteError::RateLimited {
            wait: Duration::from_secs(secs),
        };
    }
    match status {
        429 => RemoteError::RateLimited {
            wait: Duration::from_secs(1),
        },
        401 | 403 => RemoteError::Forbidden(format!("{method}: {description}")),
        404 => RemoteError::NotFound(format!("{method}: {description}")),
        400 if description.to_ascii_lowercase().contains("not found") => {
            RemoteError::NotFound(format!("{method}: {description}"))
        }
        408 | 500..=599 => RemoteError::Transient(format!("{method}: HTTP {status} {description}")),
        _ => RemoteError::Protocol(format!("{method}: HTTP {status} {description}")),
    }
}

/// Turn a raw gateway response into a result or a classified error.
fn decode_envelope<T: DeserializeOwned>(
    method: &str,
    status: u16,
    body: &str,
) -> Result<T, RemoteError> {
    let envelope: Envelope = match serde_json::from_str(body) {
        Ok(env) => env,
        Err(e) => {
            if status >= 500 || status == 429 {
                return Err(map_status(method, status, body.chars().take(200).collect(), None));
            }
            return Err(RemoteError::Protocol(format!(
                "{method}: unparseable response (HTTP {status}): {e}"
            )));
        }
    };

    if envelope.ok {
        return serde_json::from_value::<T>(envelope.result.unwrap_or(Value::Null))
            .map_err(|e| RemoteError::Protocol(format!("{method}: unexpected result shape: {e}")));
    }

    let code = envelope.error_code.unwrap_or(status);
    let retry_after = envelope.parameters.and_then(|p| p.retry_after);
    Err(map_status(
        method,
        code,
        envelope.description.unwrap_or_default(),
        retry_after,
    ))
}

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ErrorParameters>,
}

#[derive(Debug, Deserialize)]
struct ErrorParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WireChat {
    id: i64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    pinned_message_id: Option<i64>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl From<WireChat> for ChatSummary {
    fn from(chat: WireChat) -> Self {
        ChatSummary {
            id: chat.id,
            title: chat.title.unwrap_or_else(|| chat.id.to_string()),
            kind: chat.kind.unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireTopic {
    message_thread_id: i64,
    name: String,
}

impl From<WireTopic> for Topic {
    fn from(t: WireTopic) -> Self {
        Topic {
            id: t.message_thread_id,
            title: t.name,
        }
    }
}

impl From<WireChat> for ContainerInfo {
    fn from(chat: WireChat) -> Self {
        ContainerInfo {
            id: chat.id,
            title: chat.title.unwrap_or_else(|| chat.id.to_string()),
            description: chat.description.filter(|d| !d.is_empty()),
            pinned_item: chat.pinned_message_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireMessageId {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct WireFilePath {
    file_path: String,
}

#[derive(Debug, Deserialize)]
struct WireCount {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct WireFile {
    file_id: String,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    file_size: Option<u64>,
}

impl From<WireFile> for MediaRef {
    fn from(f: WireFile) -> Self {
        MediaRef {
            file_id: f.file_id,
            file_name: f.file_name,
            size: f.file_size,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WirePollOption {
    text: String,
}

#[derive(Debug, Deserialize)]
struct WirePoll {
    question: String,
    #[serde(default)]
    options: Vec<WirePollOption>,
}

/// Flat item as sent by the gateway; at most one content field is set.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireItem {
    message_id: i64,
    date: Option<i64>,
    empty: bool,
    service: Option<Value>,
    text: Option<String>,
    caption: Option<String>,
    photo: Option<WireFile>,
    video: Option<WireFile>,
    video_note: Option<WireFile>,
    animation: Option<WireFile>,
    audio: Option<WireFile>,
    voice: Option<WireFile>,
    sticker: Option<WireFile>,
    document: Option<WireFile>,
    poll: Option<WirePoll>,
}

impl From<WireItem> for RemoteItem {
    fn from(w: WireItem) -> Self {
        // Animations also carry a document field; check them first.
        let content = if w.empty {
            ItemContent::Empty
        } else if w.service.is_some() {
            ItemContent::Service
        } else if let Some(poll) = w.poll {
            ItemContent::Poll {
                question: poll.question,
                options: poll.options.into_iter().map(|o| o.text).collect(),
            }
        } else if let Some(f) = w.photo {
            ItemContent::Photo(f.into())
        } else if let Some(f) = w.video {
            ItemContent::Video(f.into())
        } else if let Some(f) = w.video_note {
            ItemContent::VideoNote(f.into())
        } else if let Some(f) = w.animation {
            ItemContent::Animation(f.into())
        } else if let Some(f) = w.audio {
            ItemContent::Audio(f.into())
        } else if let Some(f) = w.voice {
            ItemContent::Voice(f.into())
        } else if let Some(f) = w.sticker {
            ItemContent::Sticker(f.into())
        } else if let Some(f) = w.document {
            ItemContent::Document(f.into())
        } else if let Some(text) = w.text.filter(|t| !t.is_empty()) {
            ItemContent::Text(text)
        } else {
            ItemContent::Empty
        };

        RemoteItem {
            id: w.message_id,
            date: w.date.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
            caption: w.caption.filter(|c| !c.is_empty()),
            content,
        }
    }
}

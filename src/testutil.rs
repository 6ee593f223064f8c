//! In-memory fakes of the remote and media services for engine tests.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::media::{MediaError, MediaTransform, VideoEntry};
use crate::remote::{
    ChatSummary, ContainerInfo, ItemContent, MediaRef, RelayTarget, RemoteContent, RemoteError,
    RemoteItem, Topic, UploadKind,
};
use crate::state::{
    CheckpointStore, DownloadTask, DownloadUpdate, PipelineTask, PipelineUpdate,
    SqliteCheckpointStore, StateError, TransferTask, TransferUpdate,
};
use crate::types::{ChatId, ItemId};

/// A failure to inject on the next relay or download of an item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Fault {
    Fatal,
    Transient,
    RateLimited(Duration),
    RelayRestricted,
}

impl Fault {
    fn to_error(self) -> RemoteError {
        match self {
            Fault::Fatal => RemoteError::Forbidden("scripted".into()),
            Fault::Transient => RemoteError::Transient("scripted".into()),
            Fault::RateLimited(wait) => RemoteError::RateLimited { wait },
            Fault::RelayRestricted => RemoteError::RelayRestricted("scripted".into()),
        }
    }
}

/// Side-effecting calls observed by [`MockRemote`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Relay {
        from: ChatId,
        item: ItemId,
        to: RelayTarget,
    },
    Download {
        item: ItemId,
    },
    Upload {
        chat: ChatId,
        file_name: String,
        kind: UploadKind,
        caption: Option<String>,
    },
    CreateContainer {
        title: String,
        description: String,
    },
    SetDescription {
        chat: ChatId,
        description: String,
    },
    PostText {
        chat: ChatId,
        text: String,
        reply_to: Option<ItemId>,
    },
    Pin {
        chat: ChatId,
        item: ItemId,
    },
    Leave {
        chat: ChatId,
    },
}

#[derive(Default)]
struct RemoteState {
    containers: HashMap<ChatId, ContainerInfo>,
    items: HashMap<ChatId, BTreeMap<ItemId, RemoteItem>>,
    aliases: HashMap<String, ChatId>,
    topics: HashMap<ChatId, Vec<Topic>>,
    relay_restricted: HashSet<ChatId>,
    faults: HashMap<ItemId, VecDeque<Fault>>,
    broken: HashSet<ItemId>,
    broken_uploads: HashSet<String>,
    probe_fault: Option<Fault>,
    invite_link_fails: bool,
    pin_fails: bool,
    calls: Vec<Call>,
    /// Source item ids that landed in a destination, as (destination, item).
    delivered: Vec<(ChatId, ItemId)>,
    next_id: i64,
}

impl RemoteState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn push_item(&mut self, chat: ChatId, content: ItemContent, caption: Option<String>) -> ItemId {
        let id = self.next_id();
        self.items.entry(chat).or_default().insert(
            id,
            RemoteItem {
                id,
                date: None,
                caption,
                content,
            },
        );
        id
    }

    fn take_fault(&mut self, item: ItemId) -> Option<RemoteError> {
        if self.broken.contains(&item) {
            return Some(Fault::Fatal.to_error());
        }
        self.faults
            .get_mut(&item)
            .and_then(VecDeque::pop_front)
            .map(Fault::to_error)
    }

    fn require_container(&self, chat: ChatId) -> Result<(), RemoteError> {
        if self.containers.contains_key(&chat) {
            Ok(())
        } else {
            Err(RemoteError::NotFound(format!("chat {chat}")))
        }
    }
}

/// Scriptable in-memory [`RemoteContent`].
#[derive(Default)]
pub(crate) struct MockRemote {
    state: Mutex<RemoteState>,
}

impl MockRemote {
    pub fn new() -> Self {
        let mock = Self::default();
        // Created ids stay clear of the small positions tests seed by hand.
        mock.lock().next_id = 10_000;
        mock
    }

    fn lock(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_container(&self, id: ChatId, title: &str) {
        let mut st = self.lock();
        st.containers.insert(
            id,
            ContainerInfo {
                id,
                title: title.to_string(),
                description: Some(format!("{title} description")),
                pinned_item: None,
            },
        );
        st.items.entry(id).or_default();
    }

    pub fn add_topic(&self, chat: ChatId, id: ItemId, title: &str) {
        self.lock().topics.entry(chat).or_default().push(Topic {
            id,
            title: title.to_string(),
        });
    }

    pub fn add_alias(&self, alias: &str, id: ChatId) {
        self.lock().aliases.insert(alias.to_string(), id);
    }

    pub fn add_item(&self, chat: ChatId, id: ItemId, content: ItemContent) {
        self.lock().items.entry(chat).or_default().insert(
            id,
            RemoteItem {
                id,
                date: None,
                caption: None,
                content,
            },
        );
    }

    /// Text items at positions `1..=count`.
    pub fn add_text_items(&self, chat: ChatId, count: i64) {
        for id in 1..=count {
            self.add_item(chat, id, ItemContent::Text(format!("item {id}")));
        }
    }

    pub fn set_pinned(&self, chat: ChatId, item: ItemId) {
        if let Some(info) = self.lock().containers.get_mut(&chat) {
            info.pinned_item = Some(item);
        }
    }

    pub fn restrict_relay(&self, chat: ChatId) {
        self.lock().relay_restricted.insert(chat);
    }

    /// Faults returned, in order, by the next relays or downloads of `item`.
    pub fn script_faults(&self, item: ItemId, faults: Vec<Fault>) {
        self.lock().faults.insert(item, faults.into());
    }

    /// Every relay or download of `item` fails fatally.
    pub fn break_item(&self, item: ItemId) {
        self.lock().broken.insert(item);
    }

    pub fn break_upload(&self, file_name: &str) {
        self.lock().broken_uploads.insert(file_name.to_string());
    }

    pub fn fail_probe(&self, fault: Fault) {
        self.lock().probe_fault = Some(fault);
    }

    pub fn fail_invite_link(&self) {
        self.lock().invite_link_fails = true;
    }

    pub fn fail_pin(&self) {
        self.lock().pin_fails = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Item ids of every relay attempt into `chat`, failed ones included.
    pub fn relayed_into(&self, chat: ChatId) -> Vec<ItemId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Relay {
                    item,
                    to: RelayTarget::Chat(to),
                    ..
                } if to == chat => Some(item),
                _ => None,
            })
            .collect()
    }

    /// Item ids whose relay into `chat` succeeded, in order.
    pub fn delivered_into(&self, chat: ChatId) -> Vec<ItemId> {
        self.lock()
            .delivered
            .iter()
            .filter(|(to, _)| *to == chat)
            .map(|(_, item)| *item)
            .collect()
    }

    /// File names uploaded into `chat`, in call order.
    pub fn uploads_into(&self, chat: ChatId) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Upload {
                    chat: to,
                    file_name,
                    ..
                } if to == chat => Some(file_name),
                _ => None,
            })
            .collect()
    }

    pub fn container_info(&self, chat: ChatId) -> Option<ContainerInfo> {
        self.lock().containers.get(&chat).cloned()
    }
}

#[async_trait]
impl RemoteContent for MockRemote {
    async fn resolve(&self, identifier: &str) -> Result<ChatId, RemoteError> {
        let st = self.lock();
        let id = match st.aliases.get(identifier) {
            Some(id) => *id,
            None => identifier
                .parse::<ChatId>()
                .map_err(|_| RemoteError::NotFound(identifier.to_string()))?,
        };
        st.require_container(id)?;
        Ok(id)
    }

    async fn container(&self, chat: ChatId) -> Result<ContainerInfo, RemoteError> {
        self.lock()
            .containers
            .get(&chat)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("chat {chat}")))
    }

    async fn latest_item(&self, chat: ChatId) -> Result<Option<RemoteItem>, RemoteError> {
        let st = self.lock();
        st.require_container(chat)?;
        Ok(st
            .items
            .get(&chat)
            .and_then(|items| items.values().next_back().cloned()))
    }

    async fn item(&self, chat: ChatId, id: ItemId) -> Result<Option<RemoteItem>, RemoteError> {
        let st = self.lock();
        st.require_container(chat)?;
        Ok(st.items.get(&chat).and_then(|items| items.get(&id).cloned()))
    }

    async fn count_videos(&self, chat: ChatId) -> Result<u64, RemoteError> {
        let st = self.lock();
        st.require_container(chat)?;
        Ok(st
            .items
            .get(&chat)
            .map_or(0, |items| items.values().filter(|i| i.content.is_video()).count()) as u64)
    }

    async fn list_chats(&self) -> Result<Vec<ChatSummary>, RemoteError> {
        let mut chats: Vec<ChatSummary> = self
            .lock()
            .containers
            .values()
            .map(|c| ChatSummary {
                id: c.id,
                title: c.title.clone(),
                kind: "channel".to_string(),
            })
            .collect();
        chats.sort_by_key(|c| c.id);
        Ok(chats)
    }

    async fn list_topics(&self, chat: ChatId) -> Result<Vec<Topic>, RemoteError> {
        let st = self.lock();
        st.require_container(chat)?;
        Ok(st.topics.get(&chat).cloned().unwrap_or_default())
    }

    async fn relay(
        &self,
        from: ChatId,
        item: ItemId,
        to: RelayTarget,
    ) -> Result<Option<ItemId>, RemoteError> {
        let mut st = self.lock();
        st.calls.push(Call::Relay { from, item, to });
        if to == RelayTarget::Scratch {
            if let Some(fault) = st.probe_fault {
                return Err(fault.to_error());
            }
        }
        if st.relay_restricted.contains(&from) {
            return Err(RemoteError::RelayRestricted(format!("chat {from}")));
        }
        // Probes leave scripted item faults for the replay itself.
        if to == RelayTarget::Scratch {
            return Ok(None);
        }
        if let Some(err) = st.take_fault(item) {
            return Err(err);
        }
        let original = st
            .items
            .get(&from)
            .and_then(|items| items.get(&item).cloned())
            .ok_or_else(|| RemoteError::NotFound(format!("item {item}")))?;
        let RelayTarget::Chat(dest) = to else {
            return Ok(None);
        };
        st.require_container(dest)?;
        st.delivered.push((dest, item));
        Ok(Some(st.push_item(dest, original.content, original.caption)))
    }

    async fn download(&self, item: &RemoteItem, dest: &Path) -> Result<PathBuf, RemoteError> {
        {
            let mut st = self.lock();
            st.calls.push(Call::Download { item: item.id });
            if let Some(err) = st.take_fault(item.id) {
                return Err(err);
            }
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, format!("payload {}", item.id)).await?;
        Ok(dest.to_path_buf())
    }

    async fn upload(
        &self,
        chat: ChatId,
        path: &Path,
        kind: UploadKind,
        caption: Option<&str>,
    ) -> Result<ItemId, RemoteError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut st = self.lock();
        st.calls.push(Call::Upload {
            chat,
            file_name: file_name.clone(),
            kind,
            caption: caption.map(String::from),
        });
        st.require_container(chat)?;
        if st.broken_uploads.contains(&file_name) {
            return Err(Fault::Fatal.to_error());
        }
        if !path.exists() {
            return Err(RemoteError::Io(std::io::Error::from(
                std::io::ErrorKind::NotFound,
            )));
        }
        let media = MediaRef {
            file_id: file_name.clone(),
            file_name: Some(file_name),
            size: None,
        };
        let content = match kind {
            UploadKind::Document => ItemContent::Document(media),
            UploadKind::Video => ItemContent::Video(media),
            UploadKind::Photo => ItemContent::Photo(media),
            UploadKind::Audio => ItemContent::Audio(media),
        };
        Ok(st.push_item(chat, content, caption.map(String::from)))
    }

    async fn create_container(
        &self,
        title: &str,
        description: &str,
    ) -> Result<ChatId, RemoteError> {
        let mut st = self.lock();
        st.calls.push(Call::CreateContainer {
            title: title.to_string(),
            description: description.to_string(),
        });
        let id = -1_000_000_000_000 - st.next_id();
        st.containers.insert(
            id,
            ContainerInfo {
                id,
                title: title.to_string(),
                description: Some(description.to_string()),
                pinned_item: None,
            },
        );
        st.items.entry(id).or_default();
        Ok(id)
    }

    async fn set_description(&self, chat: ChatId, description: &str) -> Result<(), RemoteError> {
        let mut st = self.lock();
        st.calls.push(Call::SetDescription {
            chat,
            description: description.to_string(),
        });
        let info = st
            .containers
            .get_mut(&chat)
            .ok_or_else(|| RemoteError::NotFound(format!("chat {chat}")))?;
        info.description = Some(description.to_string());
        Ok(())
    }

    async fn export_invite_link(&self, chat: ChatId) -> Result<String, RemoteError> {
        let st = self.lock();
        if st.invite_link_fails {
            return Err(Fault::Fatal.to_error());
        }
        st.require_container(chat)?;
        Ok(format!("https://t.me/+mock{}", chat.unsigned_abs()))
    }

    async fn post_text(
        &self,
        chat: ChatId,
        text: &str,
        reply_to: Option<ItemId>,
    ) -> Result<ItemId, RemoteError> {
        let mut st = self.lock();
        st.calls.push(Call::PostText {
            chat,
            text: text.to_string(),
            reply_to,
        });
        st.require_container(chat)?;
        Ok(st.push_item(chat, ItemContent::Text(text.to_string()), None))
    }

    async fn pin(&self, chat: ChatId, item: ItemId) -> Result<(), RemoteError> {
        let mut st = self.lock();
        st.calls.push(Call::Pin { chat, item });
        if st.pin_fails {
            return Err(Fault::Fatal.to_error());
        }
        let info = st
            .containers
            .get_mut(&chat)
            .ok_or_else(|| RemoteError::NotFound(format!("chat {chat}")))?;
        info.pinned_item = Some(item);
        Ok(())
    }

    async fn leave(&self, chat: ChatId) -> Result<(), RemoteError> {
        self.lock().calls.push(Call::Leave { chat });
        Ok(())
    }
}

/// Calls observed by [`MockMedia`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MediaCall {
    Compress { source: PathBuf },
    Inventory { source: PathBuf },
    Reencode { input: PathBuf, output: PathBuf },
    CorrectDuration { path: PathBuf },
    Split { input: PathBuf, max_bytes: u64 },
    Join { inputs: Vec<PathBuf>, output: PathBuf },
    Probe { path: PathBuf },
    ExtractAudio { video: PathBuf, output: PathBuf },
}

struct MediaState {
    inventory: Vec<VideoEntry>,
    archive_volumes: usize,
    split_parts: usize,
    probed: Duration,
    fail_inventory: bool,
    fail_reencode: bool,
    fail_extract_audio: bool,
    calls: Vec<MediaCall>,
}

/// Scriptable [`MediaTransform`] that writes small placeholder files.
pub(crate) struct MockMedia {
    state: Mutex<MediaState>,
}

impl Default for MockMedia {
    fn default() -> Self {
        Self {
            state: Mutex::new(MediaState {
                inventory: Vec::new(),
                archive_volumes: 1,
                split_parts: 2,
                probed: Duration::from_secs(60),
                fail_inventory: false,
                fail_reencode: false,
                fail_extract_audio: false,
                calls: Vec::new(),
            }),
        }
    }
}

impl MockMedia {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MediaState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_inventory(&self, entries: Vec<VideoEntry>) {
        self.lock().inventory = entries;
    }

    pub fn set_archive_volumes(&self, n: usize) {
        self.lock().archive_volumes = n;
    }

    pub fn set_probed_duration(&self, d: Duration) {
        self.lock().probed = d;
    }

    pub fn fail_inventory(&self) {
        self.lock().fail_inventory = true;
    }

    pub fn fail_reencode(&self) {
        self.lock().fail_reencode = true;
    }

    pub fn fail_extract_audio(&self) {
        self.lock().fail_extract_audio = true;
    }

    pub fn calls(&self) -> Vec<MediaCall> {
        self.lock().calls.clone()
    }
}

async fn touch(path: &Path) -> Result<(), MediaError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, b"media").await?;
    Ok(())
}

fn tool_failure(tool: &str) -> MediaError {
    MediaError::ToolFailed {
        tool: tool.to_string(),
        status: Some(1),
        stderr: "scripted failure".into(),
    }
}

#[async_trait]
impl MediaTransform for MockMedia {
    async fn compress_directory(
        &self,
        source: &Path,
        output_dir: &Path,
        _volume_limit_bytes: u64,
        _exclude_extensions: &[String],
    ) -> Result<Vec<PathBuf>, MediaError> {
        let volumes = {
            let mut st = self.lock();
            st.calls.push(MediaCall::Compress {
                source: source.to_path_buf(),
            });
            st.archive_volumes
        };
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive".into());
        let mut out = Vec::with_capacity(volumes);
        for n in 1..=volumes {
            let path = output_dir.join(format!("{name}.zip.{n:03}"));
            touch(&path).await?;
            out.push(path);
        }
        Ok(out)
    }

    async fn inventory(
        &self,
        source: &Path,
        _video_extensions: &[String],
    ) -> Result<Vec<VideoEntry>, MediaError> {
        let mut st = self.lock();
        st.calls.push(MediaCall::Inventory {
            source: source.to_path_buf(),
        });
        if st.fail_inventory {
            return Err(tool_failure("ffprobe"));
        }
        Ok(st.inventory.clone())
    }

    async fn reencode(&self, input: &Path, output: &Path) -> Result<(), MediaError> {
        let fail = {
            let mut st = self.lock();
            st.calls.push(MediaCall::Reencode {
                input: input.to_path_buf(),
                output: output.to_path_buf(),
            });
            st.fail_reencode
        };
        if fail {
            return Err(tool_failure("ffmpeg"));
        }
        touch(output).await
    }

    async fn correct_duration(&self, path: &Path) -> Result<(), MediaError> {
        self.lock().calls.push(MediaCall::CorrectDuration {
            path: path.to_path_buf(),
        });
        Ok(())
    }

    async fn split(
        &self,
        input: &Path,
        output_dir: &Path,
        max_bytes: u64,
    ) -> Result<Vec<PathBuf>, MediaError> {
        let parts = {
            let mut st = self.lock();
            st.calls.push(MediaCall::Split {
                input: input.to_path_buf(),
                max_bytes,
            });
            st.split_parts
        };
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = input
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mp4".into());
        let mut out = Vec::with_capacity(parts);
        for n in 0..parts {
            let path = output_dir.join(format!("{stem}_part{n:02}.{ext}"));
            touch(&path).await?;
            out.push(path);
        }
        Ok(out)
    }

    async fn join(&self, inputs: &[PathBuf], output: &Path) -> Result<(), MediaError> {
        self.lock().calls.push(MediaCall::Join {
            inputs: inputs.to_vec(),
            output: output.to_path_buf(),
        });
        touch(output).await
    }

    async fn probe_duration(&self, path: &Path) -> Result<Duration, MediaError> {
        let mut st = self.lock();
        st.calls.push(MediaCall::Probe {
            path: path.to_path_buf(),
        });
        Ok(st.probed)
    }

    async fn extract_audio(&self, video: &Path, output: &Path) -> Result<PathBuf, MediaError> {
        let fail = {
            let mut st = self.lock();
            st.calls.push(MediaCall::ExtractAudio {
                video: video.to_path_buf(),
                output: output.to_path_buf(),
            });
            st.fail_extract_audio
        };
        if fail {
            return Err(tool_failure("ffmpeg"));
        }
        touch(output).await?;
        Ok(output.to_path_buf())
    }
}

/// Inventory row for a video at `path` with the given size.
pub(crate) fn video_entry(order: usize, path: &Path, folder: &str, size_bytes: u64) -> VideoEntry {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    VideoEntry {
        order,
        path: path.to_path_buf(),
        folder: folder.to_string(),
        file_name,
        duration_secs: 60.0,
        size_bytes,
        codec: "h264".into(),
        needs_reencode: false,
        group: folder.to_string(),
    }
}

/// [`CheckpointStore`] over SQLite that records every download update.
pub(crate) struct RecordingStore {
    inner: SqliteCheckpointStore,
    download_updates: Mutex<Vec<DownloadUpdate>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteCheckpointStore::open_in_memory().unwrap(),
            download_updates: Mutex::new(Vec::new()),
        }
    }

    pub fn download_updates(&self) -> Vec<DownloadUpdate> {
        self.download_updates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl CheckpointStore for RecordingStore {
    async fn get_transfer(&self, source_id: ChatId) -> Result<Option<TransferTask>, StateError> {
        self.inner.get_transfer(source_id).await
    }

    async fn create_transfer(&self, task: &TransferTask) -> Result<TransferTask, StateError> {
        self.inner.create_transfer(task).await
    }

    async fn update_transfer(
        &self,
        source_id: ChatId,
        update: TransferUpdate,
    ) -> Result<(), StateError> {
        self.inner.update_transfer(source_id, update).await
    }

    async fn delete_transfer(&self, source_id: ChatId) -> Result<(), StateError> {
        self.inner.delete_transfer(source_id).await
    }

    async fn list_transfers(&self) -> Result<Vec<TransferTask>, StateError> {
        self.inner.list_transfers().await
    }

    async fn get_download(&self, source_id: ChatId) -> Result<Option<DownloadTask>, StateError> {
        self.inner.get_download(source_id).await
    }

    async fn create_download(&self, task: &DownloadTask) -> Result<DownloadTask, StateError> {
        self.inner.create_download(task).await
    }

    async fn update_download(
        &self,
        source_id: ChatId,
        update: DownloadUpdate,
    ) -> Result<(), StateError> {
        self.download_updates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(update.clone());
        self.inner.update_download(source_id, update).await
    }

    async fn delete_download(&self, source_id: ChatId) -> Result<(), StateError> {
        self.inner.delete_download(source_id).await
    }

    async fn list_downloads(&self) -> Result<Vec<DownloadTask>, StateError> {
        self.inner.list_downloads().await
    }

    async fn get_pipeline(&self, project: &Path) -> Result<Option<PipelineTask>, StateError> {
        self.inner.get_pipeline(project).await
    }

    async fn create_pipeline(&self, task: &PipelineTask) -> Result<PipelineTask, StateError> {
        self.inner.create_pipeline(task).await
    }

    async fn update_pipeline(
        &self,
        project: &Path,
        update: PipelineUpdate,
    ) -> Result<(), StateError> {
        self.inner.update_pipeline(project, update).await
    }

    async fn delete_pipeline(&self, project: &Path) -> Result<(), StateError> {
        self.inner.delete_pipeline(project).await
    }

    async fn list_pipelines(&self) -> Result<Vec<PipelineTask>, StateError> {
        self.inner.list_pipelines().await
    }
}

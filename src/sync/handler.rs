use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::media::MediaTransform;
use crate::remote::{ItemContent, RelayTarget, RemoteContent, RemoteError, RemoteItem, UploadKind};
use crate::state::TransferStrategy;
use crate::types::{ChatId, ItemId};

/// Moves one item from source to destination with the job's strategy.
pub(crate) struct ItemHandler {
    remote: Arc<dyn RemoteContent>,
    media: Arc<dyn MediaTransform>,
    staging_dir: PathBuf,
    extract_audio: bool,
}

impl ItemHandler {
    pub fn new(
        remote: Arc<dyn RemoteContent>,
        media: Arc<dyn MediaTransform>,
        staging_dir: PathBuf,
        extract_audio: bool,
    ) -> Self {
        Self {
            remote,
            media,
            staging_dir,
            extract_audio,
        }
    }

    /// Replay `item` into `dest`. Returns the new item's id when the service
    /// reports one.
    pub async fn handle(
        &self,
        strategy: TransferStrategy,
        source: ChatId,
        dest: ChatId,
        item: &RemoteItem,
    ) -> Result<Option<ItemId>, RemoteError> {
        match strategy {
            TransferStrategy::Direct => {
                self.remote
                    .relay(source, item.id, RelayTarget::Chat(dest))
                    .await
            }
            TransferStrategy::StageAndRelay | TransferStrategy::Unknown => {
                self.stage_and_relay(dest, item).await
            }
        }
    }

    async fn stage_and_relay(
        &self,
        dest: ChatId,
        item: &RemoteItem,
    ) -> Result<Option<ItemId>, RemoteError> {
        let kind = match &item.content {
            ItemContent::Empty | ItemContent::Service => return Ok(None),
            ItemContent::Text(text) => {
                return self.remote.post_text(dest, text, None).await.map(Some);
            }
            ItemContent::Poll { question, options } => {
                let text = format_poll(question, options);
                return self.remote.post_text(dest, &text, None).await.map(Some);
            }
            ItemContent::Photo(_) => UploadKind::Photo,
            ItemContent::Video(_) | ItemContent::Animation(_) | ItemContent::VideoNote(_) => {
                UploadKind::Video
            }
            ItemContent::Audio(_) | ItemContent::Voice(_) => UploadKind::Audio,
            ItemContent::Document(_) | ItemContent::Sticker(_) => UploadKind::Document,
        };
        self.stage_media(dest, item, kind).await.map(Some)
    }

    /// Download, optionally pull the audio track, upload, then drop the local
    /// copy whatever the upload outcome.
    async fn stage_media(
        &self,
        dest: ChatId,
        item: &RemoteItem,
        kind: UploadKind,
    ) -> Result<ItemId, RemoteError> {
        tokio::fs::create_dir_all(&self.staging_dir).await?;
        let target = self.staging_dir.join(item.staged_file_name());
        let local = self.remote.download(item, &target).await?;
        tracing::debug!("Staged item {} at {}", item.id, local.display());

        if self.extract_audio && item.content.is_video() {
            let mp3 = local.with_extension("mp3");
            match self.media.extract_audio(&local, &mp3).await {
                Ok(path) => tracing::info!("Extracted audio to {}", path.display()),
                Err(e) => tracing::warn!("Audio extraction failed for item {}: {}", item.id, e),
            }
        }

        let uploaded = self
            .remote
            .upload(dest, &local, kind, item.caption.as_deref())
            .await;
        discard(&local).await;
        uploaded
    }
}

async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Could not remove staged file {}: {}", path.display(), e),
    }
}

fn format_poll(question: &str, options: &[String]) -> String {
    let mut text = format!("📊 {question}");
    for option in options {
        text.push_str("\n- ");
        text.push_str(option);
    }
    text
}

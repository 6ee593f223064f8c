//! Post-processing after replay. Every sub-step is guarded on its own: a
//! failure is logged and counted, never propagated.

use std::collections::HashMap;
use std::path::Path;

use tokio::io::AsyncWriteExt;

use super::{PublishTarget, SyncEngine};
use crate::retry;
use crate::types::{ChatId, ItemId};

impl SyncEngine {
    /// Returns the number of sub-steps that failed.
    pub(super) async fn post_process(
        &self,
        source: ChatId,
        title: &str,
        dest: ChatId,
        mapping: &HashMap<ItemId, ItemId>,
    ) -> usize {
        let mut failures = 0;

        let link = match retry::execute(&self.policy, || self.remote.export_invite_link(dest)).await
        {
            Ok(link) => link,
            Err(e) => {
                let link = derived_link(dest);
                tracing::warn!("Could not export invite link, recording {}: {}", link, e);
                link
            }
        };

        if let Err(e) = append_link_record(&self.options.links_file, title, &link).await {
            tracing::warn!(
                "Could not write link record to {}: {}",
                self.options.links_file.display(),
                e
            );
            failures += 1;
        }

        if let Some(PublishTarget { chat, topic }) = self.options.publish_link_to {
            let text = format!("{title}\n{link}");
            match retry::execute(&self.policy, || self.remote.post_text(chat, &text, topic)).await {
                Ok(_) => tracing::info!("Posted destination link to {}", chat),
                Err(e) => {
                    tracing::warn!("Could not post link to {}: {}", chat, e);
                    failures += 1;
                }
            }
        }

        if !mapping.is_empty() {
            if let Err(e) = self.mirror_pin(source, dest, mapping).await {
                tracing::warn!("Could not mirror pinned item: {}", e);
                failures += 1;
            }
        }

        if self.options.leave_source {
            match retry::execute(&self.policy, || self.remote.leave(source)).await {
                Ok(()) => tracing::info!("Left source {}", source),
                Err(e) => {
                    tracing::warn!("Could not leave source {}: {}", source, e);
                    failures += 1;
                }
            }
        }

        failures
    }

    async fn mirror_pin(
        &self,
        source: ChatId,
        dest: ChatId,
        mapping: &HashMap<ItemId, ItemId>,
    ) -> Result<(), crate::remote::RemoteError> {
        let info = retry::execute(&self.policy, || self.remote.container(source)).await?;
        let Some(pinned) = info.pinned_item else {
            return Ok(());
        };
        let Some(&target) = mapping.get(&pinned) else {
            tracing::debug!("Pinned item {} was not replayed in this run", pinned);
            return Ok(());
        };
        retry::execute(&self.policy, || self.remote.pin(dest, target)).await?;
        tracing::info!("Pinned item {} (source item {})", target, pinned);
        Ok(())
    }
}

/// Fallback link for a container whose invite link cannot be exported.
pub(crate) fn derived_link(chat: ChatId) -> String {
    let id = chat.to_string();
    let bare = id
        .strip_prefix("-100")
        .map(str::to_string)
        .unwrap_or_else(|| chat.unsigned_abs().to_string());
    format!("https://t.me/c/{bare}/1")
}

async fn append_link_record(path: &Path, title: &str, link: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(format!("{title}\n{link}\n\n").as_bytes())
        .await?;
    file.flush().await
}

use super::manifest::{self, ManifestEntry};
use super::{report, PipelineError, PipelineOrchestrator, WorkLayout};
use crate::media::VideoEntry;
use crate::progress::{create_progress_bar, format_clock, format_size};
use crate::remote::UploadKind;
use crate::retry;
use crate::state::{PipelineTask, PipelineUpdate};
use crate::types::ChatId;

impl PipelineOrchestrator {
    /// Upload the manifest in order, resuming after the task's last-artifact
    /// marker, then upload and pin the summary.
    pub(super) async fn publish(
        &self,
        task: &mut PipelineTask,
        layout: &WorkLayout,
    ) -> Result<(), PipelineError> {
        let manifest: Vec<ManifestEntry> = report::read_rows(&layout.upload_plan_csv())?;
        let summary = layout.summary_txt();
        if !summary.exists() {
            return Err(PipelineError::MissingArtifact(summary));
        }
        let dest = self.ensure_destination(task, layout).await?;

        let summary_done = task.last_artifact.as_deref() == Some(summary.as_path());
        let start = match &task.last_artifact {
            None => 0,
            Some(_) if summary_done => manifest.len(),
            Some(marker) => match manifest.iter().position(|e| &e.path == marker) {
                Some(i) => {
                    tracing::info!("Resuming upload after {}", marker.display());
                    i + 1
                }
                None => {
                    tracing::warn!(
                        "Resume marker {} is not in the upload plan, starting from the top",
                        marker.display()
                    );
                    0
                }
            },
        };

        let pending = &manifest[start..];
        let pb = create_progress_bar(
            self.options.no_progress_bar,
            "publish",
            pending.len() as u64,
        );
        for entry in pending {
            pb.set_message(entry.caption.lines().next().unwrap_or_default().to_string());
            retry::execute(&self.remote_policy, || {
                self.remote.upload(
                    dest,
                    &entry.path,
                    entry.kind.upload_kind(),
                    Some(&entry.caption),
                )
            })
            .await?;
            self.persist(task, PipelineUpdate::LastArtifact(Some(entry.path.clone())))
                .await?;
            pb.inc(1);
        }
        pb.finish_and_clear();

        if summary_done {
            tracing::info!("Summary already published");
            return Ok(());
        }
        let caption = task.project_name.clone();
        let summary_id = retry::execute(&self.remote_policy, || {
            self.remote
                .upload(dest, &summary, UploadKind::Document, Some(&caption))
        })
        .await?;
        self.persist(task, PipelineUpdate::LastArtifact(Some(summary.clone())))
            .await?;
        if let Err(e) = retry::execute(&self.remote_policy, || self.remote.pin(dest, summary_id)).await
        {
            tracing::warn!("Could not pin summary: {}", e);
        }
        tracing::info!("Published {} file(s) to {}", pending.len() + 1, dest);
        Ok(())
    }

    /// The recorded destination, the configured one, or a new container
    /// titled after the project with a size and duration header.
    async fn ensure_destination(
        &self,
        task: &mut PipelineTask,
        layout: &WorkLayout,
    ) -> Result<ChatId, PipelineError> {
        if let Some(dest) = task.destination_id {
            return Ok(dest);
        }

        let dest = match &self.options.destination {
            Some(identifier) => {
                retry::execute(&self.remote_policy, || self.remote.resolve(identifier)).await?
            }
            None => {
                let videos: Vec<VideoEntry> = report::read_rows(&layout.finalized_csv())?;
                let (size, duration) = manifest::totals(&videos);
                let title = match &self.options.title_prefix {
                    Some(prefix) => format!("{} {}", prefix, task.project_name),
                    None => task.project_name.clone(),
                };
                let header = format!(
                    "{}\nTotal size: {}\nTotal duration: {}",
                    task.project_name,
                    format_size(size),
                    format_clock(duration)
                );
                let dest = retry::execute(&self.remote_policy, || {
                    self.remote.create_container(&title, &header)
                })
                .await?;
                tracing::info!("Created destination \"{}\" ({})", title, dest);

                match retry::execute(&self.remote_policy, || self.remote.export_invite_link(dest))
                    .await
                {
                    Ok(link) => {
                        let description = format!("{header}\n\n{link}");
                        if let Err(e) = retry::execute(&self.remote_policy, || {
                            self.remote.set_description(dest, &description)
                        })
                        .await
                        {
                            tracing::warn!("Could not add invite link to description: {}", e);
                        }
                    }
                    Err(e) => tracing::warn!("Could not export invite link: {}", e),
                }
                dest
            }
        };
        self.persist(task, PipelineUpdate::DestinationId(Some(dest)))
            .await?;
        Ok(dest)
    }
}

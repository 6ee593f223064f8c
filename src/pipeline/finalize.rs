use std::path::{Path, PathBuf};

use super::{remove_dir_if_exists, report, PipelineError, PipelineOrchestrator, WorkLayout};
use crate::media::VideoEntry;
use crate::retry;
use crate::types::FinalizePlan;

impl PipelineOrchestrator {
    /// Turn transformed videos into the upload-ready set in `final/` and
    /// record it in `finalized.csv`. Prior output of this step is cleared
    /// first so a re-run never mixes stale parts with fresh ones.
    pub(super) async fn finalize(&self, layout: &WorkLayout) -> Result<(), PipelineError> {
        let entries: Vec<VideoEntry> = report::read_rows(&layout.report_csv())?;

        for dir in [layout.split_dir(), layout.final_dir()] {
            remove_dir_if_exists(&dir).await?;
            tokio::fs::create_dir_all(&dir).await?;
        }
        match tokio::fs::remove_file(layout.finalized_csv()).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        let mut finalized = match self.options.plan {
            FinalizePlan::Single => self.finalize_single(&entries, layout).await?,
            FinalizePlan::Group => self.finalize_groups(&entries, layout).await?,
        };
        for (i, entry) in finalized.iter_mut().enumerate() {
            entry.order = i + 1;
        }
        report::write_rows(&layout.finalized_csv(), &finalized)?;
        tracing::info!(
            "Finalized {} video(s) into {} artifact(s)",
            entries.len(),
            finalized.len()
        );
        Ok(())
    }

    /// Per video: split parts, else the re-encoded copy, else the original.
    async fn finalize_single(
        &self,
        entries: &[VideoEntry],
        layout: &WorkLayout,
    ) -> Result<Vec<VideoEntry>, PipelineError> {
        let mut out = Vec::new();
        for entry in entries {
            let source = layout.transformed_source(entry);
            let unit = Unit {
                order: entry.order,
                stem: entry.stem().to_string(),
                source,
                duration_secs: entry.duration_secs,
                template: entry,
            };
            out.extend(self.finalize_unit(layout, unit).await?);
        }
        Ok(out)
    }

    /// Join each group's videos in report order, then split if oversized.
    async fn finalize_groups(
        &self,
        entries: &[VideoEntry],
        layout: &WorkLayout,
    ) -> Result<Vec<VideoEntry>, PipelineError> {
        let mut groups: Vec<(&str, Vec<&VideoEntry>)> = Vec::new();
        for entry in entries {
            match groups.iter_mut().find(|(g, _)| *g == entry.group) {
                Some((_, members)) => members.push(entry),
                None => groups.push((entry.group.as_str(), vec![entry])),
            }
        }

        let mut out = Vec::new();
        for (n, (group, members)) in groups.into_iter().enumerate() {
            let order = n + 1;
            let stem = group_stem(group);
            let sources: Vec<PathBuf> = members
                .iter()
                .map(|e| layout.transformed_source(e))
                .collect();
            let source = if let [only] = sources.as_slice() {
                only.clone()
            } else {
                let joined = layout.split_dir().join(format!("{order:03}_{stem}.mp4"));
                tracing::info!("Joining {} video(s) of group {}", sources.len(), stem);
                retry::execute(&self.local_policy, || self.media.join(&sources, &joined)).await?;
                joined
            };
            let unit = Unit {
                order,
                stem,
                source,
                duration_secs: members.iter().map(|e| e.duration_secs).sum(),
                template: members[0],
            };
            out.extend(self.finalize_unit(layout, unit).await?);
        }
        Ok(out)
    }

    /// Split `unit.source` when it exceeds the size limit, then materialize
    /// every resulting file into `final/`.
    async fn finalize_unit(
        &self,
        layout: &WorkLayout,
        unit: Unit<'_>,
    ) -> Result<Vec<VideoEntry>, PipelineError> {
        let limit = self.options.file_size_limit_bytes;
        let size = tokio::fs::metadata(&unit.source).await?.len();

        if size <= limit {
            let display = format!("{}.{}", unit.stem, extension_of(&unit.source));
            let path = materialize(&unit.source, layout, unit.order, &display).await?;
            return Ok(vec![unit.entry(path, display, unit.duration_secs).await?]);
        }

        let split_dir = layout
            .split_dir()
            .join(format!("{:03}_{}", unit.order, unit.stem));
        tracing::info!(
            "Splitting {} ({} bytes, limit {})",
            unit.source.display(),
            size,
            limit
        );
        let parts = retry::execute(&self.local_policy, || {
            self.media.split(&unit.source, &split_dir, limit)
        })
        .await?;

        let mut out = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let display = format!("{}_part{:02}.{}", unit.stem, i, extension_of(part));
            let duration = retry::execute(&self.local_policy, || self.media.probe_duration(part))
                .await?;
            let path = materialize(part, layout, unit.order, &display).await?;
            out.push(unit.entry(path, display, duration.as_secs_f64()).await?);
        }
        Ok(out)
    }
}

/// One finalize input: a single video, or a joined group.
struct Unit<'a> {
    order: usize,
    stem: String,
    source: PathBuf,
    duration_secs: f64,
    template: &'a VideoEntry,
}

impl Unit<'_> {
    async fn entry(
        &self,
        path: PathBuf,
        file_name: String,
        duration_secs: f64,
    ) -> Result<VideoEntry, PipelineError> {
        let size_bytes = tokio::fs::metadata(&path).await?.len();
        Ok(VideoEntry {
            order: self.order,
            path,
            folder: self.template.folder.clone(),
            file_name,
            duration_secs,
            size_bytes,
            codec: self.template.codec.clone(),
            needs_reencode: false,
            group: self.template.group.clone(),
        })
    }
}

/// Place `artifact` in `final/` as `<order>_<display>`, hard-linking when
/// possible.
async fn materialize(
    artifact: &Path,
    layout: &WorkLayout,
    order: usize,
    display: &str,
) -> Result<PathBuf, PipelineError> {
    let target = layout.final_dir().join(format!("{order:03}_{display}"));
    if tokio::fs::hard_link(artifact, &target).await.is_err() {
        tokio::fs::copy(artifact, &target).await?;
    }
    Ok(target)
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mp4".to_string())
}

fn group_stem(group: &str) -> String {
    if group.is_empty() {
        "videos".to_string()
    } else {
        group.replace('/', "_")
    }
}

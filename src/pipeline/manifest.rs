//! The annotate step: derive the upload manifest and the summary document.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{list_files, report, PipelineError, PipelineOptions, PipelineOrchestrator, WorkLayout};
use crate::media::VideoEntry;
use crate::progress::{format_clock, format_size};
use crate::remote::UploadKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestKind {
    Archive,
    Video,
}

impl ManifestKind {
    pub fn upload_kind(&self) -> UploadKind {
        match self {
            ManifestKind::Archive => UploadKind::Document,
            ManifestKind::Video => UploadKind::Video,
        }
    }
}

/// One row of `upload_plan.csv`: a file to upload, in order, with its caption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub order: usize,
    pub kind: ManifestKind,
    pub path: PathBuf,
    pub caption: String,
}

impl PipelineOrchestrator {
    pub(super) async fn annotate(
        &self,
        project_name: &str,
        layout: &WorkLayout,
    ) -> Result<(), PipelineError> {
        let archives = list_files(&layout.archives_dir(), &[]).await?;
        let videos: Vec<VideoEntry> = report::read_rows(&layout.finalized_csv())?;

        let manifest = build_manifest(&archives, &videos, &self.options);
        report::write_rows(&layout.upload_plan_csv(), &manifest)?;

        let summary = render_summary(project_name, &manifest, &videos);
        tokio::fs::write(layout.summary_txt(), summary).await?;
        tracing::info!(
            "Upload plan has {} archive(s) and {} video(s)",
            archives.len(),
            videos.len()
        );
        Ok(())
    }
}

/// Archives first, then videos in report order, numbered from
/// `start_index`, each caption carrying its folder path.
pub(crate) fn build_manifest(
    archives: &[PathBuf],
    videos: &[VideoEntry],
    options: &PipelineOptions,
) -> Vec<ManifestEntry> {
    let mut manifest = Vec::with_capacity(archives.len() + videos.len());

    for (i, path) in archives.iter().enumerate() {
        manifest.push(ManifestEntry {
            order: manifest.len() + 1,
            kind: ManifestKind::Archive,
            path: path.clone(),
            caption: format!(
                "#{} {} ({}/{})",
                options.document_hashtag,
                options.document_title,
                i + 1,
                archives.len()
            ),
        });
    }

    for (i, video) in videos.iter().enumerate() {
        let index = options.start_index as usize + i;
        let title = Path::new(&video.file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| video.file_name.clone());
        let mut caption = format!("#{}{:03} {}", options.hashtag_index, index, title);
        if !video.folder.is_empty() {
            caption.push('\n');
            caption.push_str(&video.folder.split('/').collect::<Vec<_>>().join(" > "));
        }
        manifest.push(ManifestEntry {
            order: manifest.len() + 1,
            kind: ManifestKind::Video,
            path: video.path.clone(),
            caption,
        });
    }
    manifest
}

/// Total size and duration of finalized videos.
pub(crate) fn totals(videos: &[VideoEntry]) -> (u64, Duration) {
    let size = videos.iter().map(|v| v.size_bytes).sum();
    let secs: f64 = videos.iter().map(|v| v.duration_secs.max(0.0)).sum();
    (size, Duration::from_secs_f64(secs))
}

fn render_summary(project_name: &str, manifest: &[ManifestEntry], videos: &[VideoEntry]) -> String {
    let (size, duration) = totals(videos);
    let archives = manifest
        .iter()
        .filter(|e| e.kind == ManifestKind::Archive)
        .count();

    let mut out = String::new();
    let _ = writeln!(out, "{project_name}");
    let _ = writeln!(out);
    let _ = writeln!(out, "Videos: {}", videos.len());
    let _ = writeln!(out, "Total size: {}", format_size(size));
    let _ = writeln!(out, "Total duration: {}", format_clock(duration));
    let _ = writeln!(out, "Archives: {archives}");

    let mut folder: Option<&str> = None;
    let video_entries = manifest.iter().filter(|e| e.kind == ManifestKind::Video);
    for (entry, video) in video_entries.zip(videos) {
        if folder != Some(video.folder.as_str()) {
            folder = Some(video.folder.as_str());
            let _ = writeln!(out);
            let heading = if video.folder.is_empty() {
                "/"
            } else {
                video.folder.as_str()
            };
            let _ = writeln!(out, "{heading}");
        }
        let headline = entry.caption.lines().next().unwrap_or_default();
        let _ = writeln!(
            out,
            "  {} ({})",
            headline,
            format_clock(Duration::from_secs_f64(video.duration_secs.max(0.0)))
        );
    }
    out
}

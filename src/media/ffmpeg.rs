//! Subprocess adapter over `ffmpeg`, `ffprobe` and `7z`.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use walkdir::WalkDir;

use super::{has_extension, MediaError, MediaTransform, VideoEntry};

/// Stderr kept in error messages.
const STDERR_TAIL: usize = 600;

#[derive(Debug, Clone)]
pub struct FfmpegTransform {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    sevenzip: PathBuf,
}

impl Default for FfmpegTransform {
    fn default() -> Self {
        Self::new(
            PathBuf::from("ffmpeg"),
            PathBuf::from("ffprobe"),
            PathBuf::from("7z"),
        )
    }
}

impl FfmpegTransform {
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf, sevenzip: PathBuf) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            sevenzip,
        }
    }

    fn command(&self, program: &Path) -> Command {
        let mut cmd = Command::new(program);
        cmd.kill_on_drop(true);
        cmd
    }

    async fn run(&self, mut cmd: Command) -> Result<Output, MediaError> {
        let tool = cmd.as_std().get_program().to_string_lossy().into_owned();
        tracing::debug!(command = ?cmd.as_std(), "Running media tool");
        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MediaError::MissingTool { tool: tool.clone() }
            } else {
                MediaError::Io(e)
            }
        })?;
        if !output.status.success() {
            return Err(MediaError::ToolFailed {
                tool,
                status: output.status.code(),
                stderr: stderr_tail(&output.stderr),
            });
        }
        Ok(output)
    }

    async fn probe(&self, path: &Path) -> Result<ProbeOutput, MediaError> {
        let mut cmd = self.command(&self.ffprobe);
        cmd.args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path);
        let output = self.run(cmd).await?;
        parse_probe(&output.stdout)
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let start = text
        .char_indices()
        .rev()
        .nth(STDERR_TAIL)
        .map_or(0, |(i, _)| i);
    text[start..].to_string()
}

#[derive(Debug, Default, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    size: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_type: String,
    #[serde(default)]
    codec_name: String,
}

impl ProbeOutput {
    fn duration_secs(&self) -> f64 {
        self.format
            .duration
            .as_deref()
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0)
            .unwrap_or(0.0)
    }

    fn video_codec(&self) -> &str {
        self.streams
            .iter()
            .find(|s| s.codec_type == "video")
            .map_or("", |s| s.codec_name.as_str())
    }
}

fn parse_probe(stdout: &[u8]) -> Result<ProbeOutput, MediaError> {
    serde_json::from_slice(stdout).map_err(|e| MediaError::Parse {
        what: "ffprobe output".into(),
        detail: e.to_string(),
    })
}

/// Re-encode unless the file is already H.264 in an mp4 container.
fn needs_reencode(path: &Path, codec: &str) -> bool {
    let is_mp4 = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mp4"));
    !(is_mp4 && codec == "h264")
}

/// `/`-joined folder of `path` relative to `root`; empty at the root.
fn relative_folder(root: &Path, path: &Path) -> String {
    path.parent()
        .and_then(|p| p.strip_prefix(root).ok())
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}

/// Segment length giving parts of at most `max_bytes`, assuming even bitrate.
fn segment_seconds(duration_secs: f64, size_bytes: u64, max_bytes: u64) -> f64 {
    if max_bytes == 0 || size_bytes <= max_bytes {
        return duration_secs;
    }
    // 5% headroom for bitrate variance and container overhead.
    let parts = ((size_bytes as f64 * 1.05) / max_bytes as f64).ceil().max(2.0);
    (duration_secs / parts).max(1.0)
}

/// Body of an ffmpeg concat-demuxer list.
fn concat_list(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|p| format!("file '{}'\n", p.display().to_string().replace('\'', "'\\''")))
        .collect()
}

/// Files directly under `dir` whose names start with `prefix`, sorted.
async fn files_with_prefix(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, MediaError> {
    let mut found = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(prefix) && entry.file_type().await?.is_file() {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

fn walk_sorted(root: &Path) -> Result<Vec<PathBuf>, MediaError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

async fn walk_sorted_blocking(root: &Path) -> Result<Vec<PathBuf>, MediaError> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || walk_sorted(&root))
        .await
        .map_err(|e| MediaError::Io(std::io::Error::other(e)))?
}

#[async_trait]
impl MediaTransform for FfmpegTransform {
    async fn compress_directory(
        &self,
        source: &Path,
        output_dir: &Path,
        volume_limit_bytes: u64,
        exclude_extensions: &[String],
    ) -> Result<Vec<PathBuf>, MediaError> {
        tokio::fs::create_dir_all(output_dir).await?;
        let files: Vec<PathBuf> = walk_sorted_blocking(source)
            .await?
            .into_iter()
            .filter(|p| !has_extension(p, exclude_extensions))
            .filter_map(|p| p.strip_prefix(source).ok().map(Path::to_path_buf))
            .collect();
        if files.is_empty() {
            tracing::info!("No files to archive under {}", source.display());
            return Ok(Vec::new());
        }

        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string());
        let list_path = output_dir.join(format!("{name}.filelist"));
        let list: String = files
            .iter()
            .map(|p| format!("{}\n", p.display()))
            .collect();
        tokio::fs::write(&list_path, list).await?;

        let archive = output_dir.join(format!("{name}.zip"));
        let mut cmd = self.command(&self.sevenzip);
        cmd.args(["a", "-tzip", "-y"])
            .arg(format!("-v{volume_limit_bytes}b"))
            .arg(&archive)
            .arg(format!("@{}", list_path.display()))
            .current_dir(source);
        let result = self.run(cmd).await;
        let _ = tokio::fs::remove_file(&list_path).await;
        result?;

        files_with_prefix(output_dir, &format!("{name}.zip")).await
    }

    async fn inventory(
        &self,
        source: &Path,
        video_extensions: &[String],
    ) -> Result<Vec<VideoEntry>, MediaError> {
        let videos: Vec<PathBuf> = walk_sorted_blocking(source)
            .await?
            .into_iter()
            .filter(|p| has_extension(p, video_extensions))
            .collect();

        let mut entries = Vec::with_capacity(videos.len());
        for (i, path) in videos.into_iter().enumerate() {
            let probe = self.probe(&path).await?;
            let size_bytes = match probe.format.size.as_deref().and_then(|s| s.parse().ok()) {
                Some(size) => size,
                None => tokio::fs::metadata(&path).await?.len(),
            };
            let codec = probe.video_codec().to_string();
            let folder = relative_folder(source, &path);
            entries.push(VideoEntry {
                order: i + 1,
                file_name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                duration_secs: probe.duration_secs(),
                size_bytes,
                needs_reencode: needs_reencode(&path, &codec),
                codec,
                group: folder.clone(),
                folder,
                path,
            });
        }
        Ok(entries)
    }

    async fn reencode(&self, input: &Path, output: &Path) -> Result<(), MediaError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut cmd = self.command(&self.ffmpeg);
        cmd.args(["-y", "-i"])
            .arg(input)
            .args(["-c:v", "libx264", "-preset", "fast", "-crf", "23"])
            .args(["-c:a", "aac", "-b:a", "128k", "-movflags", "+faststart"])
            .arg(output);
        self.run(cmd).await?;
        Ok(())
    }

    async fn correct_duration(&self, path: &Path) -> Result<(), MediaError> {
        let tmp = path.with_extension("fixing.mp4");
        let mut cmd = self.command(&self.ffmpeg);
        cmd.args(["-y", "-fflags", "+genpts", "-i"])
            .arg(path)
            .args(["-map", "0", "-c", "copy"])
            .arg(&tmp);
        self.run(cmd).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn split(
        &self,
        input: &Path,
        output_dir: &Path,
        max_bytes: u64,
    ) -> Result<Vec<PathBuf>, MediaError> {
        tokio::fs::create_dir_all(output_dir).await?;
        let probe = self.probe(input).await?;
        let size = tokio::fs::metadata(input).await?.len();
        let segment = segment_seconds(probe.duration_secs(), size, max_bytes);

        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        let ext = input
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mp4".to_string());
        let pattern = output_dir.join(format!("{stem}_part%02d.{ext}"));
        let mut cmd = self.command(&self.ffmpeg);
        cmd.args(["-y", "-i"])
            .arg(input)
            .args(["-map", "0", "-c", "copy", "-f", "segment", "-segment_time"])
            .arg(format!("{segment:.3}"))
            .args(["-reset_timestamps", "1"])
            .arg(&pattern);
        self.run(cmd).await?;

        files_with_prefix(output_dir, &format!("{stem}_part")).await
    }

    async fn join(&self, inputs: &[PathBuf], output: &Path) -> Result<(), MediaError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let list_path = output.with_extension("concat.txt");
        tokio::fs::write(&list_path, concat_list(inputs)).await?;
        let mut cmd = self.command(&self.ffmpeg);
        cmd.args(["-y", "-f", "concat", "-safe", "0", "-i"])
            .arg(&list_path)
            .args(["-c", "copy"])
            .arg(output);
        let result = self.run(cmd).await;
        let _ = tokio::fs::remove_file(&list_path).await;
        result.map(|_| ())
    }

    async fn probe_duration(&self, path: &Path) -> Result<Duration, MediaError> {
        let probe = self.probe(path).await?;
        Ok(Duration::from_secs_f64(probe.duration_secs()))
    }

    async fn extract_audio(&self, video: &Path, output: &Path) -> Result<PathBuf, MediaError> {
        let mut cmd = self.command(&self.ffmpeg);
        cmd.args(["-y", "-i"])
            .arg(video)
            .args(["-vn", "-acodec", "libmp3lame", "-b:a", "192k"])
            .arg(output);
        self.run(cmd).await?;
        Ok(output.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE_JSON: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "audio", "codec_name": "aac"},
            {"index": 1, "codec_type": "video", "codec_name": "hevc"}
        ],
        "format": {"filename": "a.mkv", "duration": "754.120000", "size": "104857600"}
    }"#;

    #[test]
    fn test_parse_probe() {
        let probe = parse_probe(PROBE_JSON.as_bytes()).unwrap();
        assert_eq!(probe.video_codec(), "hevc");
        assert!((probe.duration_secs() - 754.12).abs() < 1e-9);
        assert_eq!(probe.format.size.as_deref(), Some("104857600"));
    }

    #[test]
    fn test_parse_probe_without_duration() {
        let probe = parse_probe(br#"{"streams": [], "format": {}}"#).unwrap();
        assert_eq!(probe.duration_secs(), 0.0);
        assert_eq!(probe.video_codec(), "");
        assert!(parse_probe(b"not json").is_err());
    }

    #[test]
    fn test_needs_reencode() {
        assert!(!needs_reencode(Path::new("a.mp4"), "h264"));
        assert!(!needs_reencode(Path::new("a.MP4"), "h264"));
        assert!(needs_reencode(Path::new("a.mkv"), "h264"));
        assert!(needs_reencode(Path::new("a.mp4"), "hevc"));
    }

    #[test]
    fn test_relative_folder() {
        let root = Path::new("/proj");
        assert_eq!(relative_folder(root, Path::new("/proj/a.mp4")), "");
        assert_eq!(
            relative_folder(root, Path::new("/proj/Module 1/Part A/a.mp4")),
            "Module 1/Part A"
        );
    }

    #[test]
    fn test_segment_seconds() {
        // Under the limit: one segment covering everything.
        assert_eq!(segment_seconds(100.0, 50, 100), 100.0);
        // 250 bytes * 1.05 / 100 = 2.625 -> 3 parts.
        assert!((segment_seconds(300.0, 250, 100) - 100.0).abs() < 1e-9);
        // Never fewer than two parts once over the limit.
        assert!((segment_seconds(100.0, 101, 100) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list(&[PathBuf::from("/a/it's.mp4"), PathBuf::from("/b.mp4")]);
        assert_eq!(list, "file '/a/it'\\''s.mp4'\nfile '/b.mp4'\n");
    }

    #[test]
    fn test_stderr_tail_keeps_end() {
        let long = "x".repeat(2000) + "END";
        let tail = stderr_tail(long.as_bytes());
        assert!(tail.ends_with("END"));
        assert!(tail.len() <= STDERR_TAIL + 1);
    }

    #[test]
    fn test_walk_sorted_lists_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        std::fs::write(dir.path().join("b/2.mp4"), b"").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"").unwrap();
        std::fs::write(dir.path().join("c.mp4"), b"").unwrap();
        let files = walk_sorted(dir.path()).unwrap();
        let rel: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            rel,
            vec![
                PathBuf::from("a.txt"),
                PathBuf::from("b/2.mp4"),
                PathBuf::from("c.mp4")
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_tool_is_reported() {
        let transform = FfmpegTransform::new(
            PathBuf::from("/nonexistent/ffmpeg-xyz"),
            PathBuf::from("/nonexistent/ffprobe-xyz"),
            PathBuf::from("/nonexistent/7z-xyz"),
        );
        let err = transform
            .probe_duration(Path::new("/tmp/a.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::MissingTool { .. }));
    }
}

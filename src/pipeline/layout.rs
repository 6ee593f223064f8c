use std::path::{Path, PathBuf};

use crate::media::VideoEntry;

/// Where a project's generated artifacts live: `<parent>/<name>_output/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkLayout {
    root: PathBuf,
}

impl WorkLayout {
    pub fn for_project(project: &Path) -> Self {
        let name = project_name(project);
        let parent = project.parent().unwrap_or_else(|| Path::new("."));
        Self {
            root: parent.join(format!("{name}_output")),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn archives_dir(&self) -> PathBuf {
        self.root.join("archives")
    }

    pub fn report_csv(&self) -> PathBuf {
        self.root.join("report.csv")
    }

    pub fn reencoded_dir(&self) -> PathBuf {
        self.root.join("reencoded")
    }

    pub fn split_dir(&self) -> PathBuf {
        self.root.join("split")
    }

    pub fn final_dir(&self) -> PathBuf {
        self.root.join("final")
    }

    pub fn finalized_csv(&self) -> PathBuf {
        self.root.join("finalized.csv")
    }

    pub fn upload_plan_csv(&self) -> PathBuf {
        self.root.join("upload_plan.csv")
    }

    pub fn summary_txt(&self) -> PathBuf {
        self.root.join("summary.txt")
    }

    /// Re-encoded copy of a report entry. The order prefix keeps equal file
    /// names from different folders apart.
    pub fn reencoded_path(&self, entry: &VideoEntry) -> PathBuf {
        self.reencoded_dir()
            .join(format!("{:03}_{}.mp4", entry.order, entry.stem()))
    }

    /// Input for finalize: the re-encoded copy when present, else the original.
    pub fn transformed_source(&self, entry: &VideoEntry) -> PathBuf {
        let reencoded = self.reencoded_path(entry);
        if reencoded.exists() {
            reencoded
        } else {
            entry.path.clone()
        }
    }
}

/// Display name of a project: its directory name.
pub fn project_name(project: &Path) -> String {
    project
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_sibling_of_project() {
        let layout = WorkLayout::for_project(Path::new("/data/courses/Rust 101"));
        assert_eq!(layout.root(), Path::new("/data/courses/Rust 101_output"));
        assert_eq!(
            layout.upload_plan_csv(),
            PathBuf::from("/data/courses/Rust 101_output/upload_plan.csv")
        );
        assert_eq!(project_name(Path::new("/data/courses/Rust 101")), "Rust 101");
    }

    #[test]
    fn test_transformed_source_prefers_reencoded() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("proj");
        let layout = WorkLayout::for_project(&project);
        let entry = crate::testutil::video_entry(2, &project.join("a/intro.avi"), "a", 10);

        assert_eq!(layout.transformed_source(&entry), entry.path);

        let reencoded = layout.reencoded_path(&entry);
        assert!(reencoded.ends_with("reencoded/002_intro.mp4"));
        std::fs::create_dir_all(reencoded.parent().unwrap()).unwrap();
        std::fs::write(&reencoded, b"x").unwrap();
        assert_eq!(layout.transformed_source(&entry), reencoded);
    }
}

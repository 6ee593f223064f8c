//! CSV persistence for pipeline artifacts shared between steps.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::PipelineError;

/// Write `rows` with a header line, replacing any existing file.
pub(crate) fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read every row of a CSV artifact written by [`write_rows`].
pub(crate) fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, PipelineError> {
    if !path.exists() {
        return Err(PipelineError::MissingArtifact(path.to_path_buf()));
    }
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader.deserialize().collect::<Result<Vec<T>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::VideoEntry;
    use crate::testutil::video_entry;

    #[test]
    fn test_report_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/report.csv");
        let mut entry = video_entry(1, Path::new("/p/m1/a, b.mp4"), "m1", 2048);
        entry.needs_reencode = true;
        write_rows(&path, &[entry.clone()]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(
            "order,path,folder,file_name,duration_secs,size_bytes,codec,needs_reencode,group\n"
        ));
        let rows: Vec<VideoEntry> = read_rows(&path).unwrap();
        assert_eq!(rows, vec![entry]);
    }

    #[test]
    fn test_missing_artifact() {
        let err = read_rows::<VideoEntry>(Path::new("/nonexistent/report.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::MissingArtifact(_)));
    }
}

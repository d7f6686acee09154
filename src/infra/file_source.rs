use crate::app::ports::{SourcePayload, SourcePort};
use crate::calendar::file_name;
use crate::error::IngestError;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

/// Reads the day's workbook from a local directory.
pub struct FileSource {
    dir: PathBuf,
    suffix: String,
}

impl FileSource {
    pub fn new(dir: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            suffix: suffix.into(),
        }
    }

    pub fn path_for(&self, target: NaiveDate) -> PathBuf {
        self.dir.join(file_name(target, &self.suffix))
    }
}

/// Read one workbook from disk, named after its file name.
pub async fn read_payload(path: &Path) -> Result<SourcePayload, IngestError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => IngestError::SourceNotFound(path.display().to_string()),
        _ => IngestError::SourceUnavailable(format!("{}: {e}", path.display())),
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    info!(path = %path.display(), bytes = bytes.len(), "read workbook from disk");
    Ok(SourcePayload::new(name, bytes))
}

#[async_trait]
impl SourcePort for FileSource {
    fn name_for(&self, target: NaiveDate) -> String {
        file_name(target, &self.suffix)
    }

    async fn fetch(&self, target: NaiveDate) -> Result<SourcePayload, IngestError> {
        read_payload(&self.path_for(target)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_reads_file_named_after_date() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("250724iyakuhinkyoukyu.xlsx"), b"xlsx").unwrap();
        let source = FileSource::new(dir.path(), "iyakuhinkyoukyu.xlsx");

        let payload = source
            .fetch(NaiveDate::from_ymd_opt(2025, 7, 24).unwrap())
            .await
            .unwrap();
        assert_eq!(payload.name, "250724iyakuhinkyoukyu.xlsx");
        assert_eq!(payload.bytes, b"xlsx");
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let source = FileSource::new(dir.path(), "iyakuhinkyoukyu.xlsx");
        let err = source
            .fetch(NaiveDate::from_ymd_opt(2025, 7, 25).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::SourceNotFound(_)));
    }

    #[tokio::test]
    async fn test_directory_is_unavailable_not_missing() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("250726iyakuhinkyoukyu.xlsx")).unwrap();
        let source = FileSource::new(dir.path(), "iyakuhinkyoukyu.xlsx");
        let err = source
            .fetch(NaiveDate::from_ymd_opt(2025, 7, 26).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::SourceUnavailable(_)));
    }
}

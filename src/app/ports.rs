use crate::error::{IngestError, RunError, StoreError};
use crate::pipeline::RunReport;
use crate::storage::SnapshotStore;
use async_trait::async_trait;
use chrono::NaiveDate;
use sha2::{Digest, Sha256};

/// Source bytes for one run plus the name they were published under.
#[derive(Debug, Clone)]
pub struct SourcePayload {
    pub name: String,
    pub bytes: Vec<u8>,
    pub sha256: String,
}

impl SourcePayload {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let sha256 = hex::encode(Sha256::digest(&bytes));
        Self {
            name: name.into(),
            bytes,
            sha256,
        }
    }
}

/// Yields the workbook published for a given date.
#[async_trait]
pub trait SourcePort: Send + Sync {
    /// Name of the file expected for `target`, used to attribute failures.
    fn name_for(&self, target: NaiveDate) -> String;

    async fn fetch(&self, target: NaiveDate) -> Result<SourcePayload, IngestError>;
}

/// Opens a fresh, explicitly owned store session for one commit.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn SnapshotStore>, StoreError>;
}

/// Receives the per-run counters and fatal errors.
///
/// `record_run` is called exactly once per run, failed runs included.
pub trait ObservabilitySink: Send + Sync {
    fn record_run(&self, report: &RunReport);
    fn record_failure(&self, report: &RunReport, error: &RunError);
}

// Ingest-side ports
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpGetResult, HttpFailure>;
}

#[derive(Clone, Debug)]
pub struct HttpGetResult {
    pub status: u16,
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub last_modified: Option<String>,
}

/// Why a GET produced no response body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HttpFailure {
    /// DNS, connect or timeout; nothing was received.
    Connect(String),
    /// A response started but could not be read.
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_fingerprint() {
        let payload = SourcePayload::new("250724iyakuhinkyoukyu.xlsx", b"abc".to_vec());
        assert_eq!(
            payload.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}

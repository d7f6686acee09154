use std::fmt;
use thiserror::Error;

/// The source bytes are not a readable workbook.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("workbook could not be read: {0}")]
    Workbook(#[from] calamine::XlsxError),

    #[error("workbook contains no sheets")]
    NoSheet,

    #[error("label row expected at row {offset} but the sheet ends before it")]
    MissingHeaderRow { offset: usize },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "db")]
    #[error("libSQL error: {0}")]
    Libsql(String),

    #[error("store session already closed")]
    Closed,

    #[error("snapshot lease is held by {holder}")]
    LeaseHeld { holder: String },

    #[error("invalid table name: {0}")]
    InvalidTable(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("source not found: {0}")]
    SourceNotFound(String),

    #[error("source transport error: {0}")]
    SourceTransport(String),

    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("store failed: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;

/// Pipeline step a fatal error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Fetch,
    Decode,
    Connect,
    Replace,
    Cleanup,
    Close,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Fetch => "fetch",
            Step::Decode => "decode",
            Step::Connect => "connect",
            Step::Replace => "replace",
            Step::Cleanup => "cleanup",
            Step::Close => "close",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A run-aborting failure, attributed to the file being processed and the
/// step that failed.
#[derive(Error, Debug)]
#[error("{step} step failed for {source_name}: {error}")]
pub struct RunError {
    pub source_name: String,
    pub step: Step,
    #[source]
    pub error: IngestError,
}

impl RunError {
    pub fn new(source_name: impl Into<String>, step: Step, error: impl Into<IngestError>) -> Self {
        Self {
            source_name: source_name.into(),
            step,
            error: error.into(),
        }
    }
}

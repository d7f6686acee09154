// Ingestion pipeline: decode -> translate -> filter -> dedupe -> snapshot

pub mod decode;
pub mod dedupe;
pub mod filter;
pub mod snapshot;
pub mod translate;

use crate::app::ports::{ObservabilitySink, SourcePayload, SourcePort, StoreConnector};
use crate::constants::STATUS_TARGET;
use crate::error::{DecodeError, IngestError, RunError, Step};
use crate::types::MedicineRecord;
use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use serde::Serialize;
use snapshot::SnapshotWriter;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Counters and outcome of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub source_name: String,
    pub payload_sha256: Option<String>,
    pub rows_decoded: usize,
    pub empty_rows_dropped: usize,
    pub missing_key_dropped: usize,
    pub duplicate_keys: usize,
    pub records_written: usize,
    pub rows_purged: u64,
    pub executed_at: Option<DateTime<Utc>>,
}

impl RunReport {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            source_name: source_name.into(),
            payload_sha256: None,
            rows_decoded: 0,
            empty_rows_dropped: 0,
            missing_key_dropped: 0,
            duplicate_keys: 0,
            records_written: 0,
            rows_purged: 0,
            executed_at: None,
        }
    }

    /// The operator-facing outcome of a run that did not fail.
    pub fn status_line(&self) -> String {
        if self.executed_at.is_none() {
            "nothing to write".to_string()
        } else {
            format!(
                "{} records committed, {} rows purged",
                self.records_written, self.rows_purged
            )
        }
    }
}

/// Records ready to commit, plus the counts gathered on the way.
#[derive(Debug)]
pub struct Prepared {
    pub records: Vec<MedicineRecord>,
    pub rows_decoded: usize,
    pub empty_rows_dropped: usize,
    pub missing_key_dropped: usize,
    pub duplicate_keys: usize,
}

/// Decode, translate, filter and dedupe a workbook. No I/O.
#[instrument(skip(bytes), fields(bytes = bytes.len()))]
pub fn prepare(bytes: &[u8], header_offset: usize) -> Result<Prepared, DecodeError> {
    let sheet = decode::decode(bytes, header_offset)?;

    let check = translate::check_labels(&sheet.labels);
    for label in &check.missing {
        warn!(label = %label.escape_debug(), sheet = %sheet.sheet_name, "expected column label not found");
    }
    if check.key_missing() {
        error!(sheet = %sheet.sheet_name, "natural key column is missing; every row will be dropped");
    }
    if !check.unmapped.is_empty() {
        info!(unmapped = ?check.unmapped, "sheet carries columns that are not ingested");
    }

    let rows_decoded = sheet.rows.len();
    let translated: Vec<MedicineRecord> = sheet.rows.iter().map(translate::translate).collect();
    let (kept, dropped) = filter::filter(translated);
    let (records, duplicate_keys) = dedupe::dedupe(kept);

    Ok(Prepared {
        records,
        rows_decoded,
        empty_rows_dropped: dropped.empty_rows_dropped,
        missing_key_dropped: dropped.missing_key_dropped,
        duplicate_keys,
    })
}

/// One source, one store, one sink: the whole ingestion run.
pub struct Pipeline {
    source: Arc<dyn SourcePort>,
    connector: Arc<dyn StoreConnector>,
    sink: Arc<dyn ObservabilitySink>,
    writer: SnapshotWriter,
    header_offset: usize,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn SourcePort>,
        connector: Arc<dyn StoreConnector>,
        sink: Arc<dyn ObservabilitySink>,
        writer: SnapshotWriter,
        header_offset: usize,
    ) -> Self {
        Self {
            source,
            connector,
            sink,
            writer,
            header_offset,
        }
    }

    /// Fetch the file published for `target` and ingest it.
    #[instrument(skip_all, fields(target = %target))]
    pub async fn run(&self, target: NaiveDate) -> Result<RunReport, RunError> {
        match self.source.fetch(target).await {
            Ok(payload) => self.run_payload(payload).await,
            Err(e) => Err(self.fetch_failed(self.source.name_for(target), e)),
        }
    }

    /// Report a run that ended before any bytes were obtained.
    pub fn fetch_failed(&self, source_name: String, error: IngestError) -> RunError {
        let report = RunReport::new(&source_name);
        let err = RunError::new(source_name, Step::Fetch, error);
        self.finish(&report, Some(&err));
        err
    }

    /// Ingest bytes that were already fetched.
    #[instrument(skip_all, fields(source = %payload.name, sha256 = %payload.sha256))]
    pub async fn run_payload(&self, payload: SourcePayload) -> Result<RunReport, RunError> {
        let mut report = RunReport::new(&payload.name);
        report.payload_sha256 = Some(payload.sha256.clone());

        let result = self.ingest(&payload, &mut report).await;
        self.finish(&report, result.as_ref().err());
        result.map(|()| report)
    }

    async fn ingest(&self, payload: &SourcePayload, report: &mut RunReport) -> Result<(), RunError> {
        let prepared = prepare(&payload.bytes, self.header_offset)
            .map_err(|e| RunError::new(&payload.name, Step::Decode, e))?;
        report.rows_decoded = prepared.rows_decoded;
        report.empty_rows_dropped = prepared.empty_rows_dropped;
        report.missing_key_dropped = prepared.missing_key_dropped;
        report.duplicate_keys = prepared.duplicate_keys;

        if prepared.records.is_empty() {
            info!("no records survived filtering; store left untouched");
            return Ok(());
        }

        // One timestamp for the whole run, at the store's resolution.
        let at = Utc::now().trunc_subsecs(6);
        let session = self
            .connector
            .connect()
            .await
            .map_err(|e| RunError::new(&payload.name, Step::Connect, e))?;
        let outcome = self
            .writer
            .commit(&payload.name, session, prepared.records, at)
            .await?;

        report.records_written = outcome.records_written;
        report.rows_purged = outcome.rows_purged;
        report.executed_at = Some(at);
        Ok(())
    }

    fn finish(&self, report: &RunReport, failure: Option<&RunError>) {
        self.sink.record_run(report);
        match failure {
            Some(err) => self.sink.record_failure(report, err),
            None => info!(target: STATUS_TARGET, run_id = %report.run_id, source = %report.source_name, "{}", report.status_line()),
        }
    }
}

use crate::types::MedicineRecord;
use serde::Serialize;
use tracing::debug;

/// Counts of rows removed by each filter pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterReport {
    pub empty_rows_dropped: usize,
    pub missing_key_dropped: usize,
}

/// Drop fully blank rows, then rows without a natural key.
///
/// Both passes are non-fatal and may leave nothing behind.
pub fn filter(records: Vec<MedicineRecord>) -> (Vec<MedicineRecord>, FilterReport) {
    let before = records.len();
    let non_empty: Vec<MedicineRecord> = records.into_iter().filter(|r| !r.is_blank()).collect();
    let empty_rows_dropped = before - non_empty.len();

    let before = non_empty.len();
    let keyed: Vec<MedicineRecord> = non_empty
        .into_iter()
        .filter(|r| r.natural_key().is_some())
        .collect();
    let missing_key_dropped = before - keyed.len();

    debug!(
        empty_rows_dropped,
        missing_key_dropped,
        remaining = keyed.len(),
        "filtered records"
    );
    (
        keyed,
        FilterReport {
            empty_rows_dropped,
            missing_key_dropped,
        },
    )
}

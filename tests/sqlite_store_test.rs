mod common;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use common::*;
use medsupply::app::ports::StoreConnector;
use medsupply::constants::*;
use medsupply::error::{IngestError, Step, StoreError};
use medsupply::infra::sqlite_store::{SqliteConnector, SqliteStore};
use medsupply::pipeline::snapshot::SnapshotWriter;
use medsupply::storage::SnapshotStore;
use medsupply::types::MedicineRecord;
use std::sync::Arc;
use tempfile::tempdir;

fn rec(key: &str, status: &str) -> MedicineRecord {
    MedicineRecord {
        yj_code: Some(key.into()),
        product_name: Some("カロナール錠200".into()),
        shipping_status: Some(status.into()),
        listing_date: NaiveDate::from_ymd_opt(1984, 11, 22),
        ..Default::default()
    }
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_753_315_200 + secs, 0).unwrap()
}

fn writer(holder: &str) -> SnapshotWriter {
    SnapshotWriter::new(2, Duration::minutes(15), holder)
}

#[tokio::test]
async fn test_committing_twice_keeps_only_the_second_stamp() {
    let dir = tempdir().unwrap();
    let connector = SqliteConnector::new(dir.path().join("snap.db"), DEFAULT_TABLE);
    let records = vec![rec("A", "1"), rec("B", "1"), rec("C", "1")];
    let (t1, t2) = (at(0), at(300));

    writer("run-1")
        .commit("f.xlsx", connector.connect().await.unwrap(), records.clone(), t1)
        .await
        .unwrap();
    let outcome = writer("run-2")
        .commit("f.xlsx", connector.connect().await.unwrap(), records.clone(), t2)
        .await
        .unwrap();
    assert_eq!(outcome.records_written, 3);
    assert_eq!(outcome.rows_purged, 0);

    let mut session = connector.connect().await.unwrap();
    let stats = session.stats().await.unwrap();
    assert_eq!(stats.rows, 3);
    assert_eq!(stats.stamps, vec![t2]);

    let stored = session.load_all().await.unwrap();
    let expected: Vec<MedicineRecord> = records.into_iter().map(|r| r.stamped(t2)).collect();
    assert_eq!(stored, expected);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_keys_missing_from_the_new_snapshot_are_purged() {
    let dir = tempdir().unwrap();
    let connector = SqliteConnector::new(dir.path().join("snap.db"), "Shipping");

    writer("run-1")
        .commit(
            "a.xlsx",
            connector.connect().await.unwrap(),
            vec![rec("A", "1"), rec("B", "1"), rec("GONE", "1")],
            at(0),
        )
        .await
        .unwrap();
    let outcome = writer("run-2")
        .commit(
            "b.xlsx",
            connector.connect().await.unwrap(),
            vec![rec("A", "2"), rec("B", "2")],
            at(60),
        )
        .await
        .unwrap();
    assert_eq!(outcome.rows_purged, 1);

    let mut session = connector.connect().await.unwrap();
    let keys: Vec<String> = session
        .load_all()
        .await
        .unwrap()
        .into_iter()
        .filter_map(|r| r.yj_code)
        .collect();
    assert_eq!(keys, vec!["A", "B"]);
}

#[tokio::test]
async fn test_lease_is_shared_between_sessions_on_one_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snap.db");
    let connector = SqliteConnector::new(&path, DEFAULT_TABLE);

    let mut holder = SqliteStore::open(&path, DEFAULT_TABLE).unwrap();
    holder
        .acquire_lease("run-1", at(0), Duration::minutes(15))
        .await
        .unwrap();

    let err = writer("run-2")
        .commit("f.xlsx", connector.connect().await.unwrap(), vec![rec("A", "1")], at(60))
        .await
        .unwrap_err();
    assert_eq!(err.step, Step::Replace);
    assert!(matches!(
        err.error,
        IngestError::Store(StoreError::LeaseHeld { ref holder }) if holder == "run-1"
    ));

    // Once the lease expires the next run takes it over.
    writer("run-2")
        .commit(
            "f.xlsx",
            connector.connect().await.unwrap(),
            vec![rec("A", "1")],
            at(16 * 60),
        )
        .await
        .unwrap();
    assert_eq!(holder.stats().await.unwrap().rows, 1);
    holder.close().await.unwrap();
}

#[tokio::test]
async fn test_pipeline_into_sqlite() {
    let dir = tempdir().unwrap();
    let connector = Arc::new(SqliteConnector::new(dir.path().join("snap.db"), DEFAULT_TABLE));
    let sink = Arc::new(RecordingSink::default());
    let labels = all_labels();
    let bytes = standard_workbook(vec![
        row(
            &labels,
            &[
                (LABEL_YJ_CODE, V::T("1141007F1063")),
                (LABEL_LISTING_DATE, V::T("1984/11/22")),
                (LABEL_SHIPPING_STATUS, V::T("③通常出荷")),
            ],
        ),
        row(&labels, &[(LABEL_YJ_CODE, V::N(2171014.0))]),
    ]);

    let report = pipeline(bytes, connector.clone(), sink, "run-1")
        .run(day())
        .await
        .unwrap();
    assert_eq!(report.records_written, 2);

    let mut session = connector.connect().await.unwrap();
    let rows = session.load_all().await.unwrap();
    assert_eq!(rows[0].natural_key(), Some("1141007F1063"));
    assert_eq!(rows[0].listing_date, NaiveDate::from_ymd_opt(1984, 11, 22));
    assert_eq!(rows[0].updated_at, report.executed_at);
    // Integral numbers in text columns carry no fraction.
    assert_eq!(rows[1].natural_key(), Some("2171014"));
}

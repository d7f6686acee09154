#![cfg(feature = "db")]

use chrono::{DateTime, Duration, Utc};
use medsupply::app::ports::StoreConnector;
use medsupply::constants::DEFAULT_TABLE;
use medsupply::error::{IngestError, Step, StoreError};
use medsupply::infra::libsql_store::LibsqlConnector;
use medsupply::pipeline::snapshot::SnapshotWriter;
use medsupply::storage::SnapshotStore;
use medsupply::types::MedicineRecord;
use tempfile::{tempdir, TempDir};

fn rec(key: &str, status: &str) -> MedicineRecord {
    MedicineRecord {
        yj_code: Some(key.into()),
        shipping_status: Some(status.into()),
        listing_date: chrono::NaiveDate::from_ymd_opt(1984, 11, 22),
        ..Default::default()
    }
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_753_315_200 + secs, 0).unwrap()
}

fn writer(holder: &str) -> SnapshotWriter {
    SnapshotWriter::new(2, Duration::minutes(15), holder)
}

async fn local_connector() -> (TempDir, LibsqlConnector) {
    let dir = tempdir().unwrap();
    let url = format!("file:{}", dir.path().join("snap.db").display());
    let connector = LibsqlConnector::new(&url, "", DEFAULT_TABLE).await.unwrap();
    (dir, connector)
}

#[tokio::test]
async fn test_replace_then_purge_keeps_one_stamp() {
    let (_dir, connector) = local_connector().await;

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
    assert_eq!(outcome.records_written, 2);
    assert_eq!(outcome.rows_purged, 1);

    let mut session = connector.connect().await.unwrap();
    let stats = session.stats().await.unwrap();
    assert_eq!(stats.rows, 2);
    assert_eq!(stats.stamps, vec![at(60)]);

    let rows = session.load_all().await.unwrap();
    assert_eq!(rows, vec![rec("A", "2").stamped(at(60)), rec("B", "2").stamped(at(60))]);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_live_lease_refuses_a_second_run() {
    let (_dir, connector) = local_connector().await;

    let mut holder = connector.connect().await.unwrap();
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
    assert_eq!(holder.stats().await.unwrap().rows, 0);

    // Released by its holder, the lease is free for the next run.
    holder.release_lease("run-1").await.unwrap();
    writer("run-2")
        .commit("f.xlsx", connector.connect().await.unwrap(), vec![rec("A", "1")], at(120))
        .await
        .unwrap();
    assert_eq!(holder.stats().await.unwrap().rows, 1);
}

#[tokio::test]
async fn test_expired_lease_is_taken_over() {
    let (_dir, connector) = local_connector().await;

    let mut stale = connector.connect().await.unwrap();
    stale
        .acquire_lease("run-1", at(0), Duration::minutes(15))
        .await
        .unwrap();

    let mut next = connector.connect().await.unwrap();
    next.acquire_lease("run-2", at(16 * 60), Duration::minutes(15))
        .await
        .unwrap();
    let err = stale
        .acquire_lease("run-1", at(17 * 60), Duration::minutes(15))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::LeaseHeld { ref holder } if holder == "run-2"));
}

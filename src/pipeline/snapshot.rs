use crate::error::{RunError, Step, StoreError};
use crate::storage::SnapshotStore;
use crate::types::MedicineRecord;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument, warn};

/// What a successful commit changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    pub records_written: usize,
    pub rows_purged: u64,
}

/// Stamps, replaces and purges one run's records against a store session.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    batch_size: usize,
    lease_ttl: Duration,
    holder: String,
}

impl SnapshotWriter {
    pub fn new(batch_size: usize, lease_ttl: Duration, holder: impl Into<String>) -> Self {
        Self {
            batch_size: batch_size.max(1),
            lease_ttl,
            holder: holder.into(),
        }
    }

    /// Commit `records` as the snapshot taken at `at`.
    ///
    /// Every record is stamped with `at`, replaced in batches, and then every
    /// row stamped before `at` is purged. The session is closed on every
    /// path. A failed replace skips the purge; the next successful run
    /// removes whatever the failed one left behind.
    #[instrument(skip_all, fields(source = %source_name, records = records.len(), at = %at))]
    pub async fn commit(
        &self,
        source_name: &str,
        mut session: Box<dyn SnapshotStore>,
        records: Vec<MedicineRecord>,
        at: DateTime<Utc>,
    ) -> Result<CommitOutcome, RunError> {
        let stamped: Vec<MedicineRecord> = records.into_iter().map(|r| r.stamped(at)).collect();
        let result = self.write(session.as_mut(), &stamped, at).await;
        let closed = session.close().await;

        match (result, closed) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(e)) => Err(RunError::new(source_name, Step::Close, e)),
            (Err((step, e)), closed) => {
                if let Err(close_err) = closed {
                    warn!(error = %close_err, "closing store session after failure also failed");
                }
                Err(RunError::new(source_name, step, e))
            }
        }
    }

    async fn write(
        &self,
        session: &mut dyn SnapshotStore,
        records: &[MedicineRecord],
        at: DateTime<Utc>,
    ) -> Result<CommitOutcome, (Step, StoreError)> {
        session
            .acquire_lease(&self.holder, at, self.lease_ttl)
            .await
            .map_err(|e| (Step::Replace, e))?;

        let result = self.replace_then_purge(session, records, at).await;

        if let Err(e) = session.release_lease(&self.holder).await {
            warn!(error = %e, holder = %self.holder, "failed to release snapshot lease; it will expire");
        }
        result
    }

    async fn replace_then_purge(
        &self,
        session: &mut dyn SnapshotStore,
        records: &[MedicineRecord],
        at: DateTime<Utc>,
    ) -> Result<CommitOutcome, (Step, StoreError)> {
        let mut written = 0;
        for chunk in records.chunks(self.batch_size) {
            session
                .replace_batch(chunk)
                .await
                .map_err(|e| (Step::Replace, e))?;
            written += chunk.len();
            debug!(written, total = records.len(), "replaced batch");
        }

        let purged = session
            .purge_older_than(at)
            .await
            .map_err(|e| (Step::Cleanup, e))?;
        info!(written, purged, "snapshot committed");

        Ok(CommitOutcome {
            records_written: written,
            rows_purged: purged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::StoreConnector;
    use crate::storage::InMemoryStore;

    fn rec(key: &str, status: &str) -> MedicineRecord {
        MedicineRecord {
            yj_code: Some(key.into()),
            shipping_status: Some(status.into()),
            ..Default::default()
        }
    }

    fn writer() -> SnapshotWriter {
        SnapshotWriter::new(2, Duration::minutes(15), "test-run")
    }

    #[tokio::test]
    async fn test_commit_stamps_and_purges() {
        let store = InMemoryStore::new();
        let t0 = Utc::now();
        store
            .insert_raw(MedicineRecord {
                updated_at: Some(t0),
                ..rec("GONE", "A")
            })
            .unwrap();

        let t1 = t0 + Duration::seconds(5);
        let session = store.connect().await.unwrap();
        let outcome = writer()
            .commit("f.xlsx", session, vec![rec("A", "1"), rec("B", "1"), rec("C", "1")], t1)
            .await
            .unwrap();

        assert_eq!(outcome.records_written, 3);
        assert_eq!(outcome.rows_purged, 1);
        let rows = store.session().load_all().await.unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.updated_at == Some(t1)));
        assert_eq!(store.sessions_closed(), 1);
        assert_eq!(store.lease_holder(), None);
    }

    #[tokio::test]
    async fn test_replace_failure_skips_purge_and_closes() {
        let store = InMemoryStore::new().failing_replace_after(1);
        let t0 = Utc::now();
        store
            .insert_raw(MedicineRecord {
                updated_at: Some(t0),
                ..rec("OLD", "A")
            })
            .unwrap();

        let t1 = t0 + Duration::seconds(5);
        let session = store.connect().await.unwrap();
        let err = writer()
            .commit("f.xlsx", session, vec![rec("A", "1"), rec("B", "1"), rec("C", "1")], t1)
            .await
            .unwrap_err();

        assert_eq!(err.step, Step::Replace);
        assert_eq!(err.source_name, "f.xlsx");
        // First batch landed, the stale row survived: mixed stamps until the next run.
        let stats = store.session().stats().await.unwrap();
        assert_eq!(stats.rows, 3);
        assert_eq!(stats.stamps, vec![t0, t1]);
        assert_eq!(store.sessions_closed(), 1);
        assert_eq!(store.lease_holder(), None);
    }

    #[tokio::test]
    async fn test_purge_failure_is_attributed_to_cleanup() {
        let store = InMemoryStore::new().failing_purge();
        let session = store.connect().await.unwrap();
        let err = writer()
            .commit("f.xlsx", session, vec![rec("A", "1")], Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.step, Step::Cleanup);
        assert_eq!(store.sessions_closed(), 1);
    }

    #[tokio::test]
    async fn test_held_lease_aborts_before_any_write() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store
            .session()
            .acquire_lease("other-run", now, Duration::minutes(15))
            .await
            .unwrap();

        let session = store.connect().await.unwrap();
        let err = writer()
            .commit("f.xlsx", session, vec![rec("A", "1")], now)
            .await
            .unwrap_err();

        assert_eq!(err.step, Step::Replace);
        assert!(matches!(
            err.error,
            crate::error::IngestError::Store(StoreError::LeaseHeld { .. })
        ));
        assert!(store.session().load_all().await.unwrap().is_empty());
        assert_eq!(store.lease_holder().as_deref(), Some("other-run"));
        assert_eq!(store.sessions_closed(), 1);
    }
}

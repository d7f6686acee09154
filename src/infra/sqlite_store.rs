use crate::app::ports::StoreConnector;
use crate::constants::LEASE_NAME;
use crate::error::StoreError;
use crate::infra::snapshot_row::{self, from_micros, SqlValue, COLUMNS};
use crate::storage::{validate_table_name, SnapshotStore, StoreResult, StoreStats};
use crate::types::MedicineRecord;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Snapshot table in a local SQLite file.
pub struct SqliteStore {
    conn: Option<Connection>,
    table: String,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P, table: &str) -> StoreResult<Self> {
        validate_table_name(table)?;
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Backend(format!("creating {}: {e}", parent.display())))?;
            }
        }
        let conn = Connection::open(path.as_ref())?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(&format!(
            "PRAGMA journal_mode=WAL;\n{}",
            snapshot_row::schema_sql(table)
        ))?;
        Ok(Self {
            conn: Some(conn),
            table: table.to_string(),
        })
    }

    fn conn(&self) -> StoreResult<&Connection> {
        self.conn.as_ref().ok_or(StoreError::Closed)
    }

    fn conn_mut(&mut self) -> StoreResult<&mut Connection> {
        self.conn.as_mut().ok_or(StoreError::Closed)
    }

    fn lease_name(&self) -> String {
        format!("{LEASE_NAME}:{}", self.table)
    }
}

impl From<SqlValue> for Value {
    fn from(v: SqlValue) -> Self {
        match v {
            SqlValue::Null => Value::Null,
            SqlValue::Text(s) => Value::Text(s),
            SqlValue::Integer(i) => Value::Integer(i),
        }
    }
}

impl From<Value> for SqlValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Text(s) => SqlValue::Text(s),
            Value::Integer(i) => SqlValue::Integer(i),
            _ => SqlValue::Null,
        }
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<MedicineRecord> {
    let values = (0..COLUMNS.len())
        .map(|i| row.get::<_, Value>(i).map(SqlValue::from))
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(snapshot_row::decode(values))
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn replace_batch(&mut self, records: &[MedicineRecord]) -> StoreResult<()> {
        let sql = snapshot_row::upsert_sql(&self.table);
        let conn = self.conn_mut()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&sql)?;
            for record in records {
                let values = snapshot_row::encode(record).into_iter().map(Value::from);
                stmt.execute(params_from_iter(values))?;
            }
        }
        tx.commit()?;
        debug!(rows = records.len(), "replaced batch");
        Ok(())
    }

    async fn purge_older_than(&mut self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let sql = format!("DELETE FROM {} WHERE updated_at < ?1", self.table);
        let conn = self.conn_mut()?;
        let tx = conn.transaction()?;
        let deleted = tx.execute(&sql, params![cutoff.timestamp_micros()])?;
        tx.commit()?;
        Ok(deleted as u64)
    }

    async fn acquire_lease(
        &mut self,
        holder: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> StoreResult<()> {
        let name = self.lease_name();
        let conn = self.conn_mut()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current: Option<(String, i64)> = tx
            .query_row(
                snapshot_row::LEASE_SELECT_SQL,
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        if let Some((current_holder, expires_at)) = current {
            if current_holder != holder && expires_at > now.timestamp_micros() {
                return Err(StoreError::LeaseHeld {
                    holder: current_holder,
                });
            }
        }
        tx.execute(
            snapshot_row::LEASE_UPSERT_SQL,
            params![name, holder, (now + ttl).timestamp_micros()],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn release_lease(&mut self, holder: &str) -> StoreResult<()> {
        let name = self.lease_name();
        self.conn()?
            .execute(snapshot_row::LEASE_DELETE_SQL, params![name, holder])?;
        Ok(())
    }

    async fn load_all(&mut self) -> StoreResult<Vec<MedicineRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&snapshot_row::select_sql(&self.table))?;
        let rows = stmt
            .query_map([], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn stats(&mut self) -> StoreResult<StoreStats> {
        let conn = self.conn()?;
        let rows: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |r| r.get(0))?;
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT updated_at FROM {} ORDER BY updated_at",
            self.table
        ))?;
        let stamps = stmt
            .query_map([], |r| r.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .filter_map(from_micros)
            .collect();
        Ok(StoreStats {
            rows: rows as u64,
            stamps,
        })
    }

    async fn close(&mut self) -> StoreResult<()> {
        let conn = self.conn.take().ok_or(StoreError::Closed)?;
        conn.close().map_err(|(_, e)| StoreError::Sqlite(e))
    }
}

/// Opens one `SqliteStore` session per commit.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: PathBuf,
    table: String,
}

impl SqliteConnector {
    pub fn new(path: impl Into<PathBuf>, table: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            table: table.into(),
        }
    }
}

#[async_trait]
impl StoreConnector for SqliteConnector {
    async fn connect(&self) -> StoreResult<Box<dyn SnapshotStore>> {
        let store = SqliteStore::open(&self.path, &self.table)?;
        info!(path = %self.path.display(), table = %self.table, "opened SQLite store session");
        Ok(Box::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn rec(key: &str, at: DateTime<Utc>) -> MedicineRecord {
        MedicineRecord {
            yj_code: Some(key.into()),
            product_name: Some("アスピリン".into()),
            listing_date: NaiveDate::from_ymd_opt(1984, 11, 22),
            updated_at: Some(at),
            ..Default::default()
        }
    }

    #[test]
    fn test_rejects_bad_table_name() {
        let dir = tempdir().unwrap();
        let result = SqliteStore::open(dir.path().join("s.db"), "x; DROP TABLE y");
        assert!(matches!(result, Err(StoreError::InvalidTable(_))));
    }

    #[tokio::test]
    async fn test_records_survive_a_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("s.db");
        let at = DateTime::from_timestamp(1_753_315_200, 123_456_000).unwrap();

        let mut store = SqliteStore::open(&path, "T").unwrap();
        store.replace_batch(&[rec("B", at), rec("A", at)]).await.unwrap();
        store.close().await.unwrap();
        assert!(matches!(store.close().await, Err(StoreError::Closed)));

        let mut store = SqliteStore::open(&path, "T").unwrap();
        let rows = store.load_all().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], rec("A", at));
        assert_eq!(rows[1].natural_key(), Some("B"));
    }
}

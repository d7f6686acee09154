use crate::app::ports::StoreConnector;
use crate::constants::LEASE_NAME;
use crate::error::StoreError;
use crate::infra::snapshot_row::{self, from_micros, SqlValue, COLUMNS};
use crate::storage::{validate_table_name, SnapshotStore, StoreResult, StoreStats};
use crate::types::MedicineRecord;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use libsql::params::Params;
use libsql::{Builder, Connection, Database, TransactionBehavior, Value};
use std::sync::Arc;
use tracing::{debug, info};

fn db_err(context: &str) -> impl Fn(libsql::Error) -> StoreError + '_ {
    move |e| StoreError::Libsql(format!("{context}: {e}"))
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

fn positional(values: Vec<SqlValue>) -> Params {
    Params::Positional(values.into_iter().map(Value::from).collect())
}

/// Snapshot table on a Turso/libSQL database, remote or embedded.
pub struct LibsqlStore {
    conn: Option<Connection>,
    table: String,
}

impl LibsqlStore {
    fn conn(&self) -> StoreResult<&Connection> {
        self.conn.as_ref().ok_or(StoreError::Closed)
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        self.conn()?
            .execute_batch(&snapshot_row::schema_sql(&self.table))
            .await
            .map_err(db_err("Failed to run migrations"))?;
        Ok(())
    }

    fn lease_name(&self) -> String {
        format!("{LEASE_NAME}:{}", self.table)
    }
}

#[async_trait]
impl SnapshotStore for LibsqlStore {
    async fn replace_batch(&mut self, records: &[MedicineRecord]) -> StoreResult<()> {
        let sql = snapshot_row::upsert_sql(&self.table);
        let tx = self
            .conn()?
            .transaction()
            .await
            .map_err(db_err("Failed to begin transaction"))?;
        for record in records {
            tx.execute(&sql, positional(snapshot_row::encode(record)))
                .await
                .map_err(db_err("Failed to replace record"))?;
        }
        tx.commit().await.map_err(db_err("Failed to commit batch"))?;
        debug!(rows = records.len(), "replaced batch");
        Ok(())
    }

    async fn purge_older_than(&mut self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let sql = format!("DELETE FROM {} WHERE updated_at < ?1", self.table);
        let tx = self
            .conn()?
            .transaction()
            .await
            .map_err(db_err("Failed to begin transaction"))?;
        let deleted = tx
            .execute(&sql, Params::Positional(vec![Value::Integer(cutoff.timestamp_micros())]))
            .await
            .map_err(db_err("Failed to purge stale rows"))?;
        tx.commit().await.map_err(db_err("Failed to commit purge"))?;
        Ok(deleted)
    }

    async fn acquire_lease(
        &mut self,
        holder: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> StoreResult<()> {
        let name = self.lease_name();
        // Write lock is held from the read through the upsert.
        let tx = self
            .conn()?
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(db_err("Failed to begin transaction"))?;
        let mut rows = tx
            .query(
                snapshot_row::LEASE_SELECT_SQL,
                Params::Positional(vec![Value::Text(name.clone())]),
            )
            .await
            .map_err(db_err("Failed to read lease"))?;
        if let Some(row) = rows.next().await.map_err(db_err("Failed to read lease"))? {
            let current: String = row.get(0).map_err(db_err("Failed to read lease holder"))?;
            let expires_at: i64 = row.get(1).map_err(db_err("Failed to read lease expiry"))?;
            if current != holder && expires_at > now.timestamp_micros() {
                return Err(StoreError::LeaseHeld { holder: current });
            }
        }
        drop(rows);
        tx.execute(
            snapshot_row::LEASE_UPSERT_SQL,
            Params::Positional(vec![
                Value::Text(name),
                Value::Text(holder.to_string()),
                Value::Integer((now + ttl).timestamp_micros()),
            ]),
        )
        .await
        .map_err(db_err("Failed to write lease"))?;
        tx.commit().await.map_err(db_err("Failed to commit lease"))?;
        Ok(())
    }

    async fn release_lease(&mut self, holder: &str) -> StoreResult<()> {
        let name = self.lease_name();
        self.conn()?
            .execute(
                snapshot_row::LEASE_DELETE_SQL,
                Params::Positional(vec![Value::Text(name), Value::Text(holder.to_string())]),
            )
            .await
            .map_err(db_err("Failed to release lease"))?;
        Ok(())
    }

    async fn load_all(&mut self) -> StoreResult<Vec<MedicineRecord>> {
        let mut rows = self
            .conn()?
            .query(&snapshot_row::select_sql(&self.table), ())
            .await
            .map_err(db_err("Failed to load rows"))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err("Failed to load rows"))? {
            let values = (0..COLUMNS.len() as i32)
                .map(|i| row.get_value(i).map(SqlValue::from))
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err("Failed to decode row"))?;
            out.push(snapshot_row::decode(values));
        }
        Ok(out)
    }

    async fn stats(&mut self) -> StoreResult<StoreStats> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(&format!("SELECT COUNT(*) FROM {}", self.table), ())
            .await
            .map_err(db_err("Failed to count rows"))?;
        let count: i64 = match rows.next().await.map_err(db_err("Failed to count rows"))? {
            Some(row) => row.get(0).map_err(db_err("Failed to count rows"))?,
            None => 0,
        };
        let mut rows = conn
            .query(
                &format!("SELECT DISTINCT updated_at FROM {} ORDER BY updated_at", self.table),
                (),
            )
            .await
            .map_err(db_err("Failed to read stamps"))?;
        let mut stamps = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err("Failed to read stamps"))? {
            let micros: i64 = row.get(0).map_err(db_err("Failed to read stamps"))?;
            stamps.extend(from_micros(micros));
        }
        Ok(StoreStats {
            rows: count as u64,
            stamps,
        })
    }

    async fn close(&mut self) -> StoreResult<()> {
        // Remote connections have no explicit close; dropping releases them.
        self.conn.take().map(drop).ok_or(StoreError::Closed)
    }
}

/// Connects with `LIBSQL_URL` / `LIBSQL_AUTH_TOKEN` style settings.
///
/// A `file:` URL opens an embedded database at that path instead of a
/// remote one.
pub struct LibsqlConnector {
    db: Arc<Database>,
    table: String,
}

impl LibsqlConnector {
    pub async fn new(url: &str, auth_token: &str, table: &str) -> StoreResult<Self> {
        validate_table_name(table)?;
        let db = match url.strip_prefix("file:") {
            Some(path) => {
                info!("Opening local libSQL database at {}", path);
                Builder::new_local(path).build().await
            }
            None => {
                info!("Connecting to Turso database at {}", url);
                Builder::new_remote(url.to_string(), auth_token.to_string())
                    .build()
                    .await
            }
        }
        .map_err(db_err("Failed to connect to database"))?;
        Ok(Self {
            db: Arc::new(db),
            table: table.to_string(),
        })
    }
}

#[async_trait]
impl StoreConnector for LibsqlConnector {
    async fn connect(&self) -> StoreResult<Box<dyn SnapshotStore>> {
        let conn = self
            .db
            .connect()
            .map_err(db_err("Failed to get database connection"))?;
        let store = LibsqlStore {
            conn: Some(conn),
            table: self.table.clone(),
        };
        store.ensure_schema().await?;
        Ok(Box::new(store))
    }
}

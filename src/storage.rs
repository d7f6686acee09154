use crate::app::ports::StoreConnector;
use crate::error::StoreError;
use crate::types::MedicineRecord;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

static TABLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid table name regex"));

/// Table names are interpolated into SQL, so only plain identifiers pass.
pub fn validate_table_name(name: &str) -> StoreResult<()> {
    if TABLE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(StoreError::InvalidTable(name.to_string()))
    }
}

/// Row count and distinct commit stamps currently in the store.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct StoreStats {
    pub rows: u64,
    pub stamps: Vec<DateTime<Utc>>,
}

/// One session against the snapshot table, keyed by `yj_code`.
///
/// A session is owned by a single commit and closed when it ends.
#[async_trait]
pub trait SnapshotStore: Send {
    /// Insert or fully overwrite each record by key. The batch is atomic.
    async fn replace_batch(&mut self, records: &[MedicineRecord]) -> StoreResult<()>;

    /// Delete every row stamped before `cutoff` inside one transaction.
    async fn purge_older_than(&mut self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    /// Take the snapshot lease for `holder` until `now + ttl`.
    ///
    /// Fails with [`StoreError::LeaseHeld`] while another holder's lease is
    /// unexpired; an expired lease is taken over.
    async fn acquire_lease(&mut self, holder: &str, now: DateTime<Utc>, ttl: Duration)
        -> StoreResult<()>;

    /// Drop the lease if `holder` still owns it.
    async fn release_lease(&mut self, holder: &str) -> StoreResult<()>;

    /// Every row, ordered by key.
    async fn load_all(&mut self) -> StoreResult<Vec<MedicineRecord>>;

    async fn stats(&mut self) -> StoreResult<StoreStats>;

    async fn close(&mut self) -> StoreResult<()>;
}

#[derive(Debug, Clone)]
struct Lease {
    holder: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SharedTable {
    rows: BTreeMap<String, MedicineRecord>,
    lease: Option<Lease>,
    sessions_closed: usize,
}

/// In-memory store for development and testing.
///
/// Clones share one table, so each clone acts as an independent session
/// against the same data. That is enough to simulate overlapping runs.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    table: Arc<Mutex<SharedTable>>,
    closed: bool,
    fail_replace_after: Option<usize>,
    fail_purge: bool,
    batches_written: usize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new session on the same table.
    pub fn session(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
            ..Self::default()
        }
    }

    /// Sessions created from this store fail every replace batch after the
    /// first `n`.
    pub fn failing_replace_after(mut self, n: usize) -> Self {
        self.fail_replace_after = Some(n);
        self
    }

    pub fn failing_purge(mut self) -> Self {
        self.fail_purge = true;
        self
    }

    pub fn sessions_closed(&self) -> usize {
        self.lock().map(|t| t.sessions_closed).unwrap_or_default()
    }

    pub fn lease_holder(&self) -> Option<String> {
        self.lock()
            .ok()
            .and_then(|t| t.lease.as_ref().map(|l| l.holder.clone()))
    }

    /// Seed a row directly, bypassing the commit path.
    pub fn insert_raw(&self, record: MedicineRecord) -> StoreResult<()> {
        let key = record
            .natural_key()
            .map(str::to_string)
            .ok_or_else(|| StoreError::Backend("record has no key".into()))?;
        self.lock()?.rows.insert(key, record);
        Ok(())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, SharedTable>> {
        self.table
            .lock()
            .map_err(|_| StoreError::Backend("in-memory table lock poisoned".into()))
    }

    fn open(&self) -> StoreResult<MutexGuard<'_, SharedTable>> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        self.lock()
    }
}

#[async_trait]
impl SnapshotStore for InMemoryStore {
    async fn replace_batch(&mut self, records: &[MedicineRecord]) -> StoreResult<()> {
        if let Some(limit) = self.fail_replace_after {
            if self.batches_written >= limit {
                return Err(StoreError::Backend("injected replace failure".into()));
            }
        }
        let mut table = self.open()?;
        let mut staged = Vec::with_capacity(records.len());
        for record in records {
            let key = record
                .natural_key()
                .ok_or_else(|| StoreError::Backend("record has no key".into()))?;
            staged.push((key.to_string(), record.clone()));
        }
        table.rows.extend(staged);
        drop(table);
        self.batches_written += 1;
        debug!(rows = records.len(), "replaced batch in memory");
        Ok(())
    }

    async fn purge_older_than(&mut self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        if self.fail_purge {
            return Err(StoreError::Backend("injected purge failure".into()));
        }
        let mut table = self.open()?;
        let before = table.rows.len();
        // Rows without a stamp predate any commit and are purged too.
        table
            .rows
            .retain(|_, r| r.updated_at.map_or(false, |at| at >= cutoff));
        Ok((before - table.rows.len()) as u64)
    }

    async fn acquire_lease(
        &mut self,
        holder: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> StoreResult<()> {
        let mut table = self.open()?;
        if let Some(current) = &table.lease {
            if current.holder != holder && current.expires_at > now {
                return Err(StoreError::LeaseHeld {
                    holder: current.holder.clone(),
                });
            }
        }
        table.lease = Some(Lease {
            holder: holder.to_string(),
            expires_at: now + ttl,
        });
        Ok(())
    }

    async fn release_lease(&mut self, holder: &str) -> StoreResult<()> {
        let mut table = self.open()?;
        if table.lease.as_ref().map_or(false, |l| l.holder == holder) {
            table.lease = None;
        }
        Ok(())
    }

    async fn load_all(&mut self) -> StoreResult<Vec<MedicineRecord>> {
        Ok(self.open()?.rows.values().cloned().collect())
    }

    async fn stats(&mut self) -> StoreResult<StoreStats> {
        let table = self.open()?;
        let stamps: BTreeSet<DateTime<Utc>> =
            table.rows.values().filter_map(|r| r.updated_at).collect();
        Ok(StoreStats {
            rows: table.rows.len() as u64,
            stamps: stamps.into_iter().collect(),
        })
    }

    async fn close(&mut self) -> StoreResult<()> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        self.lock()?.sessions_closed += 1;
        self.closed = true;
        Ok(())
    }
}

#[async_trait]
impl StoreConnector for InMemoryStore {
    async fn connect(&self) -> StoreResult<Box<dyn SnapshotStore>> {
        Ok(Box::new(Self {
            table: Arc::clone(&self.table),
            fail_replace_after: self.fail_replace_after,
            fail_purge: self.fail_purge,
            ..Self::default()
        }))
    }
}

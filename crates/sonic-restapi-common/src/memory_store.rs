//! In-process store used by tests and local fixtures.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::db::{DbId, FieldValues, FieldValuesExt};
use crate::error::{StoreError, StoreResult};
use crate::store::{glob_match, KvStore};

#[derive(Default)]
struct Inner {
    records: Mutex<BTreeMap<String, FieldValues>>,
    unavailable: AtomicBool,
}

/// Store backed by a shared ordered map. Clones share the same data.
///
/// Writes are visible immediately, for both the persisted-config and the
/// fast-path tables.
#[derive(Clone)]
pub struct MemoryStore {
    db: DbId,
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new(db: DbId) -> Self {
        Self {
            db,
            inner: Arc::new(Inner::default()),
        }
    }

    fn full_key(&self, table: &str, key: &str) -> String {
        self.db.key(table, key)
    }

    /// Makes every subsequent operation fail, to exercise error paths.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self, operation: &str) -> StoreResult<()> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::database(operation, "store unavailable"));
        }
        Ok(())
    }

    /// All stored keys (with table prefix), sorted.
    pub fn keys(&self) -> Vec<String> {
        self.inner.records.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.lock().is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    fn db(&self) -> DbId {
        self.db
    }

    async fn get(&self, table: &str, key: &str) -> StoreResult<Option<FieldValues>> {
        self.check_available("get")?;
        let full = self.full_key(table, key);
        Ok(self.inner.records.lock().get(&full).cloned())
    }

    async fn scan(&self, table: &str, pattern: &str) -> StoreResult<Vec<(String, FieldValues)>> {
        self.check_available("scan")?;
        let prefix = self.full_key(table, "");
        let records = self.inner.records.lock();
        Ok(records
            .iter()
            .filter_map(|(k, v)| {
                let short = k.strip_prefix(&prefix)?;
                glob_match(pattern, short).then(|| (short.to_string(), v.clone()))
            })
            .collect())
    }

    async fn upsert(&self, table: &str, key: &str, fields: &FieldValues) -> StoreResult<()> {
        self.check_available("upsert")?;
        let full = self.full_key(table, key);
        let mut records = self.inner.records.lock();
        let record = records.entry(full).or_default();
        for (field, value) in fields {
            record.set_field(field, value.clone());
        }
        Ok(())
    }

    async fn delete(&self, table: &str, key: &str) -> StoreResult<()> {
        self.check_available("delete")?;
        let full = self.full_key(table, key);
        self.inner.records.lock().remove(&full);
        Ok(())
    }
}

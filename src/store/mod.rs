//! # Persistence seam.
//!
//! The reconciliation services read rows by id through [`Repository`]; the dispatcher
//! never touches the store directly.
//!
//! [`MemoryRepository`] is an in-memory table used by single-process deployments,
//! demos and tests. It can be switched to "unavailable" to simulate an outage.
//!
//! [`Stores`] bundles the three tables a node reads. Nodes of one cluster share the
//! same backing tables; [`MemoryStores`] gives in-process nodes such a shared set.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::services::{FormDef, ListenerDef, SchedulerDef};

/// A row addressable by a numeric id.
pub trait Row: Clone + Send + Sync + 'static {
    fn id(&self) -> i64;
}

/// Read access to one table.
#[async_trait]
pub trait Repository<T: Row>: Send + Sync + 'static {
    /// Returns the row with `id`, or `None` if it does not exist (e.g. already deleted).
    async fn find(&self, id: i64) -> Result<Option<T>, StoreError>;

    /// Returns every row, ordered by id.
    async fn all(&self) -> Result<Vec<T>, StoreError>;
}

/// In-memory table.
#[derive(Debug)]
pub struct MemoryRepository<T> {
    table: &'static str,
    rows: RwLock<BTreeMap<i64, T>>,
    unavailable: AtomicBool,
}

impl<T: Row> MemoryRepository<T> {
    /// Creates an empty table.
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            rows: RwLock::new(BTreeMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Inserts or replaces a row. Returns the previous row with the same id.
    pub fn upsert(&self, row: T) -> Option<T> {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        rows.insert(row.id(), row)
    }

    /// Deletes a row. Returns it if it existed.
    pub fn delete(&self, id: i64) -> Option<T> {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        rows.remove(&id)
    }

    /// Makes every read fail with [`StoreError::Unavailable`] until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable {
                reason: format!("table `{}` is offline", self.table),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Row> Repository<T> for MemoryRepository<T> {
    async fn find(&self, id: i64) -> Result<Option<T>, StoreError> {
        self.check()?;
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        Ok(rows.get(&id).cloned())
    }

    async fn all(&self) -> Result<Vec<T>, StoreError> {
        self.check()?;
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        Ok(rows.values().cloned().collect())
    }
}

/// The tables a node reconciles against.
#[derive(Clone)]
pub struct Stores {
    pub schedulers: Arc<dyn Repository<SchedulerDef>>,
    pub listeners: Arc<dyn Repository<ListenerDef>>,
    pub forms: Arc<dyn Repository<FormDef>>,
}

/// In-memory tables, kept typed so tests and demos can write rows.
#[derive(Clone, Debug)]
pub struct MemoryStores {
    pub schedulers: Arc<MemoryRepository<SchedulerDef>>,
    pub listeners: Arc<MemoryRepository<ListenerDef>>,
    pub forms: Arc<MemoryRepository<FormDef>>,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self {
            schedulers: Arc::new(MemoryRepository::new("scheduler")),
            listeners: Arc::new(MemoryRepository::new("event_listener")),
            forms: Arc::new(MemoryRepository::new("form")),
        }
    }

    /// Read handles for a node.
    pub fn stores(&self) -> Stores {
        Stores {
            schedulers: self.schedulers.clone(),
            listeners: self.listeners.clone(),
            forms: self.forms.clone(),
        }
    }
}

impl Default for MemoryStores {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Thing {
        id: i64,
        label: &'static str,
    }

    impl Row for Thing {
        fn id(&self) -> i64 {
            self.id
        }
    }

    #[tokio::test]
    async fn test_upsert_find_delete() {
        let repo = MemoryRepository::new("things");
        assert!(repo.upsert(Thing { id: 2, label: "b" }).is_none());
        repo.upsert(Thing { id: 1, label: "a" });
        let prev = repo.upsert(Thing { id: 2, label: "b2" });
        assert_eq!(prev.map(|t| t.label), Some("b"));

        assert_eq!(repo.find(2).await.unwrap().map(|t| t.label), Some("b2"));
        let ids: Vec<i64> = repo.all().await.unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);

        repo.delete(2);
        assert_eq!(repo.find(2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unavailable_fails_reads() {
        let repo: MemoryRepository<Thing> = MemoryRepository::new("things");
        repo.set_unavailable(true);
        let err = repo.find(1).await.unwrap_err();
        assert_eq!(err.as_label(), "store_unavailable");
        repo.set_unavailable(false);
        assert!(repo.find(1).await.unwrap().is_none());
    }
}

//! # Form service - cached form definitions reconciled against form rows.
//!
//! Forms are read far more often than they change, so each node keeps them in memory,
//! indexed by id and by name. Readers get an `Arc<FormDef>` snapshot; a reload swaps
//! the pointer and never mutates a form in place.
//!
//! ## Rules
//! - At most **one** cached form per id; every row in the store stays reachable by id.
//! - When rows share a name, `form_by_name` returns the one loaded last.
//! - `remove_form` of an unknown id is a no-op.
//! - A missing row evicts the cached form.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::ReconcileError;
use crate::store::{Repository, Row};

/// Input kind of a form field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FieldKind {
    Text,
    Number,
    Boolean,
    Date,
    Email,
    /// One value out of a fixed list.
    Select { options: Vec<String> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
}

/// A form row: name plus ordered fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormDef {
    pub id: i64,
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl FormDef {
    /// Returns the field called `name`.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of required fields, in declaration order.
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter(|f| f.required).map(|f| f.name.as_str())
    }
}

impl Row for FormDef {
    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Default)]
struct Cache {
    by_id: HashMap<i64, Arc<FormDef>>,
    by_name: HashMap<String, i64>,
}

impl Cache {
    /// Caches `form`. Every id stays cached; a shared name resolves to the latest insert.
    fn insert(&mut self, form: FormDef) {
        self.evict(form.id);
        if let Some(other) = self.by_name.insert(form.name.clone(), form.id) {
            debug!(form = form.id, shadowed = other, name = %form.name, "form name now resolves to a newer row");
        }
        self.by_id.insert(form.id, Arc::new(form));
    }

    fn evict(&mut self, id: i64) -> Option<Arc<FormDef>> {
        let old = self.by_id.remove(&id)?;
        if self.by_name.get(&old.name) == Some(&id) {
            // Hand the name back to a remaining form that carries it.
            match self.by_id.values().find(|f| f.name == old.name) {
                Some(other) => self.by_name.insert(old.name.clone(), other.id),
                None => self.by_name.remove(&old.name),
            };
        }
        Some(old)
    }
}

/// Per-node form cache.
pub struct FormService {
    repo: Arc<dyn Repository<FormDef>>,
    cache: RwLock<Cache>,
}

impl FormService {
    pub fn new(repo: Arc<dyn Repository<FormDef>>) -> Arc<Self> {
        Arc::new(Self {
            repo,
            cache: RwLock::new(Cache::default()),
        })
    }

    /// Reads row `id` into the cache (or evicts it if the row is gone).
    pub async fn add_form(&self, id: i64) -> Result<(), ReconcileError> {
        let row = self.repo.find(id).await?;
        let mut cache = self.cache.write().await;
        match row {
            Some(form) if cache.by_id.get(&id).is_some_and(|f| **f == form) => {
                debug!(form = id, "form already cached with this definition");
            }
            Some(form) => {
                info!(form = id, name = %form.name, "form cached");
                cache.insert(form);
            }
            None => {
                debug!(form = id, "row not found; treating as deleted");
                cache.evict(id);
            }
        }
        Ok(())
    }

    /// Evicts form `id` and reads it again.
    pub async fn reload_form(&self, id: i64) -> Result<(), ReconcileError> {
        self.cache.write().await.evict(id);
        self.add_form(id).await
    }

    /// Evicts form `id`, if cached.
    pub async fn remove_form(&self, id: i64) -> Result<(), ReconcileError> {
        if self.cache.write().await.evict(id).is_some() {
            info!(form = id, "form evicted");
        }
        Ok(())
    }

    /// Replaces the whole cache with the contents of the table.
    pub async fn load_all(&self) -> Result<usize, ReconcileError> {
        let rows = self.repo.all().await?;
        let mut cache = self.cache.write().await;
        *cache = Cache::default();
        for form in rows {
            cache.insert(form);
        }
        Ok(cache.by_id.len())
    }

    pub async fn form(&self, id: i64) -> Option<Arc<FormDef>> {
        self.cache.read().await.by_id.get(&id).cloned()
    }

    pub async fn form_by_name(&self, name: &str) -> Option<Arc<FormDef>> {
        let cache = self.cache.read().await;
        let id = cache.by_name.get(name)?;
        cache.by_id.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.by_id.is_empty()
    }
}

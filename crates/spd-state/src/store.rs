//! StateStore — redb-backed document persistence for SPD.
//!
//! Provides typed insert / find / update / remove operations over any [`Document`].
//! All values are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// A JSON document stored in its own table, keyed by its id.
pub trait Document: Serialize + DeserializeOwned {
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]>;
    /// Human-readable collection name for logs and errors.
    const KIND: &'static str;

    fn id(&self) -> &str;
}

impl Document for Forecast {
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = FORECASTS;
    const KIND: &'static str = "forecast";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Document for ProfileCatalogue {
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = PROFILES;
    const KIND: &'static str = "profile catalogue";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Document for Policy {
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = POLICIES;
    const KIND: &'static str = "policy";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Thread-safe document store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(FORECASTS).map_err(map_err!(Table))?;
        txn.open_table(PROFILES).map_err(map_err!(Table))?;
        txn.open_table(POLICIES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Insert a new document. Fails if a document with the same id exists.
    pub fn insert<D: Document>(&self, doc: &D) -> StateResult<()> {
        let key = doc.id();
        if key.is_empty() {
            return Err(StateError::Write(format!("{} without id", D::KIND)));
        }
        let value = serde_json::to_vec(doc).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(D::TABLE).map_err(map_err!(Table))?;
            if table.get(key).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::AlreadyExists(format!("{} {key}", D::KIND)));
            }
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(kind = D::KIND, %key, "document inserted");
        Ok(())
    }

    /// Replace the document stored under `id`. Fails if none exists.
    pub fn update<D: Document>(&self, id: &str, doc: &D) -> StateResult<()> {
        let value = serde_json::to_vec(doc).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(D::TABLE).map_err(map_err!(Table))?;
            if table.get(id).map_err(map_err!(Read))?.is_none() {
                return Err(StateError::NotFound(format!("{} {id}", D::KIND)));
            }
            table
                .insert(id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(kind = D::KIND, %id, "document updated");
        Ok(())
    }

    /// Delete the document stored under `id`. Returns whether it existed.
    pub fn remove<D: Document>(&self, id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(D::TABLE).map_err(map_err!(Table))?;
            existed = table.remove(id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(kind = D::KIND, %id, existed, "document removed");
        Ok(existed)
    }

    /// Get a document by id.
    pub fn find<D: Document>(&self, id: &str) -> StateResult<Option<D>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(D::TABLE).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let doc: D =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    /// List every document of a kind.
    pub fn find_all<D: Document>(&self) -> StateResult<Vec<D>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(D::TABLE).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let doc: D = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(doc);
        }
        Ok(results)
    }
}

//! redb-backed host status persistence.
//!
//! Rows are JSON-serialized `HostRecord`s in the `hosts` table. The store
//! supports both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableError};
use tracing::{debug, info};

use hostcheck_core::UpsertMode;

use crate::error::{StateError, StateResult, map_err};
use crate::tables::*;
use crate::types::*;
use crate::upsert::{SchemaLayout, UpsertOutcome, UpsertStrategy, decode};

/// Options applied when opening a store.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreOptions {
    pub upsert: UpsertMode,
}

/// Thread-safe host status store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    strategy: UpsertStrategy,
    layout: SchemaLayout,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("strategy", &self.strategy)
            .field("layout", &self.layout)
            .finish()
    }
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        Self::open_with(path, StoreOptions::default())
    }

    pub fn open_with(path: &Path, options: StoreOptions) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self::init(db, options)?;
        debug!(?path, strategy = ?store.strategy, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        Self::open_in_memory_with(StoreOptions::default())
    }

    pub fn open_in_memory_with(options: StoreOptions) -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self::init(db, options)?;
        debug!(strategy = ?store.strategy, "in-memory state store opened");
        Ok(store)
    }

    fn init(db: Database, options: StoreOptions) -> StateResult<Self> {
        let layout = detect_layout(&db)?;
        if layout == SchemaLayout::Fresh {
            create_tables(&db)?;
        }
        let strategy = UpsertStrategy::select(options.upsert, layout);
        if let SchemaLayout::Legacy { version } = layout {
            info!(?version, ?strategy, "legacy store layout detected");
        }
        Ok(Self {
            db: Arc::new(db),
            strategy,
            layout,
        })
    }

    /// Upsert strategy selected when the store was opened.
    pub fn strategy(&self) -> UpsertStrategy {
        self.strategy
    }

    /// Layout found on disk when the store was opened.
    pub fn layout(&self) -> SchemaLayout {
        self.layout
    }

    // ── Hosts ──────────────────────────────────────────────────────

    /// Insert a host row or refresh an existing one, keeping its `added` time.
    pub fn upsert_host(&self, record: &StatusRecord) -> StateResult<UpsertOutcome> {
        self.strategy.apply(&self.db, record)
    }

    /// Get the row for a hostname.
    pub fn get_host(&self, hostname: &str) -> StateResult<Option<HostRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
        match table.get(hostname).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// List all rows, ordered by hostname.
    pub fn list_hosts(&self) -> StateResult<Vec<HostRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    pub fn count_hosts(&self) -> StateResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
        table.len().map_err(map_err!(Read))
    }
}

/// Inspect the tables present to tell a fresh, legacy or current store apart.
fn detect_layout(db: &Database) -> StateResult<SchemaLayout> {
    let txn = db.begin_read().map_err(map_err!(Transaction))?;
    match txn.open_table(HOSTS) {
        Ok(_) => {}
        Err(TableError::TableDoesNotExist(_)) => return Ok(SchemaLayout::Fresh),
        Err(e) => return Err(StateError::Table(e.to_string())),
    }
    let version = match txn.open_table(META) {
        Ok(meta) => {
            let version = meta
                .get(SCHEMA_VERSION_KEY)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value());
            version
        }
        Err(TableError::TableDoesNotExist(_)) => None,
        Err(e) => return Err(StateError::Table(e.to_string())),
    };
    Ok(match version {
        Some(version) if version >= SCHEMA_VERSION => SchemaLayout::Current { version },
        version => SchemaLayout::Legacy { version },
    })
}

fn create_tables(db: &Database) -> StateResult<()> {
    let txn = db.begin_write().map_err(map_err!(Transaction))?;
    {
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(HOSTS).map_err(map_err!(Table))?;
        let mut meta = txn.open_table(META).map_err(map_err!(Table))?;
        meta.insert(SCHEMA_VERSION_KEY, SCHEMA_VERSION)
            .map_err(map_err!(Write))?;
    }
    txn.commit().map_err(map_err!(Transaction))?;
    Ok(())
}

//! In-memory document store with handle accounting.
//!
//! Tables live in a shared map; every handle open, flush and close is
//! counted so callers can verify release discipline.

use super::sql::{SqlConnection, SqlError};
use super::{DocumentDriver, DocumentStore, DocumentStream, DriverError, DriverResult};
use crate::mapping::{Document, DocumentKey};
use crate::query::Query;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

static COUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*SELECT\s+COUNT\(\*\)\s+FROM\s+dfs\.`([^`]+)`\s*;?\s*$")
        .expect("valid count regex")
});

type Table = BTreeMap<DocumentKey, Document>;
type Tables = BTreeMap<String, Table>;

#[derive(Debug, Default)]
struct Counters {
    opened: AtomicUsize,
    flushed: AtomicUsize,
    closed: AtomicUsize,
}

/// Handle accounting snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub opened: usize,
    pub flushed: usize,
    pub closed: usize,
}

impl StoreStats {
    /// Handles opened but not closed yet.
    pub fn open_handles(&self) -> usize {
        self.opened.saturating_sub(self.closed)
    }
}

/// Document driver keeping tables in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentDriver {
    tables: Arc<Mutex<Tables>>,
    counters: Arc<Counters>,
}

impl MemoryDocumentDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            opened: self.counters.opened.load(Ordering::SeqCst),
            flushed: self.counters.flushed.load(Ordering::SeqCst),
            closed: self.counters.closed.load(Ordering::SeqCst),
        }
    }

    /// Relational connection counting documents of this driver's tables.
    pub fn sql_connection(&self) -> MemorySqlConnection {
        MemorySqlConnection {
            tables: Arc::clone(&self.tables),
        }
    }

    /// Number of documents stored at `path`, or `None` without such table.
    pub fn document_count(&self, path: &str) -> DriverResult<Option<usize>> {
        let tables = lock(&self.tables)?;
        Ok(tables.get(path).map(BTreeMap::len))
    }
}

fn lock(tables: &Mutex<Tables>) -> DriverResult<MutexGuard<'_, Tables>> {
    tables.lock().map_err(|_| DriverError::Poisoned("memory tables"))
}

impl DocumentDriver for MemoryDocumentDriver {
    type Store = MemoryDocumentStore;

    fn open_store(&self, path: &str) -> DriverResult<Self::Store> {
        if !lock(&self.tables)?.contains_key(path) {
            return Err(DriverError::TableNotFound(path.to_string()));
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryDocumentStore {
            path: path.to_string(),
            tables: Arc::clone(&self.tables),
            counters: Arc::clone(&self.counters),
            closed: false,
        })
    }

    fn create_table(&self, path: &str) -> DriverResult<()> {
        let mut tables = lock(&self.tables)?;
        if tables.contains_key(path) {
            return Err(DriverError::TableExists(path.to_string()));
        }
        tables.insert(path.to_string(), Table::new());
        Ok(())
    }

    fn drop_table(&self, path: &str) -> DriverResult<()> {
        match lock(&self.tables)?.remove(path) {
            Some(_) => Ok(()),
            None => Err(DriverError::TableNotFound(path.to_string())),
        }
    }

    fn table_exists(&self, path: &str) -> DriverResult<bool> {
        Ok(lock(&self.tables)?.contains_key(path))
    }
}

/// Handle on one in-memory table.
#[derive(Debug)]
pub struct MemoryDocumentStore {
    path: String,
    tables: Arc<Mutex<Tables>>,
    counters: Arc<Counters>,
    closed: bool,
}

impl MemoryDocumentStore {
    fn with_table<R>(&self, action: impl FnOnce(&mut Table) -> DriverResult<R>) -> DriverResult<R> {
        if self.closed {
            return Err(DriverError::StoreClosed(self.path.clone()));
        }
        let mut tables = lock(&self.tables)?;
        let table = tables
            .get_mut(&self.path)
            .ok_or_else(|| DriverError::TableNotFound(self.path.clone()))?;
        action(table)
    }

    fn key_of(&self, document: &Document) -> DriverResult<DocumentKey> {
        document
            .key()
            .cloned()
            .ok_or_else(|| DriverError::MissingKey(self.path.clone()))
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn path(&self) -> &str {
        &self.path
    }

    fn insert(&mut self, document: &Document) -> DriverResult<()> {
        let key = self.key_of(document)?;
        self.with_table(|table| {
            if table.contains_key(&key) {
                return Err(DriverError::DuplicateKey {
                    path: self.path.clone(),
                    key,
                });
            }
            table.insert(key, document.clone());
            Ok(())
        })
    }

    fn insert_or_replace(&mut self, document: &Document) -> DriverResult<()> {
        let key = self.key_of(document)?;
        self.with_table(|table| {
            table.insert(key, document.clone());
            Ok(())
        })
    }

    fn find_by_id(&self, key: &DocumentKey) -> DriverResult<Option<Document>> {
        self.with_table(|table| Ok(table.get(key).cloned()))
    }

    fn find(&self, query: &Query) -> DriverResult<DocumentStream> {
        self.with_table(|table| {
            Ok(DocumentStream::new(
                query.apply(table.values().cloned().collect::<Vec<_>>()),
            ))
        })
    }

    fn delete_by_id(&mut self, key: &DocumentKey) -> DriverResult<()> {
        self.with_table(|table| {
            table.remove(key);
            Ok(())
        })
    }

    fn flush(&mut self) -> DriverResult<()> {
        if self.closed {
            return Err(DriverError::StoreClosed(self.path.clone()));
        }
        self.counters.flushed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Err(DriverError::StoreClosed(self.path.clone()));
        }
        self.closed = true;
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Relational connection answering the count statement over in-memory
/// tables.
#[derive(Debug, Clone)]
pub struct MemorySqlConnection {
    tables: Arc<Mutex<Tables>>,
}

impl SqlConnection for MemorySqlConnection {
    type Error = SqlError;

    fn query_scalar(&self, sql: &str) -> Result<String, SqlError> {
        let path = COUNT_RE
            .captures(sql)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| SqlError::Statement(format!("unsupported statement: {sql}")))?;

        let tables = self
            .tables
            .lock()
            .map_err(|_| SqlError::Statement("memory tables lock poisoned".to_string()))?;
        tables
            .get(path)
            .map(|table| table.len().to_string())
            .ok_or_else(|| SqlError::Statement(format!("table not found: dfs.`{path}`")))
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryDocumentDriver;
    use crate::driver::{count_statement, DocumentDriver, DocumentStore, DriverError, SqlConnection};
    use crate::mapping::{Document, DocumentKey};
    use crate::query::{Condition, Query};

    #[test]
    fn integer_keys_iterate_numerically() {
        let driver = MemoryDocumentDriver::new();
        driver.create_table("/n").unwrap();
        let mut store = driver.open_store("/n").unwrap();
        for key in [10_i64, 2, 33] {
            let mut document = Document::with_key(DocumentKey::from(key));
            document.set("even", key % 2 == 0);
            store.insert(&document).unwrap();
        }

        let keys: Vec<Option<DocumentKey>> = store
            .find(&Query::new().filter(Condition::eq("even", true)))
            .unwrap()
            .map(|document| document.key().cloned())
            .collect();
        assert_eq!(
            keys,
            vec![Some(DocumentKey::Integer(2)), Some(DocumentKey::Integer(10))]
        );
    }

    #[test]
    fn keyless_documents_are_rejected() {
        let driver = MemoryDocumentDriver::new();
        driver.create_table("/n").unwrap();
        let mut store = driver.open_store("/n").unwrap();

        assert!(matches!(
            store.insert(&Document::new()),
            Err(DriverError::MissingKey(_))
        ));
        assert!(matches!(
            store.delete(&Document::new()),
            Err(DriverError::MissingKey(_))
        ));
    }

    #[test]
    fn sql_connection_counts_and_rejects_other_statements() {
        let driver = MemoryDocumentDriver::new();
        driver.create_table("/db/t").unwrap();
        let mut store = driver.open_store("/db/t").unwrap();
        store
            .insert(&Document::with_key(DocumentKey::from("a")))
            .unwrap();

        let sql = driver.sql_connection();
        assert_eq!(sql.query_scalar(&count_statement("/db/t")).unwrap(), "1");
        assert!(sql.query_scalar(&count_statement("/db/none")).is_err());
        assert!(sql.query_scalar("DELETE FROM t").is_err());
        assert_eq!(driver.document_count("/db/t").unwrap(), Some(1));
    }
}

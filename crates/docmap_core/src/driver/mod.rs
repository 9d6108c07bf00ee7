//! Document-store driver contracts and implementations.
//!
//! # Responsibility
//! - Define the store/driver boundary consumed by the template.
//! - Provide the scoped `StoreSession` guard releasing handles.
//! - Ship SQLite-backed and in-memory drivers.
//!
//! # Invariants
//! - A handle obtained through `StoreSession` is flushed then closed exactly
//!   once, on success and failure paths alike.
//! - `insert` fails on a duplicate key; `insert_or_replace` never does.

use crate::mapping::{Document, DocumentKey, MappingError};
use crate::query::Query;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod memory;
mod session;
pub mod sql;
pub mod sqlite;

pub use session::StoreSession;
pub use sql::{count_statement, SqlConnection, SqlError};

pub type DriverResult<T> = Result<T, DriverError>;

/// Raw store-level failure. Propagated to callers untranslated.
#[derive(Debug)]
pub enum DriverError {
    Sqlite(rusqlite::Error),
    /// A stored document body cannot be decoded or encoded.
    Mapping(MappingError),
    DuplicateKey {
        path: String,
        key: DocumentKey,
    },
    TableNotFound(String),
    TableExists(String),
    /// The handle for this path was already closed.
    StoreClosed(String),
    /// A keyless document reached a key-addressed operation.
    MissingKey(String),
    /// A shared connection lock was poisoned by a panicking thread.
    Poisoned(&'static str),
}

impl Display for DriverError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Mapping(err) => write!(f, "invalid stored document: {err}"),
            Self::DuplicateKey { path, key } => {
                write!(f, "document `{key}` already exists in `{path}`")
            }
            Self::TableNotFound(path) => write!(f, "table not found: {path}"),
            Self::TableExists(path) => write!(f, "table already exists: {path}"),
            Self::StoreClosed(path) => write!(f, "store handle for `{path}` is closed"),
            Self::MissingKey(path) => write!(f, "document without key cannot be addressed in `{path}`"),
            Self::Poisoned(what) => write!(f, "{what} lock poisoned"),
        }
    }
}

impl Error for DriverError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Mapping(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DriverError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<MappingError> for DriverError {
    fn from(value: MappingError) -> Self {
        Self::Mapping(value)
    }
}

/// Materialized result of a find.
#[derive(Debug)]
pub struct DocumentStream {
    documents: std::vec::IntoIter<Document>,
}

impl DocumentStream {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents: documents.into_iter(),
        }
    }

    /// Releases the stream and any documents not consumed yet.
    pub fn close(self) {}
}

impl Iterator for DocumentStream {
    type Item = Document;

    fn next(&mut self) -> Option<Self::Item> {
        self.documents.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.documents.size_hint()
    }
}

/// Session-scoped handle bound to one table path.
pub trait DocumentStore {
    fn path(&self) -> &str;

    /// Inserts a new document; fails with `DuplicateKey` when the key exists.
    fn insert(&mut self, document: &Document) -> DriverResult<()>;

    /// Inserts or replaces the document stored under the same key.
    fn insert_or_replace(&mut self, document: &Document) -> DriverResult<()>;

    fn find_by_id(&self, key: &DocumentKey) -> DriverResult<Option<Document>>;

    /// Runs `query`; documents come back in ascending key order unless the
    /// query orders them otherwise.
    fn find(&self, query: &Query) -> DriverResult<DocumentStream>;

    /// Deletes the document stored under `document`'s key.
    fn delete(&mut self, document: &Document) -> DriverResult<()> {
        match document.key() {
            Some(key) => self.delete_by_id(key),
            None => Err(DriverError::MissingKey(self.path().to_string())),
        }
    }

    fn delete_by_id(&mut self, key: &DocumentKey) -> DriverResult<()>;

    /// Deletes every document of `stream`, returning how many were deleted.
    fn delete_stream(&mut self, stream: DocumentStream) -> DriverResult<u64> {
        let mut deleted = 0;
        for document in stream {
            self.delete(&document)?;
            deleted += 1;
        }
        Ok(deleted)
    }

    fn flush(&mut self) -> DriverResult<()>;

    fn close(&mut self) -> DriverResult<()>;
}

/// Long-lived document-store connection.
pub trait DocumentDriver {
    type Store: DocumentStore;

    /// Opens a handle on an existing table.
    fn open_store(&self, path: &str) -> DriverResult<Self::Store>;

    fn create_table(&self, path: &str) -> DriverResult<()>;

    fn drop_table(&self, path: &str) -> DriverResult<()>;

    fn table_exists(&self, path: &str) -> DriverResult<bool>;

    /// Returns a new, unconstrained query.
    fn new_query(&self) -> Query {
        Query::new()
    }
}

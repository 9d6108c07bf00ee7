//! SQLite-backed document store and relational count connection.
//!
//! # Responsibility
//! - Keep each table path as one SQLite table of `(_id, body)` rows, where
//!   `body` is the document's JSON form and `_id` keeps the key's own SQLite
//!   type, so `7` and `'7'` are different keys.
//! - Answer the count statement by attaching the same database file
//!   read-only under the schema name `dfs`.
//!
//! # Invariants
//! - Handles of one driver share a single connection behind a mutex; the
//!   count connection is shared the same way.
//! - Writes are committed per statement; `flush` flushes the page cache.

use super::sql::{SqlConnection, SqlError};
use super::{DocumentDriver, DocumentStore, DocumentStream, DriverError, DriverResult};
use crate::config::StoreConfig;
use crate::error::TemplateResult;
use crate::mapping::{Document, DocumentKey};
use crate::query::Query;
use crate::repo::template::{ConnectionPair, DocumentTemplate};
use log::{debug, error, info, warn};
use rusqlite::types::{ToSqlOutput, Value as SqlValue};
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension, ToSql};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Template over the SQLite drivers.
pub type SqliteTemplate = DocumentTemplate<SqliteDocumentDriver, SqliteSqlConnection>;

/// Document driver storing tables in one SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteDocumentDriver {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDocumentDriver {
    /// Opens (or creates) a SQLite database file.
    ///
    /// # Side effects
    /// - Emits `store_open` logging events with duration and status.
    pub fn open(path: impl AsRef<Path>) -> DriverResult<Self> {
        let started_at = Instant::now();
        info!("event=store_open module=sqlite status=start mode=file");

        match Connection::open(path).and_then(bootstrap_connection) {
            Ok(conn) => {
                info!(
                    "event=store_open module=sqlite status=ok mode=file duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(Self::from_connection(conn))
            }
            Err(err) => {
                error!(
                    "event=store_open module=sqlite status=error mode=file duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err.into())
            }
        }
    }

    /// Opens a private in-memory database.
    ///
    /// Such a database cannot be attached by [`SqliteSqlConnection`].
    pub fn open_in_memory() -> DriverResult<Self> {
        let conn = Connection::open_in_memory().and_then(bootstrap_connection)?;
        info!("event=store_open module=sqlite status=ok mode=memory");
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn table_exists_locked(conn: &Connection, path: &str) -> DriverResult<bool> {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
            [path],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }
}

fn bootstrap_connection(conn: Connection) -> rusqlite::Result<Connection> {
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

fn lock(conn: &Mutex<Connection>) -> DriverResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| DriverError::Poisoned("sqlite connection"))
}

fn quote_table(path: &str) -> String {
    format!("\"{}\"", path.replace('"', "\"\""))
}

impl ToSql for DocumentKey {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            DocumentKey::Text(text) => ToSqlOutput::from(text.as_str()),
            DocumentKey::Integer(int) => ToSqlOutput::from(*int),
        })
    }
}

/// Read-only SQLite URI for a plain file path.
///
/// `%`, `?` and `#` are percent-encoded so they stay part of the path.
fn read_only_uri(path: &str) -> String {
    let mut uri = String::with_capacity(path.len() + 16);
    uri.push_str("file:");
    for c in path.chars() {
        match c {
            '%' => uri.push_str("%25"),
            '?' => uri.push_str("%3f"),
            '#' => uri.push_str("%23"),
            _ => uri.push(c),
        }
    }
    uri.push_str("?mode=ro");
    uri
}

impl DocumentDriver for SqliteDocumentDriver {
    type Store = SqliteDocumentStore;

    fn open_store(&self, path: &str) -> DriverResult<Self::Store> {
        let conn = lock(&self.conn)?;
        if !Self::table_exists_locked(&conn, path)? {
            return Err(DriverError::TableNotFound(path.to_string()));
        }
        Ok(SqliteDocumentStore {
            conn: Arc::clone(&self.conn),
            path: path.to_string(),
            closed: false,
        })
    }

    fn create_table(&self, path: &str) -> DriverResult<()> {
        let conn = lock(&self.conn)?;
        if Self::table_exists_locked(&conn, path)? {
            return Err(DriverError::TableExists(path.to_string()));
        }
        conn.execute_batch(&format!(
            "CREATE TABLE {} (
                _id PRIMARY KEY NOT NULL,
                body TEXT NOT NULL
            );",
            quote_table(path)
        ))?;
        Ok(())
    }

    fn drop_table(&self, path: &str) -> DriverResult<()> {
        let conn = lock(&self.conn)?;
        if !Self::table_exists_locked(&conn, path)? {
            return Err(DriverError::TableNotFound(path.to_string()));
        }
        conn.execute_batch(&format!("DROP TABLE {};", quote_table(path)))?;
        Ok(())
    }

    fn table_exists(&self, path: &str) -> DriverResult<bool> {
        let conn = lock(&self.conn)?;
        Self::table_exists_locked(&conn, path)
    }
}

/// Handle on one SQLite-backed table.
#[derive(Debug)]
pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
    path: String,
    closed: bool,
}

impl SqliteDocumentStore {
    fn connection(&self) -> DriverResult<MutexGuard<'_, Connection>> {
        if self.closed {
            return Err(DriverError::StoreClosed(self.path.clone()));
        }
        lock(&self.conn)
    }

    fn write(&mut self, document: &Document, verb: &str) -> DriverResult<()> {
        let key = document
            .key()
            .ok_or_else(|| DriverError::MissingKey(self.path.clone()))?;
        let body = document.to_json_string()?;
        let conn = self.connection()?;

        let result = conn.execute(
            &format!(
                "{verb} INTO {} (_id, body) VALUES (?1, ?2);",
                quote_table(&self.path)
            ),
            params![key, body],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(failure, _))
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                Err(DriverError::DuplicateKey {
                    path: self.path.clone(),
                    key: key.clone(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn path(&self) -> &str {
        &self.path
    }

    fn insert(&mut self, document: &Document) -> DriverResult<()> {
        self.write(document, "INSERT")
    }

    fn insert_or_replace(&mut self, document: &Document) -> DriverResult<()> {
        self.write(document, "INSERT OR REPLACE")
    }

    fn find_by_id(&self, key: &DocumentKey) -> DriverResult<Option<Document>> {
        let conn = self.connection()?;
        let body: Option<String> = conn
            .query_row(
                &format!(
                    "SELECT body FROM {} WHERE _id = ?1;",
                    quote_table(&self.path)
                ),
                [key],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => Ok(Some(Document::from_json_str(&body)?)),
            None => Ok(None),
        }
    }

    fn find(&self, query: &Query) -> DriverResult<DocumentStream> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!("SELECT body FROM {};", quote_table(&self.path)))?;
        let mut rows = stmt.query([])?;

        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            let body: String = row.get(0)?;
            documents.push(Document::from_json_str(&body)?);
        }
        documents.sort_by(|a, b| a.key().cmp(&b.key()));

        Ok(DocumentStream::new(query.apply(documents)))
    }

    fn delete_by_id(&mut self, key: &DocumentKey) -> DriverResult<()> {
        let conn = self.connection()?;
        conn.execute(
            &format!("DELETE FROM {} WHERE _id = ?1;", quote_table(&self.path)),
            [key],
        )?;
        Ok(())
    }

    fn flush(&mut self) -> DriverResult<()> {
        let conn = self.connection()?;
        conn.cache_flush()?;
        Ok(())
    }

    fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Err(DriverError::StoreClosed(self.path.clone()));
        }
        self.closed = true;
        Ok(())
    }
}

/// Relational connection answering the count statement over a SQLite
/// document database.
#[derive(Debug)]
pub struct SqliteSqlConnection {
    conn: Mutex<Connection>,
}

impl SqliteSqlConnection {
    /// Attaches the document database at `host` read-only as `dfs`.
    ///
    /// Returns `None` when the database cannot be opened. SQLite has no
    /// authentication, so `username` and `password` are not used.
    pub fn connect(host: &str, username: &str, password: &str) -> Option<Self> {
        if !username.is_empty() || !password.is_empty() {
            debug!("event=sql_connect module=sqlite status=info credentials=ignored");
        }

        match Self::attach(host) {
            Ok(conn) => {
                info!("event=sql_connect module=sqlite status=ok");
                Some(Self {
                    conn: Mutex::new(conn),
                })
            }
            Err(err) => {
                warn!("event=sql_connect module=sqlite status=error error={err}");
                None
            }
        }
    }

    fn attach(host: &str) -> rusqlite::Result<Connection> {
        let conn = Connection::open_with_flags(
            ":memory:",
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute("ATTACH DATABASE ?1 AS dfs;", [read_only_uri(host)])?;
        Ok(conn)
    }
}

impl SqlConnection for SqliteSqlConnection {
    type Error = SqlError;

    fn query_scalar(&self, sql: &str) -> Result<String, SqlError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| SqlError::Statement("sql connection lock poisoned".to_string()))?;
        let value: SqlValue = conn.query_row(sql, [], |row| row.get(0))?;
        match value {
            SqlValue::Integer(int) => Ok(int.to_string()),
            SqlValue::Real(real) => Ok(real.to_string()),
            SqlValue::Text(text) => Ok(text),
            SqlValue::Null | SqlValue::Blob(_) => Err(SqlError::Statement(format!(
                "statement returned a non-scalar value: {sql}"
            ))),
        }
    }
}

/// Opens a template over a SQLite document database described by `config`.
///
/// A relational connection that cannot be established is tolerated; counts
/// then fail with a resource-usage error.
pub fn open_template(config: &StoreConfig) -> TemplateResult<SqliteTemplate> {
    config.validate()?;

    let documents = SqliteDocumentDriver::open(&config.store_path)?;
    let sql = SqliteSqlConnection::connect(
        config.sql_host(),
        &config.sql_username,
        &config.sql_password,
    );

    Ok(DocumentTemplate::new(
        config.database_name.clone(),
        ConnectionPair::new(documents, sql),
    ))
}

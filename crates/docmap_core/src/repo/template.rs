//! Document operations engine.
//!
//! # Responsibility
//! - Map entities to documents and run CRUD, count and query operations
//!   against a document driver.
//! - Resolve table paths under the configured database root.
//! - Route relational count failures through the exception translator.
//!
//! # Invariants
//! - Every store handle opened by an operation is flushed then closed exactly
//!   once, on success and failure paths alike.
//! - Multi-object operations share one handle and never open one for empty
//!   input.
//! - Identity is resolved before any handle is opened.
//! - Only textual keys are generated.

use crate::driver::{
    count_statement, DocumentDriver, DocumentStore, DocumentStream, SqlConnection, SqlError,
    StoreSession,
};
use crate::error::{TemplateError, TemplateResult};
use crate::mapping::{
    resolve_absolute_path, resolve_identity, resolve_table_path, Document, DocumentKey, Entity,
    JsonCodec, MappingError,
};
use crate::query::{Condition, Query, QueryDescriptor, QueryKind, QueryOutcome};
use crate::translate::ExceptionTranslator;
use log::debug;
use serde_json::Value;
use std::time::Instant;
use uuid::Uuid;

/// Document-store driver plus the optional relational connection used for
/// counting.
#[derive(Debug)]
pub struct ConnectionPair<D, Q> {
    pub documents: D,
    pub sql: Option<Q>,
}

impl<D, Q> ConnectionPair<D, Q> {
    pub fn new(documents: D, sql: Option<Q>) -> Self {
        Self { documents, sql }
    }
}

/// Entity-oriented operations over a document store.
///
/// Methods taking a `name` address the table `name` under the database root;
/// the others derive the table from the entity's descriptor.
pub trait DocumentOperations {
    type Driver: DocumentDriver;

    fn driver(&self) -> &Self::Driver;

    /// Returns a new, unconstrained query.
    fn new_query(&self) -> Query {
        self.driver().new_query()
    }

    fn create_table(&self, name: &str) -> TemplateResult<()>;

    fn create_table_for<T: Entity>(&self) -> TemplateResult<()> {
        self.create_table(&table_path::<T>())
    }

    fn drop_table(&self, name: &str) -> TemplateResult<()>;

    fn drop_table_for<T: Entity>(&self) -> TemplateResult<()> {
        self.drop_table(&table_path::<T>())
    }

    fn table_exists(&self, name: &str) -> TemplateResult<bool>;

    fn table_exists_for<T: Entity>(&self) -> TemplateResult<bool> {
        self.table_exists(&table_path::<T>())
    }

    /// Opens a handle the caller owns and must flush and close.
    fn store(&self, name: &str) -> TemplateResult<<Self::Driver as DocumentDriver>::Store>;

    fn store_for<T: Entity>(&self) -> TemplateResult<<Self::Driver as DocumentDriver>::Store> {
        self.store(&table_path::<T>())
    }

    fn find_by_id_in<T, K>(&self, key: K, name: &str) -> TemplateResult<Option<T>>
    where
        T: Entity,
        K: Into<DocumentKey>;

    fn find_by_id<T, K>(&self, key: K) -> TemplateResult<Option<T>>
    where
        T: Entity,
        K: Into<DocumentKey>,
    {
        self.find_by_id_in(key, &table_path::<T>())
    }

    fn find_all_in<T: Entity>(&self, name: &str) -> TemplateResult<Vec<T>> {
        self.execute_in(&self.new_query(), name)
    }

    fn find_all<T: Entity>(&self) -> TemplateResult<Vec<T>> {
        self.find_all_in(&table_path::<T>())
    }

    /// Inserts `entity`, generating a textual key when it has none.
    ///
    /// # Errors
    /// - `DriverError::DuplicateKey` when the key is already stored.
    fn insert_in<T: Entity>(&self, entity: &T, name: &str) -> TemplateResult<T>;

    fn insert<T: Entity>(&self, entity: &T) -> TemplateResult<T> {
        self.insert_in(entity, &table_path::<T>())
    }

    fn insert_all_in<T: Entity>(&self, entities: &[T], name: &str) -> TemplateResult<Vec<T>>;

    fn insert_all<T: Entity>(&self, entities: &[T]) -> TemplateResult<Vec<T>> {
        self.insert_all_in(entities, &table_path::<T>())
    }

    /// Inserts or replaces `entity`, generating a textual key when it has
    /// none.
    fn save_in<T: Entity>(&self, entity: &T, name: &str) -> TemplateResult<T>;

    fn save<T: Entity>(&self, entity: &T) -> TemplateResult<T> {
        self.save_in(entity, &table_path::<T>())
    }

    fn save_all_in<T: Entity>(&self, entities: &[T], name: &str) -> TemplateResult<Vec<T>>;

    fn save_all<T: Entity>(&self, entities: &[T]) -> TemplateResult<Vec<T>> {
        self.save_all_in(entities, &table_path::<T>())
    }

    fn remove_in<T: Entity>(&self, entity: &T, name: &str) -> TemplateResult<()>;

    fn remove<T: Entity>(&self, entity: &T) -> TemplateResult<()> {
        self.remove_in(entity, &table_path::<T>())
    }

    fn remove_by_id_in<T, K>(&self, key: K, name: &str) -> TemplateResult<()>
    where
        T: Entity,
        K: Into<DocumentKey>;

    fn remove_by_id<T, K>(&self, key: K) -> TemplateResult<()>
    where
        T: Entity,
        K: Into<DocumentKey>,
    {
        self.remove_by_id_in::<T, K>(key, &table_path::<T>())
    }

    fn remove_all_of_in<T: Entity>(&self, entities: &[T], name: &str) -> TemplateResult<()>;

    fn remove_all_of<T: Entity>(&self, entities: &[T]) -> TemplateResult<()> {
        self.remove_all_of_in(entities, &table_path::<T>())
    }

    /// Deletes every document of table `name`.
    fn remove_all_in(&self, name: &str) -> TemplateResult<()>;

    fn remove_all<T: Entity>(&self) -> TemplateResult<()> {
        self.remove_all_in(&table_path::<T>())
    }

    /// Counts the documents of table `name` through the relational side.
    ///
    /// # Errors
    /// - `DataAccess(ResourceUsage)` for a `SqlError`, including a missing
    ///   relational connection.
    /// - `Untranslated` for any other connection error, carried unchanged.
    /// - `InvalidData` when the scalar is not an integer.
    fn count_in(&self, name: &str) -> TemplateResult<u64>;

    fn count<T: Entity>(&self) -> TemplateResult<u64> {
        self.count_in(&table_path::<T>())
    }

    fn execute_in<T: Entity>(&self, query: &Query, name: &str) -> TemplateResult<Vec<T>>;

    fn execute<T: Entity>(&self, query: &Query) -> TemplateResult<Vec<T>> {
        self.execute_in(query, &table_path::<T>())
    }

    fn execute_condition_in<T: Entity>(
        &self,
        condition: &Condition,
        name: &str,
    ) -> TemplateResult<Vec<T>> {
        self.execute_in(&self.new_query().filter(condition.clone()), name)
    }

    fn execute_condition<T: Entity>(&self, condition: &Condition) -> TemplateResult<Vec<T>> {
        self.execute_condition_in(condition, &table_path::<T>())
    }

    /// Runs a declared query, shaping the result by the declared kind.
    ///
    /// # Errors
    /// - `Query(Syntax)` when the declared text cannot be parsed.
    /// - `Query(ParameterCount)` when `args` do not match the placeholders.
    fn execute_declared_in<T: Entity>(
        &self,
        descriptor: &QueryDescriptor,
        args: &[Value],
        name: &str,
    ) -> TemplateResult<QueryOutcome<T>>;

    fn execute_declared<T: Entity>(
        &self,
        descriptor: &QueryDescriptor,
        args: &[Value],
    ) -> TemplateResult<QueryOutcome<T>> {
        self.execute_declared_in(descriptor, args, &table_path::<T>())
    }
}

fn table_path<T: Entity>() -> String {
    resolve_table_path(T::descriptor())
}

/// Dash-free lower-case hex rendering of a random v4 UUID.
fn generate_key() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Insert,
    Upsert,
}

impl WriteMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Upsert => "upsert",
        }
    }
}

/// Operations engine over a document driver and a relational connection.
#[derive(Debug)]
pub struct DocumentTemplate<D, Q> {
    database_name: String,
    documents: D,
    sql: Option<Q>,
    codec: JsonCodec,
    translator: ExceptionTranslator,
}

impl<D, Q> DocumentTemplate<D, Q>
where
    D: DocumentDriver,
    Q: SqlConnection,
{
    pub fn new(database_name: impl Into<String>, connections: ConnectionPair<D, Q>) -> Self {
        Self {
            database_name: database_name.into(),
            documents: connections.documents,
            sql: connections.sql,
            codec: JsonCodec,
            translator: ExceptionTranslator::new(),
        }
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn sql_connection(&self) -> Option<&Q> {
        self.sql.as_ref()
    }

    /// Places table `name` under the database root.
    pub fn absolute_path(&self, name: &str) -> String {
        resolve_absolute_path(&self.database_name, name)
    }

    fn open_session(&self, path: &str) -> TemplateResult<StoreSession<D::Store>> {
        Ok(StoreSession::open(&self.documents, path)?)
    }

    /// Runs `action` on a handle for `path`, releasing it afterwards.
    fn with_session<R>(
        &self,
        path: &str,
        action: impl FnOnce(&mut D::Store) -> TemplateResult<R>,
    ) -> TemplateResult<R> {
        let mut session = self.open_session(path)?;
        let result = action(session.store())?;
        session.release()?;
        Ok(result)
    }

    /// Converts `entity`, generating a key when it has none.
    fn keyed_document<T: Entity>(&self, entity: &T) -> TemplateResult<Document> {
        let mut document = self.codec.to_document(entity)?;
        if document.key().is_some() {
            return Ok(document);
        }

        let descriptor = T::descriptor();
        let identity = resolve_identity(descriptor)?;
        if !identity.key_type.supports_generated_key() {
            return Err(MappingError::UnsupportedIdGeneration {
                type_name: descriptor.type_name(),
                key_type: identity.key_type,
            }
            .into());
        }
        document.set_key(DocumentKey::Text(generate_key()));
        Ok(document)
    }

    /// Validates `key` against `T`'s declared key type.
    fn checked_key<T: Entity>(&self, key: DocumentKey) -> TemplateResult<DocumentKey> {
        let descriptor = T::descriptor();
        let identity = resolve_identity(descriptor)?;
        key.ensure_type(descriptor.type_name(), identity.key_type)?;
        Ok(key)
    }

    fn write_all<T: Entity>(
        &self,
        entities: &[T],
        name: &str,
        mode: WriteMode,
    ) -> TemplateResult<Vec<T>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let documents = entities
            .iter()
            .map(|entity| self.keyed_document(entity))
            .collect::<TemplateResult<Vec<_>>>()?;

        let started_at = Instant::now();
        let path = self.absolute_path(name);
        self.with_session(&path, |store| {
            for document in &documents {
                match mode {
                    WriteMode::Insert => store.insert(document)?,
                    WriteMode::Upsert => store.insert_or_replace(document)?,
                }
            }
            Ok(())
        })?;

        debug!(
            "event=documents_write module=template status=ok mode={} path={} count={} duration_ms={}",
            mode.as_str(),
            path,
            documents.len(),
            started_at.elapsed().as_millis()
        );

        documents
            .iter()
            .map(|document| self.codec.to_entity(document).map_err(TemplateError::from))
            .collect()
    }

    fn write_one<T: Entity>(&self, entity: &T, name: &str, mode: WriteMode) -> TemplateResult<T> {
        self.write_all(std::slice::from_ref(entity), name, mode)?
            .pop()
            .ok_or_else(|| TemplateError::InvalidData("write returned no entity".to_string()))
    }

    /// Drains `stream` into entities, then closes it.
    fn collect_entities<T: Entity>(&self, mut stream: DocumentStream) -> TemplateResult<Vec<T>> {
        let mut entities = Vec::with_capacity(stream.size_hint().0);
        for document in stream.by_ref() {
            entities.push(self.codec.to_entity(&document)?);
        }
        stream.close();
        Ok(entities)
    }

    fn translate_sql<E>(&self, err: E) -> TemplateError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match self.translator.translate(err) {
            Ok(translated) => TemplateError::DataAccess(translated),
            Err(raw) => TemplateError::Untranslated(Box::new(raw)),
        }
    }

    fn bound_query(&self, descriptor: &QueryDescriptor, args: &[Value]) -> TemplateResult<Query> {
        let predicate = descriptor.predicate()?;
        let query = self.new_query();
        Ok(match predicate.bind(args)? {
            Some(condition) => query.filter(condition),
            None => query,
        })
    }
}

impl<D, Q> DocumentOperations for DocumentTemplate<D, Q>
where
    D: DocumentDriver,
    Q: SqlConnection,
{
    type Driver = D;

    fn driver(&self) -> &Self::Driver {
        &self.documents
    }

    fn create_table(&self, name: &str) -> TemplateResult<()> {
        let path = self.absolute_path(name);
        self.documents.create_table(&path)?;
        debug!("event=table_create module=template status=ok path={path}");
        Ok(())
    }

    fn drop_table(&self, name: &str) -> TemplateResult<()> {
        let path = self.absolute_path(name);
        self.documents.drop_table(&path)?;
        debug!("event=table_drop module=template status=ok path={path}");
        Ok(())
    }

    fn table_exists(&self, name: &str) -> TemplateResult<bool> {
        Ok(self.documents.table_exists(&self.absolute_path(name))?)
    }

    fn store(&self, name: &str) -> TemplateResult<D::Store> {
        Ok(self.documents.open_store(&self.absolute_path(name))?)
    }

    fn find_by_id_in<T, K>(&self, key: K, name: &str) -> TemplateResult<Option<T>>
    where
        T: Entity,
        K: Into<DocumentKey>,
    {
        let key = self.checked_key::<T>(key.into())?;
        let document = self.with_session(&self.absolute_path(name), |store| {
            Ok(store.find_by_id(&key)?)
        })?;

        match document {
            Some(document) => Ok(Some(self.codec.to_entity(&document)?)),
            None => Ok(None),
        }
    }

    fn insert_in<T: Entity>(&self, entity: &T, name: &str) -> TemplateResult<T> {
        self.write_one(entity, name, WriteMode::Insert)
    }

    fn insert_all_in<T: Entity>(&self, entities: &[T], name: &str) -> TemplateResult<Vec<T>> {
        self.write_all(entities, name, WriteMode::Insert)
    }

    fn save_in<T: Entity>(&self, entity: &T, name: &str) -> TemplateResult<T> {
        self.write_one(entity, name, WriteMode::Upsert)
    }

    fn save_all_in<T: Entity>(&self, entities: &[T], name: &str) -> TemplateResult<Vec<T>> {
        self.write_all(entities, name, WriteMode::Upsert)
    }

    fn remove_in<T: Entity>(&self, entity: &T, name: &str) -> TemplateResult<()> {
        self.remove_all_of_in(std::slice::from_ref(entity), name)
    }

    fn remove_by_id_in<T, K>(&self, key: K, name: &str) -> TemplateResult<()>
    where
        T: Entity,
        K: Into<DocumentKey>,
    {
        let key = self.checked_key::<T>(key.into())?;
        self.with_session(&self.absolute_path(name), |store| {
            Ok(store.delete_by_id(&key)?)
        })
    }

    fn remove_all_of_in<T: Entity>(&self, entities: &[T], name: &str) -> TemplateResult<()> {
        if entities.is_empty() {
            return Ok(());
        }

        let documents = entities
            .iter()
            .map(|entity| self.codec.to_document(entity))
            .collect::<Result<Vec<_>, _>>()?;

        let path = self.absolute_path(name);
        self.with_session(&path, |store| {
            for document in &documents {
                store.delete(document)?;
            }
            Ok(())
        })?;

        debug!(
            "event=documents_remove module=template status=ok path={} count={}",
            path,
            documents.len()
        );
        Ok(())
    }

    fn remove_all_in(&self, name: &str) -> TemplateResult<()> {
        let path = self.absolute_path(name);
        let query = self.new_query();
        let deleted = self.with_session(&path, |store| {
            let stream = store.find(&query)?;
            Ok(store.delete_stream(stream)?)
        })?;

        debug!("event=documents_clear module=template status=ok path={path} count={deleted}");
        Ok(())
    }

    fn count_in(&self, name: &str) -> TemplateResult<u64> {
        let statement = count_statement(&self.absolute_path(name));
        let scalar = match &self.sql {
            Some(sql) => sql
                .query_scalar(&statement)
                .map_err(|err| self.translate_sql(err))?,
            None => return Err(self.translate_sql(SqlError::ConnectionUnavailable)),
        };

        scalar.trim().parse::<u64>().map_err(|_| {
            TemplateError::InvalidData(format!("count returned non-integer value `{scalar}`"))
        })
    }

    fn execute_in<T: Entity>(&self, query: &Query, name: &str) -> TemplateResult<Vec<T>> {
        let started_at = Instant::now();
        let path = self.absolute_path(name);
        let entities: Vec<T> = self.with_session(&path, |store| {
            let stream = store.find(query)?;
            self.collect_entities(stream)
        })?;

        debug!(
            "event=query_execute module=template status=ok path={} constrained={} rows={} duration_ms={}",
            path,
            !query.is_unconstrained(),
            entities.len(),
            started_at.elapsed().as_millis()
        );
        Ok(entities)
    }

    fn execute_declared_in<T: Entity>(
        &self,
        descriptor: &QueryDescriptor,
        args: &[Value],
        name: &str,
    ) -> TemplateResult<QueryOutcome<T>> {
        let query = self.bound_query(descriptor, args)?;
        let path = self.absolute_path(name);
        debug!(
            "event=declared_query module=template status=start kind={:?} path={}",
            descriptor.kind, path
        );

        match descriptor.kind {
            QueryKind::PlainFind => Ok(QueryOutcome::Entities(self.execute_in(&query, name)?)),
            QueryKind::Count => self.with_session(&path, |store| {
                Ok(QueryOutcome::Count(store.find(&query)?.count() as u64))
            }),
            QueryKind::Exists => self.with_session(&path, |store| {
                let mut stream = store.find(&query.limit(1))?;
                let found = stream.next().is_some();
                stream.close();
                Ok(QueryOutcome::Exists(found))
            }),
            QueryKind::Delete => self.with_session(&path, |store| {
                let stream = store.find(&query)?;
                Ok(QueryOutcome::Deleted(store.delete_stream(stream)?))
            }),
        }
    }
}

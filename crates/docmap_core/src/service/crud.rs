//! Typed CRUD repository over document operations.
//!
//! # Responsibility
//! - Give callers an entity-typed repository bound to one table.
//! - Run declared query methods with call-time arguments.
//!
//! # Invariants
//! - All persistence goes through `DocumentOperations`; the repository holds
//!   no handles of its own.
//! - Id lookups are checked against the entity's declared key type.

use crate::error::TemplateResult;
use crate::mapping::{resolve_identity, resolve_table_path, DocumentKey, Entity, KEY_FIELD};
use crate::query::{Condition, QueryDescriptor, QueryMethod, QueryOutcome};
use crate::repo::DocumentOperations;
use serde_json::Value;
use std::marker::PhantomData;

/// Repository for entity type `T` backed by `O`.
pub struct CrudRepository<'t, T, O> {
    operations: &'t O,
    table: String,
    _entity: PhantomData<fn() -> T>,
}

impl<'t, T, O> CrudRepository<'t, T, O>
where
    T: Entity,
    O: DocumentOperations,
{
    /// Repository over `T`'s descriptor-derived table.
    pub fn new(operations: &'t O) -> Self {
        Self::in_table(operations, resolve_table_path(T::descriptor()))
    }

    /// Repository over an explicit table name.
    pub fn in_table(operations: &'t O, table: impl Into<String>) -> Self {
        Self {
            operations,
            table: table.into(),
            _entity: PhantomData,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn save(&self, entity: &T) -> TemplateResult<T> {
        self.operations.save_in(entity, &self.table)
    }

    pub fn save_all(&self, entities: &[T]) -> TemplateResult<Vec<T>> {
        self.operations.save_all_in(entities, &self.table)
    }

    /// Inserts without replacing; an existing key fails with `DuplicateKey`.
    pub fn insert(&self, entity: &T) -> TemplateResult<T> {
        self.operations.insert_in(entity, &self.table)
    }

    pub fn insert_all(&self, entities: &[T]) -> TemplateResult<Vec<T>> {
        self.operations.insert_all_in(entities, &self.table)
    }

    pub fn find_by_id(&self, key: impl Into<DocumentKey>) -> TemplateResult<Option<T>> {
        self.operations.find_by_id_in(key.into(), &self.table)
    }

    pub fn exists_by_id(&self, key: impl Into<DocumentKey>) -> TemplateResult<bool> {
        Ok(self.find_by_id(key)?.is_some())
    }

    pub fn find_all(&self) -> TemplateResult<Vec<T>> {
        self.operations.find_all_in(&self.table)
    }

    /// Loads every entity whose key is in `keys` with a single query.
    ///
    /// Unknown keys are skipped; results come back in key order.
    pub fn find_all_by_id<K>(&self, keys: impl IntoIterator<Item = K>) -> TemplateResult<Vec<T>>
    where
        K: Into<DocumentKey>,
    {
        let descriptor = T::descriptor();
        let identity = resolve_identity(descriptor)?;

        let mut values = Vec::new();
        for key in keys {
            let key = key.into();
            key.ensure_type(descriptor.type_name(), identity.key_type)?;
            values.push(key.to_value());
        }
        if values.is_empty() {
            return Ok(Vec::new());
        }

        self.operations
            .execute_condition_in(&Condition::is_in(KEY_FIELD, values), &self.table)
    }

    /// Counts documents through the relational side.
    pub fn count(&self) -> TemplateResult<u64> {
        self.operations.count_in(&self.table)
    }

    pub fn delete(&self, entity: &T) -> TemplateResult<()> {
        self.operations.remove_in(entity, &self.table)
    }

    pub fn delete_by_id(&self, key: impl Into<DocumentKey>) -> TemplateResult<()> {
        self.operations
            .remove_by_id_in::<T, DocumentKey>(key.into(), &self.table)
    }

    pub fn delete_all_of(&self, entities: &[T]) -> TemplateResult<()> {
        self.operations.remove_all_of_in(entities, &self.table)
    }

    pub fn delete_all(&self) -> TemplateResult<()> {
        self.operations.remove_all_in(&self.table)
    }

    /// Runs a declared query method with call-time arguments.
    ///
    /// The result shape follows the method's declared kind only.
    pub fn run(&self, method: &QueryMethod, args: &[Value]) -> TemplateResult<QueryOutcome<T>> {
        let descriptor = QueryDescriptor::resolve(method);
        self.operations
            .execute_declared_in(&descriptor, args, &self.table)
    }
}

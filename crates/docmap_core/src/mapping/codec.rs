//! Document model and serde_json based entity codec.
//!
//! # Responsibility
//! - Represent store documents as a key plus a JSON field map.
//! - Convert entities to documents and documents back to entities.
//!
//! # Invariants
//! - The key lives outside `fields`; its JSON form uses the reserved `_id`
//!   field name.
//! - Key encoding is explicit: text keys stay text, integer keys stay
//!   integers.

use super::entity::{resolve_identity, Entity, FieldType};
use super::{MappingError, MappingResult};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt::{Display, Formatter};

/// Reserved JSON field carrying the document key.
pub const KEY_FIELD: &str = "_id";

/// Document key with its declared type preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocumentKey {
    Text(String),
    Integer(i64),
}

impl DocumentKey {
    /// Reads a key from JSON. `null` means "no key".
    pub fn from_value(value: &Value) -> MappingResult<Option<Self>> {
        match value {
            Value::Null => Ok(None),
            Value::String(text) => Ok(Some(Self::Text(text.clone()))),
            Value::Number(number) => number
                .as_i64()
                .map(|int| Some(Self::Integer(int)))
                .ok_or_else(|| MappingError::UnsupportedKeyType(number.to_string())),
            other => Err(MappingError::UnsupportedKeyType(other.to_string())),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(text.clone()),
            Self::Integer(int) => Value::from(*int),
        }
    }

    pub fn key_type(&self) -> FieldType {
        match self {
            Self::Text(_) => FieldType::Text,
            Self::Integer(_) => FieldType::Integer,
        }
    }

    /// Checks this key against the declared key type of an entity.
    pub fn ensure_type(&self, type_name: &'static str, expected: FieldType) -> MappingResult<()> {
        let actual = self.key_type();
        if actual == expected {
            return Ok(());
        }
        Err(MappingError::KeyTypeMismatch {
            type_name,
            expected,
            actual,
        })
    }
}

impl Display for DocumentKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Integer(int) => write!(f, "{int}"),
        }
    }
}

impl From<&str> for DocumentKey {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for DocumentKey {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for DocumentKey {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for DocumentKey {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for DocumentKey {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

/// Store-native record: an optional key and a field map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    key: Option<DocumentKey>,
    fields: Map<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(key: DocumentKey) -> Self {
        Self {
            key: Some(key),
            fields: Map::new(),
        }
    }

    /// Builds a document from its JSON form, lifting `_id` into the key.
    pub fn from_json_map(mut map: Map<String, Value>) -> MappingResult<Self> {
        let key = match map.remove(KEY_FIELD) {
            Some(value) => DocumentKey::from_value(&value)?,
            None => None,
        };
        Ok(Self { key, fields: map })
    }

    pub fn from_json_str(text: &str) -> MappingResult<Self> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(map) => Self::from_json_map(map),
            _ => Err(MappingError::NotAnObject {
                type_name: "Document",
            }),
        }
    }

    pub fn key(&self) -> Option<&DocumentKey> {
        self.key.as_ref()
    }

    pub fn set_key(&mut self, key: DocumentKey) {
        self.key = Some(key);
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Resolves a dotted field path; `_id` addresses the key.
    pub fn lookup(&self, path: &str) -> Option<Cow<'_, Value>> {
        if path == KEY_FIELD {
            return self.key.as_ref().map(|key| Cow::Owned(key.to_value()));
        }

        let mut segments = path.split('.');
        let mut current = self.fields.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(Cow::Borrowed(current))
    }

    /// JSON form with `_id` first.
    pub fn to_json_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        if let Some(key) = &self.key {
            map.insert(KEY_FIELD.to_string(), key.to_value());
        }
        for (name, value) in &self.fields {
            map.insert(name.clone(), value.clone());
        }
        map
    }

    pub fn to_json_string(&self) -> MappingResult<String> {
        Ok(serde_json::to_string(&Value::Object(self.to_json_map()))?)
    }
}

/// Entity ⇄ document conversion through serde_json.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    /// Serializes `entity`, moving its identity field into the document key.
    ///
    /// # Errors
    /// - Identity resolution errors of `T`.
    /// - `KeyTypeMismatch` when the key value disagrees with the declared type.
    pub fn to_document<T: Entity>(&self, entity: &T) -> MappingResult<Document> {
        let descriptor = T::descriptor();
        let identity = resolve_identity(descriptor)?;

        let Value::Object(mut map) = serde_json::to_value(entity)? else {
            return Err(MappingError::NotAnObject {
                type_name: descriptor.type_name(),
            });
        };

        let key = match map.remove(identity.name) {
            Some(value) => DocumentKey::from_value(&value)?,
            None => None,
        };
        if let Some(key) = &key {
            key.ensure_type(descriptor.type_name(), identity.key_type)?;
        }

        Ok(Document { key, fields: map })
    }

    /// Deserializes a document into `T`, restoring the key into `T`'s identity
    /// field.
    pub fn to_entity<T: Entity>(&self, document: &Document) -> MappingResult<T> {
        let identity = resolve_identity(T::descriptor())?;

        let mut map = document.fields.clone();
        map.insert(
            identity.name.to_string(),
            document.key.as_ref().map_or(Value::Null, DocumentKey::to_value),
        );

        Ok(serde_json::from_value(Value::Object(map))?)
    }
}

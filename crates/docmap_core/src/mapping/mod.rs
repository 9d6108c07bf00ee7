//! Entity metadata, storage path derivation and document conversion.
//!
//! # Responsibility
//! - Describe entity types once (`EntityDescriptor`) instead of inspecting
//!   them per call.
//! - Resolve identity fields, table paths and document keys.
//! - Convert entities to store documents and back.
//!
//! # Invariants
//! - An entity type declares at most one identity field.
//! - Conversion is always driven by the requested entity type.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod codec;
pub mod entity;
pub mod path;

pub use codec::{Document, DocumentKey, JsonCodec, KEY_FIELD};
pub use entity::{
    resolve_identity, resolve_key_type, Entity, EntityDescriptor, FieldDescriptor, FieldType,
    IdentityField, IdentityMarker,
};
pub use path::{resolve_absolute_path, resolve_table_path};

pub type MappingResult<T> = Result<T, MappingError>;

/// Failure raised while resolving entity metadata or converting documents.
#[derive(Debug)]
pub enum MappingError {
    /// No field of the entity carries an identity marker.
    MissingIdentity { type_name: &'static str },
    /// More than one field carries an identity marker.
    AmbiguousIdentity {
        type_name: &'static str,
        fields: Vec<&'static str>,
    },
    /// The entity has no key value and its key type cannot be generated.
    UnsupportedIdGeneration {
        type_name: &'static str,
        key_type: FieldType,
    },
    /// A key value was supplied with a type other than the declared one.
    KeyTypeMismatch {
        type_name: &'static str,
        expected: FieldType,
        actual: FieldType,
    },
    /// A JSON value that cannot act as a document key.
    UnsupportedKeyType(String),
    /// The entity did not serialize into a JSON object.
    NotAnObject { type_name: &'static str },
    Json(serde_json::Error),
}

impl Display for MappingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingIdentity { type_name } => {
                write!(f, "no identity field declared on entity `{type_name}`")
            }
            Self::AmbiguousIdentity { type_name, fields } => write!(
                f,
                "entity `{type_name}` declares several identity fields: {}",
                fields.join(", ")
            ),
            Self::UnsupportedIdGeneration {
                type_name,
                key_type,
            } => write!(
                f,
                "id auto generation is provided only for text keys; `{type_name}` uses {key_type}"
            ),
            Self::KeyTypeMismatch {
                type_name,
                expected,
                actual,
            } => write!(
                f,
                "entity `{type_name}` expects a {expected} key, got {actual}"
            ),
            Self::UnsupportedKeyType(value) => {
                write!(f, "value `{value}` cannot be used as a document key")
            }
            Self::NotAnObject { type_name } => {
                write!(f, "entity `{type_name}` did not serialize into an object")
            }
            Self::Json(err) => write!(f, "{err}"),
        }
    }
}

impl Error for MappingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for MappingError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

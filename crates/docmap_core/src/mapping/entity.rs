//! Entity descriptors and identity resolution.
//!
//! # Responsibility
//! - Hold the per-type metadata used by the template: storage location and
//!   the ordered field list with identity markers.
//! - Resolve which field acts as the document key.
//!
//! # Invariants
//! - Descriptors are built once per type and shared as `&'static`.
//! - Two identity markers are accepted and treated as equivalent.
//! - Zero marked fields is `MissingIdentity`; several is `AmbiguousIdentity`.

use super::{MappingError, MappingResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::{Display, Formatter};

/// Declared type of an entity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Binary,
    Nested,
}

impl FieldType {
    /// Returns whether a missing key of this type may be generated.
    pub fn supports_generated_key(self) -> bool {
        matches!(self, Self::Text)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Binary => "binary",
            Self::Nested => "nested",
        }
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker flagging a field as the document key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityMarker {
    /// Generic data-layer identity marker.
    Id,
    /// Document-store specific identity marker.
    DocumentId,
}

/// One declared entity field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    name: &'static str,
    field_type: FieldType,
    marker: Option<IdentityMarker>,
}

impl FieldDescriptor {
    pub fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            marker: None,
        }
    }

    /// Field marked with [`IdentityMarker::Id`].
    pub fn id(name: &'static str, field_type: FieldType) -> Self {
        Self::new(name, field_type).marked(IdentityMarker::Id)
    }

    /// Field marked with [`IdentityMarker::DocumentId`].
    pub fn document_id(name: &'static str, field_type: FieldType) -> Self {
        Self::new(name, field_type).marked(IdentityMarker::DocumentId)
    }

    pub fn marked(mut self, marker: IdentityMarker) -> Self {
        self.marker = Some(marker);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn marker(&self) -> Option<IdentityMarker> {
        self.marker
    }
}

/// Static description of an entity type.
///
/// Field order is declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    type_name: &'static str,
    storage_location: String,
    fields: Vec<FieldDescriptor>,
}

impl EntityDescriptor {
    /// Creates a descriptor with no storage-location override.
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            storage_location: String::new(),
            fields: Vec::new(),
        }
    }

    /// Overrides the storage location (table name or path).
    pub fn storage_location(mut self, location: impl Into<String>) -> Self {
        self.storage_location = location.into();
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Declared storage location; empty when not overridden.
    pub fn declared_location(&self) -> &str {
        &self.storage_location
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }
}

/// Resolved identity field of an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityField {
    pub name: &'static str,
    pub key_type: FieldType,
    pub marker: IdentityMarker,
}

/// A typed record persisted through the template.
///
/// Implementors return a descriptor built once, typically from a
/// `once_cell::sync::Lazy` static.
pub trait Entity: Serialize + DeserializeOwned {
    fn descriptor() -> &'static EntityDescriptor;
}

/// Resolves the single identity field of `descriptor`.
///
/// # Errors
/// - `MissingIdentity` when no field is marked.
/// - `AmbiguousIdentity` when more than one field is marked.
pub fn resolve_identity(descriptor: &EntityDescriptor) -> MappingResult<IdentityField> {
    let marked: Vec<(&FieldDescriptor, IdentityMarker)> = descriptor
        .fields
        .iter()
        .filter_map(|field| field.marker.map(|marker| (field, marker)))
        .collect();

    match marked.as_slice() {
        [] => Err(MappingError::MissingIdentity {
            type_name: descriptor.type_name,
        }),
        [(field, marker)] => Ok(IdentityField {
            name: field.name,
            key_type: field.field_type,
            marker: *marker,
        }),
        many => Err(MappingError::AmbiguousIdentity {
            type_name: descriptor.type_name,
            fields: many.iter().map(|(field, _)| field.name).collect(),
        }),
    }
}

/// Resolves the declared type of the identity field.
pub fn resolve_key_type(descriptor: &EntityDescriptor) -> MappingResult<FieldType> {
    resolve_identity(descriptor).map(|identity| identity.key_type)
}

#[cfg(test)]
mod tests {
    use super::{
        resolve_identity, resolve_key_type, EntityDescriptor, FieldDescriptor, FieldType,
        IdentityMarker,
    };
    use crate::mapping::MappingError;

    #[test]
    fn either_marker_identifies_the_key() {
        let by_id = EntityDescriptor::new("User")
            .field(FieldDescriptor::new("name", FieldType::Text))
            .field(FieldDescriptor::id("id", FieldType::Text));
        let by_document_id = EntityDescriptor::new("Order")
            .field(FieldDescriptor::document_id("number", FieldType::Integer));

        let identity = resolve_identity(&by_id).unwrap();
        assert_eq!(identity.name, "id");
        assert_eq!(identity.marker, IdentityMarker::Id);
        assert_eq!(
            resolve_key_type(&by_document_id).unwrap(),
            FieldType::Integer
        );
    }

    #[test]
    fn missing_marker_is_rejected() {
        let descriptor =
            EntityDescriptor::new("Plain").field(FieldDescriptor::new("name", FieldType::Text));

        let err = resolve_key_type(&descriptor).unwrap_err();
        assert!(matches!(
            err,
            MappingError::MissingIdentity { type_name: "Plain" }
        ));
    }

    #[test]
    fn several_markers_fail_fast() {
        let descriptor = EntityDescriptor::new("Twice")
            .field(FieldDescriptor::id("a", FieldType::Text))
            .field(FieldDescriptor::document_id("b", FieldType::Text));

        match resolve_identity(&descriptor) {
            Err(MappingError::AmbiguousIdentity { fields, .. }) => {
                assert_eq!(fields, vec!["a", "b"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn only_text_keys_are_generated() {
        assert!(FieldType::Text.supports_generated_key());
        assert!(!FieldType::Integer.supports_generated_key());
        assert!(!FieldType::Binary.supports_generated_key());
    }
}

//! Table path derivation.
//!
//! Pure string composition: no duplicate-slash or traversal normalization.
//! Malformed segments surface later as driver errors.

use super::entity::EntityDescriptor;

/// Returns the table path of an entity type, always starting with `/`.
///
/// Uses the declared storage location, or the lower-cased type name when
/// no location is declared.
pub fn resolve_table_path(descriptor: &EntityDescriptor) -> String {
    let name = match descriptor.declared_location() {
        "" => descriptor.type_name().to_lowercase(),
        declared => declared.to_string(),
    };

    if name.starts_with('/') {
        name
    } else {
        format!("/{name}")
    }
}

/// Places `logical_name` under `database_root`, making the result absolute.
pub fn resolve_absolute_path(database_root: &str, logical_name: &str) -> String {
    if database_root.starts_with('/') {
        format!("{database_root}{logical_name}")
    } else {
        format!("/{database_root}{logical_name}")
    }
}

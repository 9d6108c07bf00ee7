//! Declared query methods and their resolved descriptors.
//!
//! # Invariants
//! - The kind of a declared query is fixed by its declaration, never by
//!   call-time arguments.
//! - A declaration without an explicit kind is a plain find.

use super::parser::{parse_predicate, Predicate};
use super::{QueryError, QueryResult};

/// Result shape of a declared query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryKind {
    #[default]
    PlainFind,
    Count,
    Delete,
    Exists,
}

impl QueryKind {
    /// Maps flag-style declarations onto a kind.
    ///
    /// # Errors
    /// - `ConflictingKinds` when more than one flag is set.
    pub fn from_flags(count: bool, delete: bool, exists: bool) -> QueryResult<Self> {
        match (count, delete, exists) {
            (false, false, false) => Ok(Self::PlainFind),
            (true, false, false) => Ok(Self::Count),
            (false, true, false) => Ok(Self::Delete),
            (false, false, true) => Ok(Self::Exists),
            _ => Err(QueryError::ConflictingKinds {
                count,
                delete,
                exists,
            }),
        }
    }
}

/// Declaration of a repository query method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryMethod {
    name: String,
    text: Option<String>,
    kind: QueryKind,
}

impl QueryMethod {
    /// Method with no query declaration.
    pub fn unannotated(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: None,
            kind: QueryKind::PlainFind,
        }
    }

    pub fn declared(name: impl Into<String>, text: impl Into<String>, kind: QueryKind) -> Self {
        Self {
            name: name.into(),
            text: Some(text.into()),
            kind,
        }
    }

    pub fn find(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::declared(name, text, QueryKind::PlainFind)
    }

    pub fn count(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::declared(name, text, QueryKind::Count)
    }

    pub fn delete(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::declared(name, text, QueryKind::Delete)
    }

    pub fn exists(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::declared(name, text, QueryKind::Exists)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }
}

/// Resolved shape of a declared query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDescriptor {
    /// True iff the declared text is present and not blank.
    pub has_text: bool,
    /// Declared text, or empty when there is none.
    pub text: String,
    pub kind: QueryKind,
}

impl QueryDescriptor {
    /// Resolves a declaration. Performs no execution.
    pub fn resolve(method: &QueryMethod) -> Self {
        let text = method.text().unwrap_or_default();
        Self {
            has_text: !text.trim().is_empty(),
            text: text.to_string(),
            kind: method.kind(),
        }
    }

    /// Parses the declared text; no text means an unconstrained predicate.
    pub fn predicate(&self) -> QueryResult<Predicate> {
        if !self.has_text {
            return Ok(Predicate::unconstrained());
        }
        parse_predicate(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::{QueryDescriptor, QueryKind, QueryMethod};
    use crate::query::QueryError;

    #[test]
    fn delete_declaration_resolves_to_delete_kind() {
        let method = QueryMethod::delete("deleteByName", "name = ?");
        let descriptor = QueryDescriptor::resolve(&method);

        assert_eq!(
            descriptor,
            QueryDescriptor {
                has_text: true,
                text: "name = ?".to_string(),
                kind: QueryKind::Delete,
            }
        );
    }

    #[test]
    fn blank_or_missing_text_has_no_text() {
        let blank = QueryDescriptor::resolve(&QueryMethod::count("countAll", "  "));
        let missing = QueryDescriptor::resolve(&QueryMethod::unannotated("findAll"));

        assert!(!blank.has_text);
        assert_eq!(blank.kind, QueryKind::Count);
        assert!(!missing.has_text);
        assert_eq!(missing.text, "");
        assert_eq!(missing.kind, QueryKind::PlainFind);
        assert_eq!(missing.predicate().unwrap().parameter_count(), 0);
    }

    #[test]
    fn flags_map_to_kinds() {
        assert_eq!(
            QueryKind::from_flags(false, false, false).unwrap(),
            QueryKind::PlainFind
        );
        assert_eq!(
            QueryKind::from_flags(false, false, true).unwrap(),
            QueryKind::Exists
        );
        assert!(matches!(
            QueryKind::from_flags(true, true, false),
            Err(QueryError::ConflictingKinds { .. })
        ));
    }
}

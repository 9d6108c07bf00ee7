//! Document operations layer.
//!
//! # Responsibility
//! - Define the entity-oriented `DocumentOperations` contract.
//! - Keep driver handles, path resolution and conversion inside the
//!   template so repositories stay storage-agnostic.
//!
//! # Invariants
//! - Raw driver failures propagate untranslated; relational failures go
//!   through the exception translator.

pub mod template;

pub use template::{ConnectionPair, DocumentOperations, DocumentTemplate};

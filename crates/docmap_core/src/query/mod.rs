//! Query model, predicate parsing and declared query resolution.
//!
//! # Responsibility
//! - Describe find queries (`Query`, `Condition`) independently of a driver.
//! - Parse declared predicate text and bind call-time arguments.
//! - Resolve declared query methods into `QueryDescriptor`s.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod condition;
pub mod method;
pub mod parser;

pub use condition::{CompareOp, Condition, Query, SortKey, SortOrder};
pub use method::{QueryDescriptor, QueryKind, QueryMethod};
pub use parser::{parse_predicate, Predicate};

pub type QueryResult<T> = Result<T, QueryError>;

#[derive(Debug)]
pub enum QueryError {
    /// Declared predicate text cannot be parsed.
    Syntax {
        text: String,
        position: usize,
        message: String,
    },
    /// Call-time arguments do not match the declared placeholders.
    ParameterCount { expected: usize, actual: usize },
    /// A flag-style declaration sets more than one kind.
    ConflictingKinds {
        count: bool,
        delete: bool,
        exists: bool,
    },
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syntax {
                text,
                position,
                message,
            } => write!(f, "invalid query `{text}` at {position}: {message}"),
            Self::ParameterCount { expected, actual } => write!(
                f,
                "query expects {expected} argument(s), {actual} supplied"
            ),
            Self::ConflictingKinds {
                count,
                delete,
                exists,
            } => write!(
                f,
                "conflicting query kinds: count={count} delete={delete} exists={exists}"
            ),
        }
    }
}

impl Error for QueryError {}

/// Result of running a declared query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome<T> {
    Entities(Vec<T>),
    Count(u64),
    Deleted(u64),
    Exists(bool),
}

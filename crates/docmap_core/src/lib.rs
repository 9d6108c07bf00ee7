//! Repository-pattern document mapping.
//! Maps typed entities onto document-store tables and runs CRUD, count and
//! declared queries against them through pluggable drivers.

pub mod config;
pub mod driver;
pub mod error;
pub mod logging;
pub mod mapping;
pub mod query;
pub mod repo;
pub mod service;
pub mod translate;

pub use config::{ConfigError, StoreConfig};
pub use driver::memory::{MemoryDocumentDriver, MemorySqlConnection};
pub use driver::sqlite::{open_template, SqliteDocumentDriver, SqliteSqlConnection, SqliteTemplate};
pub use driver::{DocumentDriver, DocumentStore, DriverError, SqlConnection, SqlError};
pub use error::{DataAccessError, TemplateError, TemplateResult};
pub use logging::{default_log_level, init_logging, LogSettings, LoggingError};
pub use mapping::{
    Document, DocumentKey, Entity, EntityDescriptor, FieldDescriptor, FieldType, MappingError,
};
pub use query::{
    Condition, Query, QueryDescriptor, QueryError, QueryKind, QueryMethod, QueryOutcome,
};
pub use repo::{ConnectionPair, DocumentOperations, DocumentTemplate};
pub use service::CrudRepository;
pub use translate::ExceptionTranslator;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}

//! Translation of low-level failures into `DataAccessError`.
//!
//! # Invariants
//! - Matching uses the short type name of the raw error only: no message
//!   inspection, no cause-chain walking.
//! - Anything outside the known set is handed back unchanged, since it may
//!   come from caller code.

use crate::error::DataAccessError;
use std::error::Error;

const RESOURCE_USAGE_ERRORS: &[&str] = &["SqlError"];

#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionTranslator;

impl ExceptionTranslator {
    pub fn new() -> Self {
        Self
    }

    /// Translates `err` when its type is a known resource-access failure,
    /// otherwise returns it untouched in `Err`.
    pub fn translate<E>(&self, err: E) -> Result<DataAccessError, E>
    where
        E: Error + Send + Sync + 'static,
    {
        if RESOURCE_USAGE_ERRORS.contains(&short_type_name::<E>()) {
            return Ok(DataAccessError::ResourceUsage {
                message: err.to_string(),
                source: Box::new(err),
            });
        }
        Err(err)
    }
}

/// `a::b::Name<c::D>` -> `Name`.
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::{short_type_name, ExceptionTranslator};
    use crate::driver::{DriverError, SqlError};
    use crate::error::DataAccessError;
    use std::error::Error;

    #[test]
    fn sql_errors_become_resource_usage() {
        let translated = ExceptionTranslator::new()
            .translate(SqlError::Statement("connection refused".to_string()))
            .unwrap();

        let DataAccessError::ResourceUsage { message, source } = &translated;
        assert_eq!(message, "connection refused");
        assert!(source.downcast_ref::<SqlError>().is_some());
        assert!(translated.source().is_some());
    }

    #[test]
    fn unknown_errors_are_returned_unchanged() {
        let original = DriverError::TableNotFound("/t".to_string());
        let returned = ExceptionTranslator::new().translate(original).unwrap_err();
        assert!(matches!(returned, DriverError::TableNotFound(path) if path == "/t"));

        let io = std::io::Error::new(std::io::ErrorKind::Other, "SqlError");
        assert!(ExceptionTranslator::new().translate(io).is_err());
    }

    #[test]
    fn short_type_name_strips_paths_and_generics() {
        assert_eq!(short_type_name::<SqlError>(), "SqlError");
        assert_eq!(short_type_name::<Vec<SqlError>>(), "Vec");
        assert_eq!(short_type_name::<str>(), "str");
    }
}

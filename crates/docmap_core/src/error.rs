//! Template-level error taxonomy.
//!
//! # Invariants
//! - A collaborator failure is either translated once (`DataAccess`) or
//!   carried unchanged; it is never wrapped twice.

use crate::config::ConfigError;
use crate::driver::DriverError;
use crate::mapping::MappingError;
use crate::query::QueryError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type TemplateResult<T> = Result<T, TemplateError>;

/// Store-agnostic failure produced by the error translator.
#[derive(Debug)]
pub enum DataAccessError {
    /// A recognized low-level resource-access failure.
    ResourceUsage {
        message: String,
        source: Box<dyn Error + Send + Sync>,
    },
}

impl Display for DataAccessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResourceUsage { message, .. } => {
                write!(f, "invalid resource usage: {message}")
            }
        }
    }
}

impl Error for DataAccessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ResourceUsage { source, .. } => Some(source.as_ref()),
        }
    }
}

/// Error returned by template and repository operations.
#[derive(Debug)]
pub enum TemplateError {
    Mapping(MappingError),
    Driver(DriverError),
    Query(QueryError),
    Config(ConfigError),
    DataAccess(DataAccessError),
    /// A collaborator failure outside the translator's known set.
    Untranslated(Box<dyn Error + Send + Sync>),
    InvalidData(String),
}

impl Display for TemplateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mapping(err) => write!(f, "{err}"),
            Self::Driver(err) => write!(f, "{err}"),
            Self::Query(err) => write!(f, "{err}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::DataAccess(err) => write!(f, "{err}"),
            Self::Untranslated(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid data: {message}"),
        }
    }
}

impl Error for TemplateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Mapping(err) => Some(err),
            Self::Driver(err) => Some(err),
            Self::Query(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::DataAccess(err) => Some(err),
            Self::Untranslated(err) => Some(err.as_ref()),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<MappingError> for TemplateError {
    fn from(value: MappingError) -> Self {
        Self::Mapping(value)
    }
}

impl From<DriverError> for TemplateError {
    fn from(value: DriverError) -> Self {
        Self::Driver(value)
    }
}

impl From<QueryError> for TemplateError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

impl From<ConfigError> for TemplateError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<DataAccessError> for TemplateError {
    fn from(value: DataAccessError) -> Self {
        Self::DataAccess(value)
    }
}

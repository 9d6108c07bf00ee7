//! Store configuration.
//!
//! # Responsibility
//! - Describe where the document database lives, which database root to
//!   place tables under, and how to reach the relational side.
//! - Load that description from JSON or from `DOCMAP_*` environment
//!   variables.
//!
//! # Invariants
//! - `database_name` and `store_path` are never blank after `validate()`,
//!   and a present `log` section has a known level and an absolute directory.
//! - The relational host defaults to the document store path.

use crate::logging::{LogSettings, LoggingError};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const ENV_DATABASE: &str = "DOCMAP_DATABASE";
pub const ENV_STORE_PATH: &str = "DOCMAP_STORE_PATH";
pub const ENV_SQL_HOST: &str = "DOCMAP_SQL_HOST";
pub const ENV_SQL_USER: &str = "DOCMAP_SQL_USER";
pub const ENV_SQL_PASSWORD: &str = "DOCMAP_SQL_PASSWORD";
pub const ENV_LOG_LEVEL: &str = "DOCMAP_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "DOCMAP_LOG_DIR";

#[derive(Debug)]
pub enum ConfigError {
    /// A required setting is absent or blank.
    Missing(&'static str),
    Json(serde_json::Error),
    /// The logging section is invalid.
    Log(LoggingError),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(setting) => write!(f, "missing required setting `{setting}`"),
            Self::Json(err) => write!(f, "invalid configuration: {err}"),
            Self::Log(err) => write!(f, "invalid log settings: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Missing(_) => None,
            Self::Json(err) => Some(err),
            Self::Log(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<LoggingError> for ConfigError {
    fn from(value: LoggingError) -> Self {
        Self::Log(value)
    }
}

/// Connection settings for a template.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// Database root every table path is placed under.
    pub database_name: String,
    /// Document database location.
    pub store_path: String,
    /// Relational side host; the store path when absent.
    #[serde(default)]
    pub sql_host: Option<String>,
    #[serde(default)]
    pub sql_username: String,
    #[serde(default)]
    pub sql_password: String,
    #[serde(default)]
    pub log: Option<LogSettings>,
}

impl StoreConfig {
    pub fn new(database_name: impl Into<String>, store_path: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            store_path: store_path.into(),
            sql_host: None,
            sql_username: String::new(),
            sql_password: String::new(),
            log: None,
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `DOCMAP_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let mut config = Self::new(required(ENV_DATABASE)?, required(ENV_STORE_PATH)?);
        config.sql_host = lookup(ENV_SQL_HOST).filter(|value| !value.trim().is_empty());
        config.sql_username = lookup(ENV_SQL_USER).unwrap_or_default();
        config.sql_password = lookup(ENV_SQL_PASSWORD).unwrap_or_default();
        config.log = lookup(ENV_LOG_DIR).map(|dir| LogSettings {
            level: lookup(ENV_LOG_LEVEL),
            dir,
        });

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_name.trim().is_empty() {
            return Err(ConfigError::Missing("database_name"));
        }
        if self.store_path.trim().is_empty() {
            return Err(ConfigError::Missing("store_path"));
        }
        if let Some(log) = &self.log {
            log.validate()?;
        }
        Ok(())
    }

    pub fn sql_host(&self) -> &str {
        self.sql_host.as_deref().unwrap_or(&self.store_path)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, StoreConfig, ENV_DATABASE, ENV_LOG_DIR, ENV_SQL_HOST, ENV_STORE_PATH};
    use crate::logging::LoggingError;
    use std::collections::HashMap;

    #[test]
    fn json_config_applies_defaults() {
        let config =
            StoreConfig::from_json_str(r#"{"database_name": "test", "store_path": "/tmp/docs.db"}"#)
                .unwrap();

        assert_eq!(config, StoreConfig::new("test", "/tmp/docs.db"));
        assert_eq!(config.sql_host(), "/tmp/docs.db");
    }

    #[test]
    fn json_config_rejects_blank_database() {
        let err = StoreConfig::from_json_str(r#"{"database_name": " ", "store_path": "x"}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("database_name")));

        assert!(matches!(
            StoreConfig::from_json_str("{"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn lookup_config_reads_optional_settings() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_DATABASE, "apps"),
            (ENV_STORE_PATH, "/data/docs.db"),
            (ENV_SQL_HOST, "/data/replica.db"),
            (ENV_LOG_DIR, "/var/log/docmap"),
        ]);

        let config =
            StoreConfig::from_lookup(|name| vars.get(name).map(|value| value.to_string())).unwrap();

        assert_eq!(config.database_name, "apps");
        assert_eq!(config.sql_host(), "/data/replica.db");
        assert_eq!(config.sql_username, "");
        let log = config.log.unwrap();
        assert_eq!(log.dir, "/var/log/docmap");
        assert_eq!(log.level, None);
    }

    #[test]
    fn lookup_config_requires_database_and_store() {
        let err = StoreConfig::from_lookup(|name| {
            (name == ENV_DATABASE).then(|| "apps".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing(name) if name == ENV_STORE_PATH));
    }

    #[test]
    fn invalid_log_section_is_rejected() {
        let err = StoreConfig::from_json_str(
            r#"{"database_name": "test", "store_path": "/tmp/docs.db",
                "log": {"level": "chatty", "dir": "/var/log/docmap"}}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Log(LoggingError::UnsupportedLevel(level)) if level == "chatty"
        ));
    }
}

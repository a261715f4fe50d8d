//! Store connection configuration.
//!
//! # Responsibility
//! - Describe how to reach each backend in a serialisable form.
//! - Reject unusable settings before any connection attempt.
//!
//! # Invariants
//! - A validated `MongoConfig` names a legal database and legal
//!   collections; a validated `SqlConfig` has a non-empty connection string.

use crate::db::{DEFAULT_MONGO_PORT, DEFAULT_MONGO_SERVER};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

const MONGO_DB_NAME_MAX_BYTES: usize = 63;
const MONGO_DB_NAME_FORBIDDEN: &[char] = &[
    '/', '\\', '.', ' ', '"', '$', '*', '<', '>', ':', '|', '?', '\0',
];

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Connection settings for one backend, tagged by `backend`.
///
/// ```json
/// { "backend": "sql", "connection_string": "sqlite:///data/app.db" }
/// { "backend": "mongo", "server": "localhost", "port": 27017,
///   "db_name": "app", "collections": ["users"] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    Sql(SqlConfig),
    Mongo(MongoConfig),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlConfig {
    pub connection_string: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MongoConfig {
    #[serde(default = "default_mongo_server")]
    pub server: String,
    #[serde(default = "default_mongo_port")]
    pub port: u16,
    pub db_name: String,
    /// Collections exposed as repositories by the database facade.
    #[serde(default)]
    pub collections: Vec<String>,
}

fn default_mongo_server() -> String {
    DEFAULT_MONGO_SERVER.to_string()
}

fn default_mongo_port() -> u16 {
    DEFAULT_MONGO_PORT
}

impl StoreConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Sql(config) => config.validate(),
            Self::Mongo(config) => config.validate(),
        }
    }
}

impl SqlConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection_string.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "connection_string cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl MongoConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.trim().is_empty() {
            return Err(ConfigError::Invalid("server cannot be empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".to_string()));
        }
        validate_db_name(&self.db_name)?;
        for collection in &self.collections {
            validate_collection_name(collection)?;
        }
        Ok(())
    }
}

fn validate_db_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::Invalid("db_name cannot be empty".to_string()));
    }
    if name.len() > MONGO_DB_NAME_MAX_BYTES {
        return Err(ConfigError::Invalid(format!(
            "db_name `{name}` exceeds {MONGO_DB_NAME_MAX_BYTES} bytes"
        )));
    }
    if let Some(bad) = name.chars().find(|c| MONGO_DB_NAME_FORBIDDEN.contains(c)) {
        return Err(ConfigError::Invalid(format!(
            "db_name `{name}` contains forbidden character `{bad}`"
        )));
    }
    Ok(())
}

fn validate_collection_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::Invalid(
            "collection name cannot be empty".to_string(),
        ));
    }
    if name.contains('$') || name.contains('\0') {
        return Err(ConfigError::Invalid(format!(
            "collection name `{name}` contains `$` or NUL"
        )));
    }
    if name.starts_with("system.") {
        return Err(ConfigError::Invalid(format!(
            "collection name `{name}` uses the reserved `system.` prefix"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, MongoConfig, SqlConfig, StoreConfig};
    use std::io::Write;

    #[test]
    fn parses_sql_config() {
        let config =
            StoreConfig::from_json_str(r#"{"backend":"sql","connection_string":"sqlite::memory:"}"#)
                .unwrap();
        assert_eq!(
            config,
            StoreConfig::Sql(SqlConfig {
                connection_string: "sqlite::memory:".to_string()
            })
        );
    }

    #[test]
    fn mongo_config_applies_defaults() {
        let config = StoreConfig::from_json_str(r#"{"backend":"mongo","db_name":"test"}"#).unwrap();
        assert_eq!(
            config,
            StoreConfig::Mongo(MongoConfig {
                server: "localhost".to_string(),
                port: 27017,
                db_name: "test".to_string(),
                collections: Vec::new(),
            })
        );
    }

    #[test]
    fn rejects_unknown_backend() {
        let err = StoreConfig::from_json_str(r#"{"backend":"redis"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_invalid_values() {
        let cases = [
            r#"{"backend":"sql","connection_string":"  "}"#,
            r#"{"backend":"mongo","db_name":""}"#,
            r#"{"backend":"mongo","db_name":"a.b"}"#,
            r#"{"backend":"mongo","db_name":"ok","port":0}"#,
            r#"{"backend":"mongo","db_name":"ok","collections":["sys$tem"]}"#,
            r#"{"backend":"mongo","db_name":"ok","collections":["system.users"]}"#,
        ];
        for case in cases {
            let err = StoreConfig::from_json_str(case).expect_err(case);
            assert!(matches!(err, ConfigError::Invalid(_)), "{case}: {err}");
        }
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"backend":"mongo","server":"db.internal","port":27018,"db_name":"app",
                "collections":["users","orders"]}}"#
        )
        .unwrap();

        let config = StoreConfig::load(file.path()).unwrap();
        match config {
            StoreConfig::Mongo(mongo) => {
                assert_eq!(mongo.server, "db.internal");
                assert_eq!(mongo.port, 27018);
                assert_eq!(mongo.collections, vec!["users", "orders"]);
            }
            other => panic!("unexpected config: {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = StoreConfig::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}

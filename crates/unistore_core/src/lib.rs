//! Uniform repository layer over a relational and a document store.
//!
//! Calling code adds, reads, searches, counts and deletes records through
//! [`Repository`] without branching on whether SQLite or MongoDB backs the
//! collection. Facades own the connection a group of repositories shares
//! and release it through [`Lifecycle`] scopes.

pub mod config;
pub mod db;
pub mod facade;
pub mod lifecycle;
pub mod logging;
pub mod repo;

pub use config::{ConfigError, MongoConfig, SqlConfig, StoreConfig};
pub use db::{DbError, DbResult, MongoConnection, SqlSession};
pub use facade::{MongoDbFacade, MongoFacade, RepositoryFacade, SqlFacade};
pub use lifecycle::{Lifecycle, Scoped};
pub use logging::{
    default_log_level, init_logging, init_logging_with, logging_status, LogSettings, LoggingError,
};
pub use repo::contract::{RepoError, RepoResult, Repository, UsageError};
pub use repo::mongo_repo::{
    filter_document, projection_document, DocumentCursor, MongoRepository, SearchOptions,
    SortOrder,
};
pub use repo::query::{Filter, Projection};
pub use repo::sql_repo::{Entity, ProjectedRow, SqlRepository, SqlRepositoryBuilder};

/// Returns the crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}

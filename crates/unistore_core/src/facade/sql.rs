//! Facade over one SQLite session.

use super::RepositoryFacade;
use crate::config::SqlConfig;
use crate::db::SqlSession;
use crate::lifecycle::Lifecycle;
use crate::repo::contract::RepoResult;
use crate::repo::sql_repo::{Entity, SqlRepository};
use rusqlite::Connection;

/// Owns one [`SqlSession`] and builds repositories that share it.
///
/// The session is exposed so callers can run statements the repository
/// surface does not cover.
#[derive(Debug)]
pub struct SqlFacade {
    session: SqlSession,
}

impl SqlFacade {
    /// Opens the session described by `connection_string`.
    pub fn connect(connection_string: &str) -> RepoResult<Self> {
        Ok(Self {
            session: SqlSession::open(connection_string)?,
        })
    }

    /// Adopts a pre-built connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            session: SqlSession::from_connection(conn),
        }
    }

    pub fn from_config(config: &SqlConfig) -> RepoResult<Self> {
        Self::connect(&config.connection_string)
    }

    pub fn session(&self) -> &SqlSession {
        &self.session
    }

    /// Builds a repository for `E` bound to this facade's session.
    pub fn repository<E, I, S>(&self, primary_keys: I) -> RepoResult<SqlRepository<E>>
    where
        E: Entity,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SqlRepository::builder()
            .primary_keys(primary_keys)
            .session(self.session.clone())
            .build()
    }
}

impl Lifecycle for SqlFacade {
    fn reinitialize(&mut self) -> RepoResult<()> {
        self.session.reopen()?;
        Ok(())
    }

    fn dispose(&mut self) -> RepoResult<()> {
        self.session.close()?;
        Ok(())
    }
}

impl RepositoryFacade for SqlFacade {
    fn commit(&self) -> RepoResult<()> {
        self.session.commit()?;
        Ok(())
    }
}

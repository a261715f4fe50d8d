//! Facades over a MongoDB server connection and one of its databases.
//!
//! A server connection is shared by every database reached through it, so
//! the split is two-level: [`MongoFacade`] owns the client, and
//! [`MongoDbFacade`] groups the repositories of one database on top of it.

use super::RepositoryFacade;
use crate::config::MongoConfig;
use crate::db::MongoConnection;
use crate::lifecycle::Lifecycle;
use crate::repo::contract::RepoResult;
use crate::repo::mongo_repo::MongoRepository;
use log::info;
use mongodb::sync::{Client, Database};
use std::collections::BTreeMap;

/// Owns one server connection.
#[derive(Debug)]
pub struct MongoFacade {
    connection: MongoConnection,
}

impl MongoFacade {
    pub fn connect(server: &str, port: u16) -> RepoResult<Self> {
        Ok(Self {
            connection: MongoConnection::connect(server, port)?,
        })
    }

    pub fn connect_default() -> RepoResult<Self> {
        Ok(Self {
            connection: MongoConnection::connect_default()?,
        })
    }

    /// Adopts a pre-built client.
    pub fn from_client(client: Client) -> Self {
        Self {
            connection: MongoConnection::from_client(client),
        }
    }

    pub fn from_config(config: &MongoConfig) -> RepoResult<Self> {
        Self::connect(&config.server, config.port)
    }

    pub fn connection(&self) -> &MongoConnection {
        &self.connection
    }

    /// Groups repositories for `collections` of database `db_name`.
    pub fn database<I, S>(&self, db_name: &str, collections: I) -> MongoDbFacade
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        MongoDbFacade::new(self.connection.clone(), db_name, collections)
    }
}

impl Lifecycle for MongoFacade {
    fn reinitialize(&mut self) -> RepoResult<()> {
        self.connection.reopen()?;
        Ok(())
    }

    fn dispose(&mut self) -> RepoResult<()> {
        self.connection.close();
        Ok(())
    }
}

impl RepositoryFacade for MongoFacade {
    /// Document writes are immediate.
    fn commit(&self) -> RepoResult<()> {
        Ok(())
    }
}

/// Repositories of one database, looked up by collection name.
#[derive(Debug)]
pub struct MongoDbFacade {
    connection: MongoConnection,
    db_name: String,
    collections: BTreeMap<String, MongoRepository>,
}

impl MongoDbFacade {
    pub fn new<I, S>(connection: MongoConnection, db_name: &str, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let collections: BTreeMap<String, MongoRepository> = collections
            .into_iter()
            .map(|name| {
                let name = name.as_ref().to_string();
                let repository = MongoRepository::new(connection.clone(), db_name, name.as_str());
                (name, repository)
            })
            .collect();
        info!(
            "event=mongo_db_facade module=facade status=ok db={} collections={}",
            db_name,
            collections.len()
        );

        Self {
            connection,
            db_name: db_name.to_string(),
            collections,
        }
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Raw driver handle for operations outside the repository surface.
    pub fn database(&self) -> RepoResult<Database> {
        Ok(self.connection.database(&self.db_name)?)
    }

    /// Repository registered for `name` at construction.
    pub fn collection(&self, name: &str) -> Option<&MongoRepository> {
        self.collections.get(name)
    }

    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// Builds a repository for a collection that was not registered up
    /// front. It shares this facade's connection.
    pub fn repository(&self, collection_name: &str) -> MongoRepository {
        MongoRepository::new(self.connection.clone(), self.db_name.as_str(), collection_name)
    }
}

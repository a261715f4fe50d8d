//! Facades: one connection shared by a group of repositories.
//!
//! # Responsibility
//! - Own the backend connection for its whole lifetime.
//! - Hand out repositories bound to that connection.
//! - Provide `commit` and scoped release through [`Lifecycle`].
//!
//! # Invariants
//! - The facade is the authoritative owner of its connection; repositories
//!   obtained from it never close it.

use crate::lifecycle::Lifecycle;
use crate::repo::contract::RepoResult;

mod mongo;
mod sql;

pub use mongo::{MongoDbFacade, MongoFacade};
pub use sql::SqlFacade;

/// Single entry point bundling a backend connection.
pub trait RepositoryFacade: Lifecycle {
    /// Persists pending changes made through any repository of this facade.
    fn commit(&self) -> RepoResult<()>;
}

//! Backend connection handles for the relational and document stores.
//!
//! # Responsibility
//! - Open and configure SQLite sessions from connection strings.
//! - Open MongoDB client connections from server/port pairs.
//! - Surface backend failures without translating them.
//!
//! # Invariants
//! - A handle is shared by cloning; the creator is the authoritative owner.
//! - Operations on a closed handle fail with `DbError::Disposed`.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod mongo_conn;
mod sql_session;

pub use mongo_conn::{MongoConnection, DEFAULT_MONGO_PORT, DEFAULT_MONGO_SERVER};
pub use sql_session::{parse_connection_string, SqlSession, SqlTarget};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    Mongo(mongodb::error::Error),
    /// The session or client was disposed and has not been reopened.
    Disposed { backend: &'static str },
    /// The handle was adopted from a pre-built connection, so there are no
    /// parameters to reconnect with.
    CannotReopen { backend: &'static str },
    UnsupportedConnectionString(String),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Mongo(err) => write!(f, "{err}"),
            Self::Disposed { backend } => write!(f, "{backend} connection has been disposed"),
            Self::CannotReopen { backend } => write!(
                f,
                "{backend} connection was supplied pre-built and cannot be reopened"
            ),
            Self::UnsupportedConnectionString(value) => {
                write!(f, "unsupported connection string `{value}`")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Mongo(err) => Some(err),
            Self::Disposed { .. }
            | Self::CannotReopen { .. }
            | Self::UnsupportedConnectionString(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<mongodb::error::Error> for DbError {
    fn from(value: mongodb::error::Error) -> Self {
        Self::Mongo(value)
    }
}

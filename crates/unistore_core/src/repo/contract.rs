//! Repository contract shared by every backend adapter.
//!
//! # Responsibility
//! - Declare the CRUD surface callers use without branching on backend.
//! - Define the error taxonomy: usage, not-found, backend.
//!
//! # Invariants
//! - Usage errors are raised before any backend call is made.
//! - Backend errors are wrapped, never translated or suppressed.
//! - `exists` is derived from `search`; an adapter that changes what
//!   `search` returns must override `exists` too.

use crate::db::DbError;
use crate::lifecycle::Lifecycle;
use crate::repo::query::{Filter, Projection};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Caller misuse detected before touching the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    /// Neither a session nor connection parameters were supplied.
    MissingConnection,
    /// Both a session and connection parameters were supplied.
    ConflictingConnection,
    NoPrimaryKeys,
    MissingPrimaryKey(String),
    UnknownField { entity: String, field: String },
    EmptyProjection,
    NothingToAdd,
    NothingToDelete,
}

impl Display for UsageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingConnection => {
                write!(f, "you must pass either a session or a connection string")
            }
            Self::ConflictingConnection => {
                write!(f, "pass either a session or a connection string, not both")
            }
            Self::NoPrimaryKeys => write!(f, "at least one primary key must be declared"),
            Self::MissingPrimaryKey(field) => write!(f, "missing primary key field: {field}"),
            Self::UnknownField { entity, field } => {
                write!(f, "`{field}` is not a mapped field of `{entity}`")
            }
            Self::EmptyProjection => write!(f, "projection must name at least one field"),
            Self::NothingToAdd => write!(f, "you must specify either items or fields to add"),
            Self::NothingToDelete => {
                write!(f, "you must specify either items or a filter to delete")
            }
        }
    }
}

impl Error for UsageError {}

/// Repository-level error.
#[derive(Debug)]
pub enum RepoError {
    Usage(UsageError),
    /// A lookup that expected a record matched nothing.
    NotFound {
        collection: String,
        keys: Vec<(String, String)>,
    },
    /// A single-record lookup matched more than one record.
    MultipleFound {
        collection: String,
        keys: Vec<(String, String)>,
    },
    Db(DbError),
    /// A stored row could not be mapped back into its entity type.
    InvalidData(String),
}

impl RepoError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_multiple_found(&self) -> bool {
        matches!(self, Self::MultipleFound { .. })
    }

    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Usage(err) => write!(f, "{err}"),
            Self::NotFound { collection, keys } => {
                write!(f, "record not found in `{collection}`:")?;
                for (field, value) in keys {
                    write!(f, " {field}={value}")?;
                }
                Ok(())
            }
            Self::MultipleFound { collection, keys } => {
                write!(f, "multiple records found in `{collection}`:")?;
                for (field, value) in keys {
                    write!(f, " {field}={value}")?;
                }
                Ok(())
            }
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Usage(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound { .. } | Self::MultipleFound { .. } | Self::InvalidData(_) => None,
        }
    }
}

impl From<UsageError> for RepoError {
    fn from(value: UsageError) -> Self {
        Self::Usage(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<mongodb::error::Error> for RepoError {
    fn from(value: mongodb::error::Error) -> Self {
        Self::Db(DbError::Mongo(value))
    }
}

/// Uniform CRUD interface over one table or collection.
///
/// `Record` is the backend's native record shape, `Value` the type of a
/// single field value used in filters, and `Row` the shape returned by
/// projected queries. Release of the underlying connection is `dispose`
/// from [`Lifecycle`].
pub trait Repository: Lifecycle {
    type Record;
    type Value;
    type Row;

    /// Inserts one record.
    fn add(&self, item: Self::Record) -> RepoResult<()>;

    /// Inserts records in order.
    fn add_many(&self, items: Vec<Self::Record>) -> RepoResult<()>;

    /// Returns every record.
    fn all(&self) -> RepoResult<Vec<Self::Record>>;

    /// Returns every record narrowed to `projection`.
    fn all_projected(&self, projection: &Projection) -> RepoResult<Vec<Self::Row>>;

    /// Persists pending changes.
    fn commit(&self) -> RepoResult<()>;

    /// Counts all records, ignoring any filter.
    fn count(&self) -> RepoResult<u64>;

    /// Deletes one record.
    fn delete(&self, item: &Self::Record) -> RepoResult<()>;

    /// Deletes each given record. Fails with a usage error when empty.
    fn delete_many(&self, items: &[Self::Record]) -> RepoResult<()>;

    /// Deletes the single record matching `filter`. Fails with a usage
    /// error when the filter is empty.
    fn delete_where(&self, filter: &Filter<Self::Value>) -> RepoResult<()>;

    /// Deletes every record and returns how many were removed.
    fn delete_all_records(&self) -> RepoResult<u64>;

    /// Returns whether any record matches `filter`.
    fn exists(&self, filter: &Filter<Self::Value>) -> RepoResult<bool> {
        Ok(!self.search(filter)?.is_empty())
    }

    /// Returns the single record matching `filter`.
    ///
    /// With `expect` set, a miss is `RepoError::NotFound`; otherwise a miss
    /// is `Ok(None)`. Adapters that can detect it report a filter matching
    /// several records as `RepoError::MultipleFound`.
    fn get(&self, filter: &Filter<Self::Value>, expect: bool) -> RepoResult<Option<Self::Record>>;

    /// Projected form of [`Repository::get`].
    fn get_projected(
        &self,
        projection: &Projection,
        filter: &Filter<Self::Value>,
        expect: bool,
    ) -> RepoResult<Option<Self::Row>>;

    /// Returns records matching every condition of `filter`. An empty
    /// filter behaves like [`Repository::all`].
    fn search(&self, filter: &Filter<Self::Value>) -> RepoResult<Vec<Self::Record>>;

    /// Projected form of [`Repository::search`].
    fn search_projected(
        &self,
        projection: &Projection,
        filter: &Filter<Self::Value>,
    ) -> RepoResult<Vec<Self::Row>>;
}

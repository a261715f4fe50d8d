//! SQLite session handle.
//!
//! # Responsibility
//! - Resolve connection strings into file or in-memory SQLite targets.
//! - Configure connection pragmas required by the repository layer.
//! - Hold pending writes in a lazily opened transaction until `commit`.
//!
//! # Invariants
//! - Opened connections have `foreign_keys=ON` and a busy timeout.
//! - `close` never persists uncommitted work.
//! - `reopen` swaps the connection in place, so every clone sees it.

use super::{DbError, DbResult};
use log::{debug, error, info, warn};
use rusqlite::Connection;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

const BACKEND: &str = "sqlite";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Storage location resolved from a connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlTarget {
    Memory,
    File(PathBuf),
}

impl SqlTarget {
    fn mode(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File(_) => "file",
        }
    }
}

/// Parses a SQLite connection string.
///
/// URLs follow the SQLAlchemy layout: `sqlite:///<path>` is relative to
/// the working directory and `sqlite:////<path>` is absolute. `sqlite://`,
/// `sqlite:///:memory:`, `sqlite::memory:` and `:memory:` select an
/// in-memory database. A string without a scheme is a filesystem path.
/// Other schemes, and `sqlite://<host>/...`, are rejected since only the
/// bundled local engine is available.
pub fn parse_connection_string(value: &str) -> DbResult<SqlTarget> {
    let trimmed = value.trim();
    if matches!(
        trimmed,
        ":memory:" | "sqlite::memory:" | "sqlite://" | "sqlite:///:memory:"
    ) {
        return Ok(SqlTarget::Memory);
    }

    let path = if let Some(rest) = trimmed.strip_prefix("sqlite:///") {
        rest
    } else if trimmed.contains("://") || trimmed.starts_with("sqlite:") {
        return Err(DbError::UnsupportedConnectionString(value.to_string()));
    } else {
        trimmed
    };

    if path.is_empty() {
        return Err(DbError::UnsupportedConnectionString(value.to_string()));
    }
    Ok(SqlTarget::File(PathBuf::from(path)))
}

/// Shared handle over one SQLite connection.
///
/// Cloning is cheap and yields another handle to the same connection.
#[derive(Debug, Clone)]
pub struct SqlSession {
    inner: Rc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    target: Option<SqlTarget>,
    conn: RefCell<Option<Connection>>,
}

impl SqlSession {
    /// Opens a session from a connection string.
    ///
    /// # Side effects
    /// - Emits `session_open` logging events with duration and status.
    pub fn open(connection_string: &str) -> DbResult<Self> {
        let target = parse_connection_string(connection_string)?;
        let conn = open_target(&target)?;
        Ok(Self {
            inner: Rc::new(SessionInner {
                target: Some(target),
                conn: RefCell::new(Some(conn)),
            }),
        })
    }

    /// Wraps a pre-built connection. The session cannot be reopened once
    /// closed because no connection parameters are known.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            inner: Rc::new(SessionInner {
                target: None,
                conn: RefCell::new(Some(conn)),
            }),
        }
    }

    pub fn target(&self) -> Option<&SqlTarget> {
        self.inner.target.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.inner.conn.borrow().is_some()
    }

    /// Returns whether both handles point at the same underlying session.
    pub fn same_session(&self, other: &SqlSession) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns whether a write transaction is open and not yet committed.
    pub fn has_pending_changes(&self) -> bool {
        self.inner
            .conn
            .borrow()
            .as_ref()
            .is_some_and(|conn| !conn.is_autocommit())
    }

    /// Runs a read against the live connection.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> DbResult<T> {
        let guard = self.inner.conn.borrow();
        let conn = guard
            .as_ref()
            .ok_or(DbError::Disposed { backend: BACKEND })?;
        Ok(f(conn)?)
    }

    /// Runs a write inside the session transaction, opening it if needed.
    pub fn write<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> DbResult<T> {
        self.with_connection(|conn| {
            if conn.is_autocommit() {
                conn.execute_batch("BEGIN DEFERRED;")?;
            }
            f(conn)
        })
    }

    /// Executes raw SQL statements (schema setup and the like).
    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.with_connection(|conn| conn.execute_batch(sql))
    }

    /// Commits pending writes. A no-op when nothing is pending.
    pub fn commit(&self) -> DbResult<()> {
        let started_at = Instant::now();
        let committed = self.with_connection(|conn| {
            if conn.is_autocommit() {
                return Ok(false);
            }
            conn.execute_batch("COMMIT;")?;
            Ok(true)
        });

        match committed {
            Ok(true) => {
                debug!(
                    "event=session_commit module=db status=ok duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(err) => {
                error!(
                    "event=session_commit module=db status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Discards pending writes.
    pub fn rollback(&self) -> DbResult<()> {
        self.with_connection(|conn| {
            if !conn.is_autocommit() {
                conn.execute_batch("ROLLBACK;")?;
            }
            Ok(())
        })
    }

    /// Closes the connection, discarding uncommitted writes.
    ///
    /// Closing an already closed session is a no-op.
    pub fn close(&self) -> DbResult<()> {
        let Some(conn) = self.inner.conn.borrow_mut().take() else {
            return Ok(());
        };

        if !conn.is_autocommit() {
            warn!("event=session_close module=db status=rollback reason=uncommitted_changes");
            if let Err(err) = conn.execute_batch("ROLLBACK;") {
                warn!("event=session_close module=db status=rollback_failed error={err}");
            }
        }

        match conn.close() {
            Ok(()) => {
                info!("event=session_close module=db status=ok");
                Ok(())
            }
            Err((_, err)) => {
                error!("event=session_close module=db status=error error={err}");
                Err(err.into())
            }
        }
    }

    /// Reconnects a closed session with its original connection string.
    ///
    /// A no-op on a live session.
    pub fn reopen(&self) -> DbResult<()> {
        if self.is_open() {
            return Ok(());
        }
        let target = self
            .inner
            .target
            .as_ref()
            .ok_or(DbError::CannotReopen { backend: BACKEND })?;
        let conn = open_target(target)?;
        *self.inner.conn.borrow_mut() = Some(conn);
        Ok(())
    }
}

fn open_target(target: &SqlTarget) -> DbResult<Connection> {
    let started_at = Instant::now();
    let mode = target.mode();
    info!("event=session_open module=db status=start mode={mode}");

    let opened = match target {
        SqlTarget::Memory => Connection::open_in_memory(),
        SqlTarget::File(path) => Connection::open(path),
    };
    let conn = match opened {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                concat!(
                    "event=session_open module=db status=error mode={} duration_ms={} ",
                    "error_code=db_open_failed error={}"
                ),
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&conn) {
        Ok(()) => {
            info!(
                "event=session_open module=db status=ok mode={} duration_ms={}",
                mode,
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                concat!(
                    "event=session_open module=db status=error mode={} duration_ms={} ",
                    "error_code=db_bootstrap_failed error={}"
                ),
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err.into())
        }
    }
}

fn bootstrap_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}

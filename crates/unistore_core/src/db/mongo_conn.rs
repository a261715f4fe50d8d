//! MongoDB server connection handle.
//!
//! # Responsibility
//! - Build a blocking driver client from server address and port.
//! - Hand out database handles to repositories sharing the connection.
//!
//! # Invariants
//! - Client construction is lazy: no network round trip until first use.
//! - `reopen` swaps the client in place, so every clone sees it.

use super::{DbError, DbResult};
use log::{error, info};
use mongodb::bson::doc;
use mongodb::sync::{Client, Database};
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use std::time::Instant;

const BACKEND: &str = "mongodb";

pub const DEFAULT_MONGO_SERVER: &str = "localhost";
pub const DEFAULT_MONGO_PORT: u16 = 27017;

/// Shared handle over one MongoDB client.
#[derive(Clone)]
pub struct MongoConnection {
    inner: Rc<ConnectionInner>,
}

struct ConnectionInner {
    address: Option<(String, u16)>,
    client: RefCell<Option<Client>>,
}

impl Debug for MongoConnection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoConnection")
            .field("address", &self.inner.address)
            .field("open", &self.is_open())
            .finish()
    }
}

impl MongoConnection {
    /// Creates a client for `mongodb://<server>:<port>`.
    ///
    /// # Side effects
    /// - Emits `mongo_connect` logging events with duration and status.
    pub fn connect(server: &str, port: u16) -> DbResult<Self> {
        let client = build_client(server, port)?;
        Ok(Self {
            inner: Rc::new(ConnectionInner {
                address: Some((server.to_string(), port)),
                client: RefCell::new(Some(client)),
            }),
        })
    }

    /// Connects to `localhost:27017`.
    pub fn connect_default() -> DbResult<Self> {
        Self::connect(DEFAULT_MONGO_SERVER, DEFAULT_MONGO_PORT)
    }

    /// Wraps a pre-built client. The connection cannot be reopened once
    /// closed.
    pub fn from_client(client: Client) -> Self {
        Self {
            inner: Rc::new(ConnectionInner {
                address: None,
                client: RefCell::new(Some(client)),
            }),
        }
    }

    pub fn server(&self) -> Option<&str> {
        self.inner.address.as_ref().map(|(server, _)| server.as_str())
    }

    pub fn port(&self) -> Option<u16> {
        self.inner.address.as_ref().map(|(_, port)| *port)
    }

    pub fn is_open(&self) -> bool {
        self.inner.client.borrow().is_some()
    }

    pub fn same_connection(&self, other: &MongoConnection) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns a handle to the named database on the live client.
    pub fn database(&self, name: &str) -> DbResult<Database> {
        let guard = self.inner.client.borrow();
        let client = guard
            .as_ref()
            .ok_or(DbError::Disposed { backend: BACKEND })?;
        Ok(client.database(name))
    }

    /// Issues a `ping` command, forcing server selection.
    pub fn ping(&self) -> DbResult<()> {
        self.database("admin")?
            .run_command(doc! { "ping": 1 })
            .run()?;
        Ok(())
    }

    /// Drops the client. Closing twice is a no-op.
    pub fn close(&self) {
        if self.inner.client.borrow_mut().take().is_some() {
            info!("event=mongo_close module=db status=ok");
        }
    }

    /// Rebuilds a closed client from the original server and port.
    pub fn reopen(&self) -> DbResult<()> {
        if self.is_open() {
            return Ok(());
        }
        let (server, port) = self
            .inner
            .address
            .as_ref()
            .ok_or(DbError::CannotReopen { backend: BACKEND })?;
        let client = build_client(server, *port)?;
        *self.inner.client.borrow_mut() = Some(client);
        Ok(())
    }
}

fn build_client(server: &str, port: u16) -> DbResult<Client> {
    let started_at = Instant::now();
    info!("event=mongo_connect module=db status=start server={server} port={port}");

    match Client::with_uri_str(format!("mongodb://{server}:{port}")) {
        Ok(client) => {
            info!(
                "event=mongo_connect module=db status=ok server={} port={} duration_ms={}",
                server,
                port,
                started_at.elapsed().as_millis()
            );
            Ok(client)
        }
        Err(err) => {
            error!(
                concat!(
                    "event=mongo_connect module=db status=error server={} port={} ",
                    "duration_ms={} error={}"
                ),
                server,
                port,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err.into())
        }
    }
}

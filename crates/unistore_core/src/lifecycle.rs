//! Scoped acquisition for repositories and facades.
//!
//! # Invariants
//! - `enter` leaves the value connected using its original parameters.
//! - A `Scoped` value is disposed exactly once, on every exit path.

use crate::repo::contract::RepoResult;
use log::warn;
use std::ops::{Deref, DerefMut};

/// Connection lifecycle shared by repositories and facades.
pub trait Lifecycle {
    /// Reconnects from the originally supplied parameters if the
    /// connection was released. A no-op while connected.
    fn reinitialize(&mut self) -> RepoResult<()>;

    /// Releases the underlying connection. Disposing twice is a no-op.
    fn dispose(&mut self) -> RepoResult<()>;

    /// Re-initializes and returns a guard that disposes on drop.
    fn enter(mut self) -> RepoResult<Scoped<Self>>
    where
        Self: Sized,
    {
        self.reinitialize()?;
        Ok(Scoped {
            inner: self,
            released: false,
        })
    }
}

/// Guard returned by [`Lifecycle::enter`].
///
/// Dereferences to the wrapped value. Dropping the guard disposes it,
/// including during unwinding; use [`Scoped::close`] to observe the
/// dispose result.
#[derive(Debug)]
pub struct Scoped<T: Lifecycle> {
    inner: T,
    released: bool,
}

impl<T: Lifecycle> Scoped<T> {
    /// Disposes now and reports the outcome.
    pub fn close(mut self) -> RepoResult<()> {
        self.released = true;
        self.inner.dispose()
    }
}

impl<T: Lifecycle> Deref for Scoped<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: Lifecycle> DerefMut for Scoped<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: Lifecycle> Drop for Scoped<T> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = self.inner.dispose() {
            warn!("event=scope_exit module=lifecycle status=error error={err}");
        }
    }
}

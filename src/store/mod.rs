//! List-command capabilities the pools and the listener are written against.
//!
//! Two levels:
//!
//! - [`ListStore`] is what callers use: shared (`&self`) list commands. A
//!   [`PoolHandle`](crate::pool::PoolHandle) implements it by borrowing a
//!   pooled connection per call; [`InMemoryStore`] implements it directly.
//! - [`ListConnection`] + [`Connector`] are what a backend provides: one
//!   socket's worth of commands, and a way to open such a socket to an
//!   endpoint with the pool's settings.
//!
//! Lists follow the usual head/tail convention: producers push at the head,
//! consumers pop from the tail, so a single consumer sees FIFO order.

mod in_memory;

use std::sync::Arc;
use std::time::Duration;

use crate::config::PoolConfig;
use crate::endpoint::Endpoint;
use crate::error::StoreError;

pub use in_memory::{InMemoryConnector, InMemoryStore};

/// Shared list commands on a store.
pub trait ListStore: Send + Sync {
    /// Push `message` at the head of `key`. Returns the new length.
    fn push(&self, key: &str, message: &[u8]) -> Result<usize, StoreError>;

    /// Atomically pop the tail of `source` and push it at the head of
    /// `destination`. `None` when `source` is empty.
    fn pop_and_push(&self, source: &str, destination: &str)
        -> Result<Option<Vec<u8>>, StoreError>;

    /// Blocking [`pop_and_push`](ListStore::pop_and_push): waits up to
    /// `timeout` for `source` to become non-empty.
    fn pop_blocking_and_push(
        &self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, StoreError>;

    /// The tail element of `key` without removing it.
    fn peek_tail(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Remove occurrences of `message` from `key`: the first `count` from the
    /// head when positive, the last `-count` from the tail when negative, all
    /// of them when zero. Returns how many were removed.
    fn remove_occurrence(&self, key: &str, message: &[u8], count: i64) -> Result<usize, StoreError>;

    fn len(&self, key: &str) -> Result<usize, StoreError>;

    /// Close every pooled socket. Later calls reconnect lazily.
    fn disconnect_all(&self);
}

impl<S: ListStore + ?Sized> ListStore for Arc<S> {
    fn push(&self, key: &str, message: &[u8]) -> Result<usize, StoreError> {
        (**self).push(key, message)
    }

    fn pop_and_push(
        &self,
        source: &str,
        destination: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).pop_and_push(source, destination)
    }

    fn pop_blocking_and_push(
        &self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).pop_blocking_and_push(source, destination, timeout)
    }

    fn peek_tail(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).peek_tail(key)
    }

    fn remove_occurrence(&self, key: &str, message: &[u8], count: i64) -> Result<usize, StoreError> {
        (**self).remove_occurrence(key, message, count)
    }

    fn len(&self, key: &str) -> Result<usize, StoreError> {
        (**self).len(key)
    }

    fn disconnect_all(&self) {
        (**self).disconnect_all()
    }
}

/// One open socket to a store instance.
///
/// Dropping the connection closes it. For the blocking pop the connector
/// must make sure the socket read timeout does not cut the wait short.
pub trait ListConnection: Send {
    fn push(&mut self, key: &str, message: &[u8]) -> Result<usize, StoreError>;

    fn pop_and_push(
        &mut self,
        source: &str,
        destination: &str,
    ) -> Result<Option<Vec<u8>>, StoreError>;

    fn pop_blocking_and_push(
        &mut self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, StoreError>;

    fn peek_tail(&mut self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn remove_occurrence(
        &mut self,
        key: &str,
        message: &[u8],
        count: i64,
    ) -> Result<usize, StoreError>;

    fn len(&mut self, key: &str) -> Result<usize, StoreError>;
}

/// Opens connections for a pool.
///
/// The connector applies `config` (auth, timeouts, keepalive) and fails
/// with a transient [`StoreError`] if the endpoint cannot be reached.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        endpoint: &Endpoint,
        config: &PoolConfig,
    ) -> Result<Box<dyn ListConnection>, StoreError>;
}

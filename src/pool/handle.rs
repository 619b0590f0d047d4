use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::discovery::Role;
use crate::endpoint::Endpoint;
use crate::error::StoreError;
use crate::store::{ListConnection, ListStore};

use super::ConnectionPool;

/// A cheap, cloneable [`ListStore`] backed by a [`ConnectionPool`].
///
/// Each call borrows a connection for the duration of one command. A
/// connection that fails with a transient error is closed rather than
/// pooled. A [`StoreError::ReadOnly`] on the write side means the writer was
/// demoted, so the whole pool is disconnected and the next call re-resolves.
#[derive(Clone)]
pub struct PoolHandle {
    pool: Arc<ConnectionPool>,
}

impl PoolHandle {
    pub fn new(pool: ConnectionPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn role(&self) -> Role {
        self.pool.role()
    }

    /// Endpoint the underlying pool is bound to, if connected.
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.pool.endpoint()
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    fn execute<T>(
        &self,
        command: &'static str,
        f: impl FnOnce(&mut dyn ListConnection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.pool.acquire()?;
        let result = conn.run(f);

        if let Err(err) = &result {
            if err.is_transient() {
                let endpoint = conn.endpoint().clone();
                conn.discard();
                if self.role() == Role::Writer && matches!(err, StoreError::ReadOnly(_)) {
                    warn!(
                        command,
                        %endpoint,
                        "writer is read-only, disconnecting pool to re-resolve"
                    );
                    self.pool.disconnect_all();
                }
            }
        }
        result
    }
}

impl ListStore for PoolHandle {
    fn push(&self, key: &str, message: &[u8]) -> Result<usize, StoreError> {
        self.execute("push", |conn| conn.push(key, message))
    }

    fn pop_and_push(
        &self,
        source: &str,
        destination: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        self.execute("pop_and_push", |conn| conn.pop_and_push(source, destination))
    }

    fn pop_blocking_and_push(
        &self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        self.execute("pop_blocking_and_push", |conn| {
            conn.pop_blocking_and_push(source, destination, timeout)
        })
    }

    fn peek_tail(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.execute("peek_tail", |conn| conn.peek_tail(key))
    }

    fn remove_occurrence(&self, key: &str, message: &[u8], count: i64) -> Result<usize, StoreError> {
        self.execute("remove_occurrence", |conn| {
            conn.remove_occurrence(key, message, count)
        })
    }

    fn len(&self, key: &str) -> Result<usize, StoreError> {
        self.execute("len", |conn| conn.len(key))
    }

    fn disconnect_all(&self) {
        self.pool.disconnect_all();
    }
}

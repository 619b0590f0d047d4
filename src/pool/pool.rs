use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::discovery::{Role, TopologyResolver};
use crate::endpoint::Endpoint;
use crate::error::StoreError;
use crate::store::{Connector, ListConnection};

struct PoolState {
    /// Endpoint the pool is currently bound to; `None` until first use and
    /// after a disconnect.
    endpoint: Option<Endpoint>,
    idle: Vec<(Endpoint, Box<dyn ListConnection>)>,
    /// Bumped by `disconnect_all`; connections from an older generation are
    /// closed on release instead of pooled.
    generation: u64,
}

/// Connections for one role of one logical store.
///
/// The endpoint is resolved lazily: only when a new connection has to be
/// opened. If the resolved endpoint differs from the one the idle
/// connections point at, those are closed first, so a failover is picked
/// up as soon as the pool needs a fresh socket.
///
/// Safe to share between threads; acquire and release only take the pool
/// lock briefly, never across network I/O.
pub struct ConnectionPool {
    role: Role,
    resolver: Arc<TopologyResolver>,
    connector: Arc<dyn Connector>,
    config: PoolConfig,
    state: Mutex<PoolState>,
}

impl ConnectionPool {
    pub fn new(
        role: Role,
        resolver: Arc<TopologyResolver>,
        connector: Arc<dyn Connector>,
        config: PoolConfig,
    ) -> Self {
        Self {
            role,
            resolver,
            connector,
            config,
            state: Mutex::new(PoolState {
                endpoint: None,
                idle: Vec::new(),
                generation: 0,
            }),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Endpoint the pool is bound to, if it has connected since the last
    /// disconnect.
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.state().endpoint.clone()
    }

    pub fn idle_connections(&self) -> usize {
        self.state().idle.len()
    }

    /// Borrow a connection, reusing an idle one or opening a new one.
    pub fn acquire(&self) -> Result<PooledConnection<'_>, StoreError> {
        {
            let mut state = self.state();
            if let Some((endpoint, conn)) = state.idle.pop() {
                return Ok(PooledConnection {
                    pool: self,
                    conn: Some(conn),
                    endpoint,
                    generation: state.generation,
                });
            }
        }

        let (endpoint, conn) = self.open()?;

        let mut state = self.state();
        if state.endpoint.as_ref() != Some(&endpoint) {
            if let Some(previous) = &state.endpoint {
                info!(
                    role = %self.role,
                    from = %previous,
                    to = %endpoint,
                    dropped = state.idle.len(),
                    "pool endpoint changed"
                );
            }
            state.idle.clear();
            state.endpoint = Some(endpoint.clone());
        }

        Ok(PooledConnection {
            pool: self,
            conn: Some(conn),
            endpoint,
            generation: state.generation,
        })
    }

    /// Close every idle connection and forget the endpoint.
    ///
    /// Connections currently borrowed are closed when they come back. The
    /// pool stays usable and reconnects on the next acquire.
    pub fn disconnect_all(&self) {
        let mut state = self.state();
        let closed = state.idle.len();
        state.idle.clear();
        state.endpoint = None;
        state.generation += 1;
        debug!(role = %self.role, closed, "pool disconnected");
    }

    fn open(&self) -> Result<(Endpoint, Box<dyn ListConnection>), StoreError> {
        if self.role == Role::Reader {
            for replica in self.resolver.list_replicas()? {
                match self.connector.connect(&replica, &self.config) {
                    Ok(conn) => {
                        debug!(role = %self.role, endpoint = %replica, "connected");
                        return Ok((replica, conn));
                    }
                    Err(err) if err.is_transient() => {
                        warn!(role = %self.role, endpoint = %replica, error = %err, "replica unreachable");
                    }
                    Err(err) => return Err(err),
                }
            }
            debug!(role = %self.role, "no reachable replica, using writer");
        }

        let writer = self.resolver.resolve_writer()?;
        let conn = self.connector.connect(&writer, &self.config)?;
        debug!(role = %self.role, endpoint = %writer, "connected");
        Ok((writer, conn))
    }

    /// Pool the connection if it still belongs to the current generation
    /// and endpoint; otherwise it is dropped, which closes it.
    fn release(&self, endpoint: Endpoint, conn: Box<dyn ListConnection>, generation: u64) {
        let mut state = self.state();
        if generation == state.generation
            && state.endpoint.as_ref() == Some(&endpoint)
            && state.idle.len() < self.config.max_idle
        {
            state.idle.push((endpoint, conn));
        }
    }

    // The state holds no invariant a panic could break halfway, so a
    // poisoned lock is still safe to use.
    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A connection borrowed from a [`ConnectionPool`].
///
/// Goes back to the pool when dropped, unless it was
/// [discarded](PooledConnection::discard).
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    conn: Option<Box<dyn ListConnection>>,
    endpoint: Endpoint,
    generation: u64,
}

impl PooledConnection<'_> {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Run one or more commands on the connection.
    pub fn run<T>(
        &mut self,
        f: impl FnOnce(&mut dyn ListConnection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        match self.conn.as_deref_mut() {
            Some(conn) => f(conn),
            None => Err(StoreError::Connection {
                endpoint: None,
                reason: "connection already discarded".into(),
            }),
        }
    }

    /// Close the connection instead of returning it to the pool.
    pub fn discard(mut self) {
        self.conn = None;
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(self.endpoint.clone(), conn, self.generation);
        }
    }
}

use std::sync::Arc;

use tracing::info;

use crate::config::{ClientConfig, PoolConfig};
use crate::discovery::{DiscoveryTransport, Role, TopologyResolver};
use crate::error::StoreError;
use crate::store::Connector;

use super::{ConnectionPool, PoolHandle};

/// A write pool and a read pool for one logical store, sharing one
/// [`TopologyResolver`].
///
/// Both pools resolve their endpoint lazily, on first use and again after
/// a disconnect or failover. `write`/`master` and `read`/`slave` are two
/// names for the same two handles.
///
/// ## Example
///
/// ```ignore
/// let client = DualPoolClient::connect(config, my_discovery_transport, my_connector)?;
///
/// client.write().push("jobs", b"payload")?;
/// let backlog = client.read().len("jobs")?;
///
/// // On shutdown, or to force re-resolution:
/// client.disconnect();
/// ```
pub struct DualPoolClient {
    resolver: Arc<TopologyResolver>,
    write: PoolHandle,
    read: PoolHandle,
}

impl DualPoolClient {
    /// Build the resolver (peers shuffled once) and both pools.
    ///
    /// Nothing is resolved here unless `config.check_connection` is set, in
    /// which case an unusable topology fails construction.
    pub fn connect<T, C>(config: ClientConfig, transport: T, connector: C) -> Result<Self, StoreError>
    where
        T: DiscoveryTransport + 'static,
        C: Connector + 'static,
    {
        let resolver = TopologyResolver::new(&config.store_name, &config.discovery, transport);
        info!(
            store = %config.store_name,
            peers = config.discovery.peers.len(),
            min_other_peers = config.discovery.min_other_peers,
            "creating dual pool client"
        );

        let client = Self::from_resolver(resolver, config.pool, connector);
        if config.check_connection {
            let writer = client.resolver.resolve_writer()?;
            info!(store = %config.store_name, %writer, "writer confirmed");
        }
        Ok(client)
    }

    /// Build both pools on an existing resolver.
    pub fn from_resolver<C>(resolver: TopologyResolver, pool: PoolConfig, connector: C) -> Self
    where
        C: Connector + 'static,
    {
        let resolver = Arc::new(resolver);
        let connector: Arc<dyn Connector> = Arc::new(connector);

        let write = ConnectionPool::new(
            Role::Writer,
            resolver.clone(),
            connector.clone(),
            pool.clone(),
        );
        let read = ConnectionPool::new(Role::Reader, resolver.clone(), connector, pool);

        Self {
            resolver,
            write: PoolHandle::new(write),
            read: PoolHandle::new(read),
        }
    }

    pub fn store_name(&self) -> &str {
        self.resolver.store_name()
    }

    pub fn resolver(&self) -> &TopologyResolver {
        &self.resolver
    }

    /// Handle bound to the current writer.
    pub fn write(&self) -> &PoolHandle {
        &self.write
    }

    /// Same handle as [`write`](DualPoolClient::write).
    pub fn master(&self) -> &PoolHandle {
        &self.write
    }

    /// Handle bound to a healthy replica, or the writer if there is none.
    pub fn read(&self) -> &PoolHandle {
        &self.read
    }

    /// Same handle as [`read`](DualPoolClient::read).
    pub fn slave(&self) -> &PoolHandle {
        &self.read
    }

    /// Close every pooled socket on both sides.
    ///
    /// Idempotent. The client stays usable; the next call on either handle
    /// re-resolves and reconnects.
    pub fn disconnect(&self) {
        self.write.pool().disconnect_all();
        self.read.pool().disconnect_all();
    }
}

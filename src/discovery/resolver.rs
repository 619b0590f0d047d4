use std::sync::{Mutex, MutexGuard};

use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::endpoint::Endpoint;
use crate::error::StoreError;

use super::{DiscoveryTransport, ReleasingTransport, Role};

/// Resolves the current writer and healthy readers of one logical store.
///
/// Holds no sockets between calls: the transport is wrapped in a
/// [`ReleasingTransport`]. Failures are returned as-is; retrying is the
/// caller's decision.
///
/// ## Example
///
/// ```ignore
/// let resolver = TopologyResolver::new("jobs", &discovery_config, my_transport);
/// let writer = resolver.resolve_writer()?;
/// let replicas = resolver.list_replicas()?;
/// ```
pub struct TopologyResolver {
    store_name: String,
    min_other_peers: usize,
    peers: Mutex<Vec<Endpoint>>,
    transport: Box<dyn DiscoveryTransport>,
}

impl TopologyResolver {
    /// Build a resolver, shuffling the peer list once.
    ///
    /// The shuffle is load spreading only: every process otherwise hammers
    /// the first configured peer.
    pub fn new<T>(store_name: impl Into<String>, config: &DiscoveryConfig, transport: T) -> Self
    where
        T: DiscoveryTransport + 'static,
    {
        let mut peers = config.peers.clone();
        peers.shuffle(&mut rand::rng());
        Self::build(store_name.into(), peers, config.min_other_peers, transport)
    }

    /// Build a resolver that queries peers exactly in configured order.
    pub fn with_fixed_order<T>(
        store_name: impl Into<String>,
        config: &DiscoveryConfig,
        transport: T,
    ) -> Self
    where
        T: DiscoveryTransport + 'static,
    {
        Self::build(
            store_name.into(),
            config.peers.clone(),
            config.min_other_peers,
            transport,
        )
    }

    fn build<T>(store_name: String, peers: Vec<Endpoint>, min_other_peers: usize, transport: T) -> Self
    where
        T: DiscoveryTransport + 'static,
    {
        Self {
            store_name,
            min_other_peers,
            peers: Mutex::new(peers),
            transport: Box::new(ReleasingTransport::new(transport)),
        }
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn min_other_peers(&self) -> usize {
        self.min_other_peers
    }

    /// Peers in the order the next resolution will query them.
    pub fn peers(&self) -> Result<Vec<Endpoint>, StoreError> {
        Ok(self.lock_peers()?.clone())
    }

    /// Endpoint for `role`: the writer, or the first healthy replica with
    /// the writer as fallback when no replica is healthy.
    pub fn resolve(&self, role: Role) -> Result<Endpoint, StoreError> {
        match role {
            Role::Writer => self.resolve_writer(),
            Role::Reader => match self.list_replicas()?.into_iter().next() {
                Some(replica) => Ok(replica),
                None => {
                    debug!(store = %self.store_name, "no healthy replica, falling back to writer");
                    self.resolve_writer()
                }
            },
        }
    }

    /// First writer reported by a peer that passes the quorum check.
    pub fn resolve_writer(&self) -> Result<Endpoint, StoreError> {
        let peers = self.peers()?;

        for (index, peer) in peers.iter().enumerate() {
            match self.transport.master_state(peer, &self.store_name) {
                Ok(Some(state)) if state.is_confirmed(self.min_other_peers) => {
                    debug!(store = %self.store_name, %peer, writer = %state.endpoint, "writer resolved");
                    if index > 0 {
                        self.promote(peer)?;
                    }
                    return Ok(state.endpoint);
                }
                Ok(Some(state)) => {
                    warn!(
                        store = %self.store_name,
                        %peer,
                        writer = %state.endpoint,
                        is_master = state.is_master,
                        is_sdown = state.is_sdown,
                        is_odown = state.is_odown,
                        other_peers = state.num_other_peers,
                        required = self.min_other_peers,
                        "writer report failed quorum check"
                    );
                }
                Ok(None) => {
                    debug!(store = %self.store_name, %peer, "peer does not monitor store");
                }
                Err(err) => {
                    debug!(store = %self.store_name, %peer, error = %err, "discovery peer failed");
                }
            }
        }

        Err(StoreError::TopologyUnavailable {
            store: self.store_name.clone(),
            min_other_peers: self.min_other_peers,
        })
    }

    /// Healthy replicas from the first peer that reports any.
    ///
    /// An empty list is not an error; the reader pool falls back to the
    /// writer in that case.
    pub fn list_replicas(&self) -> Result<Vec<Endpoint>, StoreError> {
        let peers = self.peers()?;

        for peer in &peers {
            match self.transport.replicas(peer, &self.store_name) {
                Ok(replicas) => {
                    let total = replicas.len();
                    let healthy: Vec<Endpoint> = replicas
                        .into_iter()
                        .filter(|replica| replica.is_healthy())
                        .map(|replica| replica.endpoint)
                        .collect();
                    debug!(
                        store = %self.store_name,
                        %peer,
                        total,
                        healthy = healthy.len(),
                        "replicas listed"
                    );
                    if !healthy.is_empty() {
                        return Ok(healthy);
                    }
                }
                Err(err) => {
                    debug!(store = %self.store_name, %peer, error = %err, "discovery peer failed");
                }
            }
        }

        Ok(Vec::new())
    }

    fn promote(&self, peer: &Endpoint) -> Result<(), StoreError> {
        let mut peers = self.lock_peers()?;
        if let Some(index) = peers.iter().position(|p| p == peer) {
            peers.swap(0, index);
            info!(store = %self.store_name, %peer, "discovery peer promoted to front");
        }
        Ok(())
    }

    fn lock_peers(&self) -> Result<MutexGuard<'_, Vec<Endpoint>>, StoreError> {
        self.peers
            .lock()
            .map_err(|_| StoreError::LockPoisoned("discovery peer list"))
    }
}

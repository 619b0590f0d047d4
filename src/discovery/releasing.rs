use crate::endpoint::Endpoint;
use crate::error::StoreError;

use super::{DiscoveryTransport, MasterState, ReplicaState};

/// Wraps a [`DiscoveryTransport`] so every query releases its sockets.
///
/// Discovery traffic is bursty and small; keeping idle sockets to peers only
/// wastes file descriptors and delays noticing a dead peer. The release runs
/// whether the query succeeded or failed.
pub struct ReleasingTransport<T> {
    inner: T,
}

impl<T: DiscoveryTransport> ReleasingTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: DiscoveryTransport> DiscoveryTransport for ReleasingTransport<T> {
    fn master_state(
        &self,
        peer: &Endpoint,
        store_name: &str,
    ) -> Result<Option<MasterState>, StoreError> {
        let result = self.inner.master_state(peer, store_name);
        self.inner.release_connections();
        result
    }

    fn replicas(&self, peer: &Endpoint, store_name: &str) -> Result<Vec<ReplicaState>, StoreError> {
        let result = self.inner.replicas(peer, store_name);
        self.inner.release_connections();
        result
    }

    fn release_connections(&self) {
        self.inner.release_connections();
    }
}

//! In-memory discovery peers for tests and single-process setups.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::endpoint::Endpoint;
use crate::error::StoreError;

use super::{DiscoveryTransport, MasterState, ReplicaState};

#[derive(Default)]
struct DiscoveryState {
    /// Registered peers and whether they answer.
    peers: Vec<(Endpoint, bool)>,
    writers: HashMap<String, WriterEntry>,
    replicas: HashMap<String, Vec<ReplicaState>>,
    queries: Vec<Endpoint>,
}

struct WriterEntry {
    endpoint: Endpoint,
    is_sdown: bool,
    is_odown: bool,
}

/// A set of discovery peers that share one view of the topology.
///
/// Each reachable peer reports the other reachable peers as its quorum, so
/// marking peers unreachable shrinks what every peer can confirm. Queries
/// count as open sockets until
/// [`release_connections`](DiscoveryTransport::release_connections).
///
/// Clones share the same state.
///
/// ## Example
///
/// ```
/// use failover_queue::discovery::{DiscoveryTransport, InMemoryDiscovery};
/// use failover_queue::Endpoint;
///
/// let s1 = Endpoint::new("s1", 26379);
/// let discovery = InMemoryDiscovery::new([s1.clone(), Endpoint::new("s2", 26379)]);
/// discovery.set_writer("jobs", Endpoint::new("db1", 6379));
///
/// let state = discovery.master_state(&s1, "jobs").unwrap().unwrap();
/// assert_eq!(state.endpoint, Endpoint::new("db1", 6379));
/// assert_eq!(state.num_other_peers, 1);
/// ```
#[derive(Clone, Default)]
pub struct InMemoryDiscovery {
    state: Arc<Mutex<DiscoveryState>>,
    open: Arc<AtomicUsize>,
}

impl InMemoryDiscovery {
    pub fn new(peers: impl IntoIterator<Item = Endpoint>) -> Self {
        let discovery = Self::default();
        discovery.state().peers = peers.into_iter().map(|peer| (peer, true)).collect();
        discovery
    }

    /// Point `store_name` at a (healthy) writer.
    pub fn set_writer(&self, store_name: &str, endpoint: Endpoint) {
        self.state().writers.insert(
            store_name.to_string(),
            WriterEntry {
                endpoint,
                is_sdown: false,
                is_odown: false,
            },
        );
    }

    pub fn set_writer_down(&self, store_name: &str, subjectively: bool, objectively: bool) {
        if let Some(writer) = self.state().writers.get_mut(store_name) {
            writer.is_sdown = subjectively;
            writer.is_odown = objectively;
        }
    }

    pub fn set_replicas(&self, store_name: &str, replicas: Vec<ReplicaState>) {
        self.state().replicas.insert(store_name.to_string(), replicas);
    }

    pub fn set_reachable(&self, peer: &Endpoint, reachable: bool) {
        for (endpoint, up) in self.state().peers.iter_mut() {
            if endpoint == peer {
                *up = reachable;
            }
        }
    }

    /// Sockets opened by queries and not yet released.
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Peers that answered a query, in order.
    pub fn queried_peers(&self) -> Vec<Endpoint> {
        self.state().queries.clone()
    }

    pub fn clear_queries(&self) {
        self.state().queries.clear();
    }

    fn state(&self) -> MutexGuard<'_, DiscoveryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a "socket" to `peer` and returns how many other peers it sees.
    fn connect(&self, state: &mut DiscoveryState, peer: &Endpoint) -> Result<usize, StoreError> {
        let reachable = state
            .peers
            .iter()
            .any(|(endpoint, up)| endpoint == peer && *up);
        if !reachable {
            return Err(StoreError::connection(peer, "discovery peer unreachable"));
        }
        self.open.fetch_add(1, Ordering::SeqCst);
        state.queries.push(peer.clone());
        Ok(state
            .peers
            .iter()
            .filter(|(endpoint, up)| endpoint != peer && *up)
            .count())
    }
}

impl DiscoveryTransport for InMemoryDiscovery {
    fn master_state(
        &self,
        peer: &Endpoint,
        store_name: &str,
    ) -> Result<Option<MasterState>, StoreError> {
        let mut state = self.state();
        let num_other_peers = self.connect(&mut state, peer)?;
        Ok(state.writers.get(store_name).map(|writer| MasterState {
            endpoint: writer.endpoint.clone(),
            is_master: true,
            is_sdown: writer.is_sdown,
            is_odown: writer.is_odown,
            num_other_peers,
        }))
    }

    fn replicas(&self, peer: &Endpoint, store_name: &str) -> Result<Vec<ReplicaState>, StoreError> {
        let mut state = self.state();
        self.connect(&mut state, peer)?;
        Ok(state.replicas.get(store_name).cloned().unwrap_or_default())
    }

    fn release_connections(&self) {
        self.open.store(0, Ordering::SeqCst);
    }
}

//! Topology discovery - which endpoint is writable, which replicas are healthy.
//!
//! The discovery protocol (a quorum of monitoring peers watching the store's
//! replicas) is reached through the [`DiscoveryTransport`] capability. On top
//! of it, [`TopologyResolver`] implements the resolution rules:
//!
//! - peers are shuffled once when the resolver is built, to spread discovery
//!   load across processes; a peer that answers after earlier ones failed is
//!   moved to the front
//! - a writer report counts only if the reporting peer sees at least
//!   `min_other_peers` other peers and the writer is neither subjectively nor
//!   objectively down
//! - replicas that are down or whose replication link is broken are dropped
//! - every socket opened to a peer is released as soon as the query returns
//!   (see [`ReleasingTransport`])
//!
//! ```text
//!   DualPoolClient ──► TopologyResolver ──► ReleasingTransport ──► DiscoveryTransport
//!                      (order, quorum,      (release after          (peer RPC)
//!                       health filter)       every call)
//! ```

mod in_memory;
mod releasing;
mod resolver;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;
use crate::error::StoreError;

pub use in_memory::InMemoryDiscovery;
pub use releasing::ReleasingTransport;
pub use resolver::TopologyResolver;

/// Which side of the store a pool talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Writer,
    Reader,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Writer => write!(f, "writer"),
            Role::Reader => write!(f, "reader"),
        }
    }
}

/// One peer's view of the store's current writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MasterState {
    pub endpoint: Endpoint,
    /// The peer still considers this instance the master.
    pub is_master: bool,
    pub is_sdown: bool,
    pub is_odown: bool,
    /// Number of other discovery peers the reporting peer can see.
    pub num_other_peers: usize,
}

impl MasterState {
    /// Whether the report is trustworthy under the given quorum.
    pub fn is_confirmed(&self, min_other_peers: usize) -> bool {
        self.is_master && !self.is_sdown && !self.is_odown && self.num_other_peers >= min_other_peers
    }
}

/// Replication link state as reported for a replica.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkStatus {
    Ok,
    Err,
    Other(String),
}

impl From<&str> for LinkStatus {
    fn from(value: &str) -> Self {
        match value {
            "ok" => LinkStatus::Ok,
            "err" => LinkStatus::Err,
            other => LinkStatus::Other(other.to_string()),
        }
    }
}

/// One replica as listed by a discovery peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplicaState {
    pub endpoint: Endpoint,
    pub is_odown: bool,
    pub is_sdown: bool,
    pub link_status: LinkStatus,
}

impl ReplicaState {
    /// A replica that is up and replicating.
    pub fn healthy(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            is_odown: false,
            is_sdown: false,
            link_status: LinkStatus::Ok,
        }
    }

    pub fn is_healthy(&self) -> bool {
        !self.is_odown && !self.is_sdown && self.link_status == LinkStatus::Ok
    }
}

/// RPCs against a single discovery peer.
///
/// Implementations may open a socket per peer and keep it until
/// [`release_connections`](DiscoveryTransport::release_connections); the
/// resolver always wraps them in [`ReleasingTransport`] so nothing stays
/// open between resolutions.
pub trait DiscoveryTransport: Send + Sync {
    /// The peer's view of the writer for `store_name`, or `None` if the peer
    /// does not monitor that store.
    fn master_state(&self, peer: &Endpoint, store_name: &str)
        -> Result<Option<MasterState>, StoreError>;

    /// Every replica the peer knows for `store_name`, unfiltered.
    fn replicas(&self, peer: &Endpoint, store_name: &str) -> Result<Vec<ReplicaState>, StoreError>;

    /// Close every socket opened to any peer.
    fn release_connections(&self);
}

pub mod config;
pub mod discovery;
pub mod endpoint;
pub mod error;
pub mod listener;
pub mod message;
pub mod pool;
pub mod store;

pub use config::{ClientConfig, DiscoveryConfig, KeepaliveConfig, ListenerConfig, PoolConfig};
pub use discovery::{DiscoveryTransport, InMemoryDiscovery, Role, TopologyResolver};
pub use endpoint::{Endpoint, ParseEndpointError};
pub use error::{HandlerError, StoreError};
pub use listener::{
    Decoded, EchoHandler, ListenerStats, ListenerThread, MessageHandler, ReliableListener,
    ShutdownToken,
};
pub use pool::{DualPoolClient, PoolHandle};
pub use store::{Connector, InMemoryConnector, InMemoryStore, ListConnection, ListStore};

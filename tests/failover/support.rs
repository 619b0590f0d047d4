use failover_queue::discovery::ReplicaState;
use failover_queue::{
    ClientConfig, DiscoveryConfig, DualPoolClient, Endpoint, InMemoryConnector,
    InMemoryDiscovery, InMemoryStore, PoolConfig, StoreError,
};

pub const STORE: &str = "jobs-store";

pub fn sentinel(n: u16) -> Endpoint {
    Endpoint::new(format!("s{}", n), 26379)
}

pub fn db(n: u16) -> Endpoint {
    Endpoint::new(format!("db{}", n), 6379)
}

/// Three discovery peers watching a writer `db1` and a replica `db2`.
pub struct Cluster {
    pub discovery: InMemoryDiscovery,
    pub connector: InMemoryConnector,
    pub db1: InMemoryStore,
    pub db2: InMemoryStore,
}

impl Cluster {
    pub fn new() -> Self {
        let discovery = InMemoryDiscovery::new([sentinel(1), sentinel(2), sentinel(3)]);
        discovery.set_writer(STORE, db(1));
        discovery.set_replicas(STORE, vec![ReplicaState::healthy(db(2))]);

        let connector = InMemoryConnector::new();
        let db1 = connector.add(db(1));
        let db2 = connector.add(db(2));

        Self {
            discovery,
            connector,
            db1,
            db2,
        }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(
            STORE,
            DiscoveryConfig::new([sentinel(1), sentinel(2), sentinel(3)]).with_min_other_peers(1),
        )
    }

    pub fn client(&self) -> DualPoolClient {
        self.client_with(self.config()).unwrap()
    }

    pub fn client_with(&self, config: ClientConfig) -> Result<DualPoolClient, StoreError> {
        DualPoolClient::connect(config, self.discovery.clone(), self.connector.clone())
    }

    /// Promote `db2` to writer: discovery reports it, `db1` turns read-only.
    pub fn fail_over(&self) {
        self.discovery.set_writer(STORE, db(2));
        self.discovery.set_replicas(STORE, vec![ReplicaState::healthy(db(1))]);
        self.db1.set_read_only(true);
        self.db2.set_read_only(false);
    }
}

pub fn with_password(config: ClientConfig, password: &str) -> ClientConfig {
    config.with_pool(PoolConfig::default().with_password(password))
}

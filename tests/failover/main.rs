mod support;

use std::time::Duration;

use failover_queue::discovery::{LinkStatus, ReplicaState};
use failover_queue::{
    ClientConfig, EchoHandler, ListStore, ListenerConfig, ListenerThread, ReliableListener, Role,
    StoreError,
};
use support::{db, sentinel, with_password, Cluster, STORE};

// =============================================================================
// Resolution
// =============================================================================

#[test]
fn write_and_read_handles_reach_writer_and_replica() {
    let cluster = Cluster::new();
    let client = cluster.client();

    assert_eq!(client.write().endpoint(), None);
    client.write().push("jobs", b"a").unwrap();
    assert_eq!(client.write().endpoint(), Some(db(1)));
    assert_eq!(cluster.db1.len("jobs").unwrap(), 1);

    cluster.db2.push("jobs", b"replicated").unwrap();
    assert_eq!(client.read().len("jobs").unwrap(), 1);
    assert_eq!(client.read().endpoint(), Some(db(2)));
    assert_eq!(client.read().role(), Role::Reader);

    assert_eq!(cluster.discovery.open_connections(), 0);
}

#[test]
fn read_handle_falls_back_to_writer_without_healthy_replicas() {
    let cluster = Cluster::new();
    cluster.discovery.set_replicas(
        STORE,
        vec![ReplicaState {
            endpoint: db(2),
            is_odown: false,
            is_sdown: false,
            link_status: LinkStatus::Err,
        }],
    );
    let client = cluster.client();

    client.write().push("jobs", b"a").unwrap();
    assert_eq!(client.read().len("jobs").unwrap(), 1);
    assert_eq!(client.read().endpoint(), Some(db(1)));
}

#[test]
fn master_and_slave_are_the_same_handles() {
    let cluster = Cluster::new();
    let client = cluster.client();

    client.master().push("jobs", b"a").unwrap();
    assert_eq!(client.write().endpoint(), Some(db(1)));
    client.slave().len("jobs").unwrap();
    assert_eq!(client.read().endpoint(), Some(db(2)));
    assert_eq!(client.store_name(), STORE);
}

#[test]
fn check_connection_fails_without_quorum() {
    let cluster = Cluster::new();
    cluster.discovery.set_reachable(&sentinel(2), false);
    cluster.discovery.set_reachable(&sentinel(3), false);

    let err = cluster
        .client_with(cluster.config().with_check_connection(true))
        .err()
        .unwrap();
    assert_eq!(
        err,
        StoreError::TopologyUnavailable {
            store: STORE.to_string(),
            min_other_peers: 1,
        }
    );
    assert!(err.is_transient());
}

#[test]
fn unchecked_client_defers_errors_to_first_use() {
    let cluster = Cluster::new();
    cluster.discovery.set_writer_down(STORE, false, true);

    let client = cluster.client();
    let err = client.write().push("jobs", b"a").unwrap_err();
    assert!(matches!(err, StoreError::TopologyUnavailable { .. }));

    cluster.discovery.set_writer_down(STORE, false, false);
    client.write().push("jobs", b"a").unwrap();
}

// =============================================================================
// Failover
// =============================================================================

#[test]
fn read_only_writer_triggers_re_resolution() {
    let cluster = Cluster::new();
    let client = cluster.client();
    client.write().push("jobs", b"before").unwrap();
    assert_eq!(cluster.db1.open_connections(), 1);

    cluster.fail_over();

    let err = client.write().push("jobs", b"lost").unwrap_err();
    assert_eq!(err, StoreError::ReadOnly(db(1)));
    assert_eq!(client.write().endpoint(), None);
    assert_eq!(cluster.db1.open_connections(), 0);

    client.write().push("jobs", b"after").unwrap();
    assert_eq!(client.write().endpoint(), Some(db(2)));
    assert_eq!(cluster.db2.items("jobs"), vec![b"after".to_vec()]);
}

#[test]
fn unreachable_writer_connection_is_not_pooled() {
    let cluster = Cluster::new();
    let client = cluster.client();
    client.write().push("jobs", b"a").unwrap();

    cluster.db1.inject_failure(StoreError::connection(&db(1), "connection reset"));
    assert!(client.write().push("jobs", b"b").unwrap_err().is_transient());
    assert_eq!(client.write().pool().idle_connections(), 0);

    client.write().push("jobs", b"c").unwrap();
    assert_eq!(cluster.db1.len("jobs").unwrap(), 2);
}

#[test]
fn listener_keeps_consuming_across_a_failover() {
    let cluster = Cluster::new();
    let client = cluster.client();
    let config = ListenerConfig::new("jobs")
        .with_read_time(Duration::from_millis(50))
        .with_retry_delay(Duration::from_millis(10));
    let listener = ReliableListener::from_client(&client, config, EchoHandler).unwrap();
    let worker = ListenerThread::spawn(listener);

    cluster.fail_over();
    cluster.db2.push("jobs", b"on-new-writer").unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while cluster.db2.len("jobs").unwrap() > 0 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    while cluster.db2.len("jobs|processing").unwrap() > 0 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    let stats = worker.stop().unwrap();
    assert_eq!(stats.messages_handled, 1);
    assert_eq!(cluster.db2.len("jobs").unwrap(), 0);
    assert_eq!(cluster.db2.len("jobs|processing").unwrap(), 0);
}

// =============================================================================
// Disconnect and settings
// =============================================================================

#[test]
fn disconnect_is_idempotent_and_reconnects_lazily() {
    let cluster = Cluster::new();
    let client = cluster.client();
    client.write().push("jobs", b"a").unwrap();
    client.read().len("jobs").unwrap();
    assert_eq!(cluster.db1.open_connections(), 1);
    assert_eq!(cluster.db2.open_connections(), 1);

    client.disconnect();
    client.disconnect();
    assert_eq!(cluster.db1.open_connections(), 0);
    assert_eq!(cluster.db2.open_connections(), 0);

    client.write().push("jobs", b"b").unwrap();
    assert_eq!(cluster.db1.len("jobs").unwrap(), 2);
    assert_eq!(cluster.db1.open_connections(), 1);
}

#[test]
fn pool_settings_reach_the_connector() {
    let cluster = Cluster::new();
    cluster.db1.require_password("s3cret");

    let wrong = cluster.client_with(with_password(cluster.config(), "nope")).unwrap();
    let err = wrong.write().push("jobs", b"a").unwrap_err();
    assert!(!err.is_transient());

    let client = cluster
        .client_with(with_password(cluster.config(), "s3cret"))
        .unwrap();
    client.write().push("jobs", b"a").unwrap();
    assert_eq!(
        cluster.connector.last_config().unwrap().password.as_deref(),
        Some("s3cret")
    );
}

#[test]
fn client_config_from_json_drives_a_client() {
    let cluster = Cluster::new();
    let config = ClientConfig::from_json(
        r#"{
            "store_name": "jobs-store",
            "discovery": { "peers": ["s1:26379", "s2:26379", "s3:26379"], "min_other_peers": 2 },
            "check_connection": true
        }"#,
    )
    .unwrap();

    let client = cluster.client_with(config).unwrap();
    assert_eq!(client.resolver().min_other_peers(), 2);
    client.write().push("jobs", b"a").unwrap();
    assert_eq!(cluster.db1.len("jobs").unwrap(), 1);
}

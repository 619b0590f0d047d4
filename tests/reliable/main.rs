mod support;

use std::time::{Duration, Instant};

use failover_queue::{
    EchoHandler, ListStore, ListenerConfig, ListenerThread, ReliableListener, ShutdownToken,
    StoreError,
};
use failover_queue::store::InMemoryStore;
use support::{config, wait_until, Recorder, PROCESSING, QUEUE};

// =============================================================================
// Non-blocking receive
// =============================================================================

#[test]
fn messages_arrive_in_push_order() {
    let store = InMemoryStore::new();
    for m in ["m1", "m2", "m3"] {
        store.push(QUEUE, m.as_bytes()).unwrap();
    }

    let recorder = Recorder::new();
    let listener = ReliableListener::new(store.clone(), config(), recorder.handler()).unwrap();
    while listener.get_message().unwrap().is_some() {}

    assert_eq!(recorder.seen(), vec!["m1", "m2", "m3"]);
}

#[test]
fn handled_message_leaves_both_queues() {
    let store = InMemoryStore::new();
    store.push(QUEUE, b"a").unwrap();

    let listener = ReliableListener::new(store.clone(), config(), EchoHandler).unwrap();
    assert_eq!(listener.get_message().unwrap(), Some(b"a".to_vec()));
    assert_eq!(store.len(QUEUE).unwrap(), 0);
    assert_eq!(store.len(PROCESSING).unwrap(), 0);
    assert_eq!(listener.get_message().unwrap(), None);
}

#[test]
fn failed_handler_does_not_block_the_queue() {
    let store = InMemoryStore::new();
    store.push(QUEUE, b"bad").unwrap();
    store.push(QUEUE, b"next").unwrap();

    let recorder = Recorder::new();
    let listener = ReliableListener::new(store.clone(), config(), recorder.handler()).unwrap();

    assert_eq!(listener.get_message().unwrap(), None);
    assert_eq!(store.len(PROCESSING).unwrap(), 0);
    assert_eq!(listener.get_message().unwrap(), Some("next".to_string()));
    assert_eq!(recorder.seen(), vec!["bad", "next"]);
}

// =============================================================================
// Recovery
// =============================================================================

#[test]
fn crashed_message_is_handled_by_the_next_listener() {
    let store = InMemoryStore::new();
    store.push(QUEUE, b"x").unwrap();
    // A listener moved "x" and died before removing it.
    store.pop_and_push(QUEUE, PROCESSING).unwrap();
    assert_eq!(store.len(QUEUE).unwrap(), 0);

    let recorder = Recorder::new();
    ReliableListener::new(store.clone(), config(), recorder.handler()).unwrap();

    assert_eq!(recorder.seen(), vec!["x"]);
    assert_eq!(store.len(PROCESSING).unwrap(), 0);
}

#[test]
fn recovery_with_nothing_to_recover_is_a_no_op() {
    let store = InMemoryStore::new();
    store.push(QUEUE, b"waiting").unwrap();

    let recorder = Recorder::new();
    let listener = ReliableListener::new(store.clone(), config(), recorder.handler()).unwrap();

    assert!(recorder.seen().is_empty());
    assert_eq!(listener.recover().unwrap(), 0);
    assert_eq!(store.items(QUEUE), vec![b"waiting".to_vec()]);
}

#[test]
fn recovery_removes_failed_orphans_too() {
    let store = InMemoryStore::new();
    store.push(QUEUE, b"bad").unwrap();
    store.pop_and_push(QUEUE, PROCESSING).unwrap();

    let recorder = Recorder::new();
    let listener = ReliableListener::new(store.clone(), config(), recorder.handler()).unwrap();

    assert_eq!(recorder.seen(), vec!["bad"]);
    assert_eq!(store.len(PROCESSING).unwrap(), 0);
    assert_eq!(listener.recover().unwrap(), 0);
}

#[test]
fn unreachable_store_fails_construction() {
    let store = InMemoryStore::new();
    store.inject_failure(StoreError::Timeout(Duration::from_secs(1)));

    let err = ReliableListener::new(store, config(), EchoHandler).err().unwrap();
    assert!(err.is_transient());
}

// =============================================================================
// Blocking receive
// =============================================================================

#[test]
fn listen_exits_promptly_after_cancel_without_losing_messages() {
    let store = InMemoryStore::new();
    let recorder = Recorder::new();
    let listener = ReliableListener::new(store.clone(), config(), recorder.handler()).unwrap();
    let worker = ListenerThread::spawn(listener);

    store.push(QUEUE, b"m1").unwrap();
    store.push(QUEUE, b"m2").unwrap();
    recorder.wait_for(2);

    // The listener is parked in a blocking wait; cancelling must land within
    // about one read_time.
    let read_time = config().read_time;
    let cancelled = Instant::now();
    let stats = worker.stop().unwrap();
    assert!(cancelled.elapsed() < read_time * 4);

    assert_eq!(stats.messages_handled, 2);
    assert_eq!(recorder.seen(), vec!["m1", "m2"]);
    assert_eq!(store.len(QUEUE).unwrap(), 0);
    assert_eq!(store.len(PROCESSING).unwrap(), 0);
}

#[test]
fn listen_keeps_polling_after_a_panicking_handler() {
    let store = InMemoryStore::new();
    let recorder = Recorder::new();
    let listener = ReliableListener::new(store.clone(), config(), recorder.handler()).unwrap();
    let worker = ListenerThread::spawn(listener);

    store.push(QUEUE, b"boom").unwrap();
    store.push(QUEUE, b"good").unwrap();
    recorder.wait_for(2);

    let stats = worker.stop().unwrap();
    assert_eq!(stats.messages_failed, 1);
    assert_eq!(stats.messages_handled, 1);
    assert_eq!(store.len(QUEUE).unwrap(), 0);
    assert_eq!(store.len(PROCESSING).unwrap(), 0);
}

#[test]
fn restart_after_a_panicking_orphan_delivers_the_backlog() {
    let store = InMemoryStore::new();
    store.push(QUEUE, b"boom").unwrap();
    store.pop_and_push(QUEUE, PROCESSING).unwrap();
    store.push(QUEUE, b"good").unwrap();

    let recorder = Recorder::new();
    let listener = ReliableListener::new(store.clone(), config(), recorder.handler()).unwrap();
    assert_eq!(store.len(PROCESSING).unwrap(), 0);
    assert_eq!(listener.get_message().unwrap(), Some("good".to_string()));
    assert_eq!(recorder.seen(), vec!["boom", "good"]);
}

#[test]
fn no_message_is_ever_missing_from_both_lists() {
    const TOTAL: usize = 100;
    let store = InMemoryStore::new();
    for i in 0..TOTAL {
        store.push(QUEUE, format!("m{}", i).as_bytes()).unwrap();
    }

    let recorder = Recorder::new();
    let listener = ReliableListener::new(store.clone(), config(), recorder.handler()).unwrap();
    let worker = ListenerThread::spawn(listener);
    let deadline = Instant::now() + Duration::from_secs(10);

    loop {
        // Snapshot first: a message leaves the lists only after its handler
        // ran, so anything missing must already be counted as seen.
        let present: usize = store.lens(&[QUEUE, PROCESSING]).iter().sum();
        let handled = recorder.seen().len();
        assert!(
            present + handled >= TOTAL,
            "{} present + {} handled < {}",
            present,
            handled,
            TOTAL
        );
        if handled == TOTAL && present == 0 {
            break;
        }
        assert!(Instant::now() < deadline, "listener did not drain the queue");
        std::thread::yield_now();
    }

    let stats = worker.stop().unwrap();
    assert_eq!(stats.messages_handled, TOTAL);
}

#[test]
fn listen_keeps_polling_after_a_failed_handler() {
    let store = InMemoryStore::new();
    let recorder = Recorder::new();
    let listener = ReliableListener::new(store.clone(), config(), recorder.handler()).unwrap();
    let worker = ListenerThread::spawn(listener);

    store.push(QUEUE, b"bad").unwrap();
    store.push(QUEUE, b"good").unwrap();
    recorder.wait_for(2);

    let stats = worker.stop().unwrap();
    assert_eq!(stats.messages_failed, 1);
    assert_eq!(stats.messages_handled, 1);
    assert_eq!(store.len(PROCESSING).unwrap(), 0);
}

#[test]
fn listen_survives_transient_errors() {
    let store = InMemoryStore::new();
    let recorder = Recorder::new();
    let listener = ReliableListener::new(store.clone(), config(), recorder.handler()).unwrap();

    store.push(QUEUE, b"after").unwrap();
    store.inject_failure(StoreError::Timeout(Duration::from_secs(1)));
    store.inject_failure(StoreError::Timeout(Duration::from_secs(1)));

    let worker = ListenerThread::spawn(listener);
    recorder.wait_for(1);

    let stats = worker.stop().unwrap();
    assert_eq!(stats.transport_errors, 2);
    assert_eq!(stats.messages_handled, 1);
    assert_eq!(recorder.seen(), vec!["after"]);
}

#[test]
fn listen_reraises_non_transient_errors() {
    let store = InMemoryStore::new();
    let listener = ReliableListener::new(store.clone(), config(), EchoHandler).unwrap();
    store.inject_failure(StoreError::Command("WRONGTYPE".into()));

    let err = listener.listen(&ShutdownToken::new()).unwrap_err();
    assert_eq!(err, StoreError::Command("WRONGTYPE".into()));
}

#[test]
fn cancelled_token_stops_before_first_poll() {
    let store = InMemoryStore::new();
    store.push(QUEUE, b"untouched").unwrap();
    let listener = ReliableListener::new(store.clone(), config(), EchoHandler).unwrap();

    let shutdown = ShutdownToken::new();
    shutdown.cancel();
    let stats = listener.listen(&shutdown).unwrap();

    assert_eq!(stats.polls, 0);
    assert_eq!(store.len(QUEUE).unwrap(), 1);
}

// =============================================================================
// Several listeners
// =============================================================================

#[test]
fn listeners_with_distinct_suffixes_share_a_queue() {
    let store = InMemoryStore::new();
    let first = Recorder::new();
    let second = Recorder::new();

    let a = ReliableListener::new(
        store.clone(),
        config().with_processing_suffix("|processing-a"),
        first.handler(),
    )
    .unwrap();
    let b = ReliableListener::new(
        store.clone(),
        config().with_processing_suffix("|processing-b"),
        second.handler(),
    )
    .unwrap();
    assert_ne!(a.processing_queue(), b.processing_queue());

    let workers = [ListenerThread::spawn(a), ListenerThread::spawn(b)];
    let sent: Vec<String> = (0..20).map(|i| format!("m{}", i)).collect();
    for m in &sent {
        store.push(QUEUE, m.as_bytes()).unwrap();
    }
    wait_until(|| first.seen().len() + second.seen().len() >= sent.len());

    for worker in workers {
        worker.stop().unwrap();
    }

    let mut received = first.seen();
    received.extend(second.seen());
    received.sort();
    let mut expected = sent.clone();
    expected.sort();
    assert_eq!(received, expected);
    assert_eq!(store.len("jobs|processing-a").unwrap(), 0);
    assert_eq!(store.len("jobs|processing-b").unwrap(), 0);
}

#[test]
fn listener_config_from_json() {
    let config = ListenerConfig::from_json(r#"{"queue": "emails", "read_time": 0.25}"#).unwrap();
    assert_eq!(config.processing_queue(), "emails|processing");
    assert_eq!(config.read_time, Duration::from_millis(250));

    let listener = ReliableListener::new(InMemoryStore::new(), config, EchoHandler).unwrap();
    assert_eq!(listener.queue(), "emails");
}

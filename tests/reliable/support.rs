use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use failover_queue::ListenerConfig;

pub const QUEUE: &str = "jobs";
pub const PROCESSING: &str = "jobs|processing";

pub fn config() -> ListenerConfig {
    ListenerConfig::new(QUEUE)
        .with_read_time(Duration::from_millis(50))
        .with_retry_delay(Duration::from_millis(10))
}

/// Handler that records every payload it sees, fails on "bad" and panics
/// on "boom".
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    pub fn handler(&self) -> impl Fn(&[u8]) -> Result<String, String> + Send + Sync + 'static {
        let seen = self.seen.clone();
        move |payload: &[u8]| {
            let message = String::from_utf8_lossy(payload).into_owned();
            seen.lock().unwrap().push(message.clone());
            if message == "boom" {
                panic!("cannot survive {}", message);
            }
            if message == "bad" {
                Err(format!("rejected {}", message))
            } else {
                Ok(message)
            }
        }
    }

    /// Wait until at least `count` payloads were seen.
    pub fn wait_for(&self, count: usize) {
        wait_until(|| self.seen.lock().unwrap().len() >= count);
    }
}

pub fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

//! In-memory store instances for testing and single-process scenarios.
//!
//! [`InMemoryStore`] is one store instance: named lists with the same
//! head/tail semantics a real list store has, a condvar for the blocking
//! pop, a read-only switch to play a demoted writer, and injectable
//! failures. [`InMemoryConnector`] maps endpoints to instances so the pools
//! can be exercised end to end.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::PoolConfig;
use crate::endpoint::Endpoint;
use crate::error::StoreError;

use super::{Connector, ListConnection, ListStore};

struct StoreInner {
    endpoint: Endpoint,
    lists: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    pushed: Condvar,
    read_only: AtomicBool,
    password: Mutex<Option<String>>,
    failures: Mutex<VecDeque<StoreError>>,
    open: AtomicUsize,
}

/// One in-memory store instance.
///
/// Clones share the same lists. All list commands run under one mutex, so
/// the pop-and-push move is atomic just like on a real store.
///
/// ## Example
///
/// ```
/// use failover_queue::store::{InMemoryStore, ListStore};
///
/// let store = InMemoryStore::new();
/// store.push("jobs", b"a").unwrap();
/// store.push("jobs", b"b").unwrap();
///
/// let moved = store.pop_and_push("jobs", "jobs|processing").unwrap();
/// assert_eq!(moved.as_deref(), Some(&b"a"[..]));
/// assert_eq!(store.len("jobs|processing").unwrap(), 1);
/// ```
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<StoreInner>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::at(Endpoint::new("in-memory", 0))
    }

    /// An instance that reports itself as `endpoint` in errors.
    pub fn at(endpoint: Endpoint) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                endpoint,
                lists: Mutex::new(HashMap::new()),
                pushed: Condvar::new(),
                read_only: AtomicBool::new(false),
                password: Mutex::new(None),
                failures: Mutex::new(VecDeque::new()),
                open: AtomicUsize::new(0),
            }),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    /// Reject writes with [`StoreError::ReadOnly`], as a demoted writer does.
    pub fn set_read_only(&self, read_only: bool) {
        self.inner.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Require connections opened through [`InMemoryConnector`] to present
    /// this password.
    pub fn require_password(&self, password: impl Into<String>) {
        *lock(&self.inner.password) = Some(password.into());
    }

    /// Make the next command fail with `error`. Injected errors are consumed
    /// one per command, in order.
    pub fn inject_failure(&self, error: StoreError) {
        lock(&self.inner.failures).push_back(error);
    }

    /// Connections opened through a connector and not yet dropped.
    pub fn open_connections(&self) -> usize {
        self.inner.open.load(Ordering::SeqCst)
    }

    /// Snapshot of `key`, head first.
    pub fn items(&self, key: &str) -> Vec<Vec<u8>> {
        lock(&self.inner.lists)
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Lengths of `keys` read under one lock, so no move can land between
    /// them.
    pub fn lens(&self, keys: &[&str]) -> Vec<usize> {
        let lists = lock(&self.inner.lists);
        keys.iter()
            .map(|key| lists.get(*key).map_or(0, VecDeque::len))
            .collect()
    }

        fn check(&self, write: bool) -> Result<(), StoreError> {
        if let Some(error) = lock(&self.inner.failures).pop_front() {
            return Err(error);
        }
        if write && self.inner.read_only.load(Ordering::SeqCst) {
            return Err(StoreError::ReadOnly(self.inner.endpoint.clone()));
        }
        Ok(())
    }

    fn lists(&self) -> Result<MutexGuard<'_, HashMap<String, VecDeque<Vec<u8>>>>, StoreError> {
        self.inner
            .lists
            .lock()
            .map_err(|_| StoreError::LockPoisoned("in-memory store"))
    }

    fn try_move(
        lists: &mut HashMap<String, VecDeque<Vec<u8>>>,
        source: &str,
        destination: &str,
    ) -> Option<Vec<u8>> {
        let message = lists.get_mut(source)?.pop_back()?;
        if lists.get(source).is_some_and(|list| list.is_empty()) {
            lists.remove(source);
        }
        lists
            .entry(destination.to_string())
            .or_default()
            .push_front(message.clone());
        Some(message)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ListStore for InMemoryStore {
    fn push(&self, key: &str, message: &[u8]) -> Result<usize, StoreError> {
        self.check(true)?;
        let mut lists = self.lists()?;
        let list = lists.entry(key.to_string()).or_default();
        list.push_front(message.to_vec());
        let len = list.len();
        self.inner.pushed.notify_all();
        Ok(len)
    }

    fn pop_and_push(
        &self,
        source: &str,
        destination: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        self.check(true)?;
        let mut lists = self.lists()?;
        let moved = Self::try_move(&mut lists, source, destination);
        if moved.is_some() {
            self.inner.pushed.notify_all();
        }
        Ok(moved)
    }

    fn pop_blocking_and_push(
        &self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        self.check(true)?;
        let deadline = Instant::now() + timeout;
        let mut lists = self.lists()?;

        loop {
            if let Some(message) = Self::try_move(&mut lists, source, destination) {
                self.inner.pushed.notify_all();
                return Ok(Some(message));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            lists = self
                .inner
                .pushed
                .wait_timeout(lists, deadline - now)
                .map_err(|_| StoreError::LockPoisoned("in-memory store"))?
                .0;
        }
    }

    fn peek_tail(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.check(false)?;
        Ok(self.lists()?.get(key).and_then(|list| list.back().cloned()))
    }

    fn remove_occurrence(&self, key: &str, message: &[u8], count: i64) -> Result<usize, StoreError> {
        self.check(true)?;
        let mut lists = self.lists()?;
        let Some(list) = lists.get_mut(key) else {
            return Ok(0);
        };

        let limit = if count == 0 {
            usize::MAX
        } else {
            count.unsigned_abs() as usize
        };
        let mut removed = 0;

        if count >= 0 {
            let mut index = 0;
            while index < list.len() && removed < limit {
                if list[index] == message {
                    list.remove(index);
                    removed += 1;
                } else {
                    index += 1;
                }
            }
        } else {
            let mut index = list.len();
            while index > 0 && removed < limit {
                index -= 1;
                if list[index] == message {
                    list.remove(index);
                    removed += 1;
                }
            }
        }

        if list.is_empty() {
            lists.remove(key);
        }
        Ok(removed)
    }

    fn len(&self, key: &str) -> Result<usize, StoreError> {
        self.check(false)?;
        Ok(self.lists()?.get(key).map_or(0, VecDeque::len))
    }

    fn disconnect_all(&self) {}
}

/// A connection handed out by [`InMemoryConnector`].
struct InMemoryConnection {
    store: InMemoryStore,
}

impl InMemoryConnection {
    fn open(store: InMemoryStore) -> Self {
        store.inner.open.fetch_add(1, Ordering::SeqCst);
        Self { store }
    }
}

impl Drop for InMemoryConnection {
    fn drop(&mut self) {
        self.store.inner.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ListConnection for InMemoryConnection {
    fn push(&mut self, key: &str, message: &[u8]) -> Result<usize, StoreError> {
        self.store.push(key, message)
    }

    fn pop_and_push(
        &mut self,
        source: &str,
        destination: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        self.store.pop_and_push(source, destination)
    }

    fn pop_blocking_and_push(
        &mut self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        self.store.pop_blocking_and_push(source, destination, timeout)
    }

    fn peek_tail(&mut self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.store.peek_tail(key)
    }

    fn remove_occurrence(
        &mut self,
        key: &str,
        message: &[u8],
        count: i64,
    ) -> Result<usize, StoreError> {
        self.store.remove_occurrence(key, message, count)
    }

    fn len(&mut self, key: &str) -> Result<usize, StoreError> {
        self.store.len(key)
    }
}

#[derive(Default)]
struct ConnectorState {
    stores: HashMap<Endpoint, InMemoryStore>,
    down: Vec<Endpoint>,
    connects: Vec<Endpoint>,
    last_config: Option<PoolConfig>,
}

/// Routes connections to in-memory store instances by endpoint.
///
/// Clones share the same routing table.
#[derive(Clone, Default)]
pub struct InMemoryConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a fresh instance at `endpoint`.
    pub fn add(&self, endpoint: Endpoint) -> InMemoryStore {
        let store = InMemoryStore::at(endpoint.clone());
        lock(&self.state).stores.insert(endpoint, store.clone());
        store
    }

    /// Refuse (or allow again) connections to `endpoint`.
    pub fn set_down(&self, endpoint: &Endpoint, down: bool) {
        let mut state = lock(&self.state);
        state.down.retain(|e| e != endpoint);
        if down {
            state.down.push(endpoint.clone());
        }
    }

    /// Endpoints of every successful connect, in order.
    pub fn connects(&self) -> Vec<Endpoint> {
        lock(&self.state).connects.clone()
    }

    /// The pool settings passed to the most recent connect.
    pub fn last_config(&self) -> Option<PoolConfig> {
        lock(&self.state).last_config.clone()
    }
}

impl Connector for InMemoryConnector {
    fn connect(
        &self,
        endpoint: &Endpoint,
        config: &PoolConfig,
    ) -> Result<Box<dyn ListConnection>, StoreError> {
        let mut state = lock(&self.state);
        if state.down.contains(endpoint) {
            return Err(StoreError::connection(endpoint, "connection refused"));
        }
        let store = state
            .stores
            .get(endpoint)
            .cloned()
            .ok_or_else(|| StoreError::connection(endpoint, "no route to host"))?;

        let required = lock(&store.inner.password).clone();
        if let Some(required) = required {
            if config.password.as_deref() != Some(required.as_str()) {
                return Err(StoreError::Command("WRONGPASS invalid password".into()));
            }
        }

        state.connects.push(endpoint.clone());
        state.last_config = Some(config.clone());
        Ok(Box::new(InMemoryConnection::open(store)))
    }
}

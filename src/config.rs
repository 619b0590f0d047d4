//! Configuration for the client, its pools and the reliable listener.
//!
//! Every struct has defaults and derives serde with `#[serde(default)]`, so
//! a configuration document only needs the fields it changes. Durations
//! are written as (fractional) seconds.
//!
//! ## Example
//!
//! ```ignore
//! let config = ClientConfig::from_json(r#"{
//!     "store_name": "jobs",
//!     "discovery": { "peers": ["s1:26379", "s2:26379", "s3:26379"], "min_other_peers": 1 },
//!     "pool": { "password": "hunter2", "socket_timeout": 5 }
//! }"#)?;
//! ```

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::endpoint::Endpoint;

/// Where to find the discovery peers and how much agreement to require.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub peers: Vec<Endpoint>,
    /// Minimum number of *other* discovery peers a responding peer must see
    /// before its writer report is trusted.
    pub min_other_peers: usize,
}

impl DiscoveryConfig {
    pub fn new(peers: impl IntoIterator<Item = Endpoint>) -> Self {
        Self {
            peers: peers.into_iter().collect(),
            min_other_peers: 0,
        }
    }

    pub fn with_min_other_peers(mut self, min_other_peers: usize) -> Self {
        self.min_other_peers = min_other_peers;
        self
    }
}

/// TCP keepalive probing for pooled sockets.
///
/// The defaults start probing after 1s of idleness, probe every 3s and
/// give up after 5 unanswered probes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepaliveConfig {
    #[serde(with = "secs")]
    pub idle: Duration,
    #[serde(with = "secs")]
    pub interval: Duration,
    pub count: u32,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            idle: Duration::from_secs(1),
            interval: Duration::from_secs(3),
            count: 5,
        }
    }
}

/// Options handed to the [`Connector`](crate::store::Connector) for every
/// socket a pool opens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub password: Option<String>,
    /// Read/write timeout on pooled sockets. Also used for connecting when
    /// `connect_timeout` is unset.
    #[serde(with = "opt_secs")]
    pub socket_timeout: Option<Duration>,
    #[serde(with = "opt_secs")]
    pub connect_timeout: Option<Duration>,
    pub keepalive: Option<KeepaliveConfig>,
    /// Idle connections kept per pool; extra ones are closed on release.
    pub max_idle: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            password: None,
            socket_timeout: None,
            connect_timeout: None,
            keepalive: None,
            max_idle: 16,
        }
    }
}

impl PoolConfig {
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = Some(timeout);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_keepalive(mut self, keepalive: KeepaliveConfig) -> Self {
        self.keepalive = Some(keepalive);
        self
    }

    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    /// Timeout to apply while connecting.
    pub fn effective_connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout.or(self.socket_timeout)
    }
}

/// Everything [`DualPoolClient::connect`](crate::pool::DualPoolClient::connect) needs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Logical name the discovery peers know the store by.
    pub store_name: String,
    pub discovery: DiscoveryConfig,
    pub pool: PoolConfig,
    /// Resolve the writer once during `connect` and fail early if the
    /// topology is unusable.
    pub check_connection: bool,
}

impl ClientConfig {
    pub fn new(store_name: impl Into<String>, discovery: DiscoveryConfig) -> Self {
        Self {
            store_name: store_name.into(),
            discovery,
            pool: PoolConfig::default(),
            check_connection: false,
        }
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_check_connection(mut self, check: bool) -> Self {
        self.check_connection = check;
        self
    }

    pub fn from_json(document: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(document)
    }
}

/// Default suffix appended to a queue name to form its processing queue.
pub const DEFAULT_PROCESSING_SUFFIX: &str = "|processing";

/// Shortest accepted `read_time`. A zero timeout means "block forever" to
/// most blocking pops, which would make cancellation unbounded.
pub const MIN_READ_TIME: Duration = Duration::from_millis(1);

/// Settings for one [`ReliableListener`](crate::listener::ReliableListener).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub queue: String,
    /// Upper bound on each blocking wait; also the cancellation latency.
    /// Never below [`MIN_READ_TIME`].
    #[serde(serialize_with = "secs::serialize", deserialize_with = "read_time")]
    pub read_time: Duration,
    pub processing_suffix: String,
    /// Back-off after an absorbed transport error in `listen`.
    #[serde(with = "secs")]
    pub retry_delay: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            queue: String::new(),
            read_time: Duration::from_secs(5),
            processing_suffix: DEFAULT_PROCESSING_SUFFIX.to_string(),
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl ListenerConfig {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            ..Self::default()
        }
    }

    /// Values below [`MIN_READ_TIME`] are raised to it.
    pub fn with_read_time(mut self, read_time: Duration) -> Self {
        self.read_time = read_time.max(MIN_READ_TIME);
        self
    }

    pub fn with_processing_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.processing_suffix = suffix.into();
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Name of the list holding claimed-but-unfinished messages.
    pub fn processing_queue(&self) -> String {
        format!("{}{}", self.queue, self.processing_suffix)
    }

    pub fn from_json(document: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(document)
    }
}

fn read_time<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let read_time = secs::deserialize(deserializer)?;
    if read_time < MIN_READ_TIME {
        return Err(serde::de::Error::custom(format!(
            "read_time must be at least {:?}",
            MIN_READ_TIME
        )));
    }
    Ok(read_time)
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}

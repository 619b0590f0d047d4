//! Reliable queue consumption.
//!
//! - [`ReliableListener`] - the two-list move protocol with startup recovery
//! - [`MessageHandler`] - what the listener calls for each message
//! - [`ShutdownToken`] - cooperative stop for [`ReliableListener::listen`]
//! - [`ListenerThread`] - a listener on a background thread
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use failover_queue::listener::{EchoHandler, ReliableListener};
//! use failover_queue::store::{InMemoryStore, ListStore};
//! use failover_queue::ListenerConfig;
//!
//! let store = InMemoryStore::new();
//! store.push("jobs", b"resize:42").unwrap();
//!
//! let config = ListenerConfig::new("jobs").with_read_time(Duration::from_millis(100));
//! let listener = ReliableListener::new(store.clone(), config, EchoHandler).unwrap();
//!
//! assert_eq!(listener.get_message().unwrap(), Some(b"resize:42".to_vec()));
//! assert_eq!(store.len("jobs|processing").unwrap(), 0);
//! ```

mod handler;
mod reliable;
mod shutdown;
mod thread;

pub use handler::{Decoded, EchoHandler, MessageHandler};
pub use reliable::{ListenerStats, ReliableListener};
pub use shutdown::ShutdownToken;
pub use thread::ListenerThread;

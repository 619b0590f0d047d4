//! Failover-aware connection pools.
//!
//! - [`ConnectionPool`] - lazily resolved sockets for one role
//! - [`PoolHandle`] - a [`ListStore`](crate::store::ListStore) over a pool
//! - [`DualPoolClient`] - one write pool and one read pool sharing a resolver

mod dual;
mod handle;
#[allow(clippy::module_inception)]
mod pool;

pub use dual::DualPoolClient;
pub use handle::PoolHandle;
pub use pool::{ConnectionPool, PooledConnection};

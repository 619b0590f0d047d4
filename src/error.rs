//! Error types shared by the resolver, the pools and the listener.

use std::time::Duration;

use thiserror::Error;

use crate::endpoint::Endpoint;

/// Every failure a store caller can see.
///
/// Connection failures, timeouts and an unavailable topology are all
/// reported through this one type so callers can react uniformly (retry or
/// give up). Use [`StoreError::is_transient`] to tell those apart from
/// errors that point at a bug.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No discovery peer reported a writer that passed the quorum check.
    #[error("no writer for '{store}' confirmed by at least {min_other_peers} other discovery peers")]
    TopologyUnavailable {
        store: String,
        min_other_peers: usize,
    },
    /// The socket could not be opened, was refused, or was reset.
    #[error("connection to {} failed: {reason}", display_endpoint(.endpoint))]
    Connection {
        endpoint: Option<Endpoint>,
        reason: String,
    },
    /// A socket-level timeout elapsed.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    /// A write reached an endpoint that is no longer the writer.
    #[error("endpoint {0} is read-only")]
    ReadOnly(Endpoint),
    /// The store rejected the command itself.
    #[error("command rejected: {0}")]
    Command(String),
    /// A local mutex was poisoned by a panicking thread.
    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),
}

impl StoreError {
    /// Shorthand for a [`StoreError::Connection`] tied to an endpoint.
    pub fn connection(endpoint: &Endpoint, reason: impl Into<String>) -> Self {
        StoreError::Connection {
            endpoint: Some(endpoint.clone()),
            reason: reason.into(),
        }
    }

    /// Whether the error is one of the network or topology hiccups a
    /// long-running consumer should log and ride out.
    ///
    /// `Command` and `LockPoisoned` are not transient: retrying them would
    /// only hide a programming error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::TopologyUnavailable { .. }
                | StoreError::Connection { .. }
                | StoreError::Timeout(_)
                | StoreError::ReadOnly(_)
        )
    }
}

fn display_endpoint(endpoint: &Option<Endpoint>) -> String {
    match endpoint {
        Some(endpoint) => endpoint.to_string(),
        None => "store".to_string(),
    }
}

/// A message handler returned an error.
///
/// The listener logs it and still removes the message from the processing
/// queue; it is never re-raised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("handler failed: {0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(reason: impl std::fmt::Display) -> Self {
        HandlerError(reason.to_string())
    }
}

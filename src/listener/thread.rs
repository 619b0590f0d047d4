//! Background thread running a [`ReliableListener`].

use std::panic;
use std::thread::{self, JoinHandle};

use tracing::error;

use crate::error::StoreError;
use crate::store::ListStore;

use super::handler::MessageHandler;
use super::reliable::{ListenerStats, ReliableListener};
use super::shutdown::ShutdownToken;

/// Runs [`ReliableListener::listen`] on its own thread.
///
/// ## Example
///
/// ```ignore
/// let listener = ReliableListener::from_client(&client, ListenerConfig::new("emails"), handler)?;
/// let worker = ListenerThread::spawn(listener);
///
/// // ... producers push to "emails" ...
///
/// let stats = worker.stop()?;
/// println!("handled {} messages", stats.messages_handled);
/// ```
pub struct ListenerThread {
    shutdown: ShutdownToken,
    handle: Option<JoinHandle<Result<ListenerStats, StoreError>>>,
}

impl ListenerThread {
    /// Move `listener` onto a new thread and start listening.
    pub fn spawn<S, H>(listener: ReliableListener<S, H>) -> Self
    where
        S: ListStore + 'static,
        H: MessageHandler + 'static,
    {
        Self::spawn_with_token(listener, ShutdownToken::new())
    }

    /// Like [`spawn`](ListenerThread::spawn), stopping when `shutdown` is
    /// cancelled. One token can stop several listener threads.
    pub fn spawn_with_token<S, H>(listener: ReliableListener<S, H>, shutdown: ShutdownToken) -> Self
    where
        S: ListStore + 'static,
        H: MessageHandler + 'static,
    {
        let token = shutdown.clone();
        let handle = thread::spawn(move || listener.listen(&token));

        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn shutdown_token(&self) -> &ShutdownToken {
        &self.shutdown
    }

    /// Whether the listener has returned, either after a stop signal or on
    /// a non-transient store error.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Signal the listener to stop and wait for it to finish. Returns its
    /// statistics, or the store error that ended it.
    ///
    /// Takes at most one `read_time` plus the message in hand.
    ///
    /// # Panics
    ///
    /// Handler panics are contained by the listener, so the thread only dies
    /// from a panic in the store. That panic is resumed here.
    pub fn stop(mut self) -> Result<ListenerStats, StoreError> {
        self.shutdown.cancel();
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(payload) => {
                    error!("listener thread panicked");
                    panic::resume_unwind(payload)
                }
            },
            None => Ok(ListenerStats::default()),
        }
    }

    /// Signal the listener to stop without waiting.
    pub fn signal_stop(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for ListenerThread {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

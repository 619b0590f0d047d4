//! At-least-once consumption of a list queue.
//!
//! Every message is moved from the queue to its processing queue by one
//! atomic pop-and-push, so at any instant it sits in exactly one of the
//! two lists. It is removed from the processing queue only after the
//! handler has returned, whatever the handler returned:
//!
//! ```text
//!   producer ─push─► queue ──pop-and-push──► queue|processing ──remove──► gone
//!                                                   │
//!                                             handler runs here
//! ```
//!
//! A crash between the move and the removal leaves the message in the
//! processing queue, and the next listener built on that queue handles it
//! before accepting anything new. A crash after the handler finished but
//! before the removal therefore hands the message out twice; handlers must
//! tolerate that.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::{ListenerConfig, MIN_READ_TIME};
use crate::error::{HandlerError, StoreError};
use crate::pool::{DualPoolClient, PoolHandle};
use crate::store::ListStore;

use super::handler::MessageHandler;
use super::shutdown::ShutdownToken;

/// Counters from one [`ReliableListener::listen`] run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ListenerStats {
    /// Messages whose handler returned `Ok`.
    pub messages_handled: usize,
    /// Messages whose handler returned `Err`. They were still removed.
    pub messages_failed: usize,
    /// Transient store errors absorbed by the loop, on the claim or on the
    /// removal.
    pub transport_errors: usize,
    /// Blocking waits started.
    pub polls: usize,
}

/// Crash-safe consumer of one named queue.
///
/// Building a listener first drains its processing queue (see
/// [`recover`](ReliableListener::recover)). After that, messages are taken
/// either one at a time with [`get_message`](ReliableListener::get_message)
/// or continuously with [`listen`](ReliableListener::listen).
///
/// Several listeners may consume the same queue; give each its own
/// `processing_suffix` unless their handlers are idempotent across
/// listeners.
///
/// ## Example
///
/// ```ignore
/// let listener = ReliableListener::from_client(
///     &client,
///     ListenerConfig::new("emails").with_read_time(Duration::from_secs(1)),
///     |payload: &[u8]| send_email(payload),
/// )?;
///
/// let shutdown = ShutdownToken::new();
/// let stats = listener.listen(&shutdown)?; // until shutdown.cancel()
/// ```
pub struct ReliableListener<S, H> {
    store: S,
    handler: H,
    queue: String,
    processing_queue: String,
    read_time: Duration,
    retry_delay: Duration,
}

impl<H: MessageHandler> ReliableListener<PoolHandle, H> {
    /// Listen through the client's write handle. Every step of the protocol
    /// mutates the store, so the read side is never used.
    pub fn from_client(
        client: &DualPoolClient,
        config: ListenerConfig,
        handler: H,
    ) -> Result<Self, StoreError> {
        Self::new(client.write().clone(), config, handler)
    }
}

impl<S: ListStore, H: MessageHandler> ReliableListener<S, H> {
    /// Build the listener and run recovery to completion.
    ///
    /// Store errors during recovery are returned: a listener that cannot
    /// reach its store at startup is not usable.
    pub fn new(store: S, config: ListenerConfig, handler: H) -> Result<Self, StoreError> {
        let processing_queue = config.processing_queue();
        let listener = Self {
            store,
            handler,
            queue: config.queue,
            processing_queue,
            read_time: config.read_time.max(MIN_READ_TIME),
            retry_delay: config.retry_delay,
        };
        listener.recover()?;
        Ok(listener)
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn processing_queue(&self) -> &str {
        &self.processing_queue
    }

    pub fn read_time(&self) -> Duration {
        self.read_time
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Handle every message left in the processing queue by an earlier
    /// crash, oldest first. Returns how many were handled.
    ///
    /// A no-op when the processing queue is empty.
    pub fn recover(&self) -> Result<usize, StoreError> {
        let mut recovered = 0;

        while let Some(message) = self.store.peek_tail(&self.processing_queue)? {
            info!(
                queue = %self.queue,
                processing_queue = %self.processing_queue,
                "recovering orphaned message"
            );
            // Handler failures are logged inside; the message goes either way.
            let _ = self.invoke(&message);
            let removed = self
                .store
                .remove_occurrence(&self.processing_queue, &message, -1)?;
            recovered += 1;

            if removed == 0 {
                warn!(
                    queue = %self.queue,
                    processing_queue = %self.processing_queue,
                    "orphaned message could not be removed, stopping recovery"
                );
                break;
            }
        }

        if recovered > 0 {
            info!(queue = %self.queue, recovered, "recovery finished");
        }
        Ok(recovered)
    }

    /// Take at most one message without blocking.
    ///
    /// Returns the handler's output, or `None` when the queue was empty, a
    /// transient store error was absorbed (and logged), or the handler
    /// failed. Only non-transient store errors are returned as `Err`.
    pub fn get_message(&self) -> Result<Option<H::Output>, StoreError> {
        match self.store.pop_and_push(&self.queue, &self.processing_queue) {
            Ok(Some(message)) => Ok(self.process(&message)?.outcome.ok()),
            Ok(None) => Ok(None),
            Err(err) => {
                self.absorb(err, "claim")?;
                Ok(None)
            }
        }
    }

    /// Consume messages until `shutdown` is cancelled.
    ///
    /// Each wait is bounded by `read_time`, so cancellation takes effect
    /// within that interval. Transient store errors are logged and the loop
    /// backs off for `retry_delay`; only a non-transient error ends the
    /// loop early.
    pub fn listen(&self, shutdown: &ShutdownToken) -> Result<ListenerStats, StoreError> {
        let mut stats = ListenerStats::default();
        info!(queue = %self.queue, read_time = ?self.read_time, "listener started");

        while !shutdown.is_cancelled() {
            stats.polls += 1;
            let claimed = self.store.pop_blocking_and_push(
                &self.queue,
                &self.processing_queue,
                self.read_time,
            );

            match claimed {
                Ok(Some(message)) => {
                    let processed = self.process(&message)?;
                    match processed.outcome {
                        Ok(_) => stats.messages_handled += 1,
                        Err(_) => stats.messages_failed += 1,
                    }
                    if processed.removal_failed {
                        stats.transport_errors += 1;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    self.absorb(err, "claim")?;
                    stats.transport_errors += 1;
                    shutdown.wait_timeout(self.retry_delay);
                }
            }
        }

        info!(
            queue = %self.queue,
            handled = stats.messages_handled,
            failed = stats.messages_failed,
            transport_errors = stats.transport_errors,
            "listener stopped"
        );
        Ok(stats)
    }

    /// Run the handler on a claimed message, then remove it from the
    /// processing queue.
    fn process(&self, message: &[u8]) -> Result<Processed<H::Output>, StoreError> {
        let outcome = self.invoke(message);
        let mut removal_failed = false;

        match self.store.remove_occurrence(&self.processing_queue, message, 1) {
            Ok(0) => warn!(
                queue = %self.queue,
                processing_queue = %self.processing_queue,
                "handled message was already gone from the processing queue"
            ),
            Ok(_) => {}
            Err(err) => {
                self.absorb(err, "remove")?;
                removal_failed = true;
                warn!(
                    queue = %self.queue,
                    processing_queue = %self.processing_queue,
                    "handled message stays in the processing queue until the next recovery"
                );
            }
        }

        Ok(Processed {
            outcome,
            removal_failed,
        })
    }

    /// Run the handler. A panic is contained and reported like any other
    /// handler failure, so the message is still removed.
    fn invoke(&self, message: &[u8]) -> Result<H::Output, HandlerError> {
        let result = match catch_unwind(AssertUnwindSafe(|| self.handler.handle(message))) {
            Ok(result) => result.map_err(HandlerError::new),
            Err(payload) => Err(HandlerError::new(format!(
                "handler panicked: {}",
                panic_message(payload.as_ref())
            ))),
        };

        result.map_err(|err| {
            warn!(queue = %self.queue, error = %err, "message handler failed");
            err
        })
    }

    /// Log and swallow transient errors; log and return everything else.
    fn absorb(&self, err: StoreError, step: &'static str) -> Result<(), StoreError> {
        if err.is_transient() {
            warn!(queue = %self.queue, step, error = %err, "transient store error");
            Ok(())
        } else {
            error!(queue = %self.queue, step, error = %err, "store error");
            Err(err)
        }
    }
}

struct Processed<T> {
    outcome: Result<T, HandlerError>,
    /// The removal hit a transient error; the message stays for recovery.
    removal_failed: bool,
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

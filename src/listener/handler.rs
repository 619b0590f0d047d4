use std::convert::Infallible;
use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::error::HandlerError;
use crate::message;

/// Processes one raw message payload.
///
/// Any `Fn(&[u8]) -> Result<T, E>` closure is a handler. Handlers may run
/// more than once for the same message (after a crash, recovery hands it
/// out again), so they must be idempotent.
pub trait MessageHandler: Send + Sync {
    type Output;
    type Error: fmt::Display;

    fn handle(&self, message: &[u8]) -> Result<Self::Output, Self::Error>;
}

impl<F, T, E> MessageHandler for F
where
    F: Fn(&[u8]) -> Result<T, E> + Send + Sync,
    E: fmt::Display,
{
    type Output = T;
    type Error = E;

    fn handle(&self, message: &[u8]) -> Result<T, E> {
        self(message)
    }
}

/// Returns the payload unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoHandler;

impl MessageHandler for EchoHandler {
    type Output = Vec<u8>;
    type Error = Infallible;

    fn handle(&self, message: &[u8]) -> Result<Vec<u8>, Infallible> {
        Ok(message.to_vec())
    }
}

/// Decodes a [`message::encode`]d payload before calling a typed closure.
///
/// A payload that does not decode counts as a handler failure, so it is
/// logged and removed like any other failed message.
///
/// ## Example
///
/// ```ignore
/// let handler = Decoded::new(|job: SendEmail| mailer.send(&job.to, &job.template));
/// let listener = ReliableListener::new(store, ListenerConfig::new("emails"), handler)?;
/// ```
pub struct Decoded<T, F> {
    f: F,
    _payload: PhantomData<fn() -> T>,
}

impl<T, F> Decoded<T, F> {
    pub fn new<R, E>(f: F) -> Self
    where
        F: Fn(T) -> Result<R, E>,
    {
        Self {
            f,
            _payload: PhantomData,
        }
    }
}

impl<T, F, R, E> MessageHandler for Decoded<T, F>
where
    T: DeserializeOwned,
    F: Fn(T) -> Result<R, E> + Send + Sync,
    E: fmt::Display,
{
    type Output = R;
    type Error = HandlerError;

    fn handle(&self, payload: &[u8]) -> Result<R, HandlerError> {
        let value = message::decode::<T>(payload)
            .map_err(|err| HandlerError::new(format!("decode failed: {}", err)))?;
        (self.f)(value).map_err(HandlerError::new)
    }
}

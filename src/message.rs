//! Typed payload helpers.
//!
//! Queue messages are opaque bytes. When both ends are Rust, these
//! bitcode helpers give a compact typed encoding; see also
//! [`Decoded`](crate::listener::Decoded).

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode a value as a queue payload.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, bitcode::Error> {
    bitcode::serialize(value)
}

/// Decode a queue payload produced by [`encode`].
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, bitcode::Error> {
    bitcode::deserialize(payload)
}

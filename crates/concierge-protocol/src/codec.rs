//! JSON codec for relay payloads.
//!
//! Everything the relay publishes is JSON. Inbound payloads are size-checked
//! before they are parsed so that a single oversize message cannot stall
//! the relay loop.

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::payload::Payload;

/// Default maximum inbound payload size (64 KiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur while handling topics and payloads.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload exceeds the configured maximum size.
    #[error("Payload size {size} exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload decoded to a JSON shape the relay does not stamp.
    #[error("Unsupported payload shape: {0}")]
    UnsupportedShape(&'static str),

    /// Array payloads were received while the array policy drops them.
    #[error("Array payloads are not relayed")]
    ArraysDisabled,

    /// Invalid client identifier.
    #[error("Invalid client id: {0}")]
    InvalidClientId(&'static str),

    /// Topic does not have the expected structure.
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),
}

/// Encode a value as a JSON payload.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, ProtocolError> {
    let data = serde_json::to_vec(value)?;
    Ok(Bytes::from(data))
}

/// Decode an inbound payload, enforcing the size limit.
///
/// Malformed JSON is not an error here: it is reported as
/// [`Payload::Invalid`] so the caller decides how to drop it.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] if `data` exceeds `max_size`.
pub fn decode(data: &[u8], max_size: usize) -> Result<Payload, ProtocolError> {
    if data.len() > max_size {
        return Err(ProtocolError::PayloadTooLarge {
            size: data.len(),
            max: max_size,
        });
    }
    Ok(Payload::parse(data))
}

/// Codec carrying a configured payload size limit.
#[derive(Debug, Clone, Copy)]
pub struct PayloadCodec {
    max_payload_size: usize,
}

impl Default for PayloadCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_SIZE)
    }
}

impl PayloadCodec {
    /// Create a codec with the given size limit.
    #[must_use]
    pub fn new(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }

    /// Get the configured size limit.
    #[must_use]
    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    /// Encode a value to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Bytes, ProtocolError> {
        encode(value)
    }

    /// Decode an inbound payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is too large.
    pub fn decode(&self, data: &[u8]) -> Result<Payload, ProtocolError> {
        decode(data, self.max_payload_size)
    }
}

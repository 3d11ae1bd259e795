//! Bus abstraction traits for the concierge.
//!
//! A bus delivers everything it observes, lifecycle changes and inbound
//! messages alike, as [`BusEvent`]s on a single channel. Consuming that
//! channel from one task gives the relay a strictly ordered event stream
//! regardless of how the underlying client schedules its callbacks.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

/// Default capacity of the bus event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Something that happened on the bus connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// Connection (re-)established.
    Connected,
    /// Connection closed.
    Closed,
    /// Connection lost; the client is trying to reconnect.
    Offline,
    /// The client or the broker reported an error.
    Error(String),
    /// The client has shut down and will not reconnect.
    End,
    /// A message arrived on a subscribed topic.
    Message {
        /// Topic in `/`-separated form.
        topic: String,
        /// Raw payload.
        payload: Bytes,
    },
}

impl BusEvent {
    /// Create a message event.
    #[must_use]
    pub fn message(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        BusEvent::Message {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Short name of the event kind, for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            BusEvent::Connected => "connected",
            BusEvent::Closed => "closed",
            BusEvent::Offline => "offline",
            BusEvent::Error(_) => "error",
            BusEvent::End => "end",
            BusEvent::Message { .. } => "message",
        }
    }
}

/// Sending half of the bus event channel.
pub type EventSender = mpsc::Sender<BusEvent>;

/// Receiving half of the bus event channel.
pub type EventReceiver = mpsc::Receiver<BusEvent>;

/// Create a bus event channel with the given capacity.
#[must_use]
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The event channel or the connection is closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to connect to the broker.
    #[error("Connect failed: {0}")]
    Connect(String),

    /// Failed to subscribe.
    #[error("Subscribe to {filter} failed: {reason}")]
    Subscribe {
        /// The filter that was rejected.
        filter: String,
        /// Underlying reason.
        reason: String,
    },

    /// Failed to publish.
    #[error("Publish to {topic} failed: {reason}")]
    Publish {
        /// Target topic.
        topic: String,
        /// Underlying reason.
        reason: String,
    },

    /// Malformed subscription filter.
    #[error("Invalid filter: {0}")]
    InvalidFilter(&'static str),

    /// Unsupported bus URL scheme.
    #[error("Unsupported bus url: {0}")]
    UnsupportedUrl(String),
}

/// A publish/subscribe bus connection.
///
/// Implementations push inbound messages and lifecycle changes into the
/// [`EventSender`] they were created with; this trait covers the outbound
/// direction only.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Subscribe to a topic filter (`+` and `#` wildcards allowed).
    ///
    /// Subscribing twice to the same filter is a no-op.
    async fn subscribe(&self, filter: &str) -> Result<(), TransportError>;

    /// Publish a payload on a topic. Fire-and-forget: success means the
    /// message was handed to the client, not that anyone received it.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError>;

    /// Close the connection.
    async fn close(&self) -> Result<(), TransportError>;

    /// Get the bus name (e.g., "memory", "nats").
    fn name(&self) -> &'static str;

    /// Check if the connection is currently up.
    fn is_connected(&self) -> bool {
        true
    }
}

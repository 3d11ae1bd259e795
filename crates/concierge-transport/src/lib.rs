//! # concierge-transport
//!
//! Bus abstraction layer for the concierge relay.
//!
//! The relay is transport-agnostic: it consumes [`BusEvent`]s from a channel
//! and drives a [`Bus`] for subscriptions and publishes.
//!
//! - **MemoryBus** - In-process loopback, for tests and local development
//! - **NatsBus** - NATS client (feature `nats`, enabled by default)
//!
//! ```rust,ignore
//! use concierge_transport::{event_channel, Bus, MemoryBus};
//!
//! let (tx, mut rx) = event_channel(1024);
//! let bus = MemoryBus::new(tx);
//! bus.connect().await?;
//! while let Some(event) = rx.recv().await {
//!     // Hand the event to the relay
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "nats")]
pub mod nats;

pub use memory::{MemoryBus, Published};
pub use traits::{
    event_channel, Bus, BusEvent, EventReceiver, EventSender, TransportError,
    DEFAULT_EVENT_BUFFER,
};

#[cfg(feature = "nats")]
pub use nats::{NatsBus, NatsConfig};

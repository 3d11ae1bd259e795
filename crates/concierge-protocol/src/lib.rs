//! # concierge-protocol
//!
//! Wire-level definitions for the concierge presence relay.
//!
//! The concierge talks to game clients over a publish/subscribe bus using
//! MQTT-style topics and JSON payloads. This crate owns everything that is
//! visible on the wire:
//!
//! - `topic` - Topic grammar, client ids and wildcard filter matching
//! - `records` - Status and presence records published by the relay
//! - `payload` - Classification and server-time stamping of game payloads
//! - `codec` - JSON encoding with payload size limits
//!
//! ## Example
//!
//! ```rust
//! use concierge_protocol::{codec, ArrayPolicy, Stamp, TopicAddress};
//!
//! let address = TopicAddress::parse("gs/player1/positions").unwrap();
//! assert_eq!(address.stamped_topic(), "gs/player1/positions-ts");
//!
//! let payload = codec::decode(br#"{"x":1,"y":2}"#, codec::DEFAULT_MAX_PAYLOAD_SIZE).unwrap();
//! let stamped = concierge_protocol::stamp_payload(
//!     payload,
//!     Stamp::new(1_000, -3_600_000),
//!     ArrayPolicy::StampEntries,
//! )
//! .unwrap();
//! assert_eq!(stamped["serverUTCTime"], 1_000);
//! ```

pub mod codec;
pub mod payload;
pub mod records;
pub mod topic;

pub use codec::{decode, encode, ProtocolError};
pub use payload::{stamp_payload, ArrayPolicy, Payload, Stamp};
pub use records::{PresenceEntry, StatusName, StatusRecord, Timestamp};
pub use topic::{ClientId, TopicAddress};

//! Records published by the relay.
//!
//! These are the JSON bodies of the `status` and `recent` announcements and
//! of the HTTP read endpoints.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::topic::ClientId;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Connection status of the relay's own bus link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusName {
    /// Initial state, before the first connect.
    Disconnected,
    /// Bus connection established and subscriptions issued.
    Connected,
    /// Connection closed.
    Closed,
    /// Transport went offline and is reconnecting.
    Offline,
    /// Transport reported an error.
    ConnectionError,
    /// Transport shut down for good.
    End,
    /// A message was just received.
    Receiving,
}

impl StatusName {
    /// Wire name of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusName::Disconnected => "disconnected",
            StatusName::Connected => "connected",
            StatusName::Closed => "closed",
            StatusName::Offline => "offline",
            StatusName::ConnectionError => "connection-error",
            StatusName::End => "end",
            StatusName::Receiving => "receiving",
        }
    }
}

impl fmt::Display for StatusName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The relay's current connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Status name.
    pub name: StatusName,
    /// When the status was entered.
    pub timestamp: Timestamp,
}

impl StatusRecord {
    /// Create a status record.
    #[must_use]
    pub fn new(name: StatusName, timestamp: Timestamp) -> Self {
        Self { name, timestamp }
    }
}

/// A tracked client and the last time it was seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    /// Client id.
    pub id: ClientId,
    /// Last activity timestamp.
    #[serde(rename = "timestamp")]
    pub last_seen: Timestamp,
}

impl PresenceEntry {
    /// Create a presence entry.
    #[must_use]
    pub fn new(id: ClientId, last_seen: Timestamp) -> Self {
        Self { id, last_seen }
    }
}

//! Connection status of the relay's own bus link.

use concierge_protocol::{StatusName, StatusRecord, Timestamp};
use tracing::debug;

/// Holds the single current [`StatusRecord`].
///
/// Transitions are not validated: the transport decides what happened and
/// the latest event always wins.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    record: StatusRecord,
}

impl StatusTracker {
    /// Create a tracker in the `disconnected` state.
    #[must_use]
    pub fn new(now: Timestamp) -> Self {
        Self {
            record: StatusRecord::new(StatusName::Disconnected, now),
        }
    }

    /// Overwrite the status.
    ///
    /// Returns the previous record.
    pub fn set(&mut self, name: StatusName, now: Timestamp) -> StatusRecord {
        let previous = std::mem::replace(&mut self.record, StatusRecord::new(name, now));
        if previous.name != name {
            debug!(from = %previous.name, to = %name, "Status changed");
        }
        previous
    }

    /// Get a copy of the current status.
    #[must_use]
    pub fn get(&self) -> StatusRecord {
        self.record
    }
}

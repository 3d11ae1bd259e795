//! Presence tracking for the concierge.
//!
//! The registry remembers when each client was last seen. "Recent" is a
//! view computed at query time: stale entries are never pruned, they only
//! drop out of [`PresenceRegistry::recent`] until the client is seen again
//! or explicitly leaves.

use concierge_protocol::{ClientId, PresenceEntry, Timestamp};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Default recency window (one minute).
pub const DEFAULT_RECENCY_WINDOW: Duration = Duration::from_millis(60_000);

/// Check whether `last_seen` falls inside the window ending at `now`.
///
/// The window edge is inclusive: an entry last seen exactly `window` ago is
/// still recent.
#[must_use]
pub fn is_recent(last_seen: Timestamp, now: Timestamp, window: Duration) -> bool {
    let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
    last_seen >= now.saturating_sub(window_ms)
}

/// Client id to last-seen registry.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: HashMap<ClientId, Timestamp>,
}

impl PresenceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of tracked clients, recent or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no clients are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record that `id` was seen at `timestamp`. Last write wins.
    ///
    /// Returns `true` if this is a new client.
    pub fn update(&mut self, id: ClientId, timestamp: Timestamp) -> bool {
        let is_new = self.entries.insert(id.clone(), timestamp).is_none();
        if is_new {
            debug!(client = %id, "Presence: client tracked");
        }
        is_new
    }

    /// Forget a client. Removing an unknown client is not an error.
    ///
    /// Returns the removed entry, if any.
    pub fn remove(&mut self, id: &str) -> Option<PresenceEntry> {
        let removed = self.entries.remove_entry(id);
        if removed.is_some() {
            debug!(client = %id, "Presence: client removed");
        }
        removed.map(|(id, last_seen)| PresenceEntry::new(id, last_seen))
    }

    /// Look up a single client.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<PresenceEntry> {
        self.entries
            .get_key_value(id)
            .map(|(id, last_seen)| PresenceEntry::new(id.clone(), *last_seen))
    }

    /// All clients seen within `window` of `now`, in no particular order.
    #[must_use]
    pub fn recent(&self, now: Timestamp, window: Duration) -> Vec<PresenceEntry> {
        self.entries
            .iter()
            .filter(|(_, last_seen)| is_recent(**last_seen, now, window))
            .map(|(id, last_seen)| PresenceEntry::new(id.clone(), *last_seen))
            .collect()
    }

    /// Count the clients seen within `window` of `now`.
    #[must_use]
    pub fn recent_count(&self, now: Timestamp, window: Duration) -> usize {
        self.entries
            .values()
            .filter(|last_seen| is_recent(**last_seen, now, window))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = DEFAULT_RECENCY_WINDOW;
    const NOW: Timestamp = 1_700_000_000_000;

    fn id(s: &str) -> ClientId {
        ClientId::parse(s).unwrap()
    }

    fn recent_ids(registry: &PresenceRegistry, now: Timestamp) -> Vec<String> {
        let mut ids: Vec<String> = registry
            .recent(now, WINDOW)
            .into_iter()
            .map(|e| e.id.to_string())
            .collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_update_last_write_wins() {
        let mut registry = PresenceRegistry::new();
        assert!(registry.update(id("p1"), 10));
        assert!(!registry.update(id("p1"), 20));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("p1").unwrap().last_seen, 20);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = PresenceRegistry::new();
        registry.update(id("p1"), NOW);

        assert!(registry.remove("p1").is_some());
        assert!(registry.remove("p1").is_none());
        assert!(registry.get("p1").is_none());
        assert!(registry.recent(NOW, WINDOW).is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_recent_window_edge() {
        let window_ms = 60_000;
        let mut registry = PresenceRegistry::new();
        registry.update(id("inside"), NOW - window_ms + 1);
        registry.update(id("edge"), NOW - window_ms);
        registry.update(id("outside"), NOW - window_ms - 1);

        assert_eq!(recent_ids(&registry, NOW), vec!["edge", "inside"]);
    }

    #[test]
    fn test_recent_does_not_prune() {
        let mut registry = PresenceRegistry::new();
        registry.update(id("p1"), NOW);

        assert!(registry.recent(NOW + 120_000, WINDOW).is_empty());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.recent_count(NOW + 120_000, WINDOW), 0);
        assert_eq!(registry.recent_count(NOW, WINDOW), 1);
        assert_eq!(recent_ids(&registry, NOW + 1), vec!["p1"]);
    }

    #[test]
    fn test_recent_near_epoch_does_not_underflow() {
        let mut registry = PresenceRegistry::new();
        registry.update(id("p1"), 0);
        assert_eq!(recent_ids(&registry, 5), vec!["p1"]);
    }

    #[test]
    fn test_is_recent() {
        assert!(is_recent(NOW, NOW, WINDOW));
        assert!(is_recent(NOW + 5, NOW, WINDOW));
        assert!(!is_recent(NOW - 60_001, NOW, WINDOW));
        assert!(!is_recent(NOW - 1, NOW, Duration::ZERO));
    }
}

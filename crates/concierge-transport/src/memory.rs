//! In-process loopback bus.
//!
//! Messages published on a [`MemoryBus`] are looped back as
//! [`BusEvent::Message`] when they match one of its subscriptions, and every
//! publish is also broadcast to watchers. This is enough to run the relay
//! without a broker and to observe exactly what it publishes in tests.

use async_trait::async_trait;
use bytes::Bytes;
use concierge_protocol::topic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::traits::{Bus, BusEvent, EventSender, TransportError};

/// Default capacity of the watcher broadcast channel.
const DEFAULT_WATCH_CAPACITY: usize = 1024;

/// A message published on the memory bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    /// Topic the message was published on.
    pub topic: String,
    /// Payload bytes.
    pub payload: Bytes,
}

/// In-process loopback bus.
pub struct MemoryBus {
    events: EventSender,
    filters: Mutex<Vec<String>>,
    watchers: broadcast::Sender<Published>,
    connected: AtomicBool,
}

impl MemoryBus {
    /// Create a new memory bus feeding `events`.
    #[must_use]
    pub fn new(events: EventSender) -> Self {
        let (watchers, _) = broadcast::channel(DEFAULT_WATCH_CAPACITY);
        Self {
            events,
            filters: Mutex::new(Vec::new()),
            watchers,
            connected: AtomicBool::new(false),
        }
    }

    /// Mark the bus connected and emit [`BusEvent::Connected`].
    ///
    /// # Errors
    ///
    /// Returns an error if the event channel is closed.
    pub async fn connect(&self) -> Result<(), TransportError> {
        self.connected.store(true, Ordering::SeqCst);
        self.emit(BusEvent::Connected).await
    }

    /// Inject an event as if the transport had produced it.
    ///
    /// # Errors
    ///
    /// Returns an error if the event channel is closed.
    pub async fn emit(&self, event: BusEvent) -> Result<(), TransportError> {
        match &event {
            BusEvent::Connected => self.connected.store(true, Ordering::SeqCst),
            BusEvent::Closed | BusEvent::Offline | BusEvent::End => {
                self.connected.store(false, Ordering::SeqCst);
            }
            BusEvent::Error(_) | BusEvent::Message { .. } => {}
        }
        self.events
            .send(event)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Watch everything published on this bus.
    #[must_use]
    pub fn watch(&self) -> broadcast::Receiver<Published> {
        self.watchers.subscribe()
    }

    /// Get the active subscription filters.
    #[must_use]
    pub fn filters(&self) -> Vec<String> {
        self.filters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_subscribed(&self, topic_name: &str) -> bool {
        self.filters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|filter| topic::matches(filter, topic_name))
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn subscribe(&self, filter: &str) -> Result<(), TransportError> {
        topic::validate_filter(filter).map_err(TransportError::InvalidFilter)?;

        let mut filters = self.filters.lock().unwrap_or_else(PoisonError::into_inner);
        if !filters.iter().any(|f| f == filter) {
            filters.push(filter.to_string());
            debug!(filter = %filter, "Memory bus subscribed");
        }
        Ok(())
    }

    async fn publish(&self, topic_name: &str, payload: Bytes) -> Result<(), TransportError> {
        trace!(topic = %topic_name, bytes = payload.len(), "Memory bus publish");

        // No watchers is fine.
        let _ = self.watchers.send(Published {
            topic: topic_name.to_string(),
            payload: payload.clone(),
        });

        if self.is_subscribed(topic_name) {
            self.events
                .send(BusEvent::message(topic_name, payload))
                .await
                .map_err(|_| TransportError::ConnectionClosed)?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.emit(BusEvent::End).await
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

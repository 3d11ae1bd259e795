//! The relay engine.
//!
//! The engine turns bus events into state changes and outbound commands.
//! It never touches the network itself: [`RelayEngine::handle`] returns the
//! subscriptions and publishes to perform, and the caller executes them
//! against a bus in order. Status and presence sit behind a single lock so
//! that every publish reflects the update made by the same event.

use bytes::Bytes;
use concierge_protocol::codec::{PayloadCodec, DEFAULT_MAX_PAYLOAD_SIZE};
use concierge_protocol::{
    stamp_payload, ArrayPolicy, ClientId, PresenceEntry, ProtocolError, Stamp, StatusName,
    StatusRecord, TopicAddress,
};
use concierge_transport::BusEvent;
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::presence::{PresenceRegistry, DEFAULT_RECENCY_WINDOW};
use crate::router::{ControlAction, DataKind, Route, TopicRouter, DEFAULT_SYSTEM_PREFIX};
use crate::status::StatusTracker;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Game topic namespace.
    pub namespace: String,
    /// The relay's own identity on the bus.
    pub self_id: String,
    /// Prefix of broker system topics.
    pub system_prefix: String,
    /// How long a client counts as recent after it was last seen.
    pub recency_window: Duration,
    /// How array payloads are relayed.
    pub array_policy: ArrayPolicy,
    /// Maximum inbound payload size in bytes.
    pub max_payload_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            namespace: "gigascapes".to_string(),
            self_id: "concierge".to_string(),
            system_prefix: DEFAULT_SYSTEM_PREFIX.to_string(),
            recency_window: DEFAULT_RECENCY_WINDOW,
            array_policy: ArrayPolicy::default(),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

/// Something the caller must do on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusCommand {
    /// Subscribe to a topic filter.
    Subscribe(String),
    /// Publish a payload.
    Publish {
        /// Target topic.
        topic: String,
        /// JSON payload.
        payload: Bytes,
    },
}

/// Why a data message was not relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Payload is not valid JSON.
    InvalidJson,
    /// Payload is JSON but not an object or array.
    UnsupportedShape,
    /// Payload is an array and arrays are not relayed.
    ArraysDisabled,
    /// Payload exceeds the size limit.
    TooLarge,
    /// Topic carries an invalid client id.
    InvalidClientId,
    /// The stamped payload could not be encoded.
    Encode,
}

impl DropReason {
    /// Label for logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::InvalidJson => "invalid_json",
            DropReason::UnsupportedShape => "unsupported_shape",
            DropReason::ArraysDisabled => "arrays_disabled",
            DropReason::TooLarge => "too_large",
            DropReason::InvalidClientId => "invalid_client_id",
            DropReason::Encode => "encode",
        }
    }
}

impl From<&ProtocolError> for DropReason {
    fn from(e: &ProtocolError) -> Self {
        match e {
            ProtocolError::Json(_) => DropReason::InvalidJson,
            ProtocolError::UnsupportedShape(_) => DropReason::UnsupportedShape,
            ProtocolError::ArraysDisabled => DropReason::ArraysDisabled,
            ProtocolError::PayloadTooLarge { .. } => DropReason::TooLarge,
            ProtocolError::InvalidClientId(_) | ProtocolError::InvalidTopic(_) => {
                DropReason::InvalidClientId
            }
        }
    }
}

/// What the engine did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Connected: subscriptions issued and status announced.
    Connected,
    /// A transport lifecycle change was recorded.
    Lifecycle(StatusName),
    /// A join was processed.
    Joined,
    /// A leave was processed.
    Left,
    /// A nudge was answered.
    Nudged,
    /// A broker system message was observed.
    System,
    /// A data message was stamped and relayed.
    Relayed(DataKind),
    /// A message was dropped.
    Dropped(DropReason),
    /// Nothing to do for this topic.
    Ignored,
}

impl Disposition {
    /// Label for logs and metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Disposition::Connected => "connected",
            Disposition::Lifecycle(_) => "lifecycle",
            Disposition::Joined => "join",
            Disposition::Left => "leave",
            Disposition::Nudged => "nudge",
            Disposition::System => "system",
            Disposition::Relayed(_) => "relayed",
            Disposition::Dropped(_) => "dropped",
            Disposition::Ignored => "ignored",
        }
    }
}

/// Result of handling one bus event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// What happened.
    pub disposition: Disposition,
    /// Bus commands to execute, in order.
    pub commands: Vec<BusCommand>,
    /// Whether the presence registry was written.
    pub presence_changed: bool,
}

impl Outcome {
    fn new(disposition: Disposition) -> Self {
        Self::with_commands(disposition, Vec::new())
    }

    fn with_commands(disposition: Disposition, commands: Vec<BusCommand>) -> Self {
        Self {
            disposition,
            commands,
            presence_changed: false,
        }
    }

    fn presence_changed(mut self, changed: bool) -> Self {
        self.presence_changed = changed;
        self
    }

    /// Iterate over the publishes in this outcome.
    pub fn publishes(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.commands.iter().filter_map(|command| match command {
            BusCommand::Publish { topic, payload } => Some((topic.as_str(), payload)),
            BusCommand::Subscribe(_) => None,
        })
    }
}

/// Status and presence, guarded together.
#[derive(Debug)]
struct RelayState {
    status: StatusTracker,
    presence: PresenceRegistry,
}

/// The presence-tracking and topic-relay engine.
#[derive(Debug)]
pub struct RelayEngine {
    config: RelayConfig,
    router: TopicRouter,
    codec: PayloadCodec,
    clock: Arc<dyn Clock>,
    state: RwLock<RelayState>,
}

impl RelayEngine {
    /// Create an engine on the system clock.
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an engine on a custom clock.
    #[must_use]
    pub fn with_clock(config: RelayConfig, clock: Arc<dyn Clock>) -> Self {
        info!(
            namespace = %config.namespace,
            self_id = %config.self_id,
            window_ms = u64::try_from(config.recency_window.as_millis()).unwrap_or(u64::MAX),
            "Creating relay engine"
        );
        let router = TopicRouter::new(
            config.namespace.clone(),
            config.self_id.clone(),
            config.system_prefix.clone(),
        );
        let state = RelayState {
            status: StatusTracker::new(clock.now()),
            presence: PresenceRegistry::new(),
        };
        Self {
            codec: PayloadCodec::new(config.max_payload_size),
            config,
            router,
            clock,
            state: RwLock::new(state),
        }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Get the topic router.
    #[must_use]
    pub fn router(&self) -> &TopicRouter {
        &self.router
    }

    /// Get the clock.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Handle one bus event.
    pub fn handle(&self, event: BusEvent) -> Outcome {
        match event {
            BusEvent::Connected => self.on_connect(),
            BusEvent::Closed => self.on_lifecycle(StatusName::Closed),
            BusEvent::Offline => self.on_lifecycle(StatusName::Offline),
            BusEvent::Error(reason) => {
                warn!(reason = %reason, "Bus error");
                self.on_lifecycle(StatusName::ConnectionError)
            }
            BusEvent::End => self.on_lifecycle(StatusName::End),
            BusEvent::Message { topic, payload } => self.on_message(&topic, &payload),
        }
    }

    /// Current status.
    #[must_use]
    pub fn status_snapshot(&self) -> StatusRecord {
        self.read(|state| state.status.get())
    }

    /// Clients seen within the recency window.
    #[must_use]
    pub fn recent_snapshot(&self) -> Vec<PresenceEntry> {
        let now = self.clock.now();
        self.read(|state| state.presence.recent(now, self.config.recency_window))
    }

    /// A single tracked client, recent or not.
    #[must_use]
    pub fn client_snapshot(&self, id: &str) -> Option<PresenceEntry> {
        self.read(|state| state.presence.get(id))
    }

    /// Number of clients seen within the recency window.
    #[must_use]
    pub fn recent_count(&self) -> usize {
        let now = self.clock.now();
        self.read(|state| state.presence.recent_count(now, self.config.recency_window))
    }

    /// Number of tracked clients, stale ones included.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.read(|state| state.presence.len())
    }

    fn read<T>(&self, f: impl FnOnce(&RelayState) -> T) -> T {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RelayState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_connect(&self) -> Outcome {
        let now = self.clock.now();
        let mut commands: Vec<BusCommand> = self
            .router
            .subscriptions()
            .into_iter()
            .map(BusCommand::Subscribe)
            .collect();

        let mut state = self.write();
        state.status.set(StatusName::Connected, now);
        commands.extend(self.status_command(&state));
        drop(state);

        info!(self_id = %self.config.self_id, "Relay connected");
        Outcome::with_commands(Disposition::Connected, commands)
    }

    fn on_lifecycle(&self, name: StatusName) -> Outcome {
        let now = self.clock.now();
        self.write().status.set(name, now);
        info!(status = %name, "Bus connection status");
        Outcome::new(Disposition::Lifecycle(name))
    }

    fn on_message(&self, topic: &str, payload: &[u8]) -> Outcome {
        let now = self.clock.now();
        trace!(topic = %topic, bytes = payload.len(), "Received message");

        let mut state = self.write();
        state.status.set(StatusName::Receiving, now);

        match self.router.classify(topic) {
            Route::Control(action) => self.on_control(&mut state, action, now),
            Route::System => {
                debug!(topic = %topic, payload = %String::from_utf8_lossy(payload), "System message");
                Outcome::new(Disposition::System)
            }
            Route::Data { address, kind } => {
                let tracked = self.track(&mut state, &address.client_id, now);
                drop(state);
                self.relay(&address, kind, payload, now).presence_changed(tracked)
            }
            Route::Rejected(e) => {
                warn!(topic = %topic, error = %e, "Rejected message");
                Outcome::new(Disposition::Dropped(DropReason::from(&e)))
            }
            Route::Unrouted => {
                debug!(topic = %topic, "Ignoring message");
                Outcome::new(Disposition::Ignored)
            }
        }
    }

    fn on_control(&self, state: &mut RelayState, action: ControlAction, now: u64) -> Outcome {
        match action {
            ControlAction::Join(id) => {
                debug!(client = %id, "Join");
                let tracked = self.track(state, &id, now);
                let commands = self.recent_command(state, now).into_iter().collect();
                Outcome::with_commands(Disposition::Joined, commands).presence_changed(tracked)
            }
            ControlAction::Leave(id) => {
                debug!(client = %id, "Leave");
                let removed = state.presence.remove(id.as_str()).is_some();
                let commands = self.recent_command(state, now).into_iter().collect();
                Outcome::with_commands(Disposition::Left, commands).presence_changed(removed)
            }
            ControlAction::Nudge => {
                debug!("Nudge");
                let commands = self
                    .status_command(state)
                    .into_iter()
                    .chain(self.recent_command(state, now))
                    .collect();
                Outcome::with_commands(Disposition::Nudged, commands)
            }
            ControlAction::Unknown(topic) => {
                warn!(topic = %topic, "Unrecognized control topic");
                Outcome::new(Disposition::Ignored)
            }
        }
    }

    /// Record activity for a client, never for the relay itself.
    ///
    /// Returns `true` if the registry was written.
    fn track(&self, state: &mut RelayState, id: &ClientId, now: u64) -> bool {
        if id.as_str() == self.config.self_id {
            return false;
        }
        state.presence.update(id.clone(), now);
        true
    }

    fn relay(&self, address: &TopicAddress, kind: DataKind, payload: &[u8], now: u64) -> Outcome {
        let stamp = Stamp::new(now, self.clock.utc_offset_ms());
        let stamped = self
            .codec
            .decode(payload)
            .and_then(|parsed| stamp_payload(parsed, stamp, self.config.array_policy));

        let value = match stamped {
            Ok(value) => value,
            Err(e) => {
                let reason = DropReason::from(&e);
                match reason {
                    DropReason::UnsupportedShape | DropReason::ArraysDisabled => {
                        debug!(topic = %address, error = %e, "Dropping message");
                    }
                    _ => warn!(
                        topic = %address,
                        error = %e,
                        payload = %String::from_utf8_lossy(payload),
                        "Failed to parse message"
                    ),
                }
                return Outcome::new(Disposition::Dropped(reason));
            }
        };

        match self.encode_command(address.stamped_topic(), &value) {
            Some(command) => {
                trace!(received = %address, "Relaying with timestamp");
                Outcome::with_commands(Disposition::Relayed(kind), vec![command])
            }
            None => Outcome::new(Disposition::Dropped(DropReason::Encode)),
        }
    }

    fn status_command(&self, state: &RelayState) -> Option<BusCommand> {
        self.encode_command(self.router.status_topic(), &state.status.get())
    }

    fn recent_command(&self, state: &RelayState, now: u64) -> Option<BusCommand> {
        let recent = state.presence.recent(now, self.config.recency_window);
        self.encode_command(self.router.recent_topic(), &recent)
    }

    fn encode_command<T: Serialize + ?Sized>(&self, topic: String, value: &T) -> Option<BusCommand> {
        match self.codec.encode(value) {
            Ok(payload) => Some(BusCommand::Publish { topic, payload }),
            Err(e) => {
                warn!(topic = %topic, error = %e, "Failed to encode message");
                None
            }
        }
    }
}

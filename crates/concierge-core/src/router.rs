//! Topic classification for the relay.
//!
//! Every inbound topic falls into one of three classes:
//!
//! - control topics addressed to the relay itself (`<selfId>/...`)
//! - broker system topics (`$SYS/...`)
//! - game data (`<namespace>/<clientId>/<name>`)
//!
//! Anything else is a routing miss.

use concierge_protocol::topic::{self, TopicAddress};
use concierge_protocol::{ClientId, ProtocolError};

/// Default broker system topic prefix.
pub const DEFAULT_SYSTEM_PREFIX: &str = "$SYS";

/// Name of the join control topic.
pub const JOIN: &str = "join";
/// Name of the leave control topic.
pub const LEAVE: &str = "leave";
/// Name of the nudge control topic.
pub const NUDGE: &str = "nudge";
/// Name of the status announcement topic.
pub const STATUS: &str = "status";
/// Name of the recent-clients announcement topic.
pub const RECENT: &str = "recent";

/// Kind of game data message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    /// Player position update.
    Positions,
    /// Player or game state update.
    GameState,
}

impl DataKind {
    /// All data kinds the relay subscribes to.
    pub const ALL: [DataKind; 2] = [DataKind::Positions, DataKind::GameState];

    /// Topic name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::Positions => "positions",
            DataKind::GameState => "gamestate",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

/// A control request addressed to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAction {
    /// A client announces itself.
    Join(ClientId),
    /// A client announces its departure.
    Leave(ClientId),
    /// Someone asks for a status and recent-clients refresh.
    Nudge,
    /// Self-addressed topic with an unrecognized shape or name.
    Unknown(String),
}

/// Result of classifying a topic.
#[derive(Debug)]
pub enum Route {
    /// Control topic addressed to the relay.
    Control(ControlAction),
    /// Broker system topic.
    System,
    /// Game data to track and relay.
    Data {
        /// Parsed topic.
        address: TopicAddress,
        /// Data kind.
        kind: DataKind,
    },
    /// The topic names an invalid client id.
    Rejected(ProtocolError),
    /// Not a topic the relay acts on.
    Unrouted,
}

/// Classifies topics for a relay identity and namespace.
#[derive(Debug, Clone)]
pub struct TopicRouter {
    namespace: String,
    self_id: String,
    system_prefix: String,
}

impl TopicRouter {
    /// Create a router.
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        self_id: impl Into<String>,
        system_prefix: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            self_id: self_id.into(),
            system_prefix: system_prefix.into(),
        }
    }

    /// The game namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The relay's own identity.
    #[must_use]
    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    /// Filters the relay subscribes to on connect.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        let mut filters: Vec<String> = DataKind::ALL
            .iter()
            .map(|kind| {
                topic::join(&[&self.namespace, topic::SINGLE_LEVEL_WILDCARD, kind.as_str()])
            })
            .collect();
        filters.push(topic::join(&[&self.self_id, topic::SINGLE_LEVEL_WILDCARD, JOIN]));
        filters.push(topic::join(&[&self.self_id, topic::SINGLE_LEVEL_WILDCARD, LEAVE]));
        filters.push(topic::join(&[&self.self_id, NUDGE]));
        filters
    }

    /// Topic the relay announces its status on.
    #[must_use]
    pub fn status_topic(&self) -> String {
        topic::join(&[&self.namespace, &self.self_id, STATUS])
    }

    /// Topic the relay announces recent clients on.
    #[must_use]
    pub fn recent_topic(&self) -> String {
        topic::join(&[&self.namespace, &self.self_id, RECENT])
    }

    /// Classify an inbound topic.
    #[must_use]
    pub fn classify(&self, topic_name: &str) -> Route {
        let levels: Vec<&str> = topic::segments(topic_name).collect();

        if levels.first() == Some(&self.self_id.as_str()) {
            return self.classify_control(topic_name, &levels[1..]);
        }

        if topic_name.starts_with(&self.system_prefix) {
            return Route::System;
        }

        let address = match TopicAddress::parse(topic_name) {
            Ok(address) => address,
            Err(ProtocolError::InvalidClientId(reason)) => {
                return Route::Rejected(ProtocolError::InvalidClientId(reason))
            }
            Err(_) => return Route::Unrouted,
        };
        if address.prefix != self.namespace {
            return Route::Unrouted;
        }
        match DataKind::from_name(&address.name) {
            Some(kind) => Route::Data { address, kind },
            None => Route::Unrouted,
        }
    }

    fn classify_control(&self, topic_name: &str, rest: &[&str]) -> Route {
        let action = match rest {
            [NUDGE] => ControlAction::Nudge,
            [client, JOIN] => match ClientId::parse(*client) {
                Ok(id) => ControlAction::Join(id),
                Err(e) => return Route::Rejected(e),
            },
            [client, LEAVE] => match ClientId::parse(*client) {
                Ok(id) => ControlAction::Leave(id),
                Err(e) => return Route::Rejected(e),
            },
            _ => ControlAction::Unknown(topic_name.to_string()),
        };
        Route::Control(action)
    }
}

impl Default for TopicRouter {
    fn default() -> Self {
        Self::new("gigascapes", "concierge", DEFAULT_SYSTEM_PREFIX)
    }
}

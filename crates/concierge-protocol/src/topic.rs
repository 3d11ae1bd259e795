//! Topic grammar for the concierge bus.
//!
//! Topics are MQTT-style: levels separated by `/`, with `+` matching exactly
//! one level and `#` matching any number of trailing levels in subscription
//! filters. Game traffic uses three-level topics of the form
//! `<prefix>/<clientId>/<name>`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::ProtocolError;

/// Topic level separator.
pub const SEPARATOR: char = '/';

/// Wildcard matching exactly one topic level.
pub const SINGLE_LEVEL_WILDCARD: &str = "+";

/// Wildcard matching all remaining topic levels.
pub const MULTI_LEVEL_WILDCARD: &str = "#";

/// Suffix appended to the topic name of a stamped republish.
pub const STAMPED_SUFFIX: &str = "-ts";

/// Maximum client id length.
pub const MAX_CLIENT_ID_LENGTH: usize = 128;

/// Validate a client id.
///
/// # Errors
///
/// Returns an error message if the id is empty, too long, or contains
/// characters that would change the meaning of a topic. `.` is refused
/// because it separates subject levels on NATS.
pub fn validate_client_id(id: &str) -> Result<(), &'static str> {
    if id.is_empty() {
        return Err("client id cannot be empty");
    }
    if id.len() > MAX_CLIENT_ID_LENGTH {
        return Err("client id too long");
    }
    if id.contains(SEPARATOR) {
        return Err("client id cannot contain '/'");
    }
    if id.contains('.') {
        return Err("client id cannot contain '.'");
    }
    if id.contains(['+', '#']) {
        return Err("client id cannot contain wildcards");
    }
    if id.chars().any(char::is_control) {
        return Err("client id contains control characters");
    }
    Ok(())
}

/// Identifier of a game client, unique within the bus namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(String);

impl ClientId {
    /// Parse and validate a client id.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidClientId`] if validation fails.
    pub fn parse(id: impl Into<String>) -> Result<Self, ProtocolError> {
        let id = id.into();
        validate_client_id(&id).map_err(ProtocolError::InvalidClientId)?;
        Ok(Self(id))
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ClientId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for ClientId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ClientId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ClientId> for String {
    fn from(id: ClientId) -> Self {
        id.0
    }
}

/// Split a topic into its non-empty levels.
pub fn segments(topic: &str) -> impl Iterator<Item = &str> {
    topic.split(SEPARATOR).filter(|s| !s.is_empty())
}

/// Join topic levels with the separator.
#[must_use]
pub fn join(levels: &[&str]) -> String {
    levels.join("/")
}

/// Parsed `<prefix>/<clientId>/<name>` topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicAddress {
    /// First level, normally the game namespace.
    pub prefix: String,
    /// The client the message is about.
    pub client_id: ClientId,
    /// Message name, e.g. `positions`.
    pub name: String,
}

impl TopicAddress {
    /// Parse a three-level topic. Empty levels are ignored, so
    /// `/gs//p1/positions` parses the same as `gs/p1/positions`.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic does not have exactly three levels or
    /// the client level is not a valid client id.
    pub fn parse(topic: &str) -> Result<Self, ProtocolError> {
        let mut levels = segments(topic);
        match (levels.next(), levels.next(), levels.next(), levels.next()) {
            (Some(prefix), Some(client), Some(name), None) => Ok(Self {
                prefix: prefix.to_string(),
                client_id: ClientId::parse(client)?,
                name: name.to_string(),
            }),
            _ => Err(ProtocolError::InvalidTopic(topic.to_string())),
        }
    }

    /// The canonical topic string.
    #[must_use]
    pub fn topic(&self) -> String {
        join(&[&self.prefix, self.client_id.as_str(), &self.name])
    }

    /// Topic the stamped copy of this message is published on.
    #[must_use]
    pub fn stamped_topic(&self) -> String {
        format!("{}{}", self.topic(), STAMPED_SUFFIX)
    }
}

impl fmt::Display for TopicAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.prefix, self.client_id, self.name)
    }
}

/// Validate a subscription filter.
///
/// # Errors
///
/// Returns an error message if a wildcard is misplaced.
pub fn validate_filter(filter: &str) -> Result<(), &'static str> {
    if filter.is_empty() {
        return Err("filter cannot be empty");
    }
    let levels: Vec<&str> = filter.split(SEPARATOR).collect();
    for (i, level) in levels.iter().enumerate() {
        if *level == MULTI_LEVEL_WILDCARD {
            if i + 1 != levels.len() {
                return Err("'#' must be the last level");
            }
        } else if *level != SINGLE_LEVEL_WILDCARD && level.contains(['+', '#']) {
            return Err("wildcards must occupy a whole level");
        }
    }
    Ok(())
}

/// Check whether `topic` matches the subscription `filter`.
///
/// Follows MQTT semantics: levels are compared exactly (empty levels
/// included), `+` matches a single level, `#` matches the parent level and
/// everything below it, and topics starting with `$` are never matched by a
/// filter whose first level is a wildcard.
#[must_use]
pub fn matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$')
        && (filter.starts_with(SINGLE_LEVEL_WILDCARD) || filter.starts_with(MULTI_LEVEL_WILDCARD))
    {
        return false;
    }

    let mut filter_levels = filter.split(SEPARATOR);
    let mut topic_levels = topic.split(SEPARATOR);

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some(MULTI_LEVEL_WILDCARD), _) => return true,
            (Some(SINGLE_LEVEL_WILDCARD), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_validation() {
        assert!(ClientId::parse("player1").is_ok());
        assert!(ClientId::parse("").is_err());
        assert!(ClientId::parse("a/b").is_err());
        assert!(ClientId::parse("a+").is_err());
        assert!(ClientId::parse("#").is_err());
        assert!(ClientId::parse("player.1").is_err());
        assert!(ClientId::parse("player-1_a").is_ok());
        assert!(ClientId::parse("x".repeat(MAX_CLIENT_ID_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_client_id_serde_is_transparent() {
        let id = ClientId::parse("player1").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"player1\"");
        assert!(serde_json::from_str::<ClientId>("\"\"").is_err());
    }

    #[test]
    fn test_topic_address_parse() {
        let address = TopicAddress::parse("gs/player1/positions").unwrap();
        assert_eq!(address.prefix, "gs");
        assert_eq!(address.client_id.as_str(), "player1");
        assert_eq!(address.name, "positions");
        assert_eq!(address.stamped_topic(), "gs/player1/positions-ts");
    }

    #[test]
    fn test_topic_address_discards_empty_levels() {
        let address = TopicAddress::parse("/gs//player1/gamestate/").unwrap();
        assert_eq!(address.topic(), "gs/player1/gamestate");
    }

    #[test]
    fn test_topic_address_wrong_depth() {
        assert!(TopicAddress::parse("gs/player1").is_err());
        assert!(TopicAddress::parse("gs/player1/positions/extra").is_err());
        assert!(TopicAddress::parse("").is_err());
    }

    #[test]
    fn test_filter_matching() {
        assert!(matches("gs/+/positions", "gs/p1/positions"));
        assert!(!matches("gs/+/positions", "gs/p1/positions-ts"));
        assert!(!matches("gs/+/positions", "gs/p1/x/positions"));
        assert!(matches("concierge/nudge", "concierge/nudge"));
        assert!(!matches("concierge/+/join", "concierge/nudge"));
        assert!(matches("gs/#", "gs"));
        assert!(matches("gs/#", "gs/a/b/c"));
        assert!(matches("#", "gs/a"));
    }

    #[test]
    fn test_system_topics_not_matched_by_leading_wildcard() {
        assert!(!matches("#", "$SYS/broker/uptime"));
        assert!(!matches("+/broker/uptime", "$SYS/broker/uptime"));
        assert!(matches("$SYS/#", "$SYS/broker/uptime"));
    }

    #[test]
    fn test_filter_validation() {
        assert!(validate_filter("gs/+/positions").is_ok());
        assert!(validate_filter("gs/#").is_ok());
        assert!(validate_filter("gs/#/x").is_err());
        assert!(validate_filter("gs/a+/x").is_err());
        assert!(validate_filter("").is_err());
    }
}

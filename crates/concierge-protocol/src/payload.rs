//! Game payload classification and server-time stamping.
//!
//! Game clients publish JSON on their `positions` and `gamestate` topics.
//! The relay adds `serverUTCTime` and `serverUTCOffset` to the payload so
//! every subscriber can measure end-to-end latency against one clock.
//! Stamping is additive: all other fields are passed through untouched and
//! in their original order.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::codec::ProtocolError;
use crate::records::Timestamp;

/// Field carrying the server receive time.
pub const SERVER_TIME_FIELD: &str = "serverUTCTime";

/// Field carrying the server's UTC offset in milliseconds.
pub const SERVER_OFFSET_FIELD: &str = "serverUTCOffset";

/// A parsed inbound payload.
#[derive(Debug)]
pub enum Payload {
    /// Not valid JSON.
    Invalid(serde_json::Error),
    /// A JSON object.
    Object(Map<String, Value>),
    /// A JSON array of entries.
    Array(Vec<Value>),
    /// Any other JSON value (string, number, bool, null).
    Scalar(Value),
}

impl Payload {
    /// Parse raw bytes into a payload.
    #[must_use]
    pub fn parse(data: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(data) {
            Ok(Value::Object(fields)) => Payload::Object(fields),
            Ok(Value::Array(entries)) => Payload::Array(entries),
            Ok(other) => Payload::Scalar(other),
            Err(e) => Payload::Invalid(e),
        }
    }

    /// Short name of the payload shape, for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Invalid(_) => "invalid",
            Payload::Object(_) => "object",
            Payload::Array(_) => "array",
            Payload::Scalar(_) => "scalar",
        }
    }
}

/// How array payloads are relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArrayPolicy {
    /// Stamp every object entry and relay the array.
    #[default]
    StampEntries,
    /// Drop array payloads.
    Drop,
}

/// Server time attached to a relayed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    /// Receive time in milliseconds since the epoch.
    pub server_time: Timestamp,
    /// UTC offset in milliseconds (UTC minus local time).
    pub utc_offset_ms: i64,
}

impl Stamp {
    /// Create a stamp.
    #[must_use]
    pub fn new(server_time: Timestamp, utc_offset_ms: i64) -> Self {
        Self {
            server_time,
            utc_offset_ms,
        }
    }

    /// Add the stamp fields to an object, overwriting any existing values.
    pub fn apply(&self, fields: &mut Map<String, Value>) {
        fields.insert(SERVER_TIME_FIELD.to_string(), Value::from(self.server_time));
        fields.insert(
            SERVER_OFFSET_FIELD.to_string(),
            Value::from(self.utc_offset_ms),
        );
    }
}

/// Stamp a payload for republishing.
///
/// Objects are stamped directly. Arrays are handled per `policy`; with
/// [`ArrayPolicy::StampEntries`] each object entry is stamped and other
/// entries are passed through unchanged.
///
/// # Errors
///
/// Returns an error if the payload is invalid JSON, a scalar, or an array
/// while arrays are dropped.
pub fn stamp_payload(
    payload: Payload,
    stamp: Stamp,
    policy: ArrayPolicy,
) -> Result<Value, ProtocolError> {
    match payload {
        Payload::Object(mut fields) => {
            stamp.apply(&mut fields);
            Ok(Value::Object(fields))
        }
        Payload::Array(mut entries) => match policy {
            ArrayPolicy::StampEntries => {
                for entry in &mut entries {
                    if let Value::Object(fields) = entry {
                        stamp.apply(fields);
                    }
                }
                Ok(Value::Array(entries))
            }
            ArrayPolicy::Drop => Err(ProtocolError::ArraysDisabled),
        },
        Payload::Scalar(_) => Err(ProtocolError::UnsupportedShape("scalar")),
        Payload::Invalid(e) => Err(ProtocolError::Json(e)),
    }
}

/* 📖 # Why decode envelopes by hand instead of deriving Deserialize?

The `type` discriminator is a closed set and an unknown value must be rejected,
not coerced. The backend also frames pings differently from real changes: a
ping arrives as `event: ping` with `data: {}`, without `type` or `timestamp`.
Decoding in two steps (loose wire record, then an exhaustive match on the kind)
accepts exactly the shapes the backend produces and names the reason whenever a
message is rejected.
*/

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::model::Timestamp;

/// The closed set of change types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
    Ping,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Ping => "ping",
        }
    }
}

impl FromStr for ChangeKind {
    type Err = EnvelopeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "ping" => Ok(Self::Ping),
            other => Err(EnvelopeError::UnknownType(other.to_string())),
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change with its payload. Only real changes carry data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change<T> {
    Create(T),
    Update(T),
    Delete(T),
    Ping,
}

impl<T> Change<T> {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Create(_) => ChangeKind::Create,
            Self::Update(_) => ChangeKind::Update,
            Self::Delete(_) => ChangeKind::Delete,
            Self::Ping => ChangeKind::Ping,
        }
    }

    /// The payload of a real change, `None` for a ping.
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Create(data) | Self::Update(data) | Self::Delete(data) => Some(data),
            Self::Ping => None,
        }
    }
}

/// One notification delivered over a change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEnvelope<T> {
    /// Absent only on pings, which the backend sends without a timestamp.
    pub timestamp: Option<Timestamp>,
    pub change: Change<T>,
}

/// Why a feed message was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    NotJson(String),
    MissingType,
    UnknownType(String),
    EventTypeMismatch { event: String, kind: ChangeKind },
    MissingTimestamp(ChangeKind),
    MissingData(ChangeKind),
    InvalidData { kind: ChangeKind, reason: String },
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotJson(reason) => write!(f, "message is not a JSON object: {}", reason),
            Self::MissingType => write!(f, "message has no type"),
            Self::UnknownType(kind) => write!(f, "unknown change type {:?}", kind),
            Self::EventTypeMismatch { event, kind } => {
                write!(f, "event name {:?} does not match type {:?}", event, kind.as_str())
            }
            Self::MissingTimestamp(kind) => write!(f, "{} message has no timestamp", kind),
            Self::MissingData(kind) => write!(f, "{} message has no data", kind),
            Self::InvalidData { kind, reason } => {
                write!(f, "{} message has invalid data: {}", kind, reason)
            }
        }
    }
}

impl std::error::Error for EnvelopeError {}

/// Event names the backend uses for changes; any other name (or none) defers to `type`.
fn change_event_kind(event: Option<&str>) -> Option<ChangeKind> {
    match event? {
        "message" => None,
        name => name.parse().ok(),
    }
}

impl<T: DeserializeOwned> ChangeEnvelope<T> {
    /// Decode one frame. `event` is the SSE event name, if the frame had one.
    pub fn decode(event: Option<&str>, data: &str) -> Result<Self, EnvelopeError> {
        let event_kind = change_event_kind(event);
        if event_kind == Some(ChangeKind::Ping) {
            let timestamp = serde_json::from_str::<Value>(data)
                .ok()
                .and_then(|value| value.get("timestamp").and_then(timestamp_of));
            return Ok(Self {
                timestamp,
                change: Change::Ping,
            });
        }

        let value: Value =
            serde_json::from_str(data).map_err(|e| EnvelopeError::NotJson(e.to_string()))?;
        let Value::Object(mut record) = value else {
            return Err(EnvelopeError::NotJson("expected an object".to_string()));
        };

        let kind: ChangeKind = match record.get("type") {
            Some(Value::String(kind)) => kind.parse()?,
            Some(other) => return Err(EnvelopeError::UnknownType(other.to_string())),
            None => return Err(EnvelopeError::MissingType),
        };
        if let (Some(event), Some(event_kind)) = (event, event_kind) {
            if event_kind != kind {
                return Err(EnvelopeError::EventTypeMismatch {
                    event: event.to_string(),
                    kind,
                });
            }
        }

        let timestamp = record.get("timestamp").and_then(timestamp_of);
        if kind == ChangeKind::Ping {
            return Ok(Self {
                timestamp,
                change: Change::Ping,
            });
        }
        let timestamp = timestamp.ok_or(EnvelopeError::MissingTimestamp(kind))?;

        let data = match record.remove("data") {
            None | Some(Value::Null) => return Err(EnvelopeError::MissingData(kind)),
            Some(data) => data,
        };
        let data: T = serde_json::from_value(data).map_err(|e| EnvelopeError::InvalidData {
            kind,
            reason: e.to_string(),
        })?;

        let change = match kind {
            ChangeKind::Create => Change::Create(data),
            ChangeKind::Update => Change::Update(data),
            ChangeKind::Delete => Change::Delete(data),
            ChangeKind::Ping => Change::Ping,
        };
        Ok(Self {
            timestamp: Some(timestamp),
            change,
        })
    }
}

fn timestamp_of(value: &Value) -> Option<Timestamp> {
    value.as_str().map(Timestamp::new)
}

#[derive(Serialize)]
struct WireEnvelope<'a, T> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<&'a Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a T>,
}

impl<T: Serialize> ChangeEnvelope<T> {
    /// Encode in the backend's wire shape.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&WireEnvelope {
            kind: self.change.kind().as_str(),
            timestamp: self.timestamp.as_ref(),
            data: self.change.data(),
        })
    }

    /// Encode as one SSE frame, named after the change type.
    pub fn to_sse_frame(&self) -> serde_json::Result<String> {
        let kind = self.change.kind();
        if kind == ChangeKind::Ping {
            return Ok("event: ping\ndata: {}\n\n".to_string());
        }
        Ok(format!("event: {}\ndata: {}\n\n", kind, self.to_json()?))
    }
}

//! Record identifiers that distinguish server-assigned ids from provisional ones.
//!
//! Records created while offline get a [`RecordId::Local`] id. Once the
//! creating change has been replayed against the server, the provisional id is
//! replaced by the [`RecordId::Server`] id the server assigned.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Prefix used when a provisional id is printed or typed on the command line.
pub const LOCAL_PREFIX: &str = "local:";

/// Identifier of a shopping list or shopping item.
///
/// On the wire a server id is a plain JSON string and a provisional id is an
/// object `{"local": "<uuid>"}`, so the two can never be confused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "WireRecordId", into = "WireRecordId")]
pub enum RecordId {
    /// Id assigned by the remote store.
    Server(String),
    /// Provisional id minted on this device while offline.
    Local(Uuid),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireRecordId {
    Server(String),
    Local { local: Uuid },
}

impl From<WireRecordId> for RecordId {
    fn from(wire: WireRecordId) -> Self {
        match wire {
            WireRecordId::Server(id) => RecordId::Server(id),
            WireRecordId::Local { local } => RecordId::Local(local),
        }
    }
}

impl From<RecordId> for WireRecordId {
    fn from(id: RecordId) -> Self {
        match id {
            RecordId::Server(id) => WireRecordId::Server(id),
            RecordId::Local(local) => WireRecordId::Local { local },
        }
    }
}

impl RecordId {
    /// Wraps an id assigned by the server.
    pub fn server(id: impl Into<String>) -> Self {
        RecordId::Server(id.into())
    }

    /// Mints a fresh provisional id.
    pub fn new_local() -> Self {
        RecordId::Local(Uuid::new_v4())
    }

    /// Returns true if this id has not been confirmed by the server yet.
    pub fn is_local(&self) -> bool {
        matches!(self, RecordId::Local(_))
    }

    /// Returns the server id, or `None` for a provisional id.
    pub fn as_server(&self) -> Option<&str> {
        match self {
            RecordId::Server(id) => Some(id),
            RecordId::Local(_) => None,
        }
    }

    /// Returns the provisional uuid, or `None` for a server id.
    pub fn local_id(&self) -> Option<Uuid> {
        match self {
            RecordId::Server(_) => None,
            RecordId::Local(id) => Some(*id),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Server(id) => write!(f, "{}", id),
            RecordId::Local(id) => write!(f, "{}{}", LOCAL_PREFIX, id),
        }
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    /// Parses `local:<uuid>` as a provisional id and anything else as a server id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix(LOCAL_PREFIX) {
            Some(rest) => Ok(RecordId::Local(Uuid::parse_str(rest)?)),
            None => Ok(RecordId::Server(s.to_string())),
        }
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        RecordId::Server(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        RecordId::Server(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_id_is_plain_string_on_the_wire() {
        let id = RecordId::server("abc-123");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc-123\"");

        let parsed: RecordId = serde_json::from_str("\"abc-123\"").unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_local_id_is_tagged_object_on_the_wire() {
        let uuid = Uuid::new_v4();
        let id = RecordId::Local(uuid);
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json, serde_json::json!({ "local": uuid.to_string() }));

        let parsed: RecordId = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, id);
        assert!(parsed.is_local());
    }

    #[test]
    fn test_display_and_parse() {
        let local = RecordId::new_local();
        let text = local.to_string();
        assert!(text.starts_with(LOCAL_PREFIX));
        assert_eq!(text.parse::<RecordId>().unwrap(), local);

        let server: RecordId = "42".parse().unwrap();
        assert_eq!(server, RecordId::server("42"));
        assert_eq!(server.as_server(), Some("42"));
        assert!(server.local_id().is_none());
    }

    #[test]
    fn test_parse_rejects_bad_local_uuid() {
        assert!("local:not-a-uuid".parse::<RecordId>().is_err());
    }
}

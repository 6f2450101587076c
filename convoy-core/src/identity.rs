//! Identity types

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Convert a timestamp to Unix nanoseconds, saturating outside the
/// representable range.
pub fn timestamp_to_nanos(ts: &Timestamp) -> i64 {
    ts.timestamp_nanos_opt().unwrap_or(if ts.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}

/// Convert Unix nanoseconds back into a timestamp.
pub fn timestamp_from_nanos(nanos: i64) -> Timestamp {
    Utc.timestamp_nanos(nanos)
}

/// Opaque identifier an agent uses for itself.
///
/// Agents send raw bytes. Storage keys and JSON use the lowercase hex form,
/// so every id has exactly one textual representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct InstanceId(Vec<u8>);

impl InstanceId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse the hex form produced by [`InstanceId::to_hex`].
    pub fn from_hex(text: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(text).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<InstanceId> for String {
    fn from(id: InstanceId) -> Self {
        id.to_hex()
    }
}

impl TryFrom<String> for InstanceId {
    type Error = hex::FromHexError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        Self::from_hex(&text)
    }
}

impl From<&str> for InstanceId {
    fn from(raw: &str) -> Self {
        Self(raw.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_id_hex_form() {
        let id = InstanceId::new(vec![0xde, 0xad, 0x01]);
        assert_eq!(id.to_hex(), "dead01");
        assert_eq!(id.to_string(), "dead01");
        assert_eq!(InstanceId::from_hex("dead01").unwrap(), id);
    }

    #[test]
    fn test_instance_id_serde_uses_hex_string() {
        let id = InstanceId::from("agent-1");
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json, serde_json::json!(hex::encode("agent-1")));
        let back: InstanceId = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_instance_id_rejects_bad_hex() {
        let result: Result<InstanceId, _> = serde_json::from_value(serde_json::json!("zz"));
        assert!(result.is_err());
    }

    #[test]
    fn test_timestamp_nanos_round_trip() {
        let ts = timestamp_from_nanos(1_700_000_000_123_456_789);
        assert_eq!(timestamp_to_nanos(&ts), 1_700_000_000_123_456_789);
    }
}

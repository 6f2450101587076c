//! Convoy Core - Entity Types
//!
//! Data structures shared by every Convoy crate: identities, enums, the
//! canonical entity model, the error taxonomy, protobuf wire messages and
//! the pure codecs between them. No I/O lives here.

mod codec;
mod entities;
mod enums;
mod error;
mod identity;
pub mod legacy;
pub mod wire;

pub use codec::*;
pub use entities::*;
pub use enums::*;
pub use error::*;
pub use identity::*;

/// Name of the implicit group every agent belongs to.
pub const DEFAULT_GROUP_NAME: &str = "default";

/// Serde adapter storing opaque byte payloads as base64 text.
pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

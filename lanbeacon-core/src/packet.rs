//! The record exchanged on the wire.
//!
//! A ping is a single UDP datagram holding a JSON object with two fields:
//! `id` (non-empty text) and `user_data` (opaque bytes, base64-armoured so
//! the datagram stays printable). The source IP of the sender is filled in
//! by the receive path and is never serialized.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Receivers read datagrams into a buffer of this size. Anything larger is
/// truncated by UDP and then rejected by [`Packet::decode`], so emitters
/// must keep `user_data` well below this bound.
pub const MAX_PACKET_SIZE: usize = 1000;

/// Errors produced by the packet codec.
#[derive(Debug, Error)]
pub enum PacketError {
    #[error("malformed packet: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("packet id is empty")]
    EmptyId,
}

/// A single identity announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Identifier of the announcing host.
    pub id: String,
    /// Opaque payload attached by the announcing host. May be empty.
    #[serde(with = "base64_bytes")]
    pub user_data: Vec<u8>,
    /// Source IP observed when the datagram was received. Never serialized;
    /// lost through the wire.
    #[serde(skip)]
    pub source: Option<IpAddr>,
}

impl Packet {
    pub fn new(id: impl Into<String>, user_data: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            user_data: user_data.into(),
            source: None,
        }
    }

    /// Serialize for transmission as a single datagram.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        if self.id.is_empty() {
            return Err(PacketError::EmptyId);
        }
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a received datagram. Rejects input that does not match the
    /// expected schema, including an empty `id`.
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let packet: Packet = serde_json::from_slice(data)?;
        if packet.id.is_empty() {
            return Err(PacketError::EmptyId);
        }
        Ok(packet)
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

//! Wire protocol: the UDP envelope, message types, and peer records (§6).
//!
//! Every datagram is a JSON object `{"type": <int>, "from": <hex pubkey>,
//! "data": <...>}`. `data` is usually itself a JSON string holding the
//! pretty-printed payload (a header, block, or transaction's own
//! `to_json_string()`), so it round-trips through the same encoder the
//! payload type uses for logging and hashing; for `GetBlock`/`NewPeerAck`
//! it carries a bare number or `null` instead.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Matches `Node.MAX_BUF_SIZE = 2**21` in the original protocol.
pub const MAX_DATAGRAM_SIZE: usize = 1 << 21;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("datagram exceeds {MAX_DATAGRAM_SIZE} bytes")]
    DatagramTooLarge,
    #[error("unknown message type code {0}")]
    UnknownMsgType(u8),
    #[error("envelope data field was not in the expected shape")]
    UnexpectedDataShape,
}

/// The seven message types the peer protocol exchanges, numbered exactly
/// as the protocol's original integer codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgType {
    StrongBlockMined = 1,
    WeakHeaderMined = 2,
    NewPeer = 3,
    NewPeerAck = 4,
    Transaction = 5,
    GetBlock = 6,
    Block = 7,
}

impl MsgType {
    pub fn from_u8(v: u8) -> Result<Self, ProtocolError> {
        match v {
            1 => Ok(MsgType::StrongBlockMined),
            2 => Ok(MsgType::WeakHeaderMined),
            3 => Ok(MsgType::NewPeer),
            4 => Ok(MsgType::NewPeerAck),
            5 => Ok(MsgType::Transaction),
            6 => Ok(MsgType::GetBlock),
            7 => Ok(MsgType::Block),
            other => Err(ProtocolError::UnknownMsgType(other)),
        }
    }
}

impl Serialize for MsgType {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(*self as u8)
    }
}

struct MsgTypeVisitor;

impl<'de> Visitor<'de> for MsgTypeVisitor {
    type Value = MsgType;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "an integer message type code 1-7")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<MsgType, E> {
        MsgType::from_u8(v as u8).map_err(de::Error::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<MsgType, E> {
        MsgType::from_u8(v as u8).map_err(de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for MsgType {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        d.deserialize_u64(MsgTypeVisitor)
    }
}

/// The envelope every datagram carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub msg_type: MsgType,
    pub from: String,
    pub data: Value,
}

impl Envelope {
    pub fn with_payload(msg_type: MsgType, from: impl Into<String>, payload_json: impl Into<String>) -> Self {
        Envelope {
            msg_type,
            from: from.into(),
            data: Value::String(payload_json.into()),
        }
    }

    pub fn with_number(msg_type: MsgType, from: impl Into<String>, n: u64) -> Self {
        Envelope {
            msg_type,
            from: from.into(),
            data: Value::from(n),
        }
    }

    pub fn with_null(msg_type: MsgType, from: impl Into<String>) -> Self {
        Envelope {
            msg_type,
            from: from.into(),
            data: Value::Null,
        }
    }

    pub fn to_json_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("Envelope serializes")
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn data_as_str(&self) -> Result<&str, ProtocolError> {
        self.data.as_str().ok_or(ProtocolError::UnexpectedDataShape)
    }

    pub fn data_as_u64(&self) -> Result<u64, ProtocolError> {
        self.data.as_u64().ok_or(ProtocolError::UnexpectedDataShape)
    }
}

/// A known peer: how to reach it, and the public key it mines/signs under.
/// Matches `NodeConf`'s role in the original protocol (peer directory
/// entries), distinct from this node's own `config::NodeSettings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub port: u16,
    pub address: String,
    pub vk: String,
}

impl PeerInfo {
    pub fn new(port: u16, address: impl Into<String>, vk: impl Into<String>) -> Self {
        PeerInfo {
            port,
            address: address.into(),
            vk: vk.into(),
        }
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string_pretty(self).expect("PeerInfo serializes")
    }

    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msg_type_round_trips_through_json() {
        let env = Envelope::with_null(MsgType::NewPeerAck, "abc");
        let bytes = env.to_json_bytes();
        let parsed = Envelope::from_json_bytes(&bytes).unwrap();
        assert_eq!(parsed.msg_type, MsgType::NewPeerAck);
        assert!(parsed.data.is_null());
    }

    #[test]
    fn unknown_msg_type_code_is_rejected() {
        let raw = br#"{"type": 42, "from": "x", "data": null}"#;
        assert!(Envelope::from_json_bytes(raw).is_err());
    }

    #[test]
    fn get_block_envelope_carries_a_number() {
        let env = Envelope::with_number(MsgType::GetBlock, "abc", 7);
        assert_eq!(env.data_as_u64().unwrap(), 7);
    }

    #[test]
    fn peer_info_json_round_trips() {
        let p = PeerInfo::new(9001, "127.0.0.1", "deadbeef");
        let s = p.to_json_string();
        assert_eq!(PeerInfo::from_json_str(&s).unwrap(), p);
    }
}

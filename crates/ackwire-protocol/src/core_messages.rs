//! Built-in message types used by the session itself, and their payloads.

use std::convert::TryFrom;

use ackwire_core::{
    constants::PROTOCOL_VERSION,
    error::{DecodingErrorKind, ErrorKind, Result},
};
use sha2::{Digest, Sha256};

use crate::{
    definition::{MessageDefinition, MessageKind},
    payload::{PayloadReader, PayloadWriter},
};

/// Message types reserved by the session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CoreMessage {
    /// Connectionless probe carrying a text.
    Ping = 0,
    /// Answer to a ping.
    Pong = 1,
    /// Joiner asks the host for a connection.
    JoinRequest = 2,
    /// Host refuses a join.
    JoinDeny = 3,
    /// Host accepts a join and assigns an index.
    JoinAccept = 4,
    /// A peer announces it is leaving.
    Leave = 5,
}

impl CoreMessage {
    /// Every built-in type in registration order.
    pub const ALL: [CoreMessage; 6] = [
        CoreMessage::Ping,
        CoreMessage::Pong,
        CoreMessage::JoinRequest,
        CoreMessage::JoinDeny,
        CoreMessage::JoinAccept,
        CoreMessage::Leave,
    ];

    /// Wire type id.
    pub const fn message_type(self) -> u8 {
        self as u8
    }

    /// Delivery semantics.
    pub const fn kind(self) -> MessageKind {
        match self {
            CoreMessage::Ping => MessageKind::connectionless(0),
            CoreMessage::Pong => MessageKind::connectionless(1),
            CoreMessage::JoinRequest => MessageKind::connectionless(2),
            CoreMessage::JoinDeny => MessageKind::connectionless(3),
            CoreMessage::JoinAccept => MessageKind::new(4).reliable().sequenced(0),
            CoreMessage::Leave => MessageKind::new(5),
        }
    }

    /// Registered name.
    pub const fn name(self) -> &'static str {
        match self {
            CoreMessage::Ping => "ping",
            CoreMessage::Pong => "pong",
            CoreMessage::JoinRequest => "join_request",
            CoreMessage::JoinDeny => "join_deny",
            CoreMessage::JoinAccept => "join_accept",
            CoreMessage::Leave => "leave",
        }
    }

    /// Handler-less definition; the session dispatches these types itself.
    pub fn definition(self) -> MessageDefinition {
        MessageDefinition::new(self.name(), self.kind())
    }

    /// Maps a type id back to a built-in type.
    pub fn from_type(message_type: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|core| core.message_type() == message_type)
    }
}

/// Why a host refused a join.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum JoinDenyReason {
    /// Unspecified.
    Unknown = 0,
    /// Protocol, game version or definitions differ.
    WrongVersion = 1,
    /// The addressed session is not hosting.
    NotHost = 2,
    /// The host stopped accepting joins.
    NotAcceptingNewConnections = 3,
    /// Every connection slot is taken.
    Full = 4,
    /// A connection from the same address exists.
    DuplicateGuid = 5,
    /// The application vetoed the join.
    Rejected = 6,
}

impl TryFrom<u8> for JoinDenyReason {
    type Error = ErrorKind;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(JoinDenyReason::Unknown),
            1 => Ok(JoinDenyReason::WrongVersion),
            2 => Ok(JoinDenyReason::NotHost),
            3 => Ok(JoinDenyReason::NotAcceptingNewConnections),
            4 => Ok(JoinDenyReason::Full),
            5 => Ok(JoinDenyReason::DuplicateGuid),
            6 => Ok(JoinDenyReason::Rejected),
            unknown => {
                Err(ErrorKind::DecodingError(DecodingErrorKind::UnknownDiscriminant(unknown)))
            }
        }
    }
}

/// Combines protocol version, game version and definition hash into the value both sides
/// must agree on to connect.
pub fn compatibility_version(game_version: u16, definition_hash: u32) -> u64 {
    u64::from(PROTOCOL_VERSION) << 48 | u64::from(game_version) << 32 | u64::from(definition_hash)
}

/// First 8 bytes, little-endian, of the SHA-256 of `password`.
pub fn password_hash(password: &str) -> u64 {
    let digest = Sha256::digest(password.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Payload of `CoreMessage::JoinRequest`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinRequest {
    /// Compatibility version of the joiner.
    pub version: u64,
    /// Random value echoed back in the answer.
    pub nuonce: u32,
    /// Joiner's display name.
    pub username: String,
    /// See [`password_hash`].
    pub password_hash: u64,
}

impl JoinRequest {
    /// Serializes the payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = PayloadWriter::new();
        writer
            .write_u64(self.version)
            .write_u32(self.nuonce)
            .write_str(&self.username)
            .write_u64(self.password_hash);
        writer.into_bytes()
    }

    /// Parses the payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut reader = PayloadReader::new(payload);
        Ok(Self {
            version: reader.read_u64()?,
            nuonce: reader.read_u32()?,
            username: reader.read_string()?,
            password_hash: reader.read_u64()?,
        })
    }
}

/// Payload of `CoreMessage::JoinDeny`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct JoinDeny {
    /// Nuonce of the refused request.
    pub nuonce: u32,
    /// Why the join was refused.
    pub reason: JoinDenyReason,
}

impl JoinDeny {
    /// Serializes the payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = PayloadWriter::new();
        writer.write_u32(self.nuonce).write_u8(self.reason as u8);
        writer.into_bytes()
    }

    /// Parses the payload. Unknown reason codes decode as `JoinDenyReason::Unknown`.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut reader = PayloadReader::new(payload);
        let nuonce = reader.read_u32()?;
        let reason = JoinDenyReason::try_from(reader.read_u8()?).unwrap_or(JoinDenyReason::Unknown);
        Ok(Self { nuonce, reason })
    }
}

/// Payload of `CoreMessage::JoinAccept`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinAccept {
    /// Nuonce of the accepted request.
    pub nuonce: u32,
    /// Connection index of the host.
    pub host_index: u8,
    /// Host's display name.
    pub host_username: String,
    /// Index assigned to the joiner.
    pub assigned_index: u8,
}

impl JoinAccept {
    /// Serializes the payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = PayloadWriter::new();
        writer
            .write_u32(self.nuonce)
            .write_u8(self.host_index)
            .write_str(&self.host_username)
            .write_u8(self.assigned_index);
        writer.into_bytes()
    }

    /// Parses the payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut reader = PayloadReader::new(payload);
        Ok(Self {
            nuonce: reader.read_u32()?,
            host_index: reader.read_u8()?,
            host_username: reader.read_string()?,
            assigned_index: reader.read_u8()?,
        })
    }
}

/// Payload of `CoreMessage::Ping`.
pub fn encode_ping(text: &str) -> Vec<u8> {
    let mut writer = PayloadWriter::new();
    writer.write_str(text);
    writer.into_bytes()
}

/// Parses a `CoreMessage::Ping` payload.
pub fn decode_ping(payload: &[u8]) -> Result<String> {
    PayloadReader::new(payload).read_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_request_layout() {
        let request = JoinRequest {
            version: 0x0102030405060708,
            nuonce: 0xAABBCCDD,
            username: "ann".into(),
            password_hash: 1,
        };
        let bytes = request.encode();
        assert_eq!(&bytes[..8], &[8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(&bytes[8..12], &[0xDD, 0xCC, 0xBB, 0xAA]);
        assert_eq!(&bytes[12..16], b"ann\0");
        assert_eq!(bytes.len(), 24);
        assert_eq!(JoinRequest::decode(&bytes).unwrap(), request);
    }

    #[test]
    fn test_join_accept_decodes() {
        let accept = JoinAccept {
            nuonce: 9,
            host_index: 0,
            host_username: "host".into(),
            assigned_index: 3,
        };
        assert_eq!(JoinAccept::decode(&accept.encode()).unwrap(), accept);
        assert!(JoinAccept::decode(&accept.encode()[..6]).is_err());
    }

    #[test]
    fn test_deny_reason_codes_are_stable() {
        let deny = JoinDeny { nuonce: 1, reason: JoinDenyReason::Full };
        assert_eq!(deny.encode(), vec![1, 0, 0, 0, 4]);
        assert_eq!(JoinDeny::decode(&[1, 0, 0, 0, 200]).unwrap().reason, JoinDenyReason::Unknown);
        assert!(JoinDenyReason::try_from(7).is_err());
    }

    #[test]
    fn test_compatibility_version_packs_all_parts() {
        let version = compatibility_version(0x0203, 0xDEADBEEF);
        assert_eq!(version >> 48, u64::from(PROTOCOL_VERSION));
        assert_eq!((version >> 32) & 0xFFFF, 0x0203);
        assert_eq!(version & 0xFFFF_FFFF, 0xDEADBEEF);
    }

    #[test]
    fn test_password_hash_is_sha256_prefix() {
        // sha256("") = e3b0c442 98fc1c14 ...
        let empty_digest = [0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14];
        assert_eq!(password_hash(""), u64::from_le_bytes(empty_digest));
        assert_ne!(password_hash("a"), password_hash("b"));
    }

    #[test]
    fn test_core_types_round_trip_through_ids() {
        for core in CoreMessage::ALL {
            assert_eq!(CoreMessage::from_type(core.message_type()), Some(core));
            assert_eq!(core.kind().message_type(), core.message_type());
        }
        assert!(CoreMessage::from_type(32).is_none());
        assert!(CoreMessage::JoinAccept.kind().is_reliable_sequenced());
    }
}

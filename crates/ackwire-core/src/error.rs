//! Error types for the ackwire crates.

use std::io;

use thiserror::Error;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ErrorKind>;

/// Everything that can go wrong in the library.
///
/// Network input never produces a panic; malformed data surfaces as `DecodingError` or
/// `ReceivedDataToShort` and is dropped by the caller.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Wrapped I/O error from the socket.
    #[error("an I/O error occurred: {0}")]
    IOError(#[from] io::Error),
    /// The bytes could not be decoded.
    #[error("could not decode data: {0}")]
    DecodingError(DecodingErrorKind),
    /// A datagram was shorter than the fixed packet header.
    #[error("the received data did not have enough bytes for a packet header")]
    ReceivedDataToShort,
    /// The message type has no registered definition.
    #[error("message type {0} is not registered")]
    UnregisteredMessageType(u8),
    /// A definition with this type already exists.
    #[error("message type {0} is already registered")]
    DuplicateDefinition(u8),
    /// Definitions were registered after the session started.
    #[error("message definitions can only be registered before the session starts")]
    RegistrationClosed,
    /// The definition combines options that cannot work together.
    #[error("invalid message definition: {0}")]
    InvalidDefinition(&'static str),
    /// The message would not fit into an empty packet.
    #[error("message of {size} bytes exceeds the {max} bytes a packet can carry")]
    PayloadTooLarge {
        /// Encoded message size in bytes.
        size: usize,
        /// Largest encoded message a packet accepts.
        max: usize,
    },
    /// The operation is not allowed in the current session state.
    #[error("operation not allowed while the session is {0}")]
    InvalidSessionState(&'static str),
    /// No connection occupies the given index.
    #[error("no connection at index {0}")]
    UnknownConnection(u8),
    /// A connection-bound message was addressed to a bare address.
    #[error("message type {0} requires a connection")]
    ConnectionRequired(u8),
}

/// Reasons a piece of wire data failed to decode.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodingErrorKind {
    /// Ran out of bytes while reading a field.
    #[error("unexpected end of data")]
    UnexpectedEnd,
    /// A string was not terminated by a NUL byte.
    #[error("string is not nul terminated")]
    UnterminatedString,
    /// A string was not valid utf-8.
    #[error("string is not valid utf-8")]
    InvalidString,
    /// An enum discriminant had no matching variant.
    #[error("unknown discriminant {0}")]
    UnknownDiscriminant(u8),
}

impl From<DecodingErrorKind> for ErrorKind {
    fn from(kind: DecodingErrorKind) -> Self {
        ErrorKind::DecodingError(kind)
    }
}

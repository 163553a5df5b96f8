//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when working with the HCOM protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Packet is too short to hold the header.
    #[error("packet too short: expected at least {expected} bytes, got {actual}")]
    PacketTooShort {
        /// Expected minimum length.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// Packet is too long.
    #[error("packet too long: maximum {max} bytes, got {actual}")]
    PacketTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length.
        actual: usize,
    },

    /// A COBS block pointed past the end of the frame.
    #[error("corrupt frame: block of {block} bytes at offset {offset} overruns {len} byte frame")]
    CorruptFrame {
        /// Offset of the offending code byte.
        offset: usize,
        /// Block length announced by the code byte.
        block: usize,
        /// Length of the encoded frame.
        len: usize,
    },

    /// The encoded frame contained the delimiter byte.
    #[error("unexpected delimiter inside frame at offset {0}")]
    UnexpectedDelimiter(usize),
}

/// Result alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

//! Error types for the rig protocol.

use thiserror::Error;

/// Errors that can occur when encoding commands or decoding frames.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    /// A frame carried the wrong number of comma-separated fields.
    #[error("{frame} frame: expected {expected} fields, got {actual}")]
    FieldCount {
        /// Frame kind (`RELAYS`, `SENSORS`, `STATE`).
        frame: &'static str,
        /// Accepted field count(s), as text.
        expected: &'static str,
        /// Field count actually received.
        actual: usize,
    },

    /// A flag field was not exactly `0` or `1`.
    #[error("{frame} frame: field {index} is not a 0/1 flag: {value:?}")]
    InvalidFlag {
        /// Frame kind.
        frame: &'static str,
        /// Zero-based field position.
        index: usize,
        /// The offending text.
        value: String,
    },

    /// A numeric field could not be parsed as a finite number.
    #[error("{frame} frame: field {index} is not a number: {value:?}")]
    InvalidNumber {
        /// Frame kind.
        frame: &'static str,
        /// Zero-based field position.
        index: usize,
        /// The offending text.
        value: String,
    },

    /// No line terminator arrived before the buffer ceiling.
    #[error("line too long: max {max} bytes, got {actual} without a terminator")]
    LineTooLong { max: usize, actual: usize },

    /// Device codes are exactly two ASCII uppercase letters.
    #[error("invalid device code: {0:?}")]
    InvalidDeviceCode(String),

    /// A command line could not be parsed.
    #[error("invalid command: {0:?}")]
    InvalidCommand(String),
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

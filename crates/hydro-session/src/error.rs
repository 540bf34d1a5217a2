//! Error types for the session layer.

use hydro_protocol::ProtocolError;
use thiserror::Error;

/// Errors raised by a serial line or its connector.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No device at the given path.
    #[error("device not found: {0}")]
    NotFound(String),

    /// The device exists but we may not open it.
    #[error("permission denied opening {0}")]
    PermissionDenied(String),

    /// Another process holds the device.
    #[error("device busy: {0}")]
    Busy(String),

    /// Opening failed for another reason.
    #[error("failed to open {path}: {reason}")]
    Open {
        /// Device path.
        path: String,
        /// Driver description of the failure.
        reason: String,
    },

    /// Read or write failed on an open line.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The line has been closed.
    #[error("serial line closed")]
    Closed,
}

/// Errors surfaced synchronously by the command dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The key is not in the actuator table. Nothing was sent.
    #[error("unknown actuator: {0}")]
    UnknownActuator(String),
}

/// Errors loading or validating a [`SessionConfig`](crate::SessionConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML could not be parsed.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Values parsed but do not make sense together.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Umbrella error for the session layer.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Serial line error.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Wire protocol error.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Dispatcher error.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

//! Hub Error Types
//!
//! One error enum for configuration problems, transport faults, device
//! exception replies, decode failures and failed aggregation cycles.

use thiserror::Error;
use tokio_modbus::ExceptionCode;

/// Result type for voltage-hub operations
pub type Result<T> = std::result::Result<T, HubError>;

/// Hub errors
#[derive(Debug, Error, Clone)]
pub enum HubError {
    /// Configuration errors, raised at setup time
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// IO errors
    #[error("IO error: {0}")]
    Io(String),

    /// Timeout errors
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Malformed or unexpected replies
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Exception reply returned by the device
    #[error("Modbus exception {code:?} for function 0x{function_code:02X}")]
    Exception {
        function_code: u8,
        code: ExceptionCode,
    },

    /// Decoded value cannot be used by the consumer
    #[error("Decode error: {0}")]
    Decode(String),

    /// Aggregation cycle failed; the previously published data is kept
    #[error("Could not update values: {0}")]
    UpdateFailed(Box<HubError>),
}

impl From<std::io::Error> for HubError {
    fn from(err: std::io::Error) -> Self {
        HubError::Io(err.to_string())
    }
}

impl From<tokio_modbus::Error> for HubError {
    fn from(err: tokio_modbus::Error) -> Self {
        match err {
            tokio_modbus::Error::Transport(e) => e.into(),
            tokio_modbus::Error::Protocol(e) => HubError::Protocol(e.to_string()),
        }
    }
}

// Helper methods for creating errors
impl HubError {
    pub fn config(msg: impl Into<String>) -> Self {
        HubError::Config(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        HubError::Connection(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        HubError::Io(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        HubError::Timeout(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        HubError::Protocol(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        HubError::Decode(msg.into())
    }

    pub fn update_failed(cause: HubError) -> Self {
        HubError::UpdateFailed(Box::new(cause))
    }

    /// Check if this error indicates a need for reconnection
    pub fn needs_reconnect(&self) -> bool {
        match self {
            HubError::Io(msg) => {
                msg.contains("Broken pipe")
                    || msg.contains("Connection reset")
                    || msg.contains("Connection refused")
                    || msg.contains("Connection aborted")
                    || msg.contains("Network is unreachable")
                    || msg.contains("closed by peer")
            },
            HubError::Connection(_) | HubError::NotConnected | HubError::Timeout(_) => true,
            HubError::UpdateFailed(cause) => cause.needs_reconnect(),
            _ => false,
        }
    }

    /// Check if this is a setup-time configuration error
    pub fn is_config(&self) -> bool {
        matches!(self, HubError::Config(_))
    }
}

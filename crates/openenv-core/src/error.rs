//! Error types for openenv

use std::time::Duration;
use thiserror::Error;

/// Result type for openenv operations
pub type Result<T> = std::result::Result<T, OpenEnvError>;

/// openenv error types
#[derive(Debug, Error)]
pub enum OpenEnvError {
    /// Malformed space or environment definition, raised before the simulation starts
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Externally sourced data does not match its space
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Action arrived outside of its tick window
    #[error("Stale action for tick {received} (open tick: {open})")]
    StaleAction { received: u64, open: String },

    /// Agent missed the action deadline
    #[error("Timeout: no action within {0:?}")]
    Timeout(Duration),

    /// Agent boundary unreachable
    #[error("Transport error: {0}")]
    Transport(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Unexpected message for the current exchange
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation not allowed in the current controller state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl OpenEnvError {
    /// Whether the error stops the simulation.
    ///
    /// Validation, staleness and timeouts are handled inside a tick and never
    /// abort simulated time.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            OpenEnvError::Validation(_) | OpenEnvError::StaleAction { .. } | OpenEnvError::Timeout(_)
        )
    }

    /// Numeric code reported to the agent
    pub fn code(&self) -> i32 {
        match self {
            OpenEnvError::Configuration(_) => error_codes::CONFIGURATION,
            OpenEnvError::Validation(_) => error_codes::VALIDATION,
            OpenEnvError::StaleAction { .. } => error_codes::STALE_ACTION,
            OpenEnvError::Timeout(_) => error_codes::TIMEOUT,
            OpenEnvError::Transport(_) => error_codes::TRANSPORT,
            OpenEnvError::Serialization(_) | OpenEnvError::Protocol(_) => error_codes::PROTOCOL,
            OpenEnvError::InvalidState(_) => error_codes::INTERNAL,
        }
    }
}

impl From<serde_json::Error> for OpenEnvError {
    fn from(err: serde_json::Error) -> Self {
        OpenEnvError::Serialization(err.to_string())
    }
}

/// Mismatch between a container and the space it is checked against
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Variant tag, arity, shape or dtype disagree with the space
    #[error("type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    /// Value outside the declared bounds
    #[error("value out of range at {path}: {value} not in {bounds}")]
    Range {
        path: String,
        value: String,
        bounds: String,
    },
}

impl ValidationError {
    pub(crate) fn mismatch(
        path: &str,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        ValidationError::TypeMismatch {
            path: path.to_string(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub(crate) fn range(path: &str, value: impl ToString, bounds: impl Into<String>) -> Self {
        ValidationError::Range {
            path: path.to_string(),
            value: value.to_string(),
            bounds: bounds.into(),
        }
    }

    /// Location of the offending value, e.g. `$.box[3]`
    pub fn path(&self) -> &str {
        match self {
            ValidationError::TypeMismatch { path, .. } | ValidationError::Range { path, .. } => {
                path
            }
        }
    }
}

/// Error codes carried in action rejections
pub mod error_codes {
    pub const VALIDATION: i32 = -32001;
    pub const STALE_ACTION: i32 = -32002;
    pub const TIMEOUT: i32 = -32003;
    pub const ACTION_REFUSED: i32 = -32004;
    pub const TRANSPORT: i32 = -32005;
    pub const CONFIGURATION: i32 = -32006;
    pub const PROTOCOL: i32 = -32600;
    pub const INTERNAL: i32 = -32603;
}

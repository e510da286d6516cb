//! Error types for bridge operations.

use thiserror::Error;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Startup and infrastructure errors
///
/// Per-message problems are not represented here: payload problems are a
/// [`ValidationError`] and sink problems are a [`crate::DeliveryOutcome`].
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Broker unreachable, credentials refused, or channel/topology failures
    ///
    /// Fatal at startup; the process terminates without partial operation.
    #[error("Connectivity error: {message}")]
    Connectivity {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error - detected at startup
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// AMQP client error that was not mapped to a more specific variant
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),
}

impl BridgeError {
    /// Create a connectivity error from a message
    pub fn connectivity(message: impl Into<String>) -> Self {
        BridgeError::Connectivity {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connectivity error with source
    pub fn connectivity_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        BridgeError::Connectivity {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        BridgeError::Configuration(message.into())
    }
}

/// Why a raw payload could not become a forward record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Not JSON, or a field has the wrong type
    #[error("Malformed payload: {reason}")]
    MalformedPayload { reason: String },

    /// `esp32_fk` absent or empty
    #[error("Missing device identifier (esp32_fk)")]
    MissingIdentifier,
}

impl ValidationError {
    /// Pipeline stage the error belongs to, used as a log and metric label
    pub fn stage(&self) -> &'static str {
        match self {
            ValidationError::MalformedPayload { .. } => "parse",
            ValidationError::MissingIdentifier => "validate",
        }
    }
}

impl From<serde_json::Error> for ValidationError {
    fn from(err: serde_json::Error) -> Self {
        ValidationError::MalformedPayload {
            reason: err.to_string(),
        }
    }
}

//! Error types for the Probe suite

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProbeError>;

#[derive(Error, Debug)]
pub enum ProbeError {
    /// Bad step input: unsupported method, empty endpoint, malformed table.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("Fixture error: {reason}")]
    Fixture { reason: String },

    #[error("Could not resolve saved value: {key}")]
    Unresolved { key: String },

    #[error("No created ID found for {resource_type}. Please create a {resource_type} first. Registered: [{registered}]")]
    MissingResource {
        resource_type: String,
        registered: String,
    },

    #[error("Unknown resource type: {name}")]
    UnknownResource { name: String },

    #[error("Configuration error: {reason}")]
    Config { reason: String },

    #[error("Verification failed: {}", failures.join("; "))]
    VerificationFailed { failures: Vec<String> },

    #[error("Database error: {reason}")]
    Database { reason: String },

    #[error("HTTP error: {reason}")]
    Http { reason: String },

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Serialization error: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },
}

impl ProbeError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        ProbeError::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn fixture(reason: impl Into<String>) -> Self {
        ProbeError::Fixture {
            reason: reason.into(),
        }
    }
}

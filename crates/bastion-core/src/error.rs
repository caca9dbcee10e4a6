//! Error types for the bastion system
//!
//! This module defines all error types used throughout the workspace.

use thiserror::Error;

/// Result type alias for bastion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the bastion system
#[derive(Error, Debug)]
pub enum Error {
    /// A precondition for running is not met (privilege, tool, configuration key)
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Configuration values are present but invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// A managed resource could not be observed, created or updated
    #[error("Failed to apply {resource}: {message}")]
    ResourceApply {
        /// Resource name (e.g. "wireguard")
        resource: String,
        /// Error message
        message: String,
    },

    /// An external tool invocation failed
    #[error("Tool error ({tool}): {message}")]
    Backend {
        /// Tool name (e.g. "systemctl")
        tool: String,
        /// Error message
        message: String,
    },

    /// Fingerprint ledger errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// The readiness probe never succeeded
    #[error("Readiness probe exhausted after {attempts} attempt(s)")]
    ProbeTimeout {
        /// Number of probes issued
        attempts: u32,
    },

    /// The credential replacement was rejected
    #[error("Credential mutation failed: {0}")]
    Mutation(String),

    /// HTTP client errors (admin API)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a precondition error
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a resource apply error
    pub fn resource_apply(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResourceApply {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create a tool invocation error
    pub fn backend(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a credential mutation error
    pub fn mutation(msg: impl Into<String>) -> Self {
        Self::Mutation(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Whether this error must abort the run before any mutation
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_) | Self::Config(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

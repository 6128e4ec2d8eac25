//! Error types for the ApplicationMetadata controller
//!
//! Only failures that abort a reconciliation pass are errors. Dependency
//! violations, unreachable repositories and unhealthy components are
//! reported through the resource status instead.

use thiserror::Error;

use crate::validation::ValidationError;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for controller operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The spec violates one or more field constraints
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A probe failed in a way that is not a plain "unreachable" result
    #[error("probe error [{target}]: {message}")]
    Probe {
        /// What was being probed (repository URL or component name)
        target: String,
        /// Description of what failed
        message: String,
    },

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Where the error occurred (e.g., "engine", "controller")
        context: String,
    },
}

impl Error {
    /// Create a probe error for the given target
    pub fn probe(target: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Probe {
            target: target.into(),
            message: msg.into(),
        }
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation, configuration and serialization errors need a human to fix
    /// the input. Everything else may be transient infrastructure.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(source) => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::Validation(_) => false,
            Error::Probe { .. } => true,
            Error::Config(_) => false,
            Error::Serialization(_) => false,
            Error::Internal { .. } => true,
        }
    }

    /// Short label describing the error category, used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Kube(_) => "kube",
            Error::Validation(_) => "validation",
            Error::Probe { .. } => "probe",
            Error::Config(_) => "config",
            Error::Serialization(_) => "serialization",
            Error::Internal { .. } => "internal",
        }
    }
}

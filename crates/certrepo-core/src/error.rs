//! Error types for the certificate repository
//!
//! Store failures are passed through to callers unchanged. The repository
//! never wraps a store's not-found signal into a different kind, so callers
//! can always tell an absent entity from an unreachable backend.

use thiserror::Error;

/// Result type alias for repository operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the certificate repository
#[derive(Error, Debug)]
pub enum Error {
    /// Key not present in the store
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend failure reported by a store implementation
    #[error("Store error: {0}")]
    Store(String),

    /// Entity could not be encoded to or decoded from the store value
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The repository has been destroyed and accepts no new watches
    #[error("Repository is shutting down")]
    ShuttingDown,

    /// DNS challenge provider error
    #[error("Challenge error ({provider}): {message}")]
    Challenge {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a challenge provider error
    pub fn challenge(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Challenge {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether this error is the store's not-found signal
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

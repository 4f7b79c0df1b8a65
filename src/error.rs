//! Error taxonomy shared by every layer of the engine.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Caller handed us something unusable (bad dimension, k = 0, blank query).
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// A referenced record or resource does not exist.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// Persisted artifacts are unreadable or disagree with each other.
    #[error("corrupt state: {message}")]
    Corruption { message: String },

    /// The embedding backend failed or answered with garbage.
    #[error("embedding provider error: {message}")]
    Embedding { message: String },

    /// The generation backend failed or answered with garbage.
    #[error("generation provider error: {message}")]
    Generation { message: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Broken internal invariant, e.g. a poisoned lock.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl Error {
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn corruption<S: Into<String>>(message: S) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    pub fn embedding<S: Into<String>>(message: S) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    pub fn generation<S: Into<String>>(message: S) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

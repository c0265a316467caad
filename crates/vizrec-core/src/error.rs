//! Error types for vizrec

/// Result type alias using vizrec's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Locally-originated failures.
///
/// Errors reported by the recognition service itself are not represented
/// here: they travel back to the caller as a [`ServiceReply`](crate::ServiceReply)
/// with the upstream status and body intact.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The recognition service could not be reached or its reply could not be read
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Spooling an upload to temporary storage failed
    #[error("upload error: {0}")]
    Upload(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the failure happened while talking to the recognition service
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

//! Error types for the live-value feed.

use thiserror::Error;

/// Main error type for feed operations.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The initial broker connection could not be established.
    #[error("Cannot connect to broker at {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Transport {operation} on {channel} timed out")]
    OperationTimeout {
        operation: &'static str,
        channel: String,
    },

    #[error("Transport is closed")]
    TransportClosed,

    #[error("Channel already subscribed: {0}")]
    AlreadySubscribed(String),

    #[error("Channel not subscribed: {0}")]
    NotSubscribed(String),

    #[error("Cannot decode delivery payload: {0}")]
    Decode(String),

    #[error("Record directory error: {0}")]
    Directory(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl FeedError {
    /// Whether this error concerns a transport operation after startup.
    ///
    /// These are absorbed by the reconciler; everything else is surfaced.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            FeedError::Transport(_)
                | FeedError::OperationTimeout { .. }
                | FeedError::TransportClosed
                | FeedError::AlreadySubscribed(_)
                | FeedError::NotSubscribed(_)
        )
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::Serialization(e.to_string())
    }
}

impl From<redis::RedisError> for FeedError {
    fn from(e: redis::RedisError) -> Self {
        FeedError::Transport(e.to_string())
    }
}

/// Result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;

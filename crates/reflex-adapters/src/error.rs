use reflex_core::ReflexError;
use thiserror::Error;

/// Errors raised by any collaborator adapter.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// `start()` kept failing after every retry.
    #[error("Adapter {adapter} failed to start: {reason}")]
    StartFailed { adapter: String, reason: String },

    /// The adapter's backing service could not be reached.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Dispatch failed: {0}")]
    DispatchFailed(String),

    #[error("NLU processing failed: {0}")]
    NluFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<AdapterError> for ReflexError {
    fn from(e: AdapterError) -> Self {
        let adapter = match &e {
            AdapterError::StartFailed { adapter, .. } => adapter.clone(),
            AdapterError::DispatchFailed(_) => "message".to_string(),
            AdapterError::NluFailed(_) => "nlu".to_string(),
            AdapterError::Storage(_) | AdapterError::Database(_) => "storage".to_string(),
            AdapterError::ConnectionFailed(_) | AdapterError::Serialization(_) => {
                "adapter".to_string()
            }
        };
        ReflexError::Adapter {
            adapter,
            reason: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AdapterError>;

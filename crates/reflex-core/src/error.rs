use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReflexError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown setting: {key}")]
    UnknownSetting { key: String },

    #[error("Adapter error ({adapter}): {reason}")]
    Adapter { adapter: String, reason: String },

    #[error("Nothing to respond to: {0}")]
    NoAudience(String),

    #[error("Sequence failed ({sequence}): {reason}")]
    Sequence { sequence: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReflexError {
    /// Short stable code for logs and persisted failure records.
    pub fn code(&self) -> &'static str {
        match self {
            ReflexError::Config(_) => "CONFIG_ERROR",
            ReflexError::UnknownSetting { .. } => "UNKNOWN_SETTING",
            ReflexError::Adapter { .. } => "ADAPTER_ERROR",
            ReflexError::NoAudience(_) => "NO_AUDIENCE",
            ReflexError::Sequence { .. } => "SEQUENCE_ERROR",
            ReflexError::Serialization(_) => "SERIALIZATION_ERROR",
            ReflexError::Io(_) => "IO_ERROR",
            ReflexError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ReflexError>;

use reflex_core::ReflexError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MiddlewareError {
    /// A piece refused the state on purpose. Ordinary control flow: the
    /// owning stage fails, the sequence carries on.
    #[error("Rejected by {piece}: {reason}")]
    Rejected { piece: String, reason: String },

    /// A piece or completion hit a genuine fault.
    #[error("Middleware {piece} failed: {reason}")]
    Failed { piece: String, reason: String },

    #[error(transparent)]
    Core(#[from] ReflexError),
}

impl MiddlewareError {
    pub fn rejected(piece: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            piece: piece.into(),
            reason: reason.into(),
        }
    }

    pub fn failed(piece: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            piece: piece.into(),
            reason: reason.into(),
        }
    }

    /// Faults propagate past the stage boundary; rejections do not.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, MiddlewareError::Rejected { .. })
    }
}

pub type Result<T> = std::result::Result<T, MiddlewareError>;

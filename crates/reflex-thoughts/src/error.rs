use reflex_adapters::AdapterError;
use reflex_core::ReflexError;
use reflex_dialogue::DialogueError;
use reflex_middleware::MiddlewareError;
use thiserror::Error;

/// Faults that abort a sequence. Ordinary failures (no match, a rejected
/// validation, a collaborator returning nothing) never surface here.
#[derive(Debug, Error)]
pub enum ThoughtError {
    #[error("Stage {stage} failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: MiddlewareError,
    },

    #[error(transparent)]
    Dialogue(#[from] DialogueError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Core(#[from] ReflexError),
}

impl ThoughtError {
    pub fn code(&self) -> &'static str {
        match self {
            ThoughtError::Stage { .. } => "STAGE_ERROR",
            ThoughtError::Dialogue(_) => "DIALOGUE_ERROR",
            ThoughtError::Adapter(_) => "ADAPTER_ERROR",
            ThoughtError::Core(e) => e.code(),
        }
    }

    /// Fold into the core error for callers that only speak `ReflexError`
    /// (e.g. the `Responder` seam).
    pub fn into_core(self, sequence: &str) -> ReflexError {
        match self {
            ThoughtError::Core(e) => e,
            other => ReflexError::Sequence {
                sequence: sequence.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, ThoughtError>;

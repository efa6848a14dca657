use reflex_core::ReflexError;
use thiserror::Error;

/// Errors that can occur while opening, closing or timing out a dialogue.
#[derive(Debug, Error)]
pub enum DialogueError {
    /// The state has no inbound message to derive an audience from.
    #[error("state {0} has no message to engage")]
    NoMessage(String),

    /// The message lacks the id the dialogue's audience needs (e.g. no room).
    #[error("message has no {audience} audience key")]
    NoAudienceKey { audience: String },

    /// The controller that created the dialogue was dropped.
    #[error("dialogue {0} is detached from its controller")]
    Detached(String),

    /// A user-registered open/close/timeout hook failed.
    #[error("dialogue hook {hook} failed: {reason}")]
    Hook { hook: String, reason: String },

    #[error(transparent)]
    Core(#[from] ReflexError),
}

impl DialogueError {
    pub fn hook(hook: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Hook {
            hook: hook.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DialogueError>;

//! `reflex-core`: shared vocabulary for the reflex message engine.
//!
//! Everything else in the workspace depends on this crate: the `State`
//! threaded through a sequence, the message/envelope/NLU types it carries,
//! the configuration handle and the top-level error type.

pub mod config;
pub mod error;
pub mod path;
pub mod state;
pub mod types;

pub use config::{ReflexConfig, Settings};
pub use error::{ReflexError, Result};
pub use state::{DialogueLink, MatchRecord, MatchResult, Responder, State};
pub use types::{
    Envelope, Message, MessageKind, Method, NluKind, NluResult, NluResults, NluResultsRaw, Room,
    User,
};

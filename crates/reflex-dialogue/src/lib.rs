//! `reflex-dialogue`: audience-scoped, timeout-bound branch sessions.
//!
//! A [`Dialogue`] overrides the global branches for one audience (a user in
//! a room, a user anywhere, or a whole room) until it is closed or its
//! inactivity timer runs out. The [`DialogueController`] keeps at most one
//! engaged dialogue per audience key.

pub mod controller;
pub mod dialogue;
pub mod error;
pub mod types;

pub use controller::DialogueController;
pub use dialogue::{Dialogue, DialogueHooks};
pub use error::{DialogueError, Result};
pub use types::{Audience, AudienceKeys, DialogueOptions};

//! `reflex-thoughts`: the staged pipeline that turns a message into
//! matches, responses and memory.
//!
//! A [`Sequence`] is an ordered list of [`Stage`]s. Each stage runs as a
//! [`Thought`]: validate, run the stage's branches or middleware, then a
//! post-action. [`Thoughts`] applies the stage rules that tie the pipeline
//! to the loaded adapters, and [`Runtime`] owns the global branches,
//! middleware stacks, dialogues and memory that flows share.

pub mod error;
pub mod memory;
pub mod runtime;
pub mod stage;
pub mod thought;
pub mod thoughts;

pub use error::{Result, ThoughtError};
pub use memory::{BotMemory, MemorySnapshot};
pub use runtime::Runtime;
pub use stage::{Sequence, Stage};
pub use thought::{NoHooks, StageHooks, Thought};
pub use thoughts::{Thoughts, Wiring, STATES_COLLECTION};

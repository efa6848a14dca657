//! `reflex-middleware`: ordered processing stacks run against a `State`.
//!
//! Each piece returns a [`Flow`]: `Next` advances (optionally capturing an
//! unwind continuation), `Done` interrupts. The [`Middleware`] interpreter
//! walks the stack with a cursor and folds the captured unwinds in reverse
//! once the stack finishes, so "before" and "after" logic nest the way
//! scopes do.

pub mod engine;
pub mod error;
pub mod types;

pub use engine::{Middleware, MiddlewareRegistry};
pub use error::{MiddlewareError, Result};
pub use types::{
    complete_async, complete_fn, piece_async, piece_fn, BoxFuture, Complete, Flow, Noop, Outcome,
    Piece, Unwind,
};

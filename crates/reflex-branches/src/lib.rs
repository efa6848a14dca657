//! `reflex-branches`: matcher + reaction pairs and the controller that
//! groups them by stage.
//!
//! A [`Branch`] tests a message (regex or condition text, NLU criteria,
//! custom predicate, structured data, platform events, catch-all) and, on a
//! match, records it on the `State` and runs its reaction through the
//! stage's middleware.

pub mod branch;
pub mod conditions;
pub mod controller;
pub mod error;
pub mod nlu;
pub mod server;

pub use branch::{
    predicate_fn, strip_address, Branch, Category, EventKind, Matcher, Pattern, Predicate,
    PredicateFn,
};
pub use conditions::{Condition, Conditions, ConditionsOutcome};
pub use controller::BranchController;
pub use error::{BranchError, Result};
pub use nlu::{NluCriteria, NluCriterion, Operator};
pub use server::{ServerCriteria, ServerCriterion};

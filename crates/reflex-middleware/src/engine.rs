use std::sync::{Arc, RwLock};
use std::time::Instant;

use dashmap::DashMap;
use reflex_core::State;
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::{Complete, Flow, Outcome, Piece, Unwind};

/// An ordered stack of pieces run against a [`State`].
///
/// Pieces run strictly one after another, each awaited before the next
/// starts. The stack itself keeps no per-execution state, so one instance
/// can serve any number of executions.
pub struct Middleware {
    name: String,
    pieces: RwLock<Vec<Arc<dyn Piece>>>,
}

impl Middleware {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pieces: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a piece to the end of the stack.
    pub fn register(&self, piece: impl Piece + 'static) {
        let mut pieces = self.pieces.write().expect("middleware stack poisoned");
        debug!(stack = %self.name, piece = piece.name(), "piece registered");
        pieces.push(Arc::new(piece));
    }

    pub fn len(&self) -> usize {
        self.pieces.read().expect("middleware stack poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every piece in order, then `complete`, then the captured unwinds
    /// in reverse order.
    ///
    /// A piece returning [`Flow::Done`] interrupts the stack: later pieces
    /// and `complete` are skipped, but the unwinds captured so far still run.
    /// A piece or completion error aborts the execution without unwinding.
    pub async fn execute(&self, state: &mut State, complete: &dyn Complete) -> Result<Outcome> {
        // Snapshot so registration during an execution never blocks or
        // changes this run.
        let pieces: Vec<Arc<dyn Piece>> = self
            .pieces
            .read()
            .expect("middleware stack poisoned")
            .clone();

        let mut unwinds: Vec<Unwind> = Vec::new();
        let mut outcome = Outcome::Completed;

        for piece in &pieces {
            let t = Instant::now();
            let flow = piece.handle(state).await.inspect_err(|e| {
                warn!(stack = %self.name, piece = piece.name(), error = %e, "middleware piece failed");
            })?;
            debug!(
                stack = %self.name,
                piece = piece.name(),
                duration_ms = t.elapsed().as_millis() as u64,
                ?flow,
                "piece completed"
            );
            match flow {
                Flow::Next(unwind) => unwinds.extend(unwind),
                Flow::Done(unwind) => {
                    unwinds.extend(unwind);
                    outcome = Outcome::Interrupted;
                    break;
                }
            }
        }

        if outcome == Outcome::Completed {
            complete.complete(state).await.inspect_err(|e| {
                warn!(stack = %self.name, error = %e, "middleware completion failed");
            })?;
        }

        while let Some(unwind) = unwinds.pop() {
            unwind(state);
        }

        Ok(outcome)
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Middleware")
            .field("name", &self.name)
            .field("pieces", &self.len())
            .finish()
    }
}

/// Named middleware stacks, one per stage ("hear", "listen", ...).
///
/// Cheap to clone; clones share the same stacks. Stacks are created on
/// first use, so asking for an unknown stage yields an empty stack.
#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    stacks: Arc<DashMap<String, Arc<Middleware>>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stack registered under `name`, created empty if missing.
    pub fn get(&self, name: &str) -> Arc<Middleware> {
        self.stacks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Middleware::new(name)))
            .clone()
    }

    /// Append `piece` to the stack registered under `name`.
    pub fn register(&self, name: &str, piece: impl Piece + 'static) {
        self.get(name).register(piece);
    }

    /// Drop every stack. Subsequent `get`s start from empty stacks.
    pub fn reset(&self) {
        self.stacks.clear();
    }
}

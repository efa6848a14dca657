use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use reflex_core::State;

use crate::error::Result;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Continuation captured by a piece, run when the stack unwinds.
///
/// Unwinds run after the completion function on a normal pass, or right
/// after the interrupting piece when the stack is cut short. Either way
/// they run in reverse registration order, like leaving nested scopes.
pub type Unwind = Box<dyn FnOnce(&mut State) + Send>;

/// What a piece wants the stack to do next.
pub enum Flow {
    /// Advance to the next piece (or the completion function).
    Next(Option<Unwind>),
    /// Interrupt: skip the remaining pieces and the completion function.
    Done(Option<Unwind>),
}

impl Flow {
    pub fn next() -> Self {
        Flow::Next(None)
    }

    /// Advance, and run `unwind` once the stack finishes.
    pub fn next_then(unwind: impl FnOnce(&mut State) + Send + 'static) -> Self {
        Flow::Next(Some(Box::new(unwind)))
    }

    pub fn done() -> Self {
        Flow::Done(None)
    }

    pub fn done_then(unwind: impl FnOnce(&mut State) + Send + 'static) -> Self {
        Flow::Done(Some(Box::new(unwind)))
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Flow::Done(_))
    }
}

impl std::fmt::Debug for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Flow::Next(u) => write!(f, "Next(unwind: {})", u.is_some()),
            Flow::Done(u) => write!(f, "Done(unwind: {})", u.is_some()),
        }
    }
}

/// How a stack execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every piece said next and the completion function ran.
    Completed,
    /// A piece said done; completion was skipped.
    Interrupted,
}

/// One step of a middleware stack.
#[async_trait]
pub trait Piece: Send + Sync {
    /// Label for logs.
    fn name(&self) -> &str {
        "anonymous"
    }

    async fn handle(&self, state: &mut State) -> Result<Flow>;
}

/// The function a stack runs after its last piece.
#[async_trait]
pub trait Complete: Send + Sync {
    async fn complete(&self, state: &mut State) -> Result<()>;
}

/// Completion that does nothing; used when only the pieces matter.
pub struct Noop;

#[async_trait]
impl Complete for Noop {
    async fn complete(&self, _state: &mut State) -> Result<()> {
        Ok(())
    }
}

/// Synchronous closure piece. See [`piece_fn`].
pub struct PieceFn<F> {
    name: String,
    f: F,
}

/// Wrap a closure `Fn(&mut State) -> Result<Flow>` as a named piece.
pub fn piece_fn<F>(name: impl Into<String>, f: F) -> PieceFn<F>
where
    F: Fn(&mut State) -> Result<Flow> + Send + Sync,
{
    PieceFn {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<F> Piece for PieceFn<F>
where
    F: Fn(&mut State) -> Result<Flow> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, state: &mut State) -> Result<Flow> {
        (self.f)(state)
    }
}

/// Async closure piece. See [`piece_async`].
pub struct PieceAsync<F> {
    name: String,
    f: F,
}

/// Wrap `|state| Box::pin(async move { ... })` as a named piece.
pub fn piece_async<F>(name: impl Into<String>, f: F) -> PieceAsync<F>
where
    F: for<'a> Fn(&'a mut State) -> BoxFuture<'a, Result<Flow>> + Send + Sync,
{
    PieceAsync {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<F> Piece for PieceAsync<F>
where
    F: for<'a> Fn(&'a mut State) -> BoxFuture<'a, Result<Flow>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, state: &mut State) -> Result<Flow> {
        (self.f)(state).await
    }
}

/// Synchronous closure completion. See [`complete_fn`].
pub struct CompleteFn<F>(F);

pub fn complete_fn<F>(f: F) -> CompleteFn<F>
where
    F: Fn(&mut State) -> Result<()> + Send + Sync,
{
    CompleteFn(f)
}

#[async_trait]
impl<F> Complete for CompleteFn<F>
where
    F: Fn(&mut State) -> Result<()> + Send + Sync,
{
    async fn complete(&self, state: &mut State) -> Result<()> {
        (self.0)(state)
    }
}

/// Async closure completion. See [`complete_async`].
pub struct CompleteAsync<F>(F);

/// Wrap `|state| Box::pin(async move { ... })` as a completion function.
pub fn complete_async<F>(f: F) -> CompleteAsync<F>
where
    F: for<'a> Fn(&'a mut State) -> BoxFuture<'a, Result<()>> + Send + Sync,
{
    CompleteAsync(f)
}

#[async_trait]
impl<F> Complete for CompleteAsync<F>
where
    F: for<'a> Fn(&'a mut State) -> BoxFuture<'a, Result<()>> + Send + Sync,
{
    async fn complete(&self, state: &mut State) -> Result<()> {
        (self.0)(state).await
    }
}

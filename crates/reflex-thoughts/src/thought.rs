use std::sync::Arc;

use async_trait::async_trait;
use reflex_branches::{BranchController, Category};
use reflex_core::State;
use reflex_middleware::{Middleware, Noop, Outcome};
use tracing::{debug, warn};

use crate::error::{Result, ThoughtError};
use crate::stage::Stage;

/// Per-stage behavior plugged into [`Thought::process`].
///
/// `validate` gates the stage; `action` runs afterwards with the stage's
/// outcome. Both may narrow `branches` for the stages that follow.
#[async_trait]
pub trait StageHooks: Send + Sync {
    async fn validate(
        &self,
        _stage: Stage,
        _state: &mut State,
        _branches: &mut BranchController,
    ) -> Result<bool> {
        Ok(true)
    }

    async fn action(
        &self,
        _stage: Stage,
        _state: &mut State,
        _branches: &mut BranchController,
        _success: bool,
    ) -> Result<()> {
        Ok(())
    }
}

/// Hooks that accept every stage and do nothing afterwards.
pub struct NoHooks;

impl StageHooks for NoHooks {}

/// A stage bound to its middleware stack.
pub struct Thought {
    pub stage: Stage,
    middleware: Arc<Middleware>,
    category: Option<Category>,
}

impl Thought {
    pub fn new(stage: Stage, middleware: Arc<Middleware>) -> Self {
        Self {
            stage,
            middleware,
            category: stage.category(),
        }
    }

    /// Run the stage against `state`.
    ///
    /// Returns whether the stage succeeded. Success writes the stage's
    /// completion timestamp. Ordinary failures only reach `action(false)`;
    /// a fatal middleware error is returned as-is.
    pub async fn process(
        &self,
        state: &mut State,
        branches: &mut BranchController,
        hooks: &dyn StageHooks,
    ) -> Result<bool> {
        let stage = self.stage;
        if state.exit {
            debug!(stage = %stage, state = %state.id, "state exited, stage skipped");
            return Ok(false);
        }

        let eligible = match self.category {
            Some(category) if !branches.exist(Some(category)) => {
                debug!(stage = %stage, "no branches for stage");
                false
            }
            Some(_) if state.is_done() => {
                debug!(stage = %stage, "state done, stage skipped");
                false
            }
            _ => true,
        };

        let success = eligible && hooks.validate(stage, state, branches).await? && {
            match self.category {
                Some(category) => self.run_branches(category, state, branches).await,
                None => self.run_middleware(state).await?,
            }
        };

        if success {
            state.mark_processed(stage.as_str());
        }
        hooks.action(stage, state, branches, success).await?;
        debug!(stage = %stage, state = %state.id, success, "stage processed");
        Ok(success)
    }

    async fn run_branches(
        &self,
        category: Category,
        state: &mut State,
        branches: &BranchController,
    ) -> bool {
        for branch in branches.branches(category) {
            branch.execute(state, &self.middleware).await;
            if state.is_done() {
                debug!(stage = %self.stage, branch = %branch.id, "state done, remaining branches skipped");
                break;
            }
        }
        state.matched()
    }

    async fn run_middleware(&self, state: &mut State) -> Result<bool> {
        match self.middleware.execute(state, &Noop).await {
            Ok(Outcome::Completed) => Ok(true),
            Ok(Outcome::Interrupted) => Ok(false),
            Err(e) if !e.is_fatal() => {
                warn!(stage = %self.stage, error = %e, "stage middleware rejected state");
                Ok(false)
            }
            Err(source) => Err(ThoughtError::Stage {
                stage: self.stage.to_string(),
                source,
            }),
        }
    }
}

impl std::fmt::Debug for Thought {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thought")
            .field("stage", &self.stage)
            .field("middleware", &self.middleware)
            .field("category", &self.category)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use reflex_branches::{Branch, Pattern};
    use reflex_core::{Message, User};
    use reflex_middleware::{complete_fn, piece_fn, Flow, MiddlewareError};

    use super::*;

    fn state() -> State {
        State::new(Message::text(User::new("u1", "alice"), "hello there"))
    }

    #[derive(Default)]
    struct Recording {
        validated: AtomicUsize,
        actions: Mutex<Vec<bool>>,
        reject: bool,
    }

    #[async_trait]
    impl StageHooks for Recording {
        async fn validate(
            &self,
            _stage: Stage,
            _state: &mut State,
            _branches: &mut BranchController,
        ) -> Result<bool> {
            self.validated.fetch_add(1, Ordering::SeqCst);
            Ok(!self.reject)
        }

        async fn action(
            &self,
            _stage: Stage,
            _state: &mut State,
            _branches: &mut BranchController,
            success: bool,
        ) -> Result<()> {
            self.actions.lock().unwrap().push(success);
            Ok(())
        }
    }

    #[tokio::test]
    async fn middleware_stage_succeeds_and_stamps() {
        let thought = Thought::new(Stage::Hear, Arc::new(Middleware::new("hear")));
        let hooks = Recording::default();
        let mut s = state();

        assert!(thought
            .process(&mut s, &mut BranchController::new(), &hooks)
            .await
            .unwrap());
        assert!(s.processed("hear").is_some());
        assert_eq!(*hooks.actions.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn exit_skips_everything() {
        let thought = Thought::new(Stage::Hear, Arc::new(Middleware::new("hear")));
        let hooks = Recording::default();
        let mut s = state();
        s.exit = true;

        assert!(!thought
            .process(&mut s, &mut BranchController::new(), &hooks)
            .await
            .unwrap());
        assert_eq!(hooks.validated.load(Ordering::SeqCst), 0);
        assert!(hooks.actions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_validation_reaches_action_without_stamp() {
        let thought = Thought::new(Stage::Remember, Arc::new(Middleware::new("remember")));
        let hooks = Recording {
            reject: true,
            ..Recording::default()
        };
        let mut s = state();

        assert!(!thought
            .process(&mut s, &mut BranchController::new(), &hooks)
            .await
            .unwrap());
        assert!(s.processed("remember").is_none());
        assert_eq!(*hooks.actions.lock().unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn interrupted_or_rejected_middleware_fails_stage() {
        let hooks = Recording::default();
        let interrupting = Middleware::new("hear");
        interrupting.register(piece_fn("stop", |_s: &mut State| Ok(Flow::done())));
        let thought = Thought::new(Stage::Hear, Arc::new(interrupting));
        assert!(!thought
            .process(&mut state(), &mut BranchController::new(), &hooks)
            .await
            .unwrap());

        let rejecting = Middleware::new("hear");
        rejecting.register(piece_fn("deny", |_s: &mut State| {
            Err(MiddlewareError::rejected("deny", "spam"))
        }));
        let thought = Thought::new(Stage::Hear, Arc::new(rejecting));
        assert!(!thought
            .process(&mut state(), &mut BranchController::new(), &hooks)
            .await
            .unwrap());
        assert_eq!(*hooks.actions.lock().unwrap(), vec![false, false]);
    }

    #[tokio::test]
    async fn fatal_middleware_error_propagates() {
        let failing = Middleware::new("hear");
        failing.register(piece_fn("boom", |_s: &mut State| {
            Err(MiddlewareError::failed("boom", "database unreachable"))
        }));
        let thought = Thought::new(Stage::Hear, Arc::new(failing));
        let err = thought
            .process(&mut state(), &mut BranchController::new(), &NoHooks)
            .await
            .unwrap_err();
        assert!(matches!(err, ThoughtError::Stage { ref stage, .. } if stage == "hear"));
    }

    #[tokio::test]
    async fn branch_stage_without_branches_fails_before_validate() {
        let thought = Thought::new(Stage::Listen, Arc::new(Middleware::new("listen")));
        let hooks = Recording::default();
        assert!(!thought
            .process(&mut state(), &mut BranchController::new(), &hooks)
            .await
            .unwrap());
        assert_eq!(hooks.validated.load(Ordering::SeqCst), 0);
        assert_eq!(*hooks.actions.lock().unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn branch_iteration_stops_once_done() {
        let second_ran = Arc::new(AtomicUsize::new(0));
        let mut branches = BranchController::new();
        branches.text(
            Pattern::regex("hello").unwrap(),
            complete_fn(|s: &mut State| {
                s.finish();
                Ok(())
            }),
        );
        let counter = Arc::clone(&second_ran);
        branches.add(
            Branch::text(
                Pattern::regex("there").unwrap(),
                complete_fn(move |_s: &mut State| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .forced(true),
            None,
        );

        let thought = Thought::new(Stage::Listen, Arc::new(Middleware::new("listen")));
        let mut s = state();
        assert!(thought.process(&mut s, &mut branches, &NoHooks).await.unwrap());
        assert_eq!(second_ran.load(Ordering::SeqCst), 0);
        assert!(s.processed("listen").is_some());
    }

    #[tokio::test]
    async fn done_state_skips_branch_stage() {
        let mut branches = BranchController::new();
        branches.catch_all(Noop);
        let thought = Thought::new(Stage::Act, Arc::new(Middleware::new("act")));
        let mut s = state();
        s.finish();
        assert!(!thought.process(&mut s, &mut branches, &NoHooks).await.unwrap());
        assert!(!s.matched());
    }
}

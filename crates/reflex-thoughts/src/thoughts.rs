use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reflex_adapters::Adapters;
use reflex_branches::{BranchController, Category};
use reflex_core::{NluResults, Settings, State};
use reflex_middleware::MiddlewareRegistry;
use tracing::{debug, error, instrument, warn};

use crate::error::Result;
use crate::memory::BotMemory;
use crate::stage::{Sequence, Stage};
use crate::thought::{StageHooks, Thought};

/// Collection persisted states are kept under.
pub const STATES_COLLECTION: &str = "states";

/// Stage rules connecting the pipeline to its collaborators.
pub struct Wiring {
    adapters: Adapters,
    settings: Settings,
    memory: Arc<BotMemory>,
}

impl Wiring {
    pub fn new(adapters: Adapters, settings: Settings, memory: Arc<BotMemory>) -> Self {
        Self {
            adapters,
            settings,
            memory,
        }
    }

    async fn understand(&self, state: &mut State) -> bool {
        let Some(nlu) = self.adapters.nlu.as_ref() else {
            debug!("no NLU adapter loaded");
            return false;
        };
        let Some(message) = state.message() else {
            return false;
        };
        let Some(text) = message.text_body() else {
            debug!(message = %message.id, "not a text message, NLU skipped");
            return false;
        };
        let trimmed = text.trim();
        let min_length = self.settings.nlu_min_length();
        if trimmed.is_empty() || trimmed.chars().count() < min_length {
            debug!(message = %message.id, min_length, "text too short for NLU");
            return false;
        }

        let results = match nlu.process(message).await {
            Ok(Some(raw)) => NluResults::from(raw),
            Ok(None) => {
                error!(adapter = nlu.name(), message = %message.id, "NLU adapter returned nothing");
                return false;
            }
            Err(e) => {
                error!(adapter = nlu.name(), message = %message.id, error = %e, "NLU processing failed");
                return false;
            }
        };
        if results.is_empty() {
            error!(adapter = nlu.name(), message = %message.id, "NLU adapter returned empty results");
            return false;
        }
        state.attach_nlu(results);
        true
    }

    fn respond(&self, state: &mut State) -> bool {
        if self.adapters.message.is_none() {
            debug!("no message adapter loaded");
            return false;
        }
        let branch_id = state.last_match().map(|m| m.branch_id.clone());
        let Some(envelope) = state.pending_envelope_mut() else {
            debug!("nothing to respond with");
            return false;
        };
        if branch_id.is_some() {
            envelope.branch_id = branch_id;
        }
        true
    }

    async fn dispatch_pending(&self, state: &mut State) {
        let Some(adapter) = self.adapters.message.as_ref() else {
            return;
        };
        for envelope in state.envelopes.iter_mut().filter(|e| e.is_pending()) {
            match adapter.dispatch(envelope).await {
                Ok(_) => {
                    envelope.responded = Some(Utc::now());
                    debug!(adapter = adapter.name(), envelope = %envelope.id, "envelope dispatched");
                }
                Err(e) => {
                    error!(adapter = adapter.name(), envelope = %envelope.id, error = %e, "dispatch failed");
                }
            }
        }
    }

    fn remember(&self, state: &State) -> bool {
        if state.sequence() == Some(Sequence::Respond.as_str()) || self.adapters.storage.is_none() {
            return false;
        }
        if state.matched() {
            if let Some(message) = state.message() {
                self.memory.remember_user(&message.user);
            }
        }
        true
    }

    async fn keep(&self, state: &State) {
        let Some(storage) = self.adapters.storage.as_ref() else {
            return;
        };
        let record = match state.to_record() {
            Ok(record) => record,
            Err(e) => {
                error!(state = %state.id, error = %e, "state could not be serialized");
                return;
            }
        };
        if let Err(e) = storage.keep(STATES_COLLECTION, &record).await {
            error!(adapter = storage.name(), state = %state.id, error = %e, "failed to keep state");
        }
    }
}

#[async_trait]
impl StageHooks for Wiring {
    async fn validate(
        &self,
        stage: Stage,
        state: &mut State,
        branches: &mut BranchController,
    ) -> Result<bool> {
        Ok(match stage {
            Stage::Understand => self.understand(state).await,
            Stage::Act if state.matched() => {
                let remaining = branches.forced(Category::Act);
                debug!(remaining, "matched already, only forced act branches remain");
                remaining > 0
            }
            Stage::Act => {
                state.wrap_catch_all();
                true
            }
            Stage::Respond => self.respond(state),
            Stage::Remember => self.remember(state),
            Stage::Hear | Stage::Listen | Stage::Serve => true,
        })
    }

    async fn action(
        &self,
        stage: Stage,
        state: &mut State,
        branches: &mut BranchController,
        success: bool,
    ) -> Result<()> {
        match (stage, success) {
            (Stage::Hear, false) => {
                debug!(state = %state.id, "hear failed, state finished");
                state.finish();
            }
            (Stage::Listen, true) => {
                let remaining = branches.forced(Category::Understand);
                debug!(remaining, "listen matched, only forced understand branches remain");
            }
            (Stage::Respond, true) => self.dispatch_pending(state).await,
            (Stage::Remember, true) => self.keep(state).await,
            _ => {}
        }
        Ok(())
    }
}

/// Runs sequences for one state against one branch set.
pub struct Thoughts {
    middleware: MiddlewareRegistry,
    wiring: Arc<Wiring>,
    branches: BranchController,
}

impl Thoughts {
    pub fn new(middleware: MiddlewareRegistry, wiring: Arc<Wiring>, branches: BranchController) -> Self {
        Self {
            middleware,
            wiring,
            branches,
        }
    }

    /// Branches left after the stages run so far have narrowed them.
    pub fn branches(&self) -> &BranchController {
        &self.branches
    }

    /// Stamp `sequence` on the state (first stamp wins) and process its
    /// stages strictly in order.
    #[instrument(skip_all, fields(state = %state.id, sequence = %sequence))]
    pub async fn start(&mut self, state: &mut State, sequence: Sequence) -> Result<()> {
        state.stamp_sequence(sequence.as_str());
        for &stage in sequence.stages() {
            let thought = Thought::new(stage, self.middleware.get(stage.as_str()));
            if let Err(e) = thought.process(state, &mut self.branches, self.wiring.as_ref()).await {
                warn!(stage = %stage, error = %e, "sequence aborted");
                return Err(e);
            }
        }
        Ok(())
    }
}

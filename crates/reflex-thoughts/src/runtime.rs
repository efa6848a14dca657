use std::sync::{Arc, RwLock, Weak};

use async_trait::async_trait;
use reflex_adapters::Adapters;
use reflex_branches::BranchController;
use reflex_core::{DialogueLink, Envelope, Message, Responder, Settings, State};
use reflex_dialogue::{Dialogue, DialogueController};
use reflex_middleware::MiddlewareRegistry;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::memory::BotMemory;
use crate::stage::Sequence;
use crate::thoughts::{Thoughts, Wiring};

/// Everything a sequence needs, wired once per bot.
///
/// Holds the global branch set, the per-stage middleware stacks, the
/// dialogue registry and the loaded adapters. States handled by a runtime
/// get the runtime as their [`Responder`], so a reaction's `respond` call
/// dispatches right away.
pub struct Runtime {
    settings: Settings,
    adapters: Adapters,
    middleware: MiddlewareRegistry,
    global: RwLock<BranchController>,
    dialogues: DialogueController,
    memory: Arc<BotMemory>,
    wiring: Arc<Wiring>,
    me: Weak<Runtime>,
}

impl Runtime {
    pub fn new(settings: Settings, adapters: Adapters) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Runtime>| {
            let dialogues = DialogueController::new(settings.clone());
            let responder: Weak<dyn Responder> = me.clone();
            dialogues.set_responder(responder);
            let memory = Arc::new(BotMemory::new());
            let wiring = Arc::new(Wiring::new(
                adapters.clone(),
                settings.clone(),
                Arc::clone(&memory),
            ));
            Self {
                global: RwLock::new(BranchController::with_settings(settings.clone())),
                settings,
                adapters,
                middleware: MiddlewareRegistry::new(),
                dialogues,
                memory,
                wiring,
                me: me.clone(),
            }
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn adapters(&self) -> &Adapters {
        &self.adapters
    }

    /// Per-stage middleware stacks, keyed by stage name.
    pub fn middleware(&self) -> &MiddlewareRegistry {
        &self.middleware
    }

    pub fn dialogues(&self) -> &DialogueController {
        &self.dialogues
    }

    pub fn memory(&self) -> &Arc<BotMemory> {
        &self.memory
    }

    /// Edit the global branch set.
    pub fn branches<R>(&self, f: impl FnOnce(&mut BranchController) -> R) -> R {
        let mut global = self.global.write().expect("global branches poisoned");
        f(&mut global)
    }

    /// Copy of the global branch set, for one run to narrow freely.
    pub fn global_branches(&self) -> BranchController {
        self.global.read().expect("global branches poisoned").clone()
    }

    /// Thoughts over an explicit branch set.
    pub fn thoughts(&self, branches: BranchController) -> Thoughts {
        Thoughts::new(self.middleware.clone(), Arc::clone(&self.wiring), branches)
    }

    /// Process an inbound chat message through `receive`.
    #[instrument(skip_all, fields(message = %message.id, user = %message.user.id))]
    pub async fn receive(&self, message: Message) -> Result<State> {
        let mut state = self.attach(State::new(message));
        self.inbound(&mut state, Sequence::Receive).await?;
        Ok(state)
    }

    /// Process an inbound server request through `serve`.
    #[instrument(skip_all, fields(message = %message.id, user = %message.user.id))]
    pub async fn serve(&self, message: Message) -> Result<State> {
        let mut state = self.attach(State::new(message));
        self.inbound(&mut state, Sequence::Serve).await?;
        Ok(state)
    }

    /// Run `respond` for a state whose reaction wrote an envelope.
    pub async fn respond(&self, state: &mut State) -> Result<()> {
        self.thoughts(BranchController::new())
            .start(state, Sequence::Respond)
            .await
    }

    /// Send envelopes that answer no inbound message.
    #[instrument(skip_all, fields(envelopes = envelopes.len()))]
    pub async fn dispatch(&self, envelopes: Vec<Envelope>) -> Result<State> {
        let mut state = State::outgoing(envelopes);
        self.dispatch_state(&mut state).await?;
        Ok(state)
    }

    async fn dispatch_state(&self, state: &mut State) -> Result<()> {
        self.thoughts(BranchController::new())
            .start(state, Sequence::Dispatch)
            .await
    }

    fn attach(&self, mut state: State) -> State {
        if let Some(me) = self.me.upgrade() {
            state.set_responder(me);
        }
        state
    }

    /// Inbound flows use the engaged dialogue's branches instead of the
    /// global set. The dialogue moves on to a fresh branch set for the next
    /// turn, and moves back if this turn matched nothing.
    async fn inbound(&self, state: &mut State, sequence: Sequence) -> Result<()> {
        let dialogue = self.dialogues.engaged(state);
        let branches = match &dialogue {
            Some(dialogue) => {
                link(state, dialogue);
                dialogue.progress_branches()
            }
            None => self.global_branches(),
        };

        let result = self.thoughts(branches).start(state, sequence).await;

        if let Some(dialogue) = dialogue {
            if !state.matched() {
                debug!(dialogue = %dialogue.id, "no match in dialogue, branches reverted");
                dialogue.revert_branches();
            }
        }
        result
    }
}

fn link(state: &mut State, dialogue: &Dialogue) {
    if let Some(audience_key) = dialogue.audience_key() {
        state.dialogue = Some(DialogueLink {
            id: dialogue.id.clone(),
            audience_key,
        });
    }
}

#[async_trait]
impl Responder for Runtime {
    async fn respond(&self, state: &mut State) -> reflex_core::Result<()> {
        Runtime::respond(self, state)
            .await
            .map_err(|e| e.into_core(Sequence::Respond.as_str()))
    }

    async fn dispatch(&self, state: &mut State) -> reflex_core::Result<()> {
        self.dispatch_state(state)
            .await
            .map_err(|e| e.into_core(Sequence::Dispatch.as_str()))
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("adapters", &self.adapters)
            .field("dialogues", &self.dialogues)
            .finish()
    }
}

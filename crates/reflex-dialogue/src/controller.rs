use std::sync::{Arc, RwLock, Weak};

use dashmap::DashMap;
use reflex_core::{Responder, Settings, State};
use tracing::{debug, warn};

use crate::dialogue::{Dialogue, DialogueHooks};
use crate::error::Result;
use crate::types::{AudienceKeys, DialogueOptions};

/// Audience key -> engaged dialogue, shared by a controller and every
/// dialogue it created.
pub(crate) struct Registry {
    pub(crate) engaged: DashMap<String, Arc<Dialogue>>,
    responder: RwLock<Option<Weak<dyn Responder>>>,
}

impl Registry {
    pub(crate) fn responder(&self) -> Option<Arc<dyn Responder>> {
        self.responder
            .read()
            .expect("dialogue responder poisoned")
            .as_ref()
            .and_then(Weak::upgrade)
    }
}

/// Creates dialogues and tracks which one is engaged for each audience.
///
/// Cheap to clone; clones share the same registry. At most one dialogue is
/// engaged per audience key.
#[derive(Clone)]
pub struct DialogueController {
    registry: Arc<Registry>,
    settings: Settings,
}

impl DialogueController {
    pub fn new(settings: Settings) -> Self {
        Self {
            registry: Arc::new(Registry {
                engaged: DashMap::new(),
                responder: RwLock::new(None),
            }),
            settings,
        }
    }

    /// Where default timeout notices are dispatched. Held weakly: the
    /// responder normally owns this controller.
    pub fn set_responder(&self, responder: Weak<dyn Responder>) {
        *self
            .registry
            .responder
            .write()
            .expect("dialogue responder poisoned") = Some(responder);
    }

    /// Options from the current `[dialogue]` config.
    pub fn default_options(&self) -> DialogueOptions {
        DialogueOptions::from_config(&self.settings.snapshot().dialogue)
    }

    /// A detached dialogue with the configured defaults.
    pub fn create(&self) -> Arc<Dialogue> {
        self.create_with(self.default_options(), None)
    }

    pub fn create_with(
        &self,
        options: DialogueOptions,
        hooks: Option<Arc<dyn DialogueHooks>>,
    ) -> Arc<Dialogue> {
        let dialogue = Dialogue::new(
            options,
            hooks,
            self.settings.clone(),
            Arc::downgrade(&self.registry),
        );
        debug!(dialogue = %dialogue.id, audience = %dialogue.audience(), "dialogue created");
        dialogue
    }

    /// The dialogue engaged for `state`'s audience. Direct engagement wins
    /// over user, user over room.
    pub fn engaged(&self, state: &State) -> Option<Arc<Dialogue>> {
        let keys = AudienceKeys::from_message(state.message()?);
        let engaged = keys
            .in_precedence()
            .find_map(|key| self.registry.engaged.get(key).map(|d| Arc::clone(d.value())));
        engaged
    }

    /// Open `dialogue` for `state`'s audience.
    pub async fn engage(&self, state: &mut State, dialogue: &Arc<Dialogue>) -> Result<()> {
        dialogue.open(state).await
    }

    /// Close whatever dialogue is engaged for `state`. Returns whether one was.
    pub async fn disengage(&self, state: &State) -> Result<bool> {
        match self.engaged(state) {
            Some(dialogue) => {
                dialogue.close().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn len(&self) -> usize {
        self.registry.engaged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.engaged.is_empty()
    }

    /// Close every engaged dialogue, e.g. on shutdown. Hook errors are
    /// logged and the rest still close.
    pub async fn close_all(&self) {
        let open: Vec<Arc<Dialogue>> = self
            .registry
            .engaged
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for dialogue in open {
            if let Err(e) = dialogue.close().await {
                warn!(dialogue = %dialogue.id, error = %e, "error while closing dialogue");
            }
        }
    }
}

impl std::fmt::Debug for DialogueController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogueController")
            .field("engaged", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use reflex_core::{Envelope, Message, Room, User};
    use reflex_middleware::Noop;
    use tokio::time::{sleep, Duration};

    use super::*;
    use crate::types::Audience;

    fn state_from(user: &str, room: &str) -> State {
        State::new(Message::text(
            User::new(user, user).in_room(Room::new(room)),
            "hi",
        ))
    }

    fn controller() -> DialogueController {
        DialogueController::new(Settings::default())
    }

    #[derive(Default)]
    struct Counting {
        opened: AtomicUsize,
        closed: AtomicUsize,
        timeouts: AtomicUsize,
    }

    #[async_trait]
    impl DialogueHooks for Counting {
        async fn on_open(&self, _d: &Dialogue) -> Result<()> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_close(&self, _d: &Dialogue) -> Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_timeout(&self, _d: &Dialogue) -> Result<()> {
            self.timeouts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn counted(controller: &DialogueController, timeout_ms: u64) -> (Arc<Dialogue>, Arc<Counting>) {
        let hooks = Arc::new(Counting::default());
        let options = controller.default_options().with_timeout(timeout_ms);
        let dialogue = controller.create_with(options, Some(hooks.clone() as Arc<dyn DialogueHooks>));
        (dialogue, hooks)
    }

    #[tokio::test]
    async fn engaged_resolves_by_audience_key() {
        let dialogues = controller();
        let mut state = state_from("u1", "r1");
        let dialogue = dialogues.create();
        dialogues.engage(&mut state, &dialogue).await.unwrap();

        assert_eq!(state.dialogue.as_ref().unwrap().audience_key, "u1_r1");
        assert_eq!(dialogues.engaged(&state_from("u1", "r1")).unwrap().id, dialogue.id);
        assert!(dialogues.engaged(&state_from("u1", "r2")).is_none());
        assert!(dialogues.engaged(&state_from("u2", "r1")).is_none());

        assert!(dialogues.disengage(&state).await.unwrap());
        assert!(dialogues.is_empty());
        assert!(!dialogue.is_open());
    }

    #[tokio::test]
    async fn direct_takes_precedence_over_user_and_room() {
        let dialogues = controller();
        let room = dialogues.create_with(
            dialogues.default_options().with_audience(Audience::Room),
            None,
        );
        let user = dialogues.create_with(
            dialogues.default_options().with_audience(Audience::User),
            None,
        );
        let direct = dialogues.create();
        dialogues.engage(&mut state_from("u1", "r1"), &room).await.unwrap();
        assert_eq!(dialogues.engaged(&state_from("u2", "r1")).unwrap().id, room.id);

        dialogues.engage(&mut state_from("u1", "r1"), &user).await.unwrap();
        assert_eq!(dialogues.engaged(&state_from("u1", "r9")).unwrap().id, user.id);
        assert_eq!(dialogues.engaged(&state_from("u1", "r1")).unwrap().id, user.id);

        dialogues.engage(&mut state_from("u1", "r1"), &direct).await.unwrap();
        assert_eq!(dialogues.engaged(&state_from("u1", "r1")).unwrap().id, direct.id);
        assert_eq!(dialogues.len(), 3);
    }

    #[tokio::test]
    async fn second_dialogue_replaces_first_for_same_key() {
        let dialogues = controller();
        let (first, first_hooks) = counted(&dialogues, 1_000);
        let (second, _) = counted(&dialogues, 1_000);

        dialogues.engage(&mut state_from("u1", "r1"), &first).await.unwrap();
        assert!(first.clock_running());
        dialogues.engage(&mut state_from("u1", "r1"), &second).await.unwrap();

        assert_eq!(first_hooks.opened.load(Ordering::SeqCst), 1);
        assert_eq!(first_hooks.closed.load(Ordering::SeqCst), 1);
        assert!(!first.is_open());
        assert!(!first.clock_running());
        assert_eq!(dialogues.len(), 1);
        assert_eq!(dialogues.engaged(&state_from("u1", "r1")).unwrap().id, second.id);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fires_once_then_closes() {
        let dialogues = controller();
        let (dialogue, hooks) = counted(&dialogues, 100);
        dialogues.engage(&mut state_from("u1", "r1"), &dialogue).await.unwrap();

        sleep(Duration::from_millis(99)).await;
        assert_eq!(hooks.timeouts.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(hooks.timeouts.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.closed.load(Ordering::SeqCst), 1);
        assert!(dialogues.is_empty());

        sleep(Duration::from_millis(500)).await;
        assert_eq!(hooks.timeouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_the_clock_postpones_expiry() {
        let dialogues = controller();
        let (dialogue, hooks) = counted(&dialogues, 100);
        dialogues.engage(&mut state_from("u1", "r1"), &dialogue).await.unwrap();

        sleep(Duration::from_millis(60)).await;
        dialogue.start_clock(None);
        sleep(Duration::from_millis(60)).await;
        assert_eq!(hooks.timeouts.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(50)).await;
        tokio::task::yield_now().await;
        assert_eq!(hooks.timeouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_never_expires() {
        let dialogues = controller();
        let (dialogue, hooks) = counted(&dialogues, 0);
        dialogues.engage(&mut state_from("u1", "r1"), &dialogue).await.unwrap();
        assert!(!dialogue.clock_running());

        sleep(Duration::from_secs(3_600)).await;
        assert_eq!(hooks.timeouts.load(Ordering::SeqCst), 0);
        assert!(dialogue.is_open());
    }

    struct Recorder(Mutex<Vec<Envelope>>);

    #[async_trait]
    impl Responder for Recorder {
        async fn respond(&self, state: &mut State) -> reflex_core::Result<()> {
            self.0.lock().unwrap().extend(state.envelopes.drain(..));
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn default_timeout_dispatches_text_to_audience() {
        let dialogues = controller();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let weak: Weak<Recorder> = Arc::downgrade(&recorder);
        dialogues.set_responder(weak);

        let dialogue = dialogues.create_with(
            dialogues
                .default_options()
                .with_timeout(50)
                .with_timeout_text("Too slow!"),
            None,
        );
        dialogues.engage(&mut state_from("u1", "r1"), &dialogue).await.unwrap();

        sleep(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;
        let sent = recorder.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].strings, vec!["Too slow!"]);
        assert_eq!(sent[0].user.as_ref().unwrap().id, "u1");
        assert!(!dialogue.is_open());
    }

    #[tokio::test]
    async fn branch_history_progresses_and_reverts() {
        let dialogues = controller();
        let dialogue = dialogues.create();
        dialogue.branches(|b| b.catch_all(Noop));

        let current = dialogue.progress_branches();
        assert_eq!(current.len(), 1);
        assert_eq!(dialogue.depth(), 2);
        assert!(dialogue.branches(|b| b.is_empty()));

        let restored = dialogue.revert_branches().unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(dialogue.depth(), 1);
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use reflex_branches::BranchController;
use reflex_core::{DialogueLink, Envelope, Settings, State, User};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::controller::Registry;
use crate::error::{DialogueError, Result};
use crate::types::{Audience, AudienceKeys, DialogueOptions};

/// Callbacks around a dialogue's lifecycle.
///
/// Errors from `on_open`/`on_close` are logged and returned to whoever
/// opened or closed the dialogue. `on_timeout` runs on the timer task, so
/// its errors are only logged.
#[async_trait]
pub trait DialogueHooks: Send + Sync {
    async fn on_open(&self, _dialogue: &Dialogue) -> Result<()> {
        Ok(())
    }

    async fn on_close(&self, _dialogue: &Dialogue) -> Result<()> {
        Ok(())
    }

    /// Runs when the inactivity timer expires, before the dialogue closes.
    async fn on_timeout(&self, dialogue: &Dialogue) -> Result<()> {
        dialogue.dispatch_timeout().await
    }
}

struct Clock {
    generation: u64,
    task: JoinHandle<()>,
}

/// A timeout-bound branch scope for one audience.
///
/// While open, states from the dialogue's audience are matched against the
/// dialogue's branches instead of the global ones. Created through a
/// [`DialogueController`](crate::DialogueController).
pub struct Dialogue {
    pub id: String,
    options: DialogueOptions,
    hooks: Option<Arc<dyn DialogueHooks>>,
    settings: Settings,
    registry: Weak<Registry>,
    me: Weak<Dialogue>,
    /// Registry key while open.
    key: Mutex<Option<String>>,
    /// Author of the message that opened the dialogue; timeout notices go here.
    target: Mutex<Option<User>>,
    history: Mutex<Vec<BranchController>>,
    clock: Mutex<Option<Clock>>,
    generation: AtomicU64,
}

impl Dialogue {
    pub(crate) fn new(
        options: DialogueOptions,
        hooks: Option<Arc<dyn DialogueHooks>>,
        settings: Settings,
        registry: Weak<Registry>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            id: Uuid::now_v7().to_string(),
            options,
            hooks,
            settings,
            registry,
            me: me.clone(),
            key: Mutex::new(None),
            target: Mutex::new(None),
            history: Mutex::new(Vec::new()),
            clock: Mutex::new(None),
            generation: AtomicU64::new(0),
        })
    }

    pub fn options(&self) -> &DialogueOptions {
        &self.options
    }

    pub fn audience(&self) -> Audience {
        self.options.audience
    }

    /// Registry key this dialogue is engaged under, if open.
    pub fn audience_key(&self) -> Option<String> {
        self.key.lock().expect("dialogue key poisoned").clone()
    }

    pub fn is_open(&self) -> bool {
        self.audience_key().is_some()
    }

    /// Whether an expiry timer is pending.
    pub fn clock_running(&self) -> bool {
        self.clock.lock().expect("dialogue clock poisoned").is_some()
    }

    /// Engage this dialogue for the audience of `state`'s message.
    ///
    /// A different dialogue already engaged under the same key is closed
    /// first; the last one opened wins.
    pub async fn open(&self, state: &mut State) -> Result<()> {
        let message = state
            .message()
            .ok_or_else(|| DialogueError::NoMessage(state.id.clone()))?;
        let keys = AudienceKeys::from_message(message);
        let key = keys
            .key(self.options.audience)
            .ok_or_else(|| DialogueError::NoAudienceKey {
                audience: self.options.audience.to_string(),
            })?
            .to_string();
        let target = message.user.clone();

        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| DialogueError::Detached(self.id.clone()))?;
        let me = self
            .me
            .upgrade()
            .ok_or_else(|| DialogueError::Detached(self.id.clone()))?;

        let previous = registry.engaged.get(&key).map(|d| Arc::clone(d.value()));
        if let Some(previous) = previous.filter(|d| d.id != self.id) {
            debug!(dialogue = %previous.id, key = %key, "replacing engaged dialogue");
            previous.close().await?;
        }

        let stale = self.key.lock().expect("dialogue key poisoned").replace(key.clone());
        if let Some(stale) = stale.filter(|k| *k != key) {
            registry.engaged.remove_if(&stale, |_, d| d.id == self.id);
        }
        registry.engaged.insert(key.clone(), me);
        *self.target.lock().expect("dialogue target poisoned") = Some(target);
        state.dialogue = Some(DialogueLink {
            id: self.id.clone(),
            audience_key: key.clone(),
        });
        info!(dialogue = %self.id, key = %key, audience = %self.options.audience, "dialogue opened");

        if let Some(hooks) = &self.hooks {
            hooks.on_open(self).await.inspect_err(|e| {
                error!(dialogue = %self.id, error = %e, "dialogue open hook failed");
            })?;
        }
        self.start_clock(None);
        Ok(())
    }

    /// Disengage and stop the timer. Closing a dialogue that is not open
    /// only stops the timer.
    pub async fn close(&self) -> Result<()> {
        self.stop_clock();
        let key = self.key.lock().expect("dialogue key poisoned").take();
        let Some(key) = key else {
            return Ok(());
        };
        if let Some(registry) = self.registry.upgrade() {
            registry.engaged.remove_if(&key, |_, d| d.id == self.id);
        }
        info!(dialogue = %self.id, key = %key, "dialogue closed");

        if let Some(hooks) = &self.hooks {
            hooks.on_close(self).await.inspect_err(|e| {
                error!(dialogue = %self.id, error = %e, "dialogue close hook failed");
            })?;
        }
        Ok(())
    }

    /// (Re)start the inactivity countdown. Any pending countdown is
    /// cancelled first. `None` uses the configured timeout; 0 never expires.
    pub fn start_clock(&self, timeout_ms: Option<u64>) {
        let mut clock = self.clock.lock().expect("dialogue clock poisoned");
        if let Some(old) = clock.take() {
            old.task.abort();
        }
        let ms = timeout_ms.unwrap_or(self.options.timeout_ms);
        if ms == 0 {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            warn!(dialogue = %self.id, "no tokio runtime, dialogue will not time out");
            return;
        };
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let me = self.me.clone();
        let task = handle.spawn(async move {
            sleep(Duration::from_millis(ms)).await;
            if let Some(dialogue) = me.upgrade() {
                dialogue.expire(generation).await;
            }
        });
        *clock = Some(Clock { generation, task });
        debug!(dialogue = %self.id, timeout_ms = ms, "dialogue clock started");
    }

    pub fn stop_clock(&self) {
        if let Some(old) = self.clock.lock().expect("dialogue clock poisoned").take() {
            old.task.abort();
        }
    }

    async fn expire(&self, generation: u64) {
        {
            let mut clock = self.clock.lock().expect("dialogue clock poisoned");
            if clock.as_ref().map(|c| c.generation) != Some(generation) {
                return;
            }
            // Detach our own handle so `close` does not abort this task.
            clock.take();
        }
        info!(dialogue = %self.id, "dialogue timed out");

        let result = match &self.hooks {
            Some(hooks) => hooks.on_timeout(self).await,
            None => self.dispatch_timeout().await,
        };
        if let Err(e) = result {
            error!(dialogue = %self.id, error = %e, "dialogue timeout hook failed");
        }
        if let Err(e) = self.close().await {
            error!(dialogue = %self.id, error = %e, "failed to close timed out dialogue");
        }
    }

    /// Send the configured timeout text to the dialogue's audience through
    /// the controller's responder.
    pub async fn dispatch_timeout(&self) -> Result<()> {
        let target = self.target.lock().expect("dialogue target poisoned").clone();
        let Some(user) = target else {
            warn!(dialogue = %self.id, "dialogue never opened, no one to notify");
            return Ok(());
        };
        let responder = self.registry.upgrade().and_then(|r| r.responder());
        let Some(responder) = responder else {
            warn!(dialogue = %self.id, "no responder, timeout text dropped");
            return Ok(());
        };

        let method = self.options.timeout_method;
        let mut envelope = match self.options.audience {
            Audience::Room => Envelope::to_room(user.room.clone(), method),
            Audience::Direct | Audience::User => Envelope::to_user(&user, method),
        };
        envelope.write([self.options.timeout_text.clone()]);
        let mut state = State::outgoing(vec![envelope]);
        responder.dispatch(&mut state).await?;
        Ok(())
    }

    /// Work on the current branch set, creating it on first use. Counts as
    /// activity: the countdown restarts.
    pub fn branches<R>(&self, f: impl FnOnce(&mut BranchController) -> R) -> R {
        let out = {
            let mut history = self.history.lock().expect("dialogue history poisoned");
            match history.last_mut() {
                Some(top) => f(top),
                None => {
                    let mut top = BranchController::with_settings(self.settings.clone());
                    let out = f(&mut top);
                    history.push(top);
                    out
                }
            }
        };
        if self.is_open() {
            self.start_clock(None);
        }
        out
    }

    /// Push a fresh, empty branch set and return the previous one, which
    /// holds the branches offered for the current turn.
    pub fn progress_branches(&self) -> BranchController {
        let previous = {
            let mut history = self.history.lock().expect("dialogue history poisoned");
            let previous = history
                .last()
                .cloned()
                .unwrap_or_else(|| BranchController::with_settings(self.settings.clone()));
            history.push(BranchController::with_settings(self.settings.clone()));
            previous
        };
        if self.is_open() {
            self.start_clock(None);
        }
        previous
    }

    /// Drop the top branch set, returning to the prior one (also returned).
    pub fn revert_branches(&self) -> Option<BranchController> {
        let mut history = self.history.lock().expect("dialogue history poisoned");
        history.pop();
        history.last().cloned()
    }

    /// Number of branch sets on the history stack.
    pub fn depth(&self) -> usize {
        self.history.lock().expect("dialogue history poisoned").len()
    }
}

impl Drop for Dialogue {
    fn drop(&mut self) {
        if let Ok(mut clock) = self.clock.lock() {
            if let Some(c) = clock.take() {
                c.task.abort();
            }
        }
    }
}

impl std::fmt::Debug for Dialogue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialogue")
            .field("id", &self.id)
            .field("audience", &self.options.audience)
            .field("key", &self.audience_key())
            .field("timeout_ms", &self.options.timeout_ms)
            .field("depth", &self.depth())
            .finish()
    }
}

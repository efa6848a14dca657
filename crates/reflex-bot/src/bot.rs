use std::sync::Arc;

use reflex_adapters::{Adapters, MemoryStorage, MessageAdapter, NluAdapter, SqliteStorage, StorageAdapter};
use reflex_core::{ReflexConfig, Settings};
use reflex_thoughts::{Result, Runtime};
use tracing::{info, warn};

/// A configured bot: the runtime plus the lifecycle of its adapters and
/// memory.
pub struct Bot {
    runtime: Arc<Runtime>,
}

impl Bot {
    pub fn new(settings: Settings, adapters: Adapters) -> Self {
        Self {
            runtime: Runtime::new(settings, adapters),
        }
    }

    /// Wire a bot from config. Storage is SQLite when `storage.path` is set,
    /// in-memory otherwise.
    pub fn from_config(
        config: ReflexConfig,
        message: Arc<dyn MessageAdapter>,
        nlu: Option<Arc<dyn NluAdapter>>,
    ) -> Result<Self> {
        let storage: Arc<dyn StorageAdapter> = match config.storage.path.as_deref() {
            Some(path) => {
                ensure_parent_dir(path);
                Arc::new(SqliteStorage::open(path)?)
            }
            None => Arc::new(MemoryStorage::new()),
        };
        let mut adapters = Adapters::new().with_message(message).with_storage(storage);
        if let Some(nlu) = nlu {
            adapters = adapters.with_nlu(nlu);
        }
        Ok(Self::new(Settings::new(config), adapters))
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Start every adapter, then restore saved memory.
    pub async fn start(&self) -> Result<()> {
        let config = self.runtime.settings().snapshot();
        self.runtime.adapters().start_all(&config.adapters).await?;
        if let Some(storage) = &self.runtime.adapters().storage {
            self.runtime.memory().load(storage.as_ref()).await?;
        }
        info!(name = %config.bot.name, "bot started");
        Ok(())
    }

    /// Close open dialogues, save memory and stop the adapters. Nothing here
    /// stops the rest from running.
    pub async fn shutdown(&self) {
        self.runtime.dialogues().close_all().await;
        if let Some(storage) = &self.runtime.adapters().storage {
            if let Err(e) = self.runtime.memory().save(storage.as_ref()).await {
                warn!(error = %e, "failed to save memory on shutdown");
            }
        }
        self.runtime.adapters().shutdown_all().await;
        info!("bot stopped");
    }
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}

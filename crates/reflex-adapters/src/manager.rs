use std::sync::Arc;

use reflex_core::config::AdaptersConfig;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::adapter::{Adapter, MessageAdapter, NluAdapter, StorageAdapter};
use crate::error::{AdapterError, Result};

/// Longest delay between start attempts.
const BACKOFF_MAX_MS: u64 = 30_000;
/// Jitter fraction applied to each delay (up to +10 %).
const JITTER_FRACTION: f64 = 0.10;

/// The collaborators loaded for a bot. Any slot may be empty; the stages
/// that need a missing collaborator simply skip.
#[derive(Clone, Default)]
pub struct Adapters {
    pub message: Option<Arc<dyn MessageAdapter>>,
    pub nlu: Option<Arc<dyn NluAdapter>>,
    pub storage: Option<Arc<dyn StorageAdapter>>,
}

impl Adapters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, adapter: Arc<dyn MessageAdapter>) -> Self {
        info!(adapter = adapter.name(), "loading message adapter");
        self.message = Some(adapter);
        self
    }

    pub fn with_nlu(mut self, adapter: Arc<dyn NluAdapter>) -> Self {
        info!(adapter = adapter.name(), "loading NLU adapter");
        self.nlu = Some(adapter);
        self
    }

    pub fn with_storage(mut self, adapter: Arc<dyn StorageAdapter>) -> Self {
        info!(adapter = adapter.name(), "loading storage adapter");
        self.storage = Some(adapter);
        self
    }

    /// Start every loaded adapter, retrying each with exponential backoff.
    ///
    /// Order is storage, NLU, then message, so the platform only starts
    /// delivering once the rest is ready. Stops at the first adapter that
    /// still fails after `config.start_attempts` tries.
    pub async fn start_all(&self, config: &AdaptersConfig) -> Result<()> {
        if let Some(a) = &self.storage {
            start_one("storage", a.as_ref(), config).await?;
        }
        if let Some(a) = &self.nlu {
            start_one("nlu", a.as_ref(), config).await?;
        }
        if let Some(a) = &self.message {
            start_one("message", a.as_ref(), config).await?;
        }
        Ok(())
    }

    /// Shut down every loaded adapter in reverse start order.
    ///
    /// Errors are logged but do not stop the remaining shutdowns.
    pub async fn shutdown_all(&self) {
        if let Some(a) = &self.message {
            shutdown_one("message", a.as_ref()).await;
        }
        if let Some(a) = &self.nlu {
            shutdown_one("nlu", a.as_ref()).await;
        }
        if let Some(a) = &self.storage {
            shutdown_one("storage", a.as_ref()).await;
        }
    }
}

async fn start_one<A: Adapter + ?Sized>(
    role: &'static str,
    adapter: &A,
    config: &AdaptersConfig,
) -> Result<()> {
    info!(role, adapter = adapter.name(), "starting adapter");
    start_with_backoff(adapter, config).await.map_err(|e| {
        error!(role, adapter = adapter.name(), error = %e, "failed to start adapter after retries");
        AdapterError::StartFailed {
            adapter: adapter.name().to_string(),
            reason: e.to_string(),
        }
    })
}

async fn shutdown_one<A: Adapter + ?Sized>(role: &'static str, adapter: &A) {
    info!(role, adapter = adapter.name(), "shutting down adapter");
    if let Err(e) = adapter.shutdown().await {
        warn!(role, adapter = adapter.name(), error = %e, "error while shutting down adapter");
    }
}

impl std::fmt::Debug for Adapters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapters")
            .field("message", &self.message.as_ref().map(|a| a.name().to_string()))
            .field("nlu", &self.nlu.as_ref().map(|a| a.name().to_string()))
            .field("storage", &self.storage.as_ref().map(|a| a.name().to_string()))
            .finish()
    }
}

/// Schedule: `backoff_ms`, doubled per attempt, capped at [`BACKOFF_MAX_MS`].
async fn start_with_backoff<A: Adapter + ?Sized>(adapter: &A, config: &AdaptersConfig) -> Result<()> {
    let attempts = config.start_attempts.max(1);
    let mut delay_ms = config.backoff_ms;

    for attempt in 1..=attempts {
        match adapter.start().await {
            Ok(()) => {
                info!(adapter = adapter.name(), attempt, "adapter started");
                return Ok(());
            }
            Err(e) if attempt == attempts => return Err(e),
            Err(e) => {
                let total = delay_ms + jitter_ms(delay_ms);
                warn!(
                    adapter = adapter.name(),
                    attempt,
                    max = attempts,
                    error = %e,
                    retry_after_ms = total,
                    "adapter start failed, retrying with backoff"
                );
                sleep(Duration::from_millis(total)).await;
                delay_ms = (delay_ms * 2).min(BACKOFF_MAX_MS);
            }
        }
    }

    unreachable!("backoff loop exited without returning")
}

/// Pseudo-random jitter in `0 .. JITTER_FRACTION * base_ms`, taken from the
/// clock's sub-second nanos.
fn jitter_ms(base_ms: u64) -> u64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);

    let max_jitter = ((base_ms as f64) * JITTER_FRACTION) as u64;
    if max_jitter == 0 {
        return 0;
    }
    (nanos as u64) % max_jitter
}

use std::sync::{Arc, RwLock};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{ReflexError, Result};
use crate::path;

pub const DEFAULT_BOT_NAME: &str = "bot";
pub const DEFAULT_NLU_MIN_LENGTH: usize = 10;
pub const DEFAULT_DIALOGUE_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_DIALOGUE_TIMEOUT_TEXT: &str = "Timed out! Please start again.";

/// Top-level config (reflex.toml + REFLEX_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReflexConfig {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub nlu: NluConfig,
    #[serde(default)]
    pub dialogue: DialogueConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub adapters: AdaptersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Name the bot answers to in direct addressing ("bot hello").
    #[serde(default = "default_bot_name")]
    pub name: String,
    /// Optional second name, e.g. a short handle or "!".
    #[serde(default)]
    pub alias: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            alias: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NluConfig {
    /// Trimmed text shorter than this never reaches the NLU adapter.
    #[serde(default = "default_nlu_min_length")]
    pub min_length: usize,
}

impl Default for NluConfig {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_NLU_MIN_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueConfig {
    /// Inactivity window before a dialogue expires. 0 disables expiry.
    #[serde(default = "default_dialogue_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_dialogue_timeout_text")]
    pub timeout_text: String,
    /// Envelope method used when dispatching the timeout text.
    #[serde(default = "default_timeout_method")]
    pub timeout_method: String,
    /// Default audience mode: "direct", "user" or "room".
    #[serde(default = "default_audience")]
    pub audience: String,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_DIALOGUE_TIMEOUT_MS,
            timeout_text: default_dialogue_timeout_text(),
            timeout_method: default_timeout_method(),
            audience: default_audience(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file for the bundled storage adapter. In-memory storage when unset.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptersConfig {
    /// How many times each adapter's `start()` is tried before giving up.
    #[serde(default = "default_start_attempts")]
    pub start_attempts: u32,
    /// First retry delay; doubles per attempt.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for AdaptersConfig {
    fn default() -> Self {
        Self {
            start_attempts: default_start_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_bot_name() -> String {
    DEFAULT_BOT_NAME.to_string()
}
fn default_nlu_min_length() -> usize {
    DEFAULT_NLU_MIN_LENGTH
}
fn default_dialogue_timeout_ms() -> u64 {
    DEFAULT_DIALOGUE_TIMEOUT_MS
}
fn default_dialogue_timeout_text() -> String {
    DEFAULT_DIALOGUE_TIMEOUT_TEXT.to_string()
}
fn default_timeout_method() -> String {
    "send".to_string()
}
fn default_audience() -> String {
    "direct".to_string()
}
fn default_start_attempts() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    500
}

impl ReflexConfig {
    /// Load config from a TOML file with REFLEX_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.reflex/reflex.toml
    ///
    /// Nested keys use a double underscore: `REFLEX_NLU__MIN_LENGTH=4`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Figment::from(Serialized::defaults(ReflexConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("REFLEX_").split("__"))
            .extract()
            .map_err(|e| ReflexError::Config(e.to_string()))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.reflex/reflex.toml", home)
}

/// Shared, live view of the configuration.
///
/// Clones share the same underlying config, so a `set` made by one
/// component is visible to every other holder on its next `get`.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    inner: Arc<RwLock<ReflexConfig>>,
}

impl Settings {
    pub fn new(config: ReflexConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Typed copy of the current config.
    pub fn snapshot(&self) -> ReflexConfig {
        self.inner.read().expect("settings poisoned").clone()
    }

    /// Read a single setting by dotted key, e.g. `"nlu.min_length"`.
    pub fn get(&self, key: &str) -> Option<Value> {
        let tree = serde_json::to_value(self.snapshot()).ok()?;
        path::lookup(&tree, key).cloned()
    }

    /// Replace a single setting by dotted key.
    ///
    /// The key must name an existing field and the value must deserialize
    /// into that field's type; otherwise the config is left untouched.
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut guard = self.inner.write().expect("settings poisoned");
        let mut tree = serde_json::to_value(&*guard)?;
        let slot = path::lookup_mut(&mut tree, key).ok_or_else(|| ReflexError::UnknownSetting {
            key: key.to_string(),
        })?;
        *slot = value;
        let updated: ReflexConfig =
            serde_json::from_value(tree).map_err(|e| ReflexError::Config(format!("{key}: {e}")))?;
        *guard = updated;
        debug!(key, "setting updated");
        Ok(())
    }

    pub fn bot_name(&self) -> String {
        self.inner.read().expect("settings poisoned").bot.name.clone()
    }

    pub fn bot_alias(&self) -> Option<String> {
        self.inner.read().expect("settings poisoned").bot.alias.clone()
    }

    pub fn nlu_min_length(&self) -> usize {
        self.inner.read().expect("settings poisoned").nlu.min_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_are_sane() {
        let config = ReflexConfig::default();
        assert_eq!(config.bot.name, "bot");
        assert_eq!(config.nlu.min_length, 10);
        assert_eq!(config.dialogue.timeout_ms, 30_000);
        assert_eq!(config.dialogue.audience, "direct");
    }

    #[test]
    fn get_and_set_by_dotted_key() {
        let settings = Settings::default();
        assert_eq!(settings.get("bot.name"), Some(json!("bot")));

        settings.set("bot.alias", json!("b")).unwrap();
        assert_eq!(settings.bot_alias().as_deref(), Some("b"));

        let clone = settings.clone();
        clone.set("nlu.min_length", json!(3)).unwrap();
        assert_eq!(settings.nlu_min_length(), 3);
    }

    #[test]
    fn set_rejects_unknown_keys_and_bad_types() {
        let settings = Settings::default();
        assert!(matches!(
            settings.set("bot.nickname", json!("x")),
            Err(ReflexError::UnknownSetting { .. })
        ));
        assert!(settings.set("nlu.min_length", json!("many")).is_err());
        assert_eq!(settings.nlu_min_length(), 10);
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let config = ReflexConfig::load(Some("/nonexistent/reflex.toml")).unwrap();
        assert_eq!(config.bot.name, "bot");
    }
}

use std::fmt;
use std::str::FromStr;

use reflex_core::config::DialogueConfig;
use reflex_core::{Message, Method};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Who a dialogue listens to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    /// This user, in this room.
    #[default]
    Direct,
    /// This user, in any room.
    User,
    /// Anyone in this room.
    Room,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Direct => "direct",
            Audience::User => "user",
            Audience::Room => "room",
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Audience {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(Audience::Direct),
            "user" => Ok(Audience::User),
            "room" => Ok(Audience::Room),
            other => Err(format!("unknown dialogue audience: {other}")),
        }
    }
}

/// The three registry keys a message can be engaged under.
///
/// Format: direct = `{user_id}_{room_id}`, user = `{user_id}`,
/// room = `{room_id}`. Messages from outside any room have no room or
/// direct key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudienceKeys {
    pub direct: Option<String>,
    pub user: String,
    pub room: Option<String>,
}

impl AudienceKeys {
    pub fn from_message(message: &Message) -> Self {
        let user = &message.user;
        let room = (!user.room.id.is_empty()).then(|| user.room.id.clone());
        Self {
            direct: room.as_ref().map(|room| format!("{}_{}", user.id, room)),
            user: user.id.clone(),
            room,
        }
    }

    pub fn key(&self, audience: Audience) -> Option<&str> {
        match audience {
            Audience::Direct => self.direct.as_deref(),
            Audience::User => Some(&self.user),
            Audience::Room => self.room.as_deref(),
        }
    }

    /// Keys in engagement precedence: direct, then user, then room.
    pub fn in_precedence(&self) -> impl Iterator<Item = &str> {
        [Audience::Direct, Audience::User, Audience::Room]
            .into_iter()
            .filter_map(move |audience| self.key(audience))
    }
}

/// Per-dialogue settings. Defaults come from the `[dialogue]` config section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueOptions {
    /// Inactivity window in ms; 0 never expires.
    pub timeout_ms: u64,
    pub timeout_text: String,
    pub timeout_method: Method,
    pub audience: Audience,
}

impl DialogueOptions {
    pub fn from_config(config: &DialogueConfig) -> Self {
        let timeout_method = config.timeout_method.parse().unwrap_or_else(|e| {
            warn!(error = %e, "invalid dialogue.timeout_method, using send");
            Method::Send
        });
        let audience = config.audience.parse().unwrap_or_else(|e| {
            warn!(error = %e, "invalid dialogue.audience, using direct");
            Audience::Direct
        });
        Self {
            timeout_ms: config.timeout_ms,
            timeout_text: config.timeout_text.clone(),
            timeout_method,
            audience,
        }
    }

    pub fn with_audience(mut self, audience: Audience) -> Self {
        self.audience = audience;
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_timeout_text(mut self, text: impl Into<String>) -> Self {
        self.timeout_text = text.into();
        self
    }
}

impl Default for DialogueOptions {
    fn default() -> Self {
        Self::from_config(&DialogueConfig::default())
    }
}

use std::collections::BTreeMap;

use dashmap::DashMap;
use reflex_adapters::StorageAdapter;
use reflex_core::{ReflexError, User};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::Result;

/// Persisted form of [`BotMemory`], as handed to `save_memory`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    #[serde(default)]
    pub users: BTreeMap<String, User>,
    #[serde(default)]
    pub private: BTreeMap<String, Value>,
}

/// What the bot remembers across restarts: every user it has matched a
/// message from, and a private key/value store for reactions.
#[derive(Debug, Default)]
pub struct BotMemory {
    users: DashMap<String, User>,
    private: DashMap<String, Value>,
}

impl BotMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or refresh) a user, keyed by id. The latest room wins.
    pub fn remember_user(&self, user: &User) {
        self.users.insert(user.id.clone(), user.clone());
    }

    pub fn user(&self, id: &str) -> Option<User> {
        self.users.get(id).map(|u| u.value().clone())
    }

    /// Users whose name matches `name`, ignoring case.
    pub fn users_named(&self, name: &str) -> Vec<User> {
        self.users
            .iter()
            .filter(|u| u.name.eq_ignore_ascii_case(name))
            .map(|u| u.value().clone())
            .collect()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.private.get(key).map(|v| v.value().clone())
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.private.insert(key.into(), value);
    }

    pub fn unset(&self, key: &str) -> Option<Value> {
        self.private.remove(key).map(|(_, v)| v)
    }

    pub fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot {
            users: self
                .users
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
            private: self
                .private
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        }
    }

    /// Merge a snapshot into memory. Loaded entries overwrite current ones.
    pub fn restore(&self, snapshot: MemorySnapshot) {
        for (id, user) in snapshot.users {
            self.users.insert(id, user);
        }
        for (key, value) in snapshot.private {
            self.private.insert(key, value);
        }
    }

    pub async fn save<S: StorageAdapter + ?Sized>(&self, storage: &S) -> Result<()> {
        let snapshot = self.snapshot();
        let data = serde_json::to_value(&snapshot).map_err(ReflexError::from)?;
        storage.save_memory(&data).await?;
        debug!(
            users = snapshot.users.len(),
            keys = snapshot.private.len(),
            storage = storage.name(),
            "memory saved"
        );
        Ok(())
    }

    /// Restore from storage. Returns false when nothing had been saved yet.
    pub async fn load<S: StorageAdapter + ?Sized>(&self, storage: &S) -> Result<bool> {
        let Some(data) = storage.load_memory().await? else {
            debug!(storage = storage.name(), "no saved memory");
            return Ok(false);
        };
        let snapshot: MemorySnapshot = serde_json::from_value(data).map_err(ReflexError::from)?;
        info!(
            users = snapshot.users.len(),
            keys = snapshot.private.len(),
            "memory loaded"
        );
        self.restore(snapshot);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use reflex_adapters::MemoryStorage;
    use reflex_core::Room;
    use serde_json::json;

    use super::*;

    #[test]
    fn users_are_keyed_by_id() {
        let memory = BotMemory::new();
        memory.remember_user(&User::new("u1", "Alice").in_room(Room::new("r1")));
        memory.remember_user(&User::new("u1", "Alice").in_room(Room::new("r2")));
        memory.remember_user(&User::new("u2", "bob"));

        assert_eq!(memory.user_count(), 2);
        assert_eq!(memory.user("u1").unwrap().room.id, "r2");
        assert_eq!(memory.users_named("alice").len(), 1);
    }

    #[test]
    fn private_store_set_get_unset() {
        let memory = BotMemory::new();
        memory.set("greeted", json!(3));
        assert_eq!(memory.get("greeted"), Some(json!(3)));
        assert_eq!(memory.unset("greeted"), Some(json!(3)));
        assert!(memory.get("greeted").is_none());
    }

    #[tokio::test]
    async fn save_then_load_into_fresh_memory() {
        let storage = MemoryStorage::new();
        let memory = BotMemory::new();
        memory.remember_user(&User::new("u1", "alice"));
        memory.set("mood", json!("sunny"));
        memory.save(&storage).await.unwrap();

        let restored = BotMemory::new();
        assert!(restored.load(&storage).await.unwrap());
        assert_eq!(restored.snapshot(), memory.snapshot());
    }

    #[tokio::test]
    async fn load_without_saved_memory_is_false() {
        let memory = BotMemory::new();
        assert!(!memory.load(&MemoryStorage::new()).await.unwrap());
        assert_eq!(memory.user_count(), 0);
    }
}

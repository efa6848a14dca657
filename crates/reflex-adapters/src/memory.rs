use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::adapter::{matches_params, Adapter, StorageAdapter};
use crate::error::Result;

/// Process-local storage. Everything is lost on exit; used when no
/// database path is configured, and in tests.
#[derive(Default)]
pub struct MemoryStorage {
    memory: Mutex<Option<Value>>,
    collections: Mutex<HashMap<String, Vec<Value>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Adapter for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn save_memory(&self, data: &Value) -> Result<()> {
        *self.memory.lock().expect("memory storage poisoned") = Some(data.clone());
        Ok(())
    }

    async fn load_memory(&self) -> Result<Option<Value>> {
        Ok(self.memory.lock().expect("memory storage poisoned").clone())
    }

    async fn keep(&self, collection: &str, data: &Value) -> Result<()> {
        let mut collections = self.collections.lock().expect("memory storage poisoned");
        collections
            .entry(collection.to_string())
            .or_default()
            .push(data.clone());
        debug!(collection, "document kept");
        Ok(())
    }

    async fn find(&self, collection: &str, params: &Value) -> Result<Vec<Value>> {
        let collections = self.collections.lock().expect("memory storage poisoned");
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| matches_params(doc, params))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn lose(&self, collection: &str, params: &Value) -> Result<usize> {
        let mut collections = self.collections.lock().expect("memory storage poisoned");
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|doc| !matches_params(doc, params));
        Ok(before - docs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn keep_find_lose() {
        let storage = MemoryStorage::new();
        storage.keep("states", &json!({"id": "a", "user": {"id": "u1"}})).await.unwrap();
        storage.keep("states", &json!({"id": "b", "user": {"id": "u2"}})).await.unwrap();

        let found = storage.find("states", &json!({"user.id": "u2"})).await.unwrap();
        assert_eq!(found, vec![json!({"id": "b", "user": {"id": "u2"}})]);
        assert_eq!(
            storage.find_one("states", &json!(null)).await.unwrap().unwrap()["id"],
            "a"
        );
        assert!(storage.find("other", &json!({})).await.unwrap().is_empty());

        assert_eq!(storage.lose("states", &json!({"id": "a"})).await.unwrap(), 1);
        assert_eq!(storage.find("states", &json!({})).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn memory_round_trip() {
        let storage = MemoryStorage::new();
        assert!(storage.load_memory().await.unwrap().is_none());
        storage.save_memory(&json!({"users": {}})).await.unwrap();
        assert_eq!(storage.load_memory().await.unwrap(), Some(json!({"users": {}})));
    }
}

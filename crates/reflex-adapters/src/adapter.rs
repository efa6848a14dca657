use async_trait::async_trait;
use reflex_core::{path, Envelope, Message, NluResultsRaw};
use serde_json::Value;

use crate::error::Result;

/// Lifecycle shared by every collaborator.
///
/// All methods take `&self` so a started adapter can be shared behind an
/// `Arc` and called from any task; adapters keep their own interior state.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Stable lowercase identifier, used in logs (e.g. `"shell"`, `"sqlite"`).
    fn name(&self) -> &str;

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Delivers outgoing envelopes to the chat platform.
#[async_trait]
pub trait MessageAdapter: Adapter {
    /// Send one envelope. The returned value is whatever the platform
    /// reports back (message ids, receipts); callers may ignore it.
    async fn dispatch(&self, envelope: &Envelope) -> Result<Value>;
}

/// Produces NLU results for text messages.
#[async_trait]
pub trait NluAdapter: Adapter {
    /// Results keyed by kind, or `None` when the service had nothing to say.
    async fn process(&self, message: &Message) -> Result<Option<NluResultsRaw>>;
}

/// Persists bot memory and arbitrary JSON documents.
///
/// Query `params` are an object of dotted path -> expected value; a
/// document matches when every path resolves to an equal value. Null or
/// empty params match everything.
#[async_trait]
pub trait StorageAdapter: Adapter {
    async fn save_memory(&self, data: &Value) -> Result<()>;

    async fn load_memory(&self) -> Result<Option<Value>>;

    async fn keep(&self, collection: &str, data: &Value) -> Result<()>;

    async fn find(&self, collection: &str, params: &Value) -> Result<Vec<Value>>;

    async fn find_one(&self, collection: &str, params: &Value) -> Result<Option<Value>> {
        Ok(self.find(collection, params).await?.into_iter().next())
    }

    /// Remove matching documents. Returns how many were removed.
    async fn lose(&self, collection: &str, params: &Value) -> Result<usize>;
}

/// Whether `doc` satisfies storage query `params`.
pub fn matches_params(doc: &Value, params: &Value) -> bool {
    match params {
        Value::Null => true,
        Value::Object(map) => map
            .iter()
            .all(|(key, expected)| path::lookup(doc, key) == Some(expected)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_compare_dotted_paths() {
        let doc = json!({"message": {"user": {"id": "u1"}}, "sequence": "receive"});
        assert!(matches_params(&doc, &json!(null)));
        assert!(matches_params(&doc, &json!({})));
        assert!(matches_params(&doc, &json!({"message.user.id": "u1"})));
        assert!(!matches_params(
            &doc,
            &json!({"message.user.id": "u1", "sequence": "serve"})
        ));
        assert!(!matches_params(&doc, &json!(["message"])));
    }
}

// Shared fixtures for the pipeline integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reflex_adapters::{Adapter, Adapters, MemoryStorage, MessageAdapter, NluAdapter};
use reflex_core::{Envelope, Message, NluKind, NluResult, NluResultsRaw, Room, Settings, User};
use reflex_thoughts::Runtime;
use serde_json::Value;

/// Message adapter that records every envelope it is asked to send.
#[derive(Default)]
pub struct Recorder {
    sent: Mutex<Vec<Envelope>>,
}

impl Recorder {
    pub fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .flat_map(|e| e.strings)
            .collect()
    }
}

#[async_trait]
impl Adapter for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }
}

#[async_trait]
impl MessageAdapter for Recorder {
    async fn dispatch(&self, envelope: &Envelope) -> reflex_adapters::Result<Value> {
        self.sent.lock().unwrap().push(envelope.clone());
        Ok(Value::Null)
    }
}

/// NLU adapter that reports a fixed intent for every text.
pub struct FixedIntent(pub &'static str);

#[async_trait]
impl Adapter for FixedIntent {
    fn name(&self) -> &str {
        "fixed-intent"
    }
}

#[async_trait]
impl NluAdapter for FixedIntent {
    async fn process(&self, _message: &Message) -> reflex_adapters::Result<Option<NluResultsRaw>> {
        let mut raw = NluResultsRaw::new();
        raw.insert(NluKind::Intent, vec![NluResult::id(self.0).with_score(0.8)]);
        Ok(Some(raw))
    }
}

pub struct Harness {
    pub runtime: Arc<Runtime>,
    pub recorder: Arc<Recorder>,
    pub storage: Arc<MemoryStorage>,
}

/// Runtime with a recorder, in-memory storage and a fixed-intent NLU.
pub fn harness() -> Harness {
    let recorder = Arc::new(Recorder::default());
    let storage = Arc::new(MemoryStorage::new());
    let adapters = Adapters::new()
        .with_message(recorder.clone())
        .with_nlu(Arc::new(FixedIntent("greet")))
        .with_storage(storage.clone());
    Harness {
        runtime: Runtime::new(Settings::default(), adapters),
        recorder,
        storage,
    }
}

pub fn alice() -> User {
    User::new("u1", "alice").in_room(Room::new("general"))
}

pub fn bob() -> User {
    User::new("u2", "bob").in_room(Room::new("general"))
}

pub fn said(user: User, text: &str) -> Message {
    Message::text(user, text)
}

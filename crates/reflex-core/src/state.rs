//! `State`: the unit of work threaded through every stage of a sequence.
//!
//! One `State` is created per inbound event or outbound dispatch and is
//! mutated in place by middleware, branches and stage hooks. Fields that
//! carry invariants (`done`, stage timestamps, matches) are private and
//! only move forward through the methods below.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ReflexError, Result};
use crate::types::{Envelope, Message, Method, NluResults};

/// Whatever a branch's matcher returned, kept on the match record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MatchResult {
    /// Regex match: index 0 is the whole match, then each capture group.
    Captures(Vec<Option<String>>),
    /// Named condition set: key -> captured text (if the condition captures).
    Conditions(BTreeMap<String, Option<String>>),
    /// Subset of NLU results that satisfied the criteria.
    Nlu(NluResults),
    /// Custom predicate or structured-data result, stored verbatim.
    Value(Value),
    CatchAll,
}

impl MatchResult {
    /// Capture group `index` of a regex match.
    pub fn capture(&self, index: usize) -> Option<&str> {
        match self {
            MatchResult::Captures(groups) => groups.get(index)?.as_deref(),
            _ => None,
        }
    }

    /// Captured text of a named condition.
    pub fn condition(&self, key: &str) -> Option<&str> {
        match self {
            MatchResult::Conditions(captures) => captures.get(key)?.as_deref(),
            _ => None,
        }
    }
}

/// A branch that fired for this state, in match order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub branch_id: String,
    pub category: String,
    pub result: MatchResult,
    pub at: DateTime<Utc>,
}

impl MatchRecord {
    pub fn new(branch_id: impl Into<String>, category: impl Into<String>, result: MatchResult) -> Self {
        Self {
            branch_id: branch_id.into(),
            category: category.into(),
            result,
            at: Utc::now(),
        }
    }
}

/// Which dialogue this state was handled under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueLink {
    pub id: String,
    pub audience_key: String,
}

/// Runs the `respond` sequence for a state whose reaction wrote a response.
///
/// Implemented by the thought runtime; states only see the trait so the
/// core crate stays free of pipeline dependencies.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, state: &mut State) -> Result<()>;

    /// Deliver an outgoing-only state (no inbound message), e.g. a dialogue
    /// timeout notice.
    async fn dispatch(&self, state: &mut State) -> Result<()> {
        self.respond(state).await
    }
}

#[derive(Serialize, Deserialize)]
pub struct State {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<Message>,
    #[serde(default)]
    pub envelopes: Vec<Envelope>,
    /// Stage name -> completion time (unix ms). Written once per stage.
    #[serde(default)]
    processed: BTreeMap<String, i64>,
    #[serde(default)]
    matched: Vec<MatchRecord>,
    #[serde(default)]
    done: bool,
    /// Abort every remaining stage of the running sequence.
    #[serde(default)]
    pub exit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialogue: Option<DialogueLink>,
    /// Sequence that created this state ("receive", "serve", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sequence: Option<String>,
    /// User-defined fields; stage-specific data lives here too.
    #[serde(default)]
    pub extensions: BTreeMap<String, Value>,
    #[serde(skip)]
    responder: Option<Arc<dyn Responder>>,
}

impl State {
    /// State for an inbound message.
    pub fn new(message: Message) -> Self {
        Self {
            message: Some(message),
            ..Self::empty()
        }
    }

    /// State for an outgoing-only flow.
    pub fn outgoing(envelopes: Vec<Envelope>) -> Self {
        Self {
            envelopes,
            ..Self::empty()
        }
    }

    fn empty() -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            message: None,
            envelopes: Vec::new(),
            processed: BTreeMap::new(),
            matched: Vec::new(),
            done: false,
            exit: false,
            dialogue: None,
            sequence: None,
            extensions: BTreeMap::new(),
            responder: None,
        }
    }

    pub fn message(&self) -> Option<&Message> {
        self.message.as_ref()
    }

    /// Attach NLU results to the message. No-op for outgoing-only states.
    pub fn attach_nlu(&mut self, results: NluResults) {
        if let Some(message) = self.message.as_mut() {
            message.nlu = Some(results);
        }
    }

    /// Replace the message with a catch-all wrapper around it. Wrapping twice
    /// is a no-op.
    pub fn wrap_catch_all(&mut self) {
        if let Some(message) = self.message.take() {
            self.message = Some(if message.is_catch_all() {
                message
            } else {
                Message::catch_all(message)
            });
        }
    }

    pub fn matched(&self) -> bool {
        !self.matched.is_empty()
    }

    pub fn matches(&self) -> &[MatchRecord] {
        &self.matched
    }

    pub fn last_match(&self) -> Option<&MatchRecord> {
        self.matched.last()
    }

    pub fn record_match(&mut self, record: MatchRecord) {
        self.matched.push(record);
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Stop any further branch processing for this state. Irreversible.
    pub fn finish(&mut self) {
        self.done = true;
    }

    /// Record `stage` as completed now. Returns false if it already was.
    pub fn mark_processed(&mut self, stage: &str) -> bool {
        if self.processed.contains_key(stage) {
            return false;
        }
        self.processed
            .insert(stage.to_string(), Utc::now().timestamp_millis());
        true
    }

    pub fn processed(&self, stage: &str) -> Option<i64> {
        self.processed.get(stage).copied()
    }

    pub fn sequence(&self) -> Option<&str> {
        self.sequence.as_deref()
    }

    /// Stamp the initiating sequence. Only the first stamp sticks.
    pub fn stamp_sequence(&mut self, sequence: &str) {
        if self.sequence.is_none() {
            self.sequence = Some(sequence.to_string());
        }
    }

    pub fn set_responder(&mut self, responder: Arc<dyn Responder>) {
        self.responder = Some(responder);
    }

    pub fn pending_envelope(&self) -> Option<&Envelope> {
        self.envelopes.iter().find(|e| e.is_pending())
    }

    pub fn pending_envelope_mut(&mut self) -> Option<&mut Envelope> {
        self.envelopes.iter_mut().find(|e| e.is_pending())
    }

    /// The pending envelope, or a new one addressed to the message's author.
    pub fn envelope(&mut self) -> Result<&mut Envelope> {
        if let Some(index) = self.envelopes.iter().position(Envelope::is_pending) {
            return Ok(&mut self.envelopes[index]);
        }
        let user = self
            .message
            .as_ref()
            .map(|m| m.user.clone())
            .ok_or_else(|| ReflexError::NoAudience(format!("state {} has no message", self.id)))?;
        self.envelopes.push(Envelope::to_user(&user, Method::Send));
        let last = self.envelopes.len() - 1;
        Ok(&mut self.envelopes[last])
    }

    pub async fn respond<I, S>(&mut self, strings: I) -> Result<()>
    where
        I: IntoIterator<Item = S> + Send,
        S: Into<String>,
    {
        self.respond_via(Method::Send, strings).await
    }

    pub async fn reply<I, S>(&mut self, strings: I) -> Result<()>
    where
        I: IntoIterator<Item = S> + Send,
        S: Into<String>,
    {
        self.respond_via(Method::Reply, strings).await
    }

    /// Write `strings` to the pending envelope using `method`, then hand the
    /// state to the responder (if any) so it is dispatched immediately.
    pub async fn respond_via<I, S>(&mut self, method: Method, strings: I) -> Result<()>
    where
        I: IntoIterator<Item = S> + Send,
        S: Into<String>,
    {
        let envelope = self.envelope()?;
        envelope.method = method;
        envelope.write(strings);
        if let Some(responder) = self.responder.clone() {
            responder.respond(self).await?;
        }
        Ok(())
    }

    pub fn extension(&self, key: &str) -> Option<&Value> {
        self.extensions.get(key)
    }

    pub fn set_extension(&mut self, key: impl Into<String>, value: Value) {
        self.extensions.insert(key.into(), value);
    }

    /// Serializable view of the state for persistence. The responder handle
    /// is skipped.
    pub fn to_record(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("id", &self.id)
            .field("message", &self.message)
            .field("envelopes", &self.envelopes.len())
            .field("processed", &self.processed)
            .field("matched", &self.matched.len())
            .field("done", &self.done)
            .field("exit", &self.exit)
            .field("sequence", &self.sequence)
            .finish()
    }
}

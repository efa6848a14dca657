use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Where a message was said. Rooms are platform-defined (channel, chat, DM).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Room {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A participant, as seen in the room the message arrived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub room: Room,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            room: Room::default(),
        }
    }

    pub fn in_room(mut self, room: Room) -> Self {
        self.room = room;
        self
    }
}

/// Kinds of NLU result an adapter may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NluKind {
    Intent,
    Entities,
    Sentiment,
    Tone,
    Phrases,
    Act,
    Language,
}

impl fmt::Display for NluKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NluKind::Intent => "intent",
            NluKind::Entities => "entities",
            NluKind::Sentiment => "sentiment",
            NluKind::Tone => "tone",
            NluKind::Phrases => "phrases",
            NluKind::Act => "act",
            NluKind::Language => "language",
        };
        f.write_str(s)
    }
}

/// One scored record within an NLU result kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NluResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Adapter-specific extras are kept verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl NluResult {
    pub fn id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

/// Raw adapter output: result kind -> scored records.
pub type NluResultsRaw = BTreeMap<NluKind, Vec<NluResult>>;

/// NLU results attached to a text message by the `understand` stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NluResults(pub NluResultsRaw);

impl NluResults {
    pub fn get(&self, kind: NluKind) -> &[NluResult] {
        self.0.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn insert(&mut self, kind: NluKind, results: Vec<NluResult>) {
        self.0.insert(kind, results);
    }

    /// True when no kind carries any record.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }
}

impl From<NluResultsRaw> for NluResults {
    fn from(raw: NluResultsRaw) -> Self {
        Self(raw)
    }
}

/// What kind of event a message represents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageKind {
    Text { text: String },
    Enter,
    Leave,
    Topic { text: String },
    /// Structured request payload (webhooks, server calls).
    Server { data: Value },
    /// Marker wrapper meaning "nothing else matched this input".
    CatchAll { original: Box<Message> },
}

/// An inbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub user: User,
    #[serde(flatten)]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nlu: Option<NluResults>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(user: User, kind: MessageKind) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            user,
            kind,
            nlu: None,
            created_at: Utc::now(),
        }
    }

    pub fn text(user: User, text: impl Into<String>) -> Self {
        Self::new(user, MessageKind::Text { text: text.into() })
    }

    pub fn enter(user: User) -> Self {
        Self::new(user, MessageKind::Enter)
    }

    pub fn leave(user: User) -> Self {
        Self::new(user, MessageKind::Leave)
    }

    pub fn topic(user: User, text: impl Into<String>) -> Self {
        Self::new(user, MessageKind::Topic { text: text.into() })
    }

    pub fn server(user: User, data: Value) -> Self {
        Self::new(user, MessageKind::Server { data })
    }

    /// Wrap `original` in the catch-all marker. Keeps the original's id and user.
    pub fn catch_all(original: Message) -> Self {
        Self {
            id: original.id.clone(),
            user: original.user.clone(),
            nlu: None,
            created_at: original.created_at,
            kind: MessageKind::CatchAll {
                original: Box::new(original),
            },
        }
    }

    /// Text body for text messages, `None` for everything else.
    pub fn text_body(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn is_catch_all(&self) -> bool {
        matches!(self.kind, MessageKind::CatchAll { .. })
    }

    /// Structured payload of server messages.
    pub fn data(&self) -> Option<&Value> {
        match &self.kind {
            MessageKind::Server { data } => Some(data),
            _ => None,
        }
    }

    /// Copy of this message with a different text body. Non-text messages
    /// are returned unchanged.
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        let mut copy = self.clone();
        if let MessageKind::Text { text: body } = &mut copy.kind {
            *body = text.into();
        }
        copy
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            MessageKind::Text { text } | MessageKind::Topic { text } => f.write_str(text),
            MessageKind::Enter => write!(f, "{} entered", self.user.name),
            MessageKind::Leave => write!(f, "{} left", self.user.name),
            MessageKind::Server { data } => write!(f, "{data}"),
            MessageKind::CatchAll { original } => write!(f, "{original}"),
        }
    }
}

/// How an envelope should be delivered by the message adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    #[default]
    Send,
    Reply,
    Emote,
    Topic,
    Notify,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Send => "send",
            Method::Reply => "reply",
            Method::Emote => "emote",
            Method::Topic => "topic",
            Method::Notify => "notify",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "send" => Ok(Method::Send),
            "reply" => Ok(Method::Reply),
            "emote" => Ok(Method::Emote),
            "topic" => Ok(Method::Topic),
            "notify" => Ok(Method::Notify),
            other => Err(format!("unknown envelope method: {other}")),
        }
    }
}

/// An outgoing response, addressed to a user and/or room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub method: Method,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<Room>,
    #[serde(default)]
    pub strings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Branch whose reaction produced this envelope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
    /// Set once the message adapter has dispatched the envelope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded: Option<DateTime<Utc>>,
}

impl Envelope {
    pub fn new(method: Method) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            method,
            user: None,
            room: None,
            strings: Vec::new(),
            payload: None,
            branch_id: None,
            responded: None,
        }
    }

    /// Address to `user` in the room they were last seen in.
    pub fn to_user(user: &User, method: Method) -> Self {
        let mut envelope = Self::new(method);
        if !user.room.id.is_empty() {
            envelope.room = Some(user.room.clone());
        }
        envelope.user = Some(user.clone());
        envelope
    }

    pub fn to_room(room: Room, method: Method) -> Self {
        let mut envelope = Self::new(method);
        envelope.room = Some(room);
        envelope
    }

    pub fn write<I, S>(&mut self, strings: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.strings.extend(strings.into_iter().map(Into::into));
        self
    }

    pub fn is_pending(&self) -> bool {
        self.responded.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> User {
        User::new("u1", "alice").in_room(Room::new("r1"))
    }

    #[test]
    fn message_display_stringifies_each_kind() {
        assert_eq!(Message::text(alice(), "hi there").to_string(), "hi there");
        assert_eq!(Message::enter(alice()).to_string(), "alice entered");
        let wrapped = Message::catch_all(Message::text(alice(), "hello"));
        assert_eq!(wrapped.to_string(), "hello");
        assert!(wrapped.is_catch_all());
    }

    #[test]
    fn catch_all_keeps_identity_of_original() {
        let original = Message::text(alice(), "hello");
        let wrapped = Message::catch_all(original.clone());
        assert_eq!(wrapped.id, original.id);
        assert_eq!(wrapped.user, original.user);
    }

    #[test]
    fn message_serializes_with_type_tag() {
        let json = serde_json::to_value(Message::text(alice(), "yo")).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["text"], "yo");
        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back.text_body(), Some("yo"));
    }

    #[test]
    fn nlu_results_keyed_by_kind() {
        let raw: NluResultsRaw = serde_json::from_str(
            r#"{"intent":[{"id":"greet","score":0.9}],"language":[{"name":"en"}]}"#,
        )
        .unwrap();
        let results = NluResults::from(raw);
        assert_eq!(results.get(NluKind::Intent)[0].id.as_deref(), Some("greet"));
        assert!(results.get(NluKind::Tone).is_empty());
        assert!(!results.is_empty());
    }

    #[test]
    fn envelope_addresses_user_room() {
        let mut envelope = Envelope::to_user(&alice(), Method::Reply);
        envelope.write(["a", "b"]);
        assert_eq!(envelope.room.as_ref().map(|r| r.id.as_str()), Some("r1"));
        assert_eq!(envelope.strings, vec!["a", "b"]);
        assert!(envelope.is_pending());
    }
}

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use reflex_core::{path, MatchRecord, MatchResult, Message, MessageKind, Settings, State};
use reflex_middleware::{Complete, Middleware};
use serde_json::Value;
use tracing::{debug, error};

use crate::conditions::{Condition, Conditions};
use crate::error::{BranchError, Result};
use crate::nlu::NluCriteria;
use crate::server::ServerCriteria;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn generate_id() -> String {
    format!("branch_{}", NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

/// Which collection of a [`BranchController`](crate::BranchController) a
/// branch lives in, and so which stage evaluates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Listen,
    Understand,
    Serve,
    Act,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Listen,
        Category::Understand,
        Category::Serve,
        Category::Act,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Listen => "listen",
            Category::Understand => "understand",
            Category::Serve => "serve",
            Category::Act => "act",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = BranchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "listen" => Ok(Category::Listen),
            "understand" => Ok(Category::Understand),
            "serve" => Ok(Category::Serve),
            "act" => Ok(Category::Act),
            other => Err(BranchError::UnknownCategory(other.to_string())),
        }
    }
}

/// Text matcher: a plain regex or a named condition set.
#[derive(Debug, Clone)]
pub enum Pattern {
    Regex(Regex),
    Conditions(Conditions),
}

impl Pattern {
    /// Case-insensitive regex, the usual choice for chat input.
    pub fn regex(source: &str) -> Result<Self> {
        Ok(Pattern::Regex(
            RegexBuilder::new(source).case_insensitive(true).build()?,
        ))
    }

    pub fn exec(&self, input: &str) -> Option<MatchResult> {
        match self {
            Pattern::Regex(re) => re.captures(input).map(|caps| {
                MatchResult::Captures(
                    caps.iter()
                        .map(|m| m.map(|m| m.as_str().to_string()))
                        .collect(),
                )
            }),
            Pattern::Conditions(conditions) => {
                let outcome = conditions.exec(input);
                outcome
                    .matched
                    .then_some(MatchResult::Conditions(outcome.captures))
            }
        }
    }
}

impl From<Regex> for Pattern {
    fn from(re: Regex) -> Self {
        Pattern::Regex(re)
    }
}

impl From<Conditions> for Pattern {
    fn from(conditions: Conditions) -> Self {
        Pattern::Conditions(conditions)
    }
}

impl TryFrom<Condition> for Pattern {
    type Error = BranchError;

    fn try_from(condition: Condition) -> Result<Self> {
        Ok(Pattern::Conditions(Conditions::single(condition)?))
    }
}

/// Arbitrary async test over a message. A truthy return is a match and is
/// kept verbatim as the match result.
#[async_trait]
pub trait Predicate: Send + Sync {
    async fn test(&self, message: &Message) -> Value;
}

pub struct PredicateFn<F>(F);

/// Wrap a synchronous closure as a [`Predicate`].
pub fn predicate_fn<F, V>(f: F) -> PredicateFn<F>
where
    F: Fn(&Message) -> V + Send + Sync,
    V: Into<Value>,
{
    PredicateFn(f)
}

#[async_trait]
impl<F, V> Predicate for PredicateFn<F>
where
    F: Fn(&Message) -> V + Send + Sync,
    V: Into<Value>,
{
    async fn test(&self, message: &Message) -> Value {
        (self.0)(message).into()
    }
}

/// Platform events a branch can react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Enter,
    Leave,
    Topic,
}

/// How a branch decides whether a message concerns it.
#[derive(Clone)]
pub enum Matcher {
    Text(Pattern),
    /// Text addressed to the bot by name or alias; the pattern sees the
    /// text after the address.
    Direct { pattern: Pattern, settings: Settings },
    Nlu(NluCriteria),
    DirectNlu { criteria: NluCriteria, settings: Settings },
    Custom(Arc<dyn Predicate>),
    /// Custom predicate that only runs once NLU results are attached.
    CustomNlu(Arc<dyn Predicate>),
    Server(ServerCriteria),
    Event(EventKind),
    CatchAll,
}

impl Matcher {
    /// Collection a branch with this matcher lands in by default.
    pub fn default_category(&self) -> Category {
        match self {
            Matcher::Text(_) | Matcher::Direct { .. } | Matcher::Custom(_) | Matcher::Event(_) => {
                Category::Listen
            }
            Matcher::Nlu(_) | Matcher::DirectNlu { .. } | Matcher::CustomNlu(_) => {
                Category::Understand
            }
            Matcher::Server(_) => Category::Serve,
            Matcher::CatchAll => Category::Act,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Matcher::Text(_) => "text",
            Matcher::Direct { .. } => "direct",
            Matcher::Nlu(_) => "nlu",
            Matcher::DirectNlu { .. } => "direct_nlu",
            Matcher::Custom(_) => "custom",
            Matcher::CustomNlu(_) => "custom_nlu",
            Matcher::Server(_) => "server",
            Matcher::Event(_) => "event",
            Matcher::CatchAll => "catch_all",
        }
    }

    pub async fn test(&self, message: &Message) -> Option<MatchResult> {
        match self {
            Matcher::Text(pattern) => pattern.exec(&message.to_string()),
            Matcher::Direct { pattern, settings } => {
                let body = strip_address(message.text_body()?, settings)?;
                pattern.exec(&body)
            }
            Matcher::Nlu(criteria) => nlu_match(criteria, message),
            Matcher::DirectNlu { criteria, settings } => {
                strip_address(message.text_body()?, settings)?;
                nlu_match(criteria, message)
            }
            Matcher::Custom(predicate) => truthy(predicate.test(message).await),
            Matcher::CustomNlu(predicate) => {
                if message.nlu.is_none() {
                    error!(message = %message.id, "custom NLU branch tested without NLU results");
                    return None;
                }
                truthy(predicate.test(message).await)
            }
            Matcher::Server(criteria) => match &message.kind {
                MessageKind::Server { data } => criteria.matches(Some(data)).map(MatchResult::Value),
                _ => None,
            },
            Matcher::Event(kind) => {
                let hit = matches!(
                    (kind, &message.kind),
                    (EventKind::Enter, MessageKind::Enter)
                        | (EventKind::Leave, MessageKind::Leave)
                        | (EventKind::Topic, MessageKind::Topic { .. })
                );
                hit.then(|| MatchResult::Value(Value::String(message.to_string())))
            }
            Matcher::CatchAll => message.is_catch_all().then_some(MatchResult::CatchAll),
        }
    }
}

fn truthy(value: Value) -> Option<MatchResult> {
    path::is_truthy(&value).then_some(MatchResult::Value(value))
}

fn nlu_match(criteria: &NluCriteria, message: &Message) -> Option<MatchResult> {
    let Some(results) = message.nlu.as_ref() else {
        error!(message = %message.id, "NLU branch tested without NLU results");
        return None;
    };
    criteria.matches(results).map(MatchResult::Nlu)
}

/// Address regex for the configured bot name and alias.
///
/// Case-insensitive, optional leading `@`, optional trailing `:` or `,`.
/// Names ending in a word character must be followed by a separator or the
/// end of input, so "bots" does not address "bot".
fn address_regex(name: &str, alias: Option<&str>) -> Option<Regex> {
    let alternative = |n: &str| {
        let boundary = if n.chars().last().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            r"(?:[:,]\s*|\s+|$)"
        } else {
            r"[:,]?\s*"
        };
        format!("{}{}", regex::escape(n), boundary)
    };
    let mut alternatives: Vec<String> = Vec::new();
    for n in std::iter::once(name).chain(alias) {
        if !n.is_empty() {
            alternatives.push(alternative(n));
        }
    }
    if alternatives.is_empty() {
        return None;
    }
    RegexBuilder::new(&format!(r"^\s*@?(?:{})", alternatives.join("|")))
        .case_insensitive(true)
        .build()
        .ok()
}

/// Remaining text when `text` is addressed to the bot, else `None`.
pub fn strip_address(text: &str, settings: &Settings) -> Option<String> {
    let alias = settings.bot_alias();
    let re = address_regex(&settings.bot_name(), alias.as_deref())?;
    let found = re.find(text)?;
    Some(text[found.end()..].to_string())
}

/// A matcher paired with the reaction it triggers.
pub struct Branch {
    pub id: String,
    pub category: Category,
    pub matcher: Matcher,
    pub reaction: Arc<dyn Complete>,
    /// Run even when the state already matched another branch.
    pub force: bool,
}

impl Branch {
    pub fn new(matcher: Matcher, reaction: impl Complete + 'static) -> Self {
        Self {
            id: generate_id(),
            category: matcher.default_category(),
            matcher,
            reaction: Arc::new(reaction),
            force: false,
        }
    }

    pub fn text(pattern: impl Into<Pattern>, reaction: impl Complete + 'static) -> Self {
        Self::new(Matcher::Text(pattern.into()), reaction)
    }

    pub fn direct(
        pattern: impl Into<Pattern>,
        settings: Settings,
        reaction: impl Complete + 'static,
    ) -> Self {
        Self::new(
            Matcher::Direct {
                pattern: pattern.into(),
                settings,
            },
            reaction,
        )
    }

    pub fn nlu(criteria: NluCriteria, reaction: impl Complete + 'static) -> Self {
        Self::new(Matcher::Nlu(criteria), reaction)
    }

    pub fn direct_nlu(
        criteria: NluCriteria,
        settings: Settings,
        reaction: impl Complete + 'static,
    ) -> Self {
        Self::new(Matcher::DirectNlu { criteria, settings }, reaction)
    }

    pub fn custom(predicate: impl Predicate + 'static, reaction: impl Complete + 'static) -> Self {
        Self::new(Matcher::Custom(Arc::new(predicate)), reaction)
    }

    pub fn custom_nlu(
        predicate: impl Predicate + 'static,
        reaction: impl Complete + 'static,
    ) -> Self {
        Self::new(Matcher::CustomNlu(Arc::new(predicate)), reaction)
    }

    pub fn server(criteria: ServerCriteria, reaction: impl Complete + 'static) -> Self {
        Self::new(Matcher::Server(criteria), reaction)
    }

    pub fn enter(reaction: impl Complete + 'static) -> Self {
        Self::new(Matcher::Event(EventKind::Enter), reaction)
    }

    pub fn leave(reaction: impl Complete + 'static) -> Self {
        Self::new(Matcher::Event(EventKind::Leave), reaction)
    }

    pub fn topic(reaction: impl Complete + 'static) -> Self {
        Self::new(Matcher::Event(EventKind::Topic), reaction)
    }

    pub fn catch_all(reaction: impl Complete + 'static) -> Self {
        Self::new(Matcher::CatchAll, reaction)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn forced(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Test the matcher without touching any state.
    pub async fn matches(&self, message: &Message) -> Option<MatchResult> {
        self.matcher.test(message).await
    }

    /// Match against the state's message and, on a match, record it and run
    /// the reaction through `middleware`.
    ///
    /// Returns whether the branch matched. Reaction failures are logged and
    /// reported as no match; they never reach the caller.
    pub async fn execute(&self, state: &mut State, middleware: &Middleware) -> bool {
        if state.matched() && !self.force {
            debug!(branch = %self.id, "state already matched, skipping");
            return false;
        }
        let result = match state.message() {
            Some(message) => self.matches(message).await,
            None => None,
        };
        let Some(result) = result else {
            return false;
        };
        debug!(branch = %self.id, category = %self.category, matcher = self.matcher.kind(), "branch matched");
        state.record_match(MatchRecord::new(&self.id, self.category.as_str(), result));

        match middleware.execute(state, self.reaction.as_ref()).await {
            Ok(outcome) => {
                debug!(branch = %self.id, ?outcome, "branch reaction finished");
                true
            }
            Err(e) => {
                error!(branch = %self.id, stack = middleware.name(), error = %e, "branch reaction failed");
                false
            }
        }
    }
}

impl fmt::Debug for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Branch")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("matcher", &self.matcher.kind())
            .field("force", &self.force)
            .finish()
    }
}

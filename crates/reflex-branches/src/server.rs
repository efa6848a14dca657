//! Structured-data criteria for server requests.

use indexmap::IndexMap;
use regex::Regex;
use reflex_core::path;
use serde_json::Value;

/// One test against the value found at a dotted path.
#[derive(Debug, Clone)]
pub enum ServerCriterion {
    /// JSON equality.
    Exact(Value),
    /// The value's string form equals this text.
    Loose(String),
    /// The value's string form matches this regex.
    Pattern(Regex),
}

impl ServerCriterion {
    fn test(&self, value: &Value) -> bool {
        match self {
            ServerCriterion::Exact(expected) => value == expected,
            ServerCriterion::Loose(expected) => stringify(value) == *expected,
            ServerCriterion::Pattern(re) => re.is_match(&stringify(value)),
        }
    }
}

impl From<Value> for ServerCriterion {
    fn from(value: Value) -> Self {
        ServerCriterion::Exact(value)
    }
}

impl From<Regex> for ServerCriterion {
    fn from(re: Regex) -> Self {
        ServerCriterion::Pattern(re)
    }
}

impl From<&str> for ServerCriterion {
    fn from(s: &str) -> Self {
        ServerCriterion::Loose(s.to_string())
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Path -> criterion map; every path must resolve and pass.
///
/// An empty set only matches an empty or absent payload.
#[derive(Debug, Clone, Default)]
pub struct ServerCriteria {
    entries: IndexMap<String, ServerCriterion>,
}

impl ServerCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<String>, criterion: impl Into<ServerCriterion>) -> Self {
        self.entries.insert(path.into(), criterion.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Values found at each criterion's path, as an object keyed by path.
    pub fn matches(&self, payload: Option<&Value>) -> Option<Value> {
        if self.entries.is_empty() {
            return match payload {
                None => Some(Value::Object(Default::default())),
                Some(data) if path::is_empty(data) => Some(Value::Object(Default::default())),
                Some(_) => None,
            };
        }
        let data = payload?;
        let mut found = serde_json::Map::new();
        for (key, criterion) in &self.entries {
            let value = path::lookup(data, key)?;
            if !criterion.test(value) {
                return None;
            }
            found.insert(key.clone(), value.clone());
        }
        Some(Value::Object(found))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_criteria_match_only_empty_payloads() {
        let criteria = ServerCriteria::new();
        assert!(criteria.matches(None).is_some());
        assert!(criteria.matches(Some(&json!({}))).is_some());
        assert!(criteria.matches(Some(&json!({"a": 1}))).is_none());
    }

    #[test]
    fn exact_loose_and_pattern_criteria() {
        let payload = json!({"order": {"id": 42, "status": "shipped"}, "ref": "AB-123"});
        let criteria = ServerCriteria::new()
            .with("order.id", json!(42))
            .with("order.status", "shipped")
            .with("ref", Regex::new(r"^AB-\d+$").unwrap());
        let found = criteria.matches(Some(&payload)).unwrap();
        assert_eq!(found["order.id"], 42);

        let loose_number = ServerCriteria::new().with("order.id", "42");
        assert!(loose_number.matches(Some(&payload)).is_some());
    }

    #[test]
    fn missing_path_or_failed_test_is_no_match() {
        let payload = json!({"order": {"id": 42}});
        assert!(ServerCriteria::new()
            .with("order.missing", json!(1))
            .matches(Some(&payload))
            .is_none());
        assert!(ServerCriteria::new()
            .with("order.id", json!("42"))
            .matches(Some(&payload))
            .is_none());
        assert!(ServerCriteria::new()
            .with("order.id", json!(42))
            .matches(None)
            .is_none());
    }
}

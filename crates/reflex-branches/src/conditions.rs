//! Structured text conditions, an alternative to hand-written regexes.
//!
//! A [`Condition`] combines any of `is`, `starts`, `ends`, `contains`,
//! `excludes`, `after`, `before` and `range`; every field given must hold.
//! A [`Conditions`] set names each condition and matches only when all of
//! them do, reporting what each one captured.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{BranchError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// Whole input equals this phrase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends: Option<String>,
    /// Any of these words or phrases appears.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contains: Vec<String>,
    /// None of these words or phrases appears.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
    /// Capture the text following this phrase (up to `before`, if given).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    /// Capture the text preceding this phrase (from `after`, if given).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    /// Capture the first number inside an inclusive range, e.g. `"1-10"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(default = "default_true")]
    pub ignore_case: bool,
    /// Strip punctuation from the input before testing.
    #[serde(default)]
    pub ignore_punctuation: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Condition {
    fn default() -> Self {
        Self {
            is: None,
            starts: None,
            ends: None,
            contains: Vec::new(),
            excludes: Vec::new(),
            after: None,
            before: None,
            range: None,
            ignore_case: true,
            ignore_punctuation: false,
        }
    }
}

impl Condition {
    pub fn is(phrase: impl Into<String>) -> Self {
        Self {
            is: Some(phrase.into()),
            ..Self::default()
        }
    }

    pub fn starts(phrase: impl Into<String>) -> Self {
        Self {
            starts: Some(phrase.into()),
            ..Self::default()
        }
    }

    pub fn ends(phrase: impl Into<String>) -> Self {
        Self {
            ends: Some(phrase.into()),
            ..Self::default()
        }
    }

    pub fn contains<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            contains: phrases.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn after(phrase: impl Into<String>) -> Self {
        Self {
            after: Some(phrase.into()),
            ..Self::default()
        }
    }

    pub fn before(phrase: impl Into<String>) -> Self {
        Self {
            before: Some(phrase.into()),
            ..Self::default()
        }
    }

    pub fn range(range: impl Into<String>) -> Self {
        Self {
            range: Some(range.into()),
            ..Self::default()
        }
    }

    pub fn and_before(mut self, phrase: impl Into<String>) -> Self {
        self.before = Some(phrase.into());
        self
    }

    pub fn excluding<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excludes.extend(phrases.into_iter().map(Into::into));
        self
    }

    pub fn case_sensitive(mut self) -> Self {
        self.ignore_case = false;
        self
    }

    pub fn without_punctuation(mut self) -> Self {
        self.ignore_punctuation = true;
        self
    }

    fn compile(&self) -> Result<Compiled> {
        let build = |pattern: String| -> Result<Regex> {
            RegexBuilder::new(&pattern)
                .case_insensitive(self.ignore_case)
                .build()
                .map_err(BranchError::from)
        };

        let mut tests = Vec::new();
        if let Some(is) = &self.is {
            tests.push(build(format!(r"^\s*({})\s*$", regex::escape(is)))?);
        }
        if let Some(starts) = &self.starts {
            tests.push(build(format!(r"^\s*({})", bounded(starts)))?);
        }
        if let Some(ends) = &self.ends {
            tests.push(build(format!(r"({})\s*$", bounded(ends)))?);
        }
        if !self.contains.is_empty() {
            tests.push(build(format!("({})", alternatives(&self.contains)))?);
        }
        // after/before share one test so "after X before Y" captures between.
        match (&self.after, &self.before) {
            (Some(after), Some(before)) => tests.push(build(format!(
                r"{}\s*(.+?)\s*{}",
                bounded(after),
                bounded(before)
            ))?),
            (Some(after), None) => tests.push(build(format!(r"{}\s*(.+?)\s*$", bounded(after)))?),
            (None, Some(before)) => tests.push(build(format!(r"^\s*(.+?)\s*{}", bounded(before)))?),
            (None, None) => {}
        }

        let excludes = if self.excludes.is_empty() {
            None
        } else {
            Some(build(format!("({})", alternatives(&self.excludes)))?)
        };

        let range = self.range.as_deref().map(parse_range).transpose()?;

        if tests.is_empty() && excludes.is_none() && range.is_none() {
            return Err(BranchError::InvalidCondition(
                "condition has no criteria".to_string(),
            ));
        }

        Ok(Compiled {
            tests,
            excludes,
            range,
            ignore_punctuation: self.ignore_punctuation,
        })
    }
}

/// Escape `phrase` and add word boundaries on its word-character edges.
fn bounded(phrase: &str) -> String {
    let escaped = regex::escape(phrase.trim());
    let lead = if phrase.trim().starts_with(|c: char| c.is_alphanumeric() || c == '_') {
        r"\b"
    } else {
        ""
    };
    let tail = if phrase.trim().ends_with(|c: char| c.is_alphanumeric() || c == '_') {
        r"\b"
    } else {
        ""
    };
    format!("{lead}{escaped}{tail}")
}

fn alternatives(phrases: &[String]) -> String {
    phrases
        .iter()
        .map(|p| bounded(p))
        .collect::<Vec<_>>()
        .join("|")
}

fn parse_range(range: &str) -> Result<(f64, f64)> {
    let re = Regex::new(r"^\s*(-?\d+(?:\.\d+)?)\s*-\s*(-?\d+(?:\.\d+)?)\s*$")?;
    let caps = re
        .captures(range)
        .ok_or_else(|| BranchError::InvalidCondition(format!("bad range: {range}")))?;
    let low: f64 = caps[1]
        .parse()
        .map_err(|_| BranchError::InvalidCondition(format!("bad range: {range}")))?;
    let high: f64 = caps[2]
        .parse()
        .map_err(|_| BranchError::InvalidCondition(format!("bad range: {range}")))?;
    Ok((low.min(high), low.max(high)))
}

#[derive(Debug, Clone)]
struct Compiled {
    tests: Vec<Regex>,
    excludes: Option<Regex>,
    range: Option<(f64, f64)>,
    ignore_punctuation: bool,
}

impl Compiled {
    /// `None` when the condition fails; otherwise the capture (if any).
    fn exec(&self, input: &str) -> Option<Option<String>> {
        let cleaned;
        let input = if self.ignore_punctuation {
            cleaned = input
                .chars()
                .filter(|c| !c.is_ascii_punctuation())
                .collect::<String>();
            cleaned.as_str()
        } else {
            input
        };

        if self.excludes.as_ref().is_some_and(|re| re.is_match(input)) {
            return None;
        }

        // The last test to capture wins: after/before is pushed last and is
        // the most specific.
        let mut capture = None;
        for test in &self.tests {
            let caps = test.captures(input)?;
            if let Some(group) = caps.get(1) {
                capture = Some(group.as_str().to_string());
            }
        }

        if let Some((low, high)) = self.range {
            let number = number_in_range(input, low, high)?;
            capture = Some(number);
        }

        Some(capture)
    }
}

fn number_in_range(input: &str, low: f64, high: f64) -> Option<String> {
    let re = Regex::new(r"-?\d+(?:\.\d+)?").ok()?;
    let found = re
        .find_iter(input)
        .find(|m| {
            m.as_str()
                .parse::<f64>()
                .is_ok_and(|n| n >= low && n <= high)
        })
        .map(|m| m.as_str().to_string());
    found
}

/// Result of testing a [`Conditions`] set against an input.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionsOutcome {
    /// All conditions held.
    pub matched: bool,
    /// Per-condition capture, only for conditions that held.
    pub captures: BTreeMap<String, Option<String>>,
}

/// Named set of conditions; matches when every member matches.
#[derive(Debug, Clone, Default)]
pub struct Conditions {
    entries: IndexMap<String, Compiled>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `condition` under `key`. Replaces an existing entry with that key.
    pub fn add(mut self, key: impl Into<String>, condition: Condition) -> Result<Self> {
        self.entries.insert(key.into(), condition.compile()?);
        Ok(self)
    }

    /// A set holding one condition keyed `"0"`.
    pub fn single(condition: Condition) -> Result<Self> {
        Self::new().add("0", condition)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn exec(&self, input: &str) -> ConditionsOutcome {
        let mut captures = BTreeMap::new();
        let mut matched = !self.entries.is_empty();
        for (key, compiled) in &self.entries {
            match compiled.exec(input) {
                Some(capture) => {
                    captures.insert(key.clone(), capture);
                }
                None => matched = false,
            }
        }
        ConditionsOutcome { matched, captures }
    }
}

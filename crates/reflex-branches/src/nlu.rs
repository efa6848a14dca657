//! NLU criteria: per-kind conditions over the scored results an NLU
//! adapter attached to a message.

use std::collections::BTreeMap;
use std::fmt;

use reflex_core::{NluKind, NluResult, NluResults};
use serde::{Deserialize, Serialize};

/// How a criterion compares against a kind's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    /// Any result has the given id/name.
    In,
    /// The only result has the given id/name.
    Is,
    /// The highest scored result has the given id/name.
    Max,
    /// The lowest scored result has the given id/name.
    Min,
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::In => "in",
            Operator::Is => "is",
            Operator::Max => "max",
            Operator::Min => "min",
            Operator::Eq => "eq",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NluCriterion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<Operator>,
}

impl NluCriterion {
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

    pub fn score(score: f64) -> Self {
        Self {
            score: Some(score),
            ..Self::default()
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_operator(mut self, operator: Operator) -> Self {
        self.operator = Some(operator);
        self
    }

    /// Explicit operator, else `gte` when a score is given, else `in`.
    pub fn operator(&self) -> Operator {
        self.operator.unwrap_or(if self.score.is_some() {
            Operator::Gte
        } else {
            Operator::In
        })
    }

    fn has_identity(&self) -> bool {
        self.id.is_some() || self.name.is_some()
    }

    fn identifies(&self, result: &NluResult) -> bool {
        self.id.as_ref().map_or(true, |id| result.id.as_ref() == Some(id))
            && self
                .name
                .as_ref()
                .map_or(true, |name| result.name.as_ref() == Some(name))
    }

    /// Membership test used by `in`/`is`: id/name when given, otherwise a
    /// score-only criterion compares by equal score.
    fn member(&self, result: &NluResult) -> bool {
        if self.has_identity() {
            self.identifies(result)
        } else if let Some(score) = self.score {
            result.score == Some(score)
        } else {
            true
        }
    }

    /// Results of one kind that satisfy this criterion. Empty means no match.
    pub fn select(&self, results: &[NluResult]) -> Vec<NluResult> {
        match self.operator() {
            Operator::In => results.iter().filter(|r| self.member(r)).cloned().collect(),
            Operator::Is => match results {
                [only] if self.member(only) => vec![only.clone()],
                _ => Vec::new(),
            },
            Operator::Max => extreme(results, |a, b| a > b)
                .filter(|r| self.identifies(r))
                .into_iter()
                .cloned()
                .collect(),
            Operator::Min => extreme(results, |a, b| a < b)
                .filter(|r| self.identifies(r))
                .into_iter()
                .cloned()
                .collect(),
            op => {
                let Some(threshold) = self.score else {
                    return Vec::new();
                };
                results
                    .iter()
                    .filter(|r| self.identifies(r))
                    .filter(|r| r.score.is_some_and(|s| compare(op, s, threshold)))
                    .cloned()
                    .collect()
            }
        }
    }
}

fn compare(op: Operator, score: f64, threshold: f64) -> bool {
    match op {
        Operator::Eq => score == threshold,
        Operator::Gt => score > threshold,
        Operator::Gte => score >= threshold,
        Operator::Lt => score < threshold,
        Operator::Lte => score <= threshold,
        _ => false,
    }
}

/// Result with the most extreme score per `better`. Unscored results count
/// as zero.
fn extreme(results: &[NluResult], better: impl Fn(f64, f64) -> bool) -> Option<&NluResult> {
    results.iter().fold(None, |best: Option<&NluResult>, r| match best {
        Some(b) if !better(r.score.unwrap_or(0.0), b.score.unwrap_or(0.0)) => Some(b),
        _ => Some(r),
    })
}

/// Criteria across kinds; every kind listed must be satisfied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NluCriteria(BTreeMap<NluKind, NluCriterion>);

impl NluCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: NluKind, criterion: NluCriterion) -> Self {
        self.0.insert(kind, criterion);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The matching subset of `results`, or `None` if any kind fails.
    ///
    /// Empty criteria accept any result set unchanged.
    pub fn matches(&self, results: &NluResults) -> Option<NluResults> {
        let mut matched = NluResults::default();
        for (kind, criterion) in &self.0 {
            let selected = criterion.select(results.get(*kind));
            if selected.is_empty() {
                return None;
            }
            matched.insert(*kind, selected);
        }
        if self.0.is_empty() {
            return Some(results.clone());
        }
        Some(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intents() -> NluResults {
        let mut results = NluResults::default();
        results.insert(
            NluKind::Intent,
            vec![
                NluResult::id("greet").with_score(0.8),
                NluResult::id("order").with_score(0.3),
            ],
        );
        results.insert(NluKind::Language, vec![NluResult::name("en").with_score(1.0)]);
        results
    }

    #[test]
    fn default_operator_depends_on_score() {
        assert_eq!(NluCriterion::id("greet").operator(), Operator::In);
        assert_eq!(NluCriterion::score(0.5).operator(), Operator::Gte);
        assert_eq!(
            NluCriterion::id("greet").with_score(0.5).operator(),
            Operator::Gte
        );
        assert_eq!(
            NluCriterion::score(0.5).with_operator(Operator::Lt).operator(),
            Operator::Lt
        );
    }

    #[test]
    fn in_matches_membership_ignoring_score() {
        let criterion = NluCriterion::id("order")
            .with_score(0.99)
            .with_operator(Operator::In);
        let selected = criterion.select(intents().get(NluKind::Intent));
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id.as_deref(), Some("order"));
    }

    #[test]
    fn in_with_only_score_compares_scores() {
        let criterion = NluCriterion::score(0.3).with_operator(Operator::In);
        assert_eq!(criterion.select(intents().get(NluKind::Intent)).len(), 1);
    }

    #[test]
    fn is_requires_a_single_result() {
        let results = intents();
        assert!(NluCriterion::id("greet")
            .with_operator(Operator::Is)
            .select(results.get(NluKind::Intent))
            .is_empty());
        assert_eq!(
            NluCriterion::name("en")
                .with_operator(Operator::Is)
                .select(results.get(NluKind::Language))
                .len(),
            1
        );
    }

    #[test]
    fn max_and_min_pick_extremes() {
        let results = intents();
        let intent = results.get(NluKind::Intent);
        assert_eq!(
            NluCriterion::id("greet").with_operator(Operator::Max).select(intent).len(),
            1
        );
        assert!(NluCriterion::id("order")
            .with_operator(Operator::Max)
            .select(intent)
            .is_empty());
        assert_eq!(
            NluCriterion::id("order").with_operator(Operator::Min).select(intent).len(),
            1
        );
    }

    #[test]
    fn score_thresholds() {
        let results = intents();
        let intent = results.get(NluKind::Intent);
        assert_eq!(NluCriterion::score(0.5).select(intent).len(), 1);
        assert_eq!(
            NluCriterion::score(0.5).with_operator(Operator::Lt).select(intent)[0]
                .id
                .as_deref(),
            Some("order")
        );
        assert_eq!(
            NluCriterion::score(0.8).with_operator(Operator::Eq).select(intent).len(),
            1
        );
        assert!(NluCriterion::id("greet")
            .with_operator(Operator::Gt)
            .select(intent)
            .is_empty());
    }

    #[test]
    fn criteria_require_every_kind() {
        let criteria = NluCriteria::new()
            .with(NluKind::Intent, NluCriterion::id("greet"))
            .with(NluKind::Language, NluCriterion::name("en"));
        let matched = criteria.matches(&intents()).unwrap();
        assert_eq!(matched.get(NluKind::Intent).len(), 1);

        let failing = criteria.with(NluKind::Sentiment, NluCriterion::score(0.1));
        assert!(failing.matches(&intents()).is_none());
    }

    #[test]
    fn criteria_deserialize_from_json() {
        let criteria: NluCriteria =
            serde_json::from_str(r#"{"intent":{"id":"greet","score":0.5,"operator":"gt"}}"#)
                .unwrap();
        assert!(criteria.matches(&intents()).is_some());
    }
}

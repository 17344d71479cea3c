//! Learned selector patterns
//!
//! A [`FieldPattern`] is the ordered selector list the pattern store keeps for one
//! `(source, field)` pair together with its confidence bookkeeping. The on-disk
//! [`PatternDocument`] is `source -> field -> pattern`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::constants::patterns::{CONFIDENCE_FAILURE_PENALTY, CONFIDENCE_SUCCESS_BONUS, MAX_CONFIDENCE};

/// Pattern document: source name -> field name -> pattern
pub type PatternDocument = BTreeMap<String, BTreeMap<String, FieldPattern>>;

/// Composite `(source, field)` key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    pub source: String,
    pub field: String,
}

impl FieldKey {
    pub fn new(source: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            field: field.into(),
        }
    }
}

impl std::fmt::Display for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.source, self.field)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPattern {
    /// Priority order, deduplicated, capped
    pub selectors: Vec<String>,
    /// Always within `0..=100`
    pub confidence: u8,
    #[serde(default)]
    pub last_healed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_worked: Option<DateTime<Utc>>,
}

impl FieldPattern {
    /// Confirmed success of `selector`: bump confidence and move it to the front
    pub fn record_success(&mut self, selector: &str, now: DateTime<Utc>) {
        self.confidence = self
            .confidence
            .saturating_add(CONFIDENCE_SUCCESS_BONUS)
            .min(MAX_CONFIDENCE);
        if let Some(position) = self.selectors.iter().position(|s| s == selector) {
            if position != 0 {
                let promoted = self.selectors.remove(position);
                self.selectors.insert(0, promoted);
            }
        }
        self.last_worked = Some(now);
    }

    pub fn record_failure(&mut self) {
        self.confidence = self.confidence.saturating_sub(CONFIDENCE_FAILURE_PENALTY);
    }

    /// Build the pattern that results from a successful repair
    pub fn repaired(
        previous: Option<&Self>,
        candidates: &[String],
        baseline_confidence: u8,
        max_selectors: usize,
        now: DateTime<Utc>,
    ) -> Self {
        let existing = previous.map(|p| p.selectors.as_slice()).unwrap_or_default();
        Self {
            selectors: merge_selectors(candidates, existing, max_selectors),
            confidence: baseline_confidence.min(MAX_CONFIDENCE),
            last_healed: Some(now),
            last_worked: previous.and_then(|p| p.last_worked),
        }
    }
}

/// `front` followed by `rest`, blank entries dropped, first occurrence wins, capped
pub fn merge_selectors(front: &[String], rest: &[String], cap: usize) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(cap);
    for selector in front.iter().chain(rest) {
        if merged.len() >= cap {
            break;
        }
        let selector = selector.trim();
        if selector.is_empty() || merged.iter().any(|s| s == selector) {
            continue;
        }
        merged.push(selector.to_string());
    }
    merged
}

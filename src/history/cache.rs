// src/history/cache.rs

//! Stability-based cache decision.
//!
//! A key is served from history when its N most recent successes all carry
//! the same value. This is a heuristic about *stability*: a value that is
//! stably wrong is still a hit.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", content = "detail", rename_all = "snake_case")]
pub enum CacheDecision {
    /// The N most recent successes agree on this value.
    Hit(Value),
    /// The N most recent successes disagree.
    ValuesUnstable,
    /// Fewer than N successes, all equal; carries how many there are.
    InsufficientHistory(usize),
    /// No success recorded for the key.
    NoHistory,
}

impl CacheDecision {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheDecision::Hit(_))
    }

    pub fn hit_value(&self) -> Option<&Value> {
        match self {
            CacheDecision::Hit(v) => Some(v),
            _ => None,
        }
    }
}

/// Decide from the most recent success values (newest first).
///
/// Only the first `n` values are considered.
pub fn decide(recent_values: &[Value], n: usize) -> CacheDecision {
    let mut groups: Vec<(&Value, usize)> = Vec::new();

    for value in recent_values.iter().take(n) {
        match groups.iter_mut().find(|(seen, _)| *seen == value) {
            Some(group) => group.1 += 1,
            None => groups.push((value, 1)),
        }
    }

    match groups.as_slice() {
        [] => CacheDecision::NoHistory,
        [(value, count)] if *count == n => CacheDecision::Hit((*value).clone()),
        [(_, count)] => CacheDecision::InsufficientHistory(*count),
        _ => CacheDecision::ValuesUnstable,
    }
}

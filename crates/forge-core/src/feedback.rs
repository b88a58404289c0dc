//! Learning Feedback Channel (§2 item 9, §3 `PerformanceRecord`).
//!
//! Grounded on `crates/swarm-agents/src/config.rs`'s env-driven defaults idiom and
//! `state/types.rs`'s `ModelResult` builder style.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Complexity, ModelId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Partial,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub model: ModelId,
    pub task_type: String,
    pub language: String,
    pub complexity: Complexity,
    pub outcome: Outcome,
    pub score: f64,
    pub duration_ms: u64,
    pub iterations: u32,
    pub error_type: Option<String>,
    pub task_keywords: Vec<String>,
    pub context: String,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregate success rate for one model against one hint fingerprint.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuccessStats {
    pub attempts: u32,
    pub successes: u32,
}

impl SuccessStats {
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }
}

/// Append-only, concurrency-safe performance store consumed by the Selector.
///
/// Per §5: "The performance store is the only cross-job writable resource;
/// updates are append-only and safe under concurrent writes."
pub struct PerformanceStore {
    records: RwLock<Vec<PerformanceRecord>>,
}

impl PerformanceStore {
    pub fn new() -> Self {
        Self { records: RwLock::new(Vec::new()) }
    }

    pub fn record(&self, record: PerformanceRecord) {
        self.records.write().expect("performance store poisoned").push(record);
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("performance store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Historical success rate for `model` against the given fingerprint, or `None` if no
    /// data exists (the Selector falls back to priority-only ordering in that case).
    pub fn success_rate_for(&self, model: &str, fingerprint: &str) -> Option<f64> {
        let records = self.records.read().expect("performance store poisoned");
        let mut stats = SuccessStats::default();
        let mut seen = false;
        for record in records.iter() {
            if record.model != model {
                continue;
            }
            let mut keywords = record.task_keywords.clone();
            keywords.sort();
            let record_fp = {
                let hint = crate::model::SelectionHint {
                    language: Some(record.language.clone()),
                    complexity: Some(record.complexity),
                    keywords,
                };
                hint.fingerprint()
            };
            if record_fp != fingerprint {
                continue;
            }
            seen = true;
            stats.attempts += 1;
            if matches!(record.outcome, Outcome::Success) {
                stats.successes += 1;
            }
        }
        if seen {
            Some(stats.success_rate())
        } else {
            None
        }
    }
}

impl Default for PerformanceStore {
    fn default() -> Self {
        Self::new()
    }
}

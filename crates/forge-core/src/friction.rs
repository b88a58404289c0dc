//! Friction signals (§4.5): non-blocking diagnostics attached to
//! `timeline[].details.friction`, distinguishing a slow-but-converging job from a stuck one.
//!
//! Grounded on `escalation/friction.rs`'s oscillation/plateau/churn detectors, narrowed to the
//! three signals this spec names; these never change a DECIDE outcome.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrictionSignal {
    /// The set of reported issue categories flips between alternating iterations.
    ErrorOscillation { categories: Vec<String>, window: u32 },
    /// Error count has not strictly decreased across the trailing window.
    ErrorCountPlateau { count: usize, iterations: u32 },
    /// More than `threshold` distinct categories seen across the trailing window.
    CategoryChurn { unique_categories: usize, iterations: u32 },
}

/// One iteration's worth of validation outcome, as tracked for friction analysis.
#[derive(Debug, Clone)]
pub struct IterationSignal {
    pub categories: Vec<String>,
    pub error_count: usize,
}

const PLATEAU_WINDOW: usize = 4;
const CHURN_WINDOW: usize = 4;
const CHURN_THRESHOLD: usize = 3;

/// Detects friction signals over the trailing iteration window. `history` is ordered oldest
/// to newest and should already include the just-completed iteration.
pub fn detect(history: &[IterationSignal]) -> Vec<FrictionSignal> {
    let mut signals = Vec::new();

    if history.len() >= 4 {
        let window = &history[history.len() - 4..];
        let even: HashSet<&str> =
            window.iter().step_by(2).flat_map(|s| s.categories.iter().map(String::as_str)).collect();
        let odd: HashSet<&str> =
            window.iter().skip(1).step_by(2).flat_map(|s| s.categories.iter().map(String::as_str)).collect();
        let overlap: Vec<String> = even.intersection(&odd).map(|s| s.to_string()).collect();
        if !overlap.is_empty() {
            signals.push(FrictionSignal::ErrorOscillation { categories: overlap, window: window.len() as u32 });
        }
    }

    if history.len() >= PLATEAU_WINDOW {
        let window = &history[history.len() - PLATEAU_WINDOW..];
        let strictly_decreasing = window.windows(2).all(|pair| pair[1].error_count < pair[0].error_count);
        let last = window.last().unwrap().error_count;
        if !strictly_decreasing && last > 0 {
            signals.push(FrictionSignal::ErrorCountPlateau { count: last, iterations: window.len() as u32 });
        }
    }

    if history.len() >= CHURN_WINDOW {
        let window = &history[history.len() - CHURN_WINDOW..];
        let unique: HashSet<&str> = window.iter().flat_map(|s| s.categories.iter().map(String::as_str)).collect();
        if unique.len() > CHURN_THRESHOLD {
            signals.push(FrictionSignal::CategoryChurn { unique_categories: unique.len(), iterations: window.len() as u32 });
        }
    }

    signals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(cats: &[&str], count: usize) -> IterationSignal {
        IterationSignal { categories: cats.iter().map(|s| s.to_string()).collect(), error_count: count }
    }

    #[test]
    fn no_signals_with_too_short_a_history() {
        let history = vec![sig(&["type"], 3)];
        assert!(detect(&history).is_empty());
    }

    #[test]
    fn oscillating_categories_are_detected() {
        let history =
            vec![sig(&["lifetime"], 2), sig(&["type"], 2), sig(&["lifetime"], 2), sig(&["type"], 2)];
        let signals = detect(&history);
        assert!(signals.iter().any(|s| matches!(s, FrictionSignal::ErrorOscillation { .. })));
    }

    #[test]
    fn non_decreasing_error_count_is_a_plateau() {
        let history = vec![sig(&["a"], 5), sig(&["a"], 5), sig(&["a"], 5), sig(&["a"], 5)];
        let signals = detect(&history);
        assert!(signals.iter().any(|s| matches!(s, FrictionSignal::ErrorCountPlateau { count: 5, .. })));
    }

    #[test]
    fn strictly_decreasing_error_count_is_not_a_plateau() {
        let history = vec![sig(&["a"], 8), sig(&["a"], 6), sig(&["a"], 4), sig(&["a"], 2)];
        let signals = detect(&history);
        assert!(!signals.iter().any(|s| matches!(s, FrictionSignal::ErrorCountPlateau { .. })));
    }

    #[test]
    fn many_distinct_categories_is_churn() {
        let history = vec![sig(&["a"], 1), sig(&["b"], 1), sig(&["c"], 1), sig(&["d"], 1)];
        let signals = detect(&history);
        assert!(signals.iter().any(|s| matches!(s, FrictionSignal::CategoryChurn { .. })));
    }
}

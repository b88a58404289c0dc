//! Tier escalation decision logic (§4.1, §4.5 step 7 DECIDE).
//!
//! Grounded on `escalation/engine.rs`'s deterministic decide-from-state shape, narrowed to the
//! three outcomes this spec actually names: Complete, keep iterating (optionally with a tier
//! unlocked), or Failed.

use serde::{Deserialize, Serialize};

use crate::model::Tier;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    pub min_score: f64,
    /// Lower acceptable-with-issues floor; only honored once `iteration >= floor_min_iteration`.
    pub floor_score: f64,
    pub floor_min_iteration: u32,
    /// Failed attempts before the Cloud tier unlocks.
    pub tier1_threshold: u32,
    /// Failed attempts before the Premium tier unlocks.
    pub tier2_threshold: u32,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self { min_score: 8.0, floor_score: 6.5, floor_min_iteration: 3, tier1_threshold: 3, tier2_threshold: 6 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationDecision {
    /// score >= minScore, or score >= floorScore with iteration past the floor minimum.
    Complete { acceptable_with_issues: bool },
    /// Keep iterating; `unlocked_tier` is the highest tier the Selector may now draw from.
    Continue { unlocked_tier: Tier },
    /// iteration == maxIterations with no passing score.
    Failed,
}

/// Implements §4.5 step 7. `failed_attempts` is the count of completed, non-passing
/// iterations so far (used purely for tier-unlock thresholds, independent of the decision
/// itself).
pub fn decide(
    config: &EscalationConfig,
    score: f64,
    iteration: u32,
    max_iterations: u32,
    failed_attempts: u32,
) -> EscalationDecision {
    if score >= config.min_score {
        return EscalationDecision::Complete { acceptable_with_issues: false };
    }
    if score >= config.floor_score && iteration >= config.floor_min_iteration {
        return EscalationDecision::Complete { acceptable_with_issues: true };
    }
    if iteration < max_iterations {
        return EscalationDecision::Continue { unlocked_tier: unlocked_tier_for(config, failed_attempts) };
    }
    EscalationDecision::Failed
}

fn unlocked_tier_for(config: &EscalationConfig, failed_attempts: u32) -> Tier {
    if failed_attempts >= config.tier2_threshold {
        Tier::Premium
    } else if failed_attempts >= config.tier1_threshold {
        Tier::Cloud
    } else {
        Tier::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_above_min_completes_cleanly() {
        let cfg = EscalationConfig::default();
        let decision = decide(&cfg, 8.5, 2, 10, 0);
        assert_eq!(decision, EscalationDecision::Complete { acceptable_with_issues: false });
    }

    #[test]
    fn score_above_floor_but_before_min_iteration_keeps_iterating() {
        let cfg = EscalationConfig::default();
        let decision = decide(&cfg, 7.0, 1, 10, 0);
        assert_eq!(decision, EscalationDecision::Continue { unlocked_tier: Tier::Local });
    }

    #[test]
    fn score_above_floor_after_min_iteration_completes_with_issues() {
        let cfg = EscalationConfig::default();
        let decision = decide(&cfg, 7.0, 3, 10, 0);
        assert_eq!(decision, EscalationDecision::Complete { acceptable_with_issues: true });
    }

    #[test]
    fn low_score_before_max_iterations_unlocks_cloud_after_threshold() {
        let cfg = EscalationConfig::default();
        let decision = decide(&cfg, 2.0, 4, 10, 3);
        assert_eq!(decision, EscalationDecision::Continue { unlocked_tier: Tier::Cloud });
    }

    #[test]
    fn low_score_unlocks_premium_after_second_threshold() {
        let cfg = EscalationConfig::default();
        let decision = decide(&cfg, 2.0, 7, 10, 6);
        assert_eq!(decision, EscalationDecision::Continue { unlocked_tier: Tier::Premium });
    }

    #[test]
    fn low_score_at_max_iterations_fails() {
        let cfg = EscalationConfig::default();
        let decision = decide(&cfg, 2.0, 10, 10, 9);
        assert_eq!(decision, EscalationDecision::Failed);
    }
}

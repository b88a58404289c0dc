//! Model Registry & Selector (§4.1).
//!
//! Grounded on `registry/mod.rs`'s capability table and
//! `router/circuit_breaker.rs`'s `FallbackLadder` (ordered candidates, excluded set).

use std::collections::HashSet;

use crate::feedback::PerformanceStore;
use crate::model::{ModelDescriptor, ModelId, Purpose, SelectionHint, Tier};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no models configured for purpose {0:?}")]
    EmptyCatalog(Purpose),
}

/// Configured catalog of models, read-only at run time (§5).
pub struct ModelRegistry {
    catalog: Vec<ModelDescriptor>,
}

impl ModelRegistry {
    pub fn new(catalog: Vec<ModelDescriptor>) -> Self {
        Self { catalog }
    }

    /// Validates that the catalog satisfies §6.3: at least one Thinking model, one
    /// Validation model, and one CodeGeneration model per tier actually referenced.
    pub fn validate(&self) -> Result<(), RegistryError> {
        for purpose in [Purpose::Thinking, Purpose::Validation, Purpose::CodeGeneration] {
            if !self.catalog.iter().any(|m| m.purpose == purpose) {
                return Err(RegistryError::EmptyCatalog(purpose));
            }
        }
        Ok(())
    }

    /// The pinned lowest-tier model for a purpose, always assumed loaded/available.
    pub fn primary(&self, purpose: Purpose) -> Result<&ModelDescriptor, RegistryError> {
        self.catalog
            .iter()
            .filter(|m| m.purpose == purpose)
            .min_by_key(|m| (m.tier, m.priority))
            .ok_or(RegistryError::EmptyCatalog(purpose))
    }

    pub fn by_purpose(&self, purpose: Purpose) -> impl Iterator<Item = &ModelDescriptor> {
        self.catalog.iter().filter(move |m| m.purpose == purpose)
    }
}

/// Selector: picks the next candidate model given exclusions and unlocked tiers.
pub struct Selector<'a> {
    registry: &'a ModelRegistry,
    store: &'a PerformanceStore,
}

impl<'a> Selector<'a> {
    pub fn new(registry: &'a ModelRegistry, store: &'a PerformanceStore) -> Self {
        Self { registry, store }
    }

    /// Returns the next candidate satisfying: purpose matches; id not excluded; tier is one
    /// of `unlocked_tiers`; resource weight fits `weight_budget`; language support matches if
    /// a language hint is given. Ties on priority are broken by historical success rate for
    /// the hint; missing history falls back to priority-only ordering. Returns `None` when
    /// every candidate is excluded.
    pub fn select_next(
        &self,
        purpose: Purpose,
        excluded: &HashSet<ModelId>,
        unlocked_tiers: &[Tier],
        hint: &SelectionHint,
        weight_budget: u32,
    ) -> Option<ModelDescriptor> {
        let fingerprint = hint.fingerprint();
        let mut candidates: Vec<&ModelDescriptor> = self
            .registry
            .by_purpose(purpose)
            .filter(|m| !excluded.contains(&m.id))
            .filter(|m| unlocked_tiers.contains(&m.tier))
            .filter(|m| m.approximate_weight <= weight_budget)
            .filter(|m| match &hint.language {
                Some(lang) => m.supports_language(lang),
                None => true,
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.tier
                .cmp(&b.tier)
                .then(a.priority.cmp(&b.priority))
                .then_with(|| {
                    let rate_a = self.store.success_rate_for(&a.id, &fingerprint).unwrap_or(-1.0);
                    let rate_b = self.store.success_rate_for(&b.id, &fingerprint).unwrap_or(-1.0);
                    // Higher success rate sorts first.
                    rate_b.partial_cmp(&rate_a).unwrap_or(std::cmp::Ordering::Equal)
                })
        });

        candidates.into_iter().next().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::{Outcome, PerformanceRecord};
    use crate::model::Complexity;
    use chrono::Utc;

    fn descriptor(id: &str, purpose: Purpose, tier: Tier, priority: u32) -> ModelDescriptor {
        ModelDescriptor {
            id: id.into(),
            purpose,
            tier,
            approximate_weight: 1,
            priority,
            supported_languages: None,
        }
    }

    #[test]
    fn validate_fails_when_a_required_purpose_is_missing() {
        let registry = ModelRegistry::new(vec![descriptor(
            "codegen-1",
            Purpose::CodeGeneration,
            Tier::Local,
            0,
        )]);
        assert!(registry.validate().is_err());
    }

    #[test]
    fn primary_picks_lowest_tier_then_lowest_priority() {
        let registry = ModelRegistry::new(vec![
            descriptor("cloud-1", Purpose::CodeGeneration, Tier::Cloud, 0),
            descriptor("local-1", Purpose::CodeGeneration, Tier::Local, 1),
            descriptor("local-0", Purpose::CodeGeneration, Tier::Local, 0),
        ]);
        let primary = registry.primary(Purpose::CodeGeneration).unwrap();
        assert_eq!(primary.id, "local-0");
    }

    #[test]
    fn select_next_excludes_tried_models() {
        let registry = ModelRegistry::new(vec![
            descriptor("local-0", Purpose::CodeGeneration, Tier::Local, 0),
            descriptor("local-1", Purpose::CodeGeneration, Tier::Local, 1),
        ]);
        let store = PerformanceStore::new();
        let selector = Selector::new(&registry, &store);
        let excluded: HashSet<ModelId> = ["local-0".to_string()].into_iter().collect();
        let picked = selector
            .select_next(Purpose::CodeGeneration, &excluded, &[Tier::Local], &SelectionHint::default(), 100)
            .unwrap();
        assert_eq!(picked.id, "local-1");
    }

    #[test]
    fn select_next_returns_none_when_all_excluded() {
        let registry =
            ModelRegistry::new(vec![descriptor("local-0", Purpose::CodeGeneration, Tier::Local, 0)]);
        let store = PerformanceStore::new();
        let selector = Selector::new(&registry, &store);
        let excluded: HashSet<ModelId> = ["local-0".to_string()].into_iter().collect();
        assert!(selector
            .select_next(Purpose::CodeGeneration, &excluded, &[Tier::Local], &SelectionHint::default(), 100)
            .is_none());
    }

    #[test]
    fn select_next_locked_tier_is_unreachable_until_unlocked() {
        let registry = ModelRegistry::new(vec![descriptor(
            "cloud-0",
            Purpose::CodeGeneration,
            Tier::Cloud,
            0,
        )]);
        let store = PerformanceStore::new();
        let selector = Selector::new(&registry, &store);
        let excluded = HashSet::new();
        assert!(selector
            .select_next(Purpose::CodeGeneration, &excluded, &[Tier::Local], &SelectionHint::default(), 100)
            .is_none());
        assert!(selector
            .select_next(Purpose::CodeGeneration, &excluded, &[Tier::Local, Tier::Cloud], &SelectionHint::default(), 100)
            .is_some());
    }

    #[test]
    fn select_next_breaks_priority_ties_on_historical_success_rate() {
        let registry = ModelRegistry::new(vec![
            descriptor("a", Purpose::CodeGeneration, Tier::Local, 0),
            descriptor("b", Purpose::CodeGeneration, Tier::Local, 0),
        ]);
        let store = PerformanceStore::new();
        let hint = SelectionHint {
            language: Some("rust".into()),
            complexity: Some(Complexity::Simple),
            keywords: vec![],
        };
        let fp = hint.fingerprint();
        let _ = fp;
        store.record(PerformanceRecord {
            model: "b".into(),
            task_type: "code_generation".into(),
            language: "rust".into(),
            complexity: Complexity::Simple,
            outcome: Outcome::Success,
            score: 9.0,
            duration_ms: 100,
            iterations: 1,
            error_type: None,
            task_keywords: vec![],
            context: "t".into(),
            recorded_at: Utc::now(),
        });
        let selector = Selector::new(&registry, &store);
        let picked = selector
            .select_next(Purpose::CodeGeneration, &HashSet::new(), &[Tier::Local], &hint, 100)
            .unwrap();
        assert_eq!(picked.id, "b");
    }

    #[test]
    fn select_next_respects_language_support() {
        let registry = ModelRegistry::new(vec![ModelDescriptor {
            id: "csharp-only".into(),
            purpose: Purpose::CodeGeneration,
            tier: Tier::Local,
            approximate_weight: 1,
            priority: 0,
            supported_languages: Some(vec!["csharp".into()]),
        }]);
        let store = PerformanceStore::new();
        let selector = Selector::new(&registry, &store);
        let hint = SelectionHint { language: Some("python".into()), ..Default::default() };
        assert!(selector
            .select_next(Purpose::CodeGeneration, &HashSet::new(), &[Tier::Local], &hint, 100)
            .is_none());
    }

    #[test]
    fn select_next_excludes_candidates_whose_weight_exceeds_the_budget() {
        let registry = ModelRegistry::new(vec![
            ModelDescriptor {
                id: "premium-heavy".into(),
                purpose: Purpose::CodeGeneration,
                tier: Tier::Local,
                approximate_weight: 10,
                priority: 0,
                supported_languages: None,
            },
            descriptor("local-light", Purpose::CodeGeneration, Tier::Local, 1),
        ]);
        let store = PerformanceStore::new();
        let selector = Selector::new(&registry, &store);
        let picked = selector
            .select_next(Purpose::CodeGeneration, &HashSet::new(), &[Tier::Local], &SelectionHint::default(), 4)
            .unwrap();
        assert_eq!(picked.id, "local-light");
        assert!(selector
            .select_next(Purpose::CodeGeneration, &HashSet::new(), &[Tier::Local], &SelectionHint::default(), 0)
            .is_none());
    }
}

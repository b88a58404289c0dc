//! Catalog types for the Model Registry & Selector (§3, §4.1).

use serde::{Deserialize, Serialize};

/// Opaque model identifier, e.g. "qwen2.5-coder-7b" or "claude-opus-4".
pub type ModelId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    CodeGeneration,
    Thinking,
    Validation,
    General,
}

/// Cost/capability class. Local < Cloud < Premium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Local,
    Cloud,
    Premium,
}

impl Tier {
    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::Local => Some(Tier::Cloud),
            Tier::Cloud => Some(Tier::Premium),
            Tier::Premium => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: ModelId,
    pub purpose: Purpose,
    pub tier: Tier,
    /// Approximate resource weight, in arbitrary units comparable within a deployment's
    /// declared budget.
    pub approximate_weight: u32,
    /// Lower tries first within a tier.
    pub priority: u32,
    #[serde(default)]
    pub supported_languages: Option<Vec<String>>,
}

impl ModelDescriptor {
    pub fn supports_language(&self, language: &str) -> bool {
        match &self.supported_languages {
            None => true,
            Some(langs) => langs.iter().any(|l| l.eq_ignore_ascii_case(language)),
        }
    }
}

/// Complexity bucket for a task, used as part of a `SelectionHint`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
    VeryComplex,
}

/// Hint passed to `selectNext` so historical stats can be consulted for this shape of task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionHint {
    pub language: Option<String>,
    pub complexity: Option<Complexity>,
    pub keywords: Vec<String>,
}

impl SelectionHint {
    /// Stable key for looking up historical success rate, independent of keyword order.
    pub fn fingerprint(&self) -> String {
        let mut keywords = self.keywords.clone();
        keywords.sort();
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.language.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"|");
        if let Some(c) = self.complexity {
            hasher.update(format!("{:?}", c).as_bytes());
        }
        hasher.update(b"|");
        hasher.update(keywords.join(",").as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_escalates_local_to_cloud_to_premium() {
        assert_eq!(Tier::Local.next(), Some(Tier::Cloud));
        assert_eq!(Tier::Cloud.next(), Some(Tier::Premium));
        assert_eq!(Tier::Premium.next(), None);
    }

    #[test]
    fn descriptor_with_no_language_list_supports_everything() {
        let d = ModelDescriptor {
            id: "m".into(),
            purpose: Purpose::CodeGeneration,
            tier: Tier::Local,
            approximate_weight: 1,
            priority: 0,
            supported_languages: None,
        };
        assert!(d.supports_language("rust"));
    }

    #[test]
    fn descriptor_with_language_list_is_case_insensitive() {
        let d = ModelDescriptor {
            id: "m".into(),
            purpose: Purpose::CodeGeneration,
            tier: Tier::Local,
            approximate_weight: 1,
            priority: 0,
            supported_languages: Some(vec!["CSharp".into()]),
        };
        assert!(d.supports_language("csharp"));
        assert!(!d.supports_language("python"));
    }

    #[test]
    fn hint_fingerprint_is_stable_regardless_of_keyword_order() {
        let a = SelectionHint {
            language: Some("rust".into()),
            complexity: Some(Complexity::Complex),
            keywords: vec!["async".into(), "trait".into()],
        };
        let b = SelectionHint {
            language: Some("rust".into()),
            complexity: Some(Complexity::Complex),
            keywords: vec!["trait".into(), "async".into()],
        };
        assert_eq!(a.fingerprint(), b.fingerprint());
    }
}

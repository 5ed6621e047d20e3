//! Versioned condition keyword dictionary.
//!
//! Raw condition names rarely appear verbatim in intake answers, so each
//! canonical condition key carries a list of colloquial synonyms. Age
//! thresholds live in the same file. The dictionary is data: the bundled
//! copy ships in `resources/condition_keywords.json` and a practice can
//! point the resolver at its own file instead.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::normalize::{normalize_key, normalize_text};
use super::types::AlertError;

const BUNDLED_DICTIONARY: &str = include_str!("../../resources/condition_keywords.json");

#[derive(Debug, Deserialize)]
struct RawDictionary {
    version: u32,
    conditions: Vec<RawEntry>,
    #[serde(default)]
    age_rules: Vec<AgeRule>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    key: String,
    keywords: Vec<String>,
}

/// Synonyms for one canonical condition key, already normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordEntry {
    /// Key form (see [`normalize_key`]).
    pub key: String,
    pub keywords: Vec<String>,
}

/// Infers `key` for every individual strictly younger than `below_age`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRule {
    pub key: String,
    pub below_age: u32,
}

#[derive(Debug, Clone)]
pub struct ConditionKeywords {
    version: u32,
    entries: Vec<KeywordEntry>,
    age_rules: Vec<AgeRule>,
}

impl ConditionKeywords {
    /// The dictionary compiled into the crate.
    pub fn bundled() -> Result<Self, AlertError> {
        Self::from_json(BUNDLED_DICTIONARY)
    }

    pub fn from_path(path: &Path) -> Result<Self, AlertError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| AlertError::ReferenceDataLoad(path.display().to_string(), e.to_string()))?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, AlertError> {
        let raw: RawDictionary =
            serde_json::from_str(json).map_err(|e| AlertError::KeywordDictionary(e.to_string()))?;

        if raw.version == 0 {
            return Err(AlertError::KeywordDictionary("version must be positive".into()));
        }

        let mut entries = Vec::with_capacity(raw.conditions.len());
        for entry in raw.conditions {
            let key = normalize_key(&entry.key);
            if key.is_empty() {
                return Err(AlertError::KeywordDictionary("empty condition key".into()));
            }
            let mut keywords = Vec::with_capacity(entry.keywords.len());
            for keyword in &entry.keywords {
                let normalized = normalize_text(keyword);
                // An empty keyword would be a substring of every intake.
                if normalized.is_empty() {
                    return Err(AlertError::KeywordDictionary(format!(
                        "empty keyword under '{}'",
                        entry.key
                    )));
                }
                if !keywords.contains(&normalized) {
                    keywords.push(normalized);
                }
            }
            entries.push(KeywordEntry { key, keywords });
        }

        let mut age_rules = raw.age_rules;
        for rule in &mut age_rules {
            rule.key = normalize_key(&rule.key);
            if rule.key.is_empty() {
                return Err(AlertError::KeywordDictionary("empty age rule key".into()));
            }
        }

        tracing::debug!(
            version = raw.version,
            conditions = entries.len(),
            age_rules = age_rules.len(),
            "Condition keyword dictionary loaded"
        );

        Ok(Self {
            version: raw.version,
            entries,
            age_rules,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn entries(&self) -> &[KeywordEntry] {
        &self.entries
    }

    pub fn age_rules(&self) -> &[AgeRule] {
        &self.age_rules
    }

    /// Keys with at least one keyword contained in already-normalized text.
    pub fn keys_mentioned<'a>(&'a self, normalized_text: &'a str) -> impl Iterator<Item = &'a str> {
        self.entries
            .iter()
            .filter(move |e| e.keywords.iter().any(|k| normalized_text.contains(k.as_str())))
            .map(|e| e.key.as_str())
    }

    /// Keys implied by an age, independent of any text.
    pub fn keys_for_age(&self, age_years: u32) -> impl Iterator<Item = &str> {
        self.age_rules
            .iter()
            .filter(move |r| age_years < r.below_age)
            .map(|r| r.key.as_str())
    }
}

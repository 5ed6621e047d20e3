//! Free-text substance resolution.
//!
//! A phrase matches a substance when, after normalization, the phrase
//! contains the canonical name or an alias, or the name/alias contains the
//! phrase. The rule is deliberately permissive (plurals, partial and
//! abbreviated mentions) and has no token-boundary check, so short names
//! can match inside unrelated words.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use crate::models::Substance;

use super::catalog::CatalogSnapshot;
use super::normalize::normalize_text;

/// Phrase delimiters in care-plan sections.
static RE_DELIMITERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,;\r\n•·]+").unwrap());

/// Leading list markers: "- ", "* ", "1. ", "2) ".
static RE_LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+").unwrap());

/// Split care-plan text into candidate substance phrases.
pub fn split_plan_phrases(text: &str) -> Vec<String> {
    RE_DELIMITERS
        .split(text)
        .map(|part| RE_LIST_MARKER.replace(part, "").trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

/// Substances resolved from plan text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchedSubstances {
    pub ids: HashSet<Uuid>,
    pub by_id: HashMap<Uuid, Substance>,
}

impl MatchedSubstances {
    pub fn contains(&self, id: &Uuid) -> bool {
        self.ids.contains(id)
    }

    pub fn name(&self, id: &Uuid) -> Option<&str> {
        self.by_id.get(id).map(|s| s.canonical_name.as_str())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

struct IndexedSubstance<'a> {
    substance: &'a Substance,
    /// Normalized canonical name followed by normalized aliases, no empties.
    forms: Vec<String>,
}

/// Matcher over one catalog snapshot, with every name normalized once.
pub struct SubstanceMatcher<'a> {
    index: Vec<IndexedSubstance<'a>>,
}

impl<'a> SubstanceMatcher<'a> {
    pub fn new(catalog: &'a CatalogSnapshot) -> Self {
        let index = catalog
            .substances()
            .iter()
            .map(|substance| {
                let mut forms: Vec<String> = Vec::with_capacity(substance.aliases.len() + 1);
                for raw in std::iter::once(&substance.canonical_name).chain(substance.aliases.iter()) {
                    let form = normalize_text(raw);
                    if !form.is_empty() && !forms.contains(&form) {
                        forms.push(form);
                    }
                }
                IndexedSubstance { substance, forms }
            })
            .collect();
        Self { index }
    }

    /// Whether one phrase matches one catalog substance.
    pub fn phrase_matches(&self, phrase: &str, substance_id: &Uuid) -> bool {
        let phrase = normalize_text(phrase);
        self.index
            .iter()
            .find(|entry| entry.substance.id == *substance_id)
            .is_some_and(|entry| forms_match(&phrase, &entry.forms))
    }

    pub fn match_phrases(&self, phrases: &[String]) -> MatchedSubstances {
        let mut matched = MatchedSubstances::default();

        for phrase in phrases {
            let phrase = normalize_text(phrase);
            if phrase.is_empty() {
                continue;
            }
            for entry in &self.index {
                if matched.ids.contains(&entry.substance.id) {
                    continue;
                }
                if forms_match(&phrase, &entry.forms) {
                    matched.ids.insert(entry.substance.id);
                    matched
                        .by_id
                        .insert(entry.substance.id, entry.substance.clone());
                }
            }
        }

        matched
    }

    /// Split plan text and match every phrase.
    pub fn match_plan(&self, plan_text: &str) -> MatchedSubstances {
        self.match_phrases(&split_plan_phrases(plan_text))
    }
}

fn forms_match(phrase: &str, forms: &[String]) -> bool {
    !phrase.is_empty()
        && forms
            .iter()
            .any(|form| phrase.contains(form.as_str()) || form.contains(phrase))
}

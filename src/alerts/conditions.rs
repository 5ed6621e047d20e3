//! Condition inference from intake answers and demographics.
//!
//! Three independent rules feed the inferred set:
//! 1. a catalog condition's normalized name appears in the normalized answers;
//! 2. a keyword from the versioned dictionary appears, inferring its key;
//! 3. an age threshold holds (no text needed).
//!
//! Negated statements are not detected: "pas d'anticoagulant" still infers
//! anticoagulants. Over-alerting is the current product stance.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Condition;

use super::catalog::CatalogSnapshot;
use super::keywords::ConditionKeywords;
use super::normalize::{normalize_key, normalize_text};
use super::types::AlertError;

/// Joins answers so a condition name never matches across two answers.
const ANSWER_SEPARATOR: &str = " | ";

/// Flattened intake answers and demographics for one individual.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeProfile {
    pub answers: Vec<String>,
    pub age_years: Option<u32>,
    pub birth_date: Option<NaiveDate>,
}

impl IntakeProfile {
    /// Explicit age wins; otherwise derived from the birth date.
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        self.age_years
            .or_else(|| self.birth_date.and_then(|born| today.years_since(born)))
    }
}

/// Read access to the health-intake store.
pub trait IntakeSource: Send + Sync {
    fn load_intake(&self, individual_id: &Uuid) -> Result<IntakeProfile, AlertError>;
}

/// Conditions inferred for one individual, with display names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferredConditions {
    pub ids: HashSet<Uuid>,
    pub names: HashMap<Uuid, String>,
}

impl InferredConditions {
    pub fn insert(&mut self, condition: &Condition) {
        if self.ids.insert(condition.id) {
            self.names.insert(condition.id, condition.name.clone());
        }
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.ids.contains(id)
    }

    pub fn name(&self, id: &Uuid) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

pub struct ConditionResolver {
    keywords: ConditionKeywords,
}

impl ConditionResolver {
    pub fn new(keywords: ConditionKeywords) -> Self {
        Self { keywords }
    }

    pub fn keywords(&self) -> &ConditionKeywords {
        &self.keywords
    }

    /// Infer conditions as of today.
    pub fn infer(&self, intake: &IntakeProfile, catalog: &CatalogSnapshot) -> InferredConditions {
        self.infer_on(intake, catalog, chrono::Local::now().date_naive())
    }

    pub fn infer_on(
        &self,
        intake: &IntakeProfile,
        catalog: &CatalogSnapshot,
        today: NaiveDate,
    ) -> InferredConditions {
        let mut inferred = InferredConditions::default();

        let text = intake
            .answers
            .iter()
            .map(|a| normalize_text(a))
            .filter(|a| !a.is_empty())
            .collect::<Vec<_>>()
            .join(ANSWER_SEPARATOR);

        let by_key: HashMap<String, &Condition> = catalog
            .conditions()
            .iter()
            .map(|c| (normalize_key(&c.name), c))
            .collect();

        if !text.is_empty() {
            for condition in catalog.conditions() {
                let name = normalize_text(&condition.name);
                if !name.is_empty() && text.contains(&name) {
                    inferred.insert(condition);
                }
            }

            for key in self.keywords.keys_mentioned(&text) {
                match by_key.get(key) {
                    Some(condition) => inferred.insert(condition),
                    None => tracing::debug!(key, "Keyword key has no catalog condition"),
                }
            }
        }

        if let Some(age) = intake.age_on(today) {
            for key in self.keywords.keys_for_age(age) {
                if let Some(condition) = by_key.get(key) {
                    inferred.insert(condition);
                }
            }
        }

        inferred
    }
}

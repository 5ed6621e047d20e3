use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Severity;

/// An herb, supplement or essential oil that can appear in a care plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substance {
    pub id: Uuid,
    pub canonical_name: String,
    #[serde(default)]
    pub aliases: BTreeSet<String>,
}

/// A health state, demographic bracket or concurrent-medication category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContraindicationRule {
    pub id: Uuid,
    pub substance_id: Uuid,
    pub condition_id: Uuid,
    pub severity: Severity,
    pub message_text: String,
    #[serde(default)]
    pub recommendation_text: String,
    #[serde(default)]
    pub source_citation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstanceInteractionRule {
    pub id: Uuid,
    pub substance_a_id: Uuid,
    pub substance_b_id: Uuid,
    pub severity: Severity,
    pub message_text: String,
    #[serde(default)]
    pub recommendation_text: String,
    #[serde(default)]
    pub source_citation: String,
}

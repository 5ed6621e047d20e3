use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{RuleKind, Severity};

/// A practitioner's durable acknowledgement of one rule for one individual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcknowledgementRecord {
    pub practitioner_id: Uuid,
    pub individual_id: Uuid,
    pub rule_id: Uuid,
    pub rule_kind: RuleKind,
    pub severity: Severity,
    pub acknowledged_at: NaiveDateTime,
}

//! Alert, snapshot, status and error types shared by the alert pipeline.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::{CatalogTable, RuleKind, Severity};

// ---------------------------------------------------------------------------
// Alert
// ---------------------------------------------------------------------------

/// A rule whose conditions currently hold for an individual.
/// Derived on every evaluation, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Stable per (individual, rule), see [`alert_id`].
    pub id: Uuid,
    pub rule_id: Uuid,
    pub rule_kind: RuleKind,
    pub severity: Severity,
    /// The matched substance (substance A for interactions).
    pub subject_name: String,
    /// The inferred condition, or substance B for interactions.
    pub counterpart_name: String,
    pub message_text: String,
    pub recommendation_text: String,
    pub source_citation: String,
    pub acknowledged: bool,
}

/// Namespace for alert ids (UUIDv5 over individual + rule).
const ALERT_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_9b3d_4c7a_8e21_5d0f_a3b9_c417);

/// Deterministic alert id so identical inputs always yield identical alerts.
pub fn alert_id(individual_id: &Uuid, rule_id: &Uuid) -> Uuid {
    let mut name = [0u8; 32];
    name[..16].copy_from_slice(individual_id.as_bytes());
    name[16..].copy_from_slice(rule_id.as_bytes());
    Uuid::new_v5(&ALERT_NAMESPACE, &name)
}

// ---------------------------------------------------------------------------
// SeverityCounts
// ---------------------------------------------------------------------------

/// Per-severity counts, used for summary banners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SeverityCounts {
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
}

impl SeverityCounts {
    /// Count the alerts that are not yet acknowledged.
    pub fn unacknowledged(alerts: &[Alert]) -> Self {
        let mut counts = Self::default();
        for alert in alerts.iter().filter(|a| !a.acknowledged) {
            match alert.severity {
                Severity::Critical => counts.critical += 1,
                Severity::Warning => counts.warning += 1,
                Severity::Info => counts.info += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.critical + self.warning + self.info
    }
}

// ---------------------------------------------------------------------------
// Evaluation status
// ---------------------------------------------------------------------------

/// A partial input that degraded an evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvaluationIssue {
    /// One or more catalog tables did not load; their rules produced nothing.
    CatalogUnavailable { tables: Vec<CatalogTable> },
    /// Intake data unreachable; the inferred condition set was empty.
    ConditionInferenceFailed { reason: String },
    /// Prior acknowledgements unreadable; every alert is shown unacknowledged.
    LedgerReadFailed { reason: String },
}

/// Lets callers tell "no concerns" apart from "did not run".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvaluationStatus {
    /// No evaluation has been published yet.
    Pending,
    /// Ran with all inputs. An empty alert list means no concerns.
    Complete,
    /// Ran with partial inputs. Alerts shown are a lower bound.
    Degraded { issues: Vec<EvaluationIssue> },
    /// Could not evaluate. The alert list is empty but means nothing.
    Unavailable { reason: String },
}

impl EvaluationStatus {
    pub fn from_issues(issues: Vec<EvaluationIssue>) -> Self {
        if issues.is_empty() {
            Self::Complete
        } else {
            Self::Degraded { issues }
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

// ---------------------------------------------------------------------------
// AlertSnapshot
// ---------------------------------------------------------------------------

/// What the controller publishes to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSnapshot {
    pub individual_id: Option<Uuid>,
    /// Token of the evaluation that produced this snapshot.
    pub token: u64,
    pub status: EvaluationStatus,
    /// Sorted critical → warning → info.
    pub alerts: Vec<Alert>,
    pub unacknowledged: SeverityCounts,
    pub evaluated_at: Option<NaiveDateTime>,
    pub processing_time_ms: u64,
}

impl AlertSnapshot {
    pub fn pending() -> Self {
        Self {
            individual_id: None,
            token: 0,
            status: EvaluationStatus::Pending,
            alerts: Vec::new(),
            unacknowledged: SeverityCounts::default(),
            evaluated_at: None,
            processing_time_ms: 0,
        }
    }

    pub fn find_by_rule(&self, rule_id: &Uuid) -> Option<&Alert> {
        self.alerts.iter().find(|a| a.rule_id == *rule_id)
    }

    /// Plan sharing stays blocked while a critical alert is unacknowledged
    /// or the evaluation did not complete.
    pub fn blocks_sharing(&self) -> bool {
        !self.status.is_complete() || self.unacknowledged.critical > 0
    }
}

// ---------------------------------------------------------------------------
// EvaluationRequest
// ---------------------------------------------------------------------------

/// One care-plan edit/save event from the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub individual_id: Uuid,
    /// Free-text substance mentions from the plan sections.
    pub plan_text: String,
}

impl EvaluationRequest {
    pub fn new(individual_id: Uuid, plan_text: impl Into<String>) -> Self {
        Self {
            individual_id,
            plan_text: plan_text.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AlertError
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Catalog unavailable: {tables:?}")]
    CatalogUnavailable { tables: Vec<CatalogTable> },

    #[error("Condition inference failed: {0}")]
    ConditionInferenceFailed(String),

    #[error("Acknowledgement not persisted: {0}")]
    LedgerWriteFailed(String),

    #[error("Acknowledgements could not be read: {0}")]
    LedgerReadFailed(String),

    #[error("{step} timed out after {timeout_ms} ms")]
    Timeout { step: &'static str, timeout_ms: u64 },

    #[error("Evaluation {token} superseded by a newer request")]
    Superseded { token: u64 },

    #[error("No alert for rule {0} in the current evaluation")]
    AlertNotFound(Uuid),

    #[error("No evaluation has been published yet")]
    NoEvaluation,

    #[error("Keyword dictionary invalid: {0}")]
    KeywordDictionary(String),

    #[error("Reference data load failed ({0}): {1}")]
    ReferenceDataLoad(String, String),

    #[error("Reference data parse failed ({0}): {1}")]
    ReferenceDataParse(String, String),

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("Internal lock failed")]
    LockFailed,
}

impl AlertError {
    /// Errors worth another attempt after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Database(_)
                | Self::Timeout { .. }
                | Self::LedgerReadFailed(_)
                | Self::LedgerWriteFailed(_)
                | Self::ConditionInferenceFailed(_)
                | Self::ReferenceDataLoad(..)
                | Self::TaskFailed(_)
        )
    }
}

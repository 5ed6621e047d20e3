//! Durable practitioner acknowledgements.
//!
//! The ledger is the only durable state of the engine. Records are keyed on
//! (individual, rule); acknowledging again is a no-op that still succeeds.
//! There is no delete path.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use uuid::Uuid;

use crate::db;
use crate::models::enums::{RuleKind, Severity};
use crate::models::AcknowledgementRecord;

use super::types::AlertError;

pub trait AcknowledgementLedger: Send + Sync {
    /// Idempotent upsert of an acknowledgement by `actor_id`.
    fn acknowledge(
        &self,
        individual_id: &Uuid,
        rule_id: &Uuid,
        rule_kind: RuleKind,
        severity: Severity,
        actor_id: &Uuid,
    ) -> Result<(), AlertError>;

    /// Rule ids already acknowledged for an individual.
    fn load_acknowledged(&self, individual_id: &Uuid) -> Result<HashSet<Uuid>, AlertError>;

    /// Full records for an individual, oldest first.
    fn list_records(&self, individual_id: &Uuid) -> Result<Vec<AcknowledgementRecord>, AlertError>;
}

/// Ledger backed by the `acknowledgements` table.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: &Path) -> Result<Self, AlertError> {
        Ok(Self::new(db::open_database(path)?))
    }
}

impl AcknowledgementLedger for SqliteLedger {
    fn acknowledge(
        &self,
        individual_id: &Uuid,
        rule_id: &Uuid,
        rule_kind: RuleKind,
        severity: Severity,
        actor_id: &Uuid,
    ) -> Result<(), AlertError> {
        let record = AcknowledgementRecord {
            practitioner_id: *actor_id,
            individual_id: *individual_id,
            rule_id: *rule_id,
            rule_kind,
            severity,
            acknowledged_at: chrono::Local::now().naive_local(),
        };

        let conn = self.conn.lock().map_err(|_| AlertError::LockFailed)?;
        let inserted = db::insert_acknowledgement(&conn, &record)
            .map_err(|e| AlertError::LedgerWriteFailed(e.to_string()))?;

        if inserted {
            tracing::info!(
                individual_id = %individual_id,
                rule_id = %rule_id,
                severity = severity.as_str(),
                "Acknowledgement recorded"
            );
        } else {
            tracing::debug!(
                individual_id = %individual_id,
                rule_id = %rule_id,
                "Rule already acknowledged, keeping first record"
            );
        }
        Ok(())
    }

    fn load_acknowledged(&self, individual_id: &Uuid) -> Result<HashSet<Uuid>, AlertError> {
        let conn = self.conn.lock().map_err(|_| AlertError::LockFailed)?;
        db::get_acknowledged_rule_ids(&conn, individual_id)
            .map_err(|e| AlertError::LedgerReadFailed(e.to_string()))
    }

    fn list_records(&self, individual_id: &Uuid) -> Result<Vec<AcknowledgementRecord>, AlertError> {
        let conn = self.conn.lock().map_err(|_| AlertError::LockFailed)?;
        db::list_acknowledgements(&conn, individual_id)
            .map_err(|e| AlertError::LedgerReadFailed(e.to_string()))
    }
}

use std::collections::HashSet;
use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::catalog::parse_uuid;
use crate::db::DatabaseError;
use crate::models::enums::{RuleKind, Severity};
use crate::models::AcknowledgementRecord;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Insert an acknowledgement unless one already exists for (individual, rule).
/// Returns true when a new row was written. The first record is never replaced.
pub fn insert_acknowledgement(
    conn: &Connection,
    record: &AcknowledgementRecord,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "INSERT INTO acknowledgements
         (individual_id, rule_id, practitioner_id, rule_kind, severity, acknowledged_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(individual_id, rule_id) DO NOTHING",
        params![
            record.individual_id.to_string(),
            record.rule_id.to_string(),
            record.practitioner_id.to_string(),
            record.rule_kind.as_str(),
            record.severity.as_str(),
            record.acknowledged_at.format(TIMESTAMP_FORMAT).to_string(),
        ],
    )?;
    Ok(changed > 0)
}

/// Rule ids acknowledged for an individual.
pub fn get_acknowledged_rule_ids(
    conn: &Connection,
    individual_id: &Uuid,
) -> Result<HashSet<Uuid>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT rule_id FROM acknowledgements WHERE individual_id = ?1")?;
    let rows = stmt.query_map(params![individual_id.to_string()], |row| {
        row.get::<_, String>(0)
    })?;

    let mut ids = HashSet::new();
    for row in rows {
        ids.insert(parse_uuid(&row?)?);
    }
    Ok(ids)
}

/// Full acknowledgement records for an individual, oldest first.
pub fn list_acknowledgements(
    conn: &Connection,
    individual_id: &Uuid,
) -> Result<Vec<AcknowledgementRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT individual_id, rule_id, practitioner_id, rule_kind, severity, acknowledged_at
         FROM acknowledgements WHERE individual_id = ?1
         ORDER BY acknowledged_at, rowid",
    )?;
    let rows = stmt.query_map(params![individual_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (individual_id, rule_id, practitioner_id, rule_kind, severity, acknowledged_at) = row?;
        records.push(AcknowledgementRecord {
            individual_id: parse_uuid(&individual_id)?,
            rule_id: parse_uuid(&rule_id)?,
            practitioner_id: parse_uuid(&practitioner_id)?,
            rule_kind: RuleKind::from_str(&rule_kind)?,
            severity: Severity::from_str(&severity)?,
            acknowledged_at: NaiveDateTime::parse_from_str(&acknowledged_at, TIMESTAMP_FORMAT)
                .map_err(|e| DatabaseError::ConstraintViolation(format!("Invalid timestamp: {e}")))?,
        });
    }
    Ok(records)
}

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::Severity;
use crate::models::*;

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

pub fn insert_substance(conn: &Connection, substance: &Substance) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO substances (id, canonical_name) VALUES (?1, ?2)",
        params![substance.id.to_string(), substance.canonical_name],
    )?;
    for alias in &substance.aliases {
        conn.execute(
            "INSERT OR IGNORE INTO substance_aliases (substance_id, alias) VALUES (?1, ?2)",
            params![substance.id.to_string(), alias],
        )?;
    }
    Ok(())
}

pub fn insert_condition(conn: &Connection, condition: &Condition) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO conditions (id, name) VALUES (?1, ?2)",
        params![condition.id.to_string(), condition.name],
    )?;
    Ok(())
}

pub fn insert_contraindication_rule(
    conn: &Connection,
    rule: &ContraindicationRule,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO contraindication_rules
         (id, substance_id, condition_id, severity, message_text, recommendation_text, source_citation)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            rule.id.to_string(),
            rule.substance_id.to_string(),
            rule.condition_id.to_string(),
            rule.severity.as_str(),
            rule.message_text,
            rule.recommendation_text,
            rule.source_citation,
        ],
    )?;
    Ok(())
}

pub fn insert_interaction_rule(
    conn: &Connection,
    rule: &SubstanceInteractionRule,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO interaction_rules
         (id, substance_a_id, substance_b_id, severity, message_text, recommendation_text, source_citation)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            rule.id.to_string(),
            rule.substance_a_id.to_string(),
            rule.substance_b_id.to_string(),
            rule.severity.as_str(),
            rule.message_text,
            rule.recommendation_text,
            rule.source_citation,
        ],
    )?;
    Ok(())
}

/// Load every substance with its aliases, in insertion order.
pub fn load_substances(conn: &Connection) -> Result<Vec<Substance>, DatabaseError> {
    let mut alias_stmt =
        conn.prepare("SELECT substance_id, alias FROM substance_aliases ORDER BY rowid")?;
    let alias_rows = alias_stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut aliases: HashMap<String, BTreeSet<String>> = HashMap::new();
    for row in alias_rows {
        let (substance_id, alias) = row?;
        aliases.entry(substance_id).or_default().insert(alias);
    }

    let mut stmt = conn.prepare("SELECT id, canonical_name FROM substances ORDER BY rowid")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut substances = Vec::new();
    for row in rows {
        let (id, canonical_name) = row?;
        substances.push(Substance {
            id: parse_uuid(&id)?,
            aliases: aliases.remove(&id).unwrap_or_default(),
            canonical_name,
        });
    }
    Ok(substances)
}

pub fn load_conditions(conn: &Connection) -> Result<Vec<Condition>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT id, name FROM conditions ORDER BY rowid")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut conditions = Vec::new();
    for row in rows {
        let (id, name) = row?;
        conditions.push(Condition {
            id: parse_uuid(&id)?,
            name,
        });
    }
    Ok(conditions)
}

/// Load contraindication rules in rule-table order.
pub fn load_contraindication_rules(
    conn: &Connection,
) -> Result<Vec<ContraindicationRule>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, substance_id, condition_id, severity, message_text,
                recommendation_text, source_citation
         FROM contraindication_rules ORDER BY rowid",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, String>(6)?,
        ))
    })?;

    let mut rules = Vec::new();
    for row in rows {
        let (id, substance_id, condition_id, severity, message_text, recommendation_text, source_citation) =
            row?;
        rules.push(ContraindicationRule {
            id: parse_uuid(&id)?,
            substance_id: parse_uuid(&substance_id)?,
            condition_id: parse_uuid(&condition_id)?,
            severity: Severity::from_str(&severity)?,
            message_text,
            recommendation_text,
            source_citation,
        });
    }
    Ok(rules)
}

/// Load substance interaction rules in rule-table order.
pub fn load_interaction_rules(
    conn: &Connection,
) -> Result<Vec<SubstanceInteractionRule>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, substance_a_id, substance_b_id, severity, message_text,
                recommendation_text, source_citation
         FROM interaction_rules ORDER BY rowid",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, String>(6)?,
        ))
    })?;

    let mut rules = Vec::new();
    for row in rows {
        let (id, substance_a_id, substance_b_id, severity, message_text, recommendation_text, source_citation) =
            row?;
        rules.push(SubstanceInteractionRule {
            id: parse_uuid(&id)?,
            substance_a_id: parse_uuid(&substance_a_id)?,
            substance_b_id: parse_uuid(&substance_b_id)?,
            severity: Severity::from_str(&severity)?,
            message_text,
            recommendation_text,
            source_citation,
        });
    }
    Ok(rules)
}

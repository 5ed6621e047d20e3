//! Fixture catalog and fake collaborators shared by the alert tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use uuid::Uuid;

use crate::models::enums::{CatalogTable, Severity};
use crate::models::*;

use super::catalog::{CatalogSnapshot, CatalogSource};
use super::conditions::{IntakeProfile, IntakeSource};
use super::types::AlertError;

/// Stable fixture id derived from a name.
pub fn id(name: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

fn substance(name: &str, aliases: &[&str]) -> Substance {
    Substance {
        id: id(name),
        canonical_name: name.into(),
        aliases: aliases.iter().map(|a| a.to_string()).collect(),
    }
}

fn condition(name: &str) -> Condition {
    Condition {
        id: id(name),
        name: name.into(),
    }
}

fn contraindication(substance: &str, condition: &str, severity: Severity) -> ContraindicationRule {
    ContraindicationRule {
        id: id(&format!("{substance} x {condition}")),
        substance_id: id(substance),
        condition_id: id(condition),
        severity,
        message_text: format!("{substance} is contraindicated with {condition}."),
        recommendation_text: format!("Avoid {substance}."),
        source_citation: "Fixture monograph".into(),
    }
}

fn interaction(a: &str, b: &str, severity: Severity) -> SubstanceInteractionRule {
    SubstanceInteractionRule {
        id: id(&format!("{a} + {b}")),
        substance_a_id: id(a),
        substance_b_id: id(b),
        severity,
        message_text: format!("{a} interacts with {b}."),
        recommendation_text: "Do not combine.".into(),
        source_citation: "Fixture monograph".into(),
    }
}

/// Rule id for a fixture contraindication.
pub fn contraindication_id(substance: &str, condition: &str) -> Uuid {
    id(&format!("{substance} x {condition}"))
}

/// Rule id for a fixture interaction.
pub fn interaction_id(a: &str, b: &str) -> Uuid {
    id(&format!("{a} + {b}"))
}

pub fn fixture_catalog() -> CatalogSnapshot {
    CatalogSnapshot::new(
        vec![
            substance("Millepertuis", &["St John's wort", "Hypericum perforatum"]),
            substance("Pamplemousse", &["Grapefruit"]),
            substance("Réglisse", &["Licorice", "Liquorice", "Glycyrrhiza"]),
            substance("Menthe poivrée", &["Peppermint", "Mentha piperita"]),
            substance("Ginkgo", &["Ginkgo biloba"]),
            substance("Sauge", &["Sage", "Salvia officinalis"]),
        ],
        vec![
            condition("Anticoagulants"),
            condition("Oral contraceptives"),
            condition("Pregnancy"),
            condition("Hypertension"),
            condition("Epilepsy"),
            condition("Young child"),
            condition("Child"),
        ],
        vec![
            contraindication("Millepertuis", "Anticoagulants", Severity::Critical),
            contraindication("Réglisse", "Hypertension", Severity::Warning),
            contraindication("Ginkgo", "Anticoagulants", Severity::Warning),
            contraindication("Millepertuis", "Oral contraceptives", Severity::Critical),
            contraindication("Menthe poivrée", "Young child", Severity::Critical),
            contraindication("Sauge", "Epilepsy", Severity::Critical),
            contraindication("Sauge", "Pregnancy", Severity::Info),
        ],
        vec![
            interaction("Millepertuis", "Pamplemousse", Severity::Warning),
            interaction("Ginkgo", "Millepertuis", Severity::Info),
        ],
    )
}

/// In-memory catalog source with switchable table failures and latency.
pub struct FixtureSource {
    snapshot: CatalogSnapshot,
    failing: Mutex<HashSet<CatalogTable>>,
    delay: Mutex<Option<Duration>>,
    pub loads: AtomicUsize,
}

impl FixtureSource {
    pub fn new(snapshot: CatalogSnapshot) -> Self {
        Self {
            snapshot,
            failing: Mutex::new(HashSet::new()),
            delay: Mutex::new(None),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn fail(&self, table: CatalogTable) {
        self.failing.lock().unwrap().insert(table);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    fn read<T: Clone>(&self, table: CatalogTable, rows: &[T]) -> Result<Vec<T>, AlertError> {
        if let Some(delay) = *self.delay.lock().unwrap() {
            std::thread::sleep(delay);
        }
        if self.failing.lock().unwrap().contains(&table) {
            return Err(AlertError::ReferenceDataLoad(
                table.as_str().into(),
                "fixture failure".into(),
            ));
        }
        Ok(rows.to_vec())
    }
}

impl CatalogSource for FixtureSource {
    fn load_substances(&self) -> Result<Vec<Substance>, AlertError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.read(CatalogTable::Substances, self.snapshot.substances())
    }

    fn load_conditions(&self) -> Result<Vec<Condition>, AlertError> {
        self.read(CatalogTable::Conditions, self.snapshot.conditions())
    }

    fn load_contraindication_rules(&self) -> Result<Vec<ContraindicationRule>, AlertError> {
        self.read(
            CatalogTable::ContraindicationRules,
            self.snapshot.contraindication_rules(),
        )
    }

    fn load_interaction_rules(&self) -> Result<Vec<SubstanceInteractionRule>, AlertError> {
        self.read(CatalogTable::InteractionRules, self.snapshot.interaction_rules())
    }
}

/// Intake store fake: per-individual profiles, optional failure and
/// per-individual latency, and a call counter.
#[derive(Default)]
pub struct FixtureIntake {
    profiles: Mutex<HashMap<Uuid, IntakeProfile>>,
    delays: Mutex<HashMap<Uuid, Duration>>,
    failing: Mutex<bool>,
    pub calls: AtomicUsize,
}

impl FixtureIntake {
    pub fn with(self, individual_id: Uuid, profile: IntakeProfile) -> Self {
        self.profiles.lock().unwrap().insert(individual_id, profile);
        self
    }

    pub fn set_delay(&self, individual_id: Uuid, delay: Duration) {
        self.delays.lock().unwrap().insert(individual_id, delay);
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

impl IntakeSource for FixtureIntake {
    fn load_intake(&self, individual_id: &Uuid) -> Result<IntakeProfile, AlertError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delays.lock().unwrap().get(individual_id).copied();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if *self.failing.lock().unwrap() {
            return Err(AlertError::ConditionInferenceFailed("intake store offline".into()));
        }
        Ok(self
            .profiles
            .lock()
            .unwrap()
            .get(individual_id)
            .cloned()
            .unwrap_or_default())
    }
}

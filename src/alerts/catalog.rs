//! Reference catalog: substances, conditions and the two rule tables.
//!
//! The catalog is loaded into an explicit [`CatalogSnapshot`] owned by the
//! caller. Each table loads independently; a failed table leaves its
//! collection empty and is listed in [`CatalogSnapshot::missing_tables`], so
//! evaluation degrades to "no alerts for that category" instead of aborting.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use rusqlite::Connection;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::db;
use crate::models::enums::CatalogTable;
use crate::models::{Condition, ContraindicationRule, Substance, SubstanceInteractionRule};

use super::types::AlertError;

// ---------------------------------------------------------------------------
// CatalogSource
// ---------------------------------------------------------------------------

/// Bulk read access to the reference data store. One call per table.
pub trait CatalogSource: Send + Sync {
    fn load_substances(&self) -> Result<Vec<Substance>, AlertError>;
    fn load_conditions(&self) -> Result<Vec<Condition>, AlertError>;
    fn load_contraindication_rules(&self) -> Result<Vec<ContraindicationRule>, AlertError>;
    fn load_interaction_rules(&self) -> Result<Vec<SubstanceInteractionRule>, AlertError>;
}

// ---------------------------------------------------------------------------
// CatalogSnapshot
// ---------------------------------------------------------------------------

/// Immutable, validated view of the reference catalog.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    substances: Vec<Substance>,
    conditions: Vec<Condition>,
    contraindication_rules: Vec<ContraindicationRule>,
    interaction_rules: Vec<SubstanceInteractionRule>,
    substance_index: HashMap<Uuid, usize>,
    condition_index: HashMap<Uuid, usize>,
    missing: Vec<CatalogTable>,
}

impl CatalogSnapshot {
    /// Build a snapshot, dropping rules whose ids do not resolve.
    pub fn new(
        substances: Vec<Substance>,
        conditions: Vec<Condition>,
        contraindication_rules: Vec<ContraindicationRule>,
        interaction_rules: Vec<SubstanceInteractionRule>,
    ) -> Self {
        Self::assemble(
            substances,
            conditions,
            contraindication_rules,
            interaction_rules,
            Vec::new(),
        )
    }

    fn assemble(
        substances: Vec<Substance>,
        conditions: Vec<Condition>,
        contraindication_rules: Vec<ContraindicationRule>,
        interaction_rules: Vec<SubstanceInteractionRule>,
        missing: Vec<CatalogTable>,
    ) -> Self {
        let substance_index: HashMap<Uuid, usize> = substances
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id, i))
            .collect();
        let condition_index: HashMap<Uuid, usize> = conditions
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id, i))
            .collect();

        let total_contraindications = contraindication_rules.len();
        let contraindication_rules: Vec<ContraindicationRule> = contraindication_rules
            .into_iter()
            .filter(|r| {
                substance_index.contains_key(&r.substance_id)
                    && condition_index.contains_key(&r.condition_id)
            })
            .collect();

        let total_interactions = interaction_rules.len();
        let interaction_rules: Vec<SubstanceInteractionRule> = interaction_rules
            .into_iter()
            .filter(|r| {
                substance_index.contains_key(&r.substance_a_id)
                    && substance_index.contains_key(&r.substance_b_id)
            })
            .collect();

        let dropped = (total_contraindications - contraindication_rules.len())
            + (total_interactions - interaction_rules.len());
        if dropped > 0 {
            tracing::warn!(
                dropped,
                missing = ?missing,
                "Catalog rules reference unknown substances or conditions, skipped"
            );
        }

        Self {
            substances,
            conditions,
            contraindication_rules,
            interaction_rules,
            substance_index,
            condition_index,
            missing,
        }
    }

    pub fn substance(&self, id: &Uuid) -> Option<&Substance> {
        self.substance_index.get(id).map(|&i| &self.substances[i])
    }

    pub fn condition(&self, id: &Uuid) -> Option<&Condition> {
        self.condition_index.get(id).map(|&i| &self.conditions[i])
    }

    pub fn substances(&self) -> &[Substance] {
        &self.substances
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Contraindication rules in rule-table order.
    pub fn contraindication_rules(&self) -> &[ContraindicationRule] {
        &self.contraindication_rules
    }

    /// Interaction rules in rule-table order.
    pub fn interaction_rules(&self) -> &[SubstanceInteractionRule] {
        &self.interaction_rules
    }

    pub fn missing_tables(&self) -> &[CatalogTable] {
        &self.missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// True when every table failed and nothing can be evaluated.
    pub fn is_unusable(&self) -> bool {
        let missing: HashSet<&CatalogTable> = self.missing.iter().collect();
        [
            CatalogTable::Substances,
            CatalogTable::Conditions,
            CatalogTable::ContraindicationRules,
            CatalogTable::InteractionRules,
        ]
        .iter()
        .all(|t| missing.contains(t))
    }

    /// The partial-load error, if any table is missing.
    pub fn degradation(&self) -> Option<AlertError> {
        if self.missing.is_empty() {
            None
        } else {
            Some(AlertError::CatalogUnavailable {
                tables: self.missing.clone(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// CatalogStore
// ---------------------------------------------------------------------------

/// Loads the catalog once and caches it until explicitly invalidated.
pub struct CatalogStore {
    source: Arc<dyn CatalogSource>,
    cached: RwLock<Option<Arc<CatalogSnapshot>>>,
}

impl CatalogStore {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self {
            source,
            cached: RwLock::new(None),
        }
    }

    /// Read all four tables from the source. Never fails as a whole: failed
    /// tables are reported through the snapshot.
    pub fn load(&self) -> CatalogSnapshot {
        let mut missing = Vec::new();

        let substances = table(CatalogTable::Substances, self.source.load_substances(), &mut missing);
        let conditions = table(CatalogTable::Conditions, self.source.load_conditions(), &mut missing);
        let contraindications = table(
            CatalogTable::ContraindicationRules,
            self.source.load_contraindication_rules(),
            &mut missing,
        );
        let interactions = table(
            CatalogTable::InteractionRules,
            self.source.load_interaction_rules(),
            &mut missing,
        );

        let snapshot =
            CatalogSnapshot::assemble(substances, conditions, contraindications, interactions, missing);

        tracing::info!(
            substances = snapshot.substances.len(),
            conditions = snapshot.conditions.len(),
            contraindication_rules = snapshot.contraindication_rules.len(),
            interaction_rules = snapshot.interaction_rules.len(),
            complete = snapshot.is_complete(),
            "Reference catalog loaded"
        );

        snapshot
    }

    /// The cached snapshot, loading it on first use. Only complete snapshots
    /// are cached, so a partial load is retried by the next caller.
    pub fn snapshot(&self) -> Result<Arc<CatalogSnapshot>, AlertError> {
        if let Some(cached) = self
            .cached
            .read()
            .map_err(|_| AlertError::LockFailed)?
            .as_ref()
        {
            return Ok(Arc::clone(cached));
        }

        let snapshot = Arc::new(self.load());
        if snapshot.is_complete() {
            let mut cached = self.cached.write().map_err(|_| AlertError::LockFailed)?;
            *cached = Some(Arc::clone(&snapshot));
        }
        Ok(snapshot)
    }

    /// Drop the cached snapshot.
    pub fn invalidate(&self) -> Result<(), AlertError> {
        let mut cached = self.cached.write().map_err(|_| AlertError::LockFailed)?;
        *cached = None;
        Ok(())
    }

    /// Invalidate and load again.
    pub fn reload(&self) -> Result<Arc<CatalogSnapshot>, AlertError> {
        self.invalidate()?;
        self.snapshot()
    }
}

fn table<T>(
    name: CatalogTable,
    result: Result<Vec<T>, AlertError>,
    missing: &mut Vec<CatalogTable>,
) -> Vec<T> {
    match result {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(table = name.as_str(), error = %e, "Catalog table failed to load");
            missing.push(name);
            Vec::new()
        }
    }
}

// ---------------------------------------------------------------------------
// SQLite source
// ---------------------------------------------------------------------------

/// Catalog tables stored in the engine database.
pub struct SqliteCatalogSource {
    conn: Mutex<Connection>,
}

impl SqliteCatalogSource {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: &Path) -> Result<Self, AlertError> {
        Ok(Self::new(db::open_database(path)?))
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, db::DatabaseError>,
    ) -> Result<T, AlertError> {
        let conn = self.conn.lock().map_err(|_| AlertError::LockFailed)?;
        Ok(f(&*conn)?)
    }
}

impl CatalogSource for SqliteCatalogSource {
    fn load_substances(&self) -> Result<Vec<Substance>, AlertError> {
        self.with_conn(db::load_substances)
    }

    fn load_conditions(&self) -> Result<Vec<Condition>, AlertError> {
        self.with_conn(db::load_conditions)
    }

    fn load_contraindication_rules(&self) -> Result<Vec<ContraindicationRule>, AlertError> {
        self.with_conn(db::load_contraindication_rules)
    }

    fn load_interaction_rules(&self) -> Result<Vec<SubstanceInteractionRule>, AlertError> {
        self.with_conn(db::load_interaction_rules)
    }
}

// ---------------------------------------------------------------------------
// JSON source
// ---------------------------------------------------------------------------

/// Catalog tables as JSON files in one directory.
pub struct JsonCatalogSource {
    dir: PathBuf,
}

impl JsonCatalogSource {
    pub const SUBSTANCES_FILE: &'static str = "substances.json";
    pub const CONDITIONS_FILE: &'static str = "conditions.json";
    pub const CONTRAINDICATIONS_FILE: &'static str = "contraindication_rules.json";
    pub const INTERACTIONS_FILE: &'static str = "interaction_rules.json";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>, AlertError> {
        let path = self.dir.join(file);
        let json = std::fs::read_to_string(&path).map_err(|e| {
            AlertError::ReferenceDataLoad(path.display().to_string(), e.to_string())
        })?;
        serde_json::from_str(&json)
            .map_err(|e| AlertError::ReferenceDataParse(file.to_string(), e.to_string()))
    }
}

impl CatalogSource for JsonCatalogSource {
    fn load_substances(&self) -> Result<Vec<Substance>, AlertError> {
        self.read(Self::SUBSTANCES_FILE)
    }

    fn load_conditions(&self) -> Result<Vec<Condition>, AlertError> {
        self.read(Self::CONDITIONS_FILE)
    }

    fn load_contraindication_rules(&self) -> Result<Vec<ContraindicationRule>, AlertError> {
        self.read(Self::CONTRAINDICATIONS_FILE)
    }

    fn load_interaction_rules(&self) -> Result<Vec<SubstanceInteractionRule>, AlertError> {
        self.read(Self::INTERACTIONS_FILE)
    }
}

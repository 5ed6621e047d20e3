//! Alert stream controller: owns the pipeline and publishes snapshots.
//!
//! Every request takes a monotonically increasing token. Steps run in
//! order (catalog, matcher, intake, evaluator, ledger) and the token is
//! checked after each async step, so an evaluation overtaken by a newer
//! request is discarded instead of published. Catalog, intake and ledger
//! calls run on the blocking pool under a timeout with bounded retry.
//!
//! Fail-closed: when the catalog cannot be loaded the published snapshot
//! is `Unavailable`, never an empty "no concerns" list.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::watch;
use uuid::Uuid;

use crate::config::{self, EngineConfig};

use super::catalog::{CatalogSnapshot, CatalogStore, SqliteCatalogSource};
use super::conditions::{ConditionResolver, InferredConditions, IntakeSource};
use super::evaluator::evaluate;
use super::keywords::ConditionKeywords;
use super::ledger::{AcknowledgementLedger, SqliteLedger};
use super::matcher::SubstanceMatcher;
use super::retry::{run_blocking, RetryPolicy};
use super::types::{
    Alert, AlertError, AlertSnapshot, EvaluationIssue, EvaluationRequest, EvaluationStatus,
    SeverityCounts,
};

#[derive(Default)]
struct ControllerState {
    last_request: Option<EvaluationRequest>,
    /// Acknowledgements this process has persisted, per individual.
    confirmed: HashMap<Uuid, HashSet<Uuid>>,
}

struct ControllerInner {
    catalog: Arc<CatalogStore>,
    intake: Arc<dyn IntakeSource>,
    ledger: Arc<dyn AcknowledgementLedger>,
    resolver: Arc<ConditionResolver>,
    config: EngineConfig,
    latest_token: AtomicU64,
    state: Mutex<ControllerState>,
    publisher: watch::Sender<AlertSnapshot>,
}

/// Cheap to clone; clones share the same pipeline and subscribers.
#[derive(Clone)]
pub struct AlertStreamController {
    inner: Arc<ControllerInner>,
}

impl AlertStreamController {
    pub fn new(
        catalog: Arc<CatalogStore>,
        intake: Arc<dyn IntakeSource>,
        ledger: Arc<dyn AcknowledgementLedger>,
        resolver: ConditionResolver,
        config: EngineConfig,
    ) -> Self {
        let (publisher, _) = watch::channel(AlertSnapshot::pending());
        Self {
            inner: Arc::new(ControllerInner {
                catalog,
                intake,
                ledger,
                resolver: Arc::new(resolver),
                config,
                latest_token: AtomicU64::new(0),
                state: Mutex::new(ControllerState::default()),
                publisher,
            }),
        }
    }

    /// Controller over the engine database: catalog tables and ledger share
    /// the file. Uses the practice keyword dictionary when one is installed.
    pub fn open(
        db_path: &Path,
        intake: Arc<dyn IntakeSource>,
        config: EngineConfig,
    ) -> Result<Self, AlertError> {
        let source = SqliteCatalogSource::open(db_path)?;
        let ledger = SqliteLedger::open(db_path)?;

        let dictionary = config::keyword_dictionary_path();
        let keywords = if dictionary.exists() {
            ConditionKeywords::from_path(&dictionary)?
        } else {
            ConditionKeywords::bundled()?
        };
        tracing::info!(
            db = %db_path.display(),
            keyword_version = keywords.version(),
            "Alert engine opened"
        );

        Ok(Self::new(
            Arc::new(CatalogStore::new(Arc::new(source))),
            intake,
            Arc::new(ledger),
            ConditionResolver::new(keywords),
            config,
        ))
    }

    pub fn subscribe(&self) -> watch::Receiver<AlertSnapshot> {
        self.inner.publisher.subscribe()
    }

    /// The last published snapshot.
    pub fn current(&self) -> AlertSnapshot {
        self.inner.publisher.borrow().clone()
    }

    /// Queue an editor event. Evaluation starts once no newer event has
    /// arrived for the debounce window; the result is published to
    /// subscribers. Must be called from within a tokio runtime.
    pub fn submit(&self, request: EvaluationRequest) -> Result<u64, AlertError> {
        let token = self.issue_token(&request)?;
        let controller = self.clone();
        let debounce = self.inner.config.debounce();

        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if !controller.is_latest(token) {
                tracing::debug!(token, "Edit coalesced into a newer one");
                return;
            }
            match controller.run(token, request).await {
                Ok(_) | Err(AlertError::Superseded { .. }) => {}
                Err(e) => tracing::error!(token, error = %e, "Alert evaluation failed"),
            }
        });

        Ok(token)
    }

    /// Evaluate immediately, bypassing the debounce window.
    pub async fn evaluate_now(&self, request: EvaluationRequest) -> Result<AlertSnapshot, AlertError> {
        let token = self.issue_token(&request)?;
        self.run(token, request).await
    }

    /// Re-run the last request with fresh intake and ledger reads.
    pub async fn refresh(&self) -> Result<AlertSnapshot, AlertError> {
        let request = self
            .inner
            .state
            .lock()
            .map_err(|_| AlertError::LockFailed)?
            .last_request
            .clone()
            .ok_or(AlertError::NoEvaluation)?;
        self.evaluate_now(request).await
    }

    /// Drop the cached catalog and load it again. When a request has been
    /// seen, it is re-evaluated against the new catalog.
    pub async fn reload_catalog(&self) -> Result<AlertSnapshot, AlertError> {
        self.inner.catalog.invalidate()?;
        let has_request = self
            .inner
            .state
            .lock()
            .map_err(|_| AlertError::LockFailed)?
            .last_request
            .is_some();

        if has_request {
            self.refresh().await
        } else {
            let store = Arc::clone(&self.inner.catalog);
            run_blocking("catalog load", &self.inner.config.retry, move || store.snapshot()).await?;
            Ok(self.current())
        }
    }

    /// Persist an acknowledgement for an alert of the current snapshot.
    ///
    /// The alert only flips to acknowledged once the ledger write succeeded.
    /// On failure the published snapshot is left untouched.
    pub async fn acknowledge(
        &self,
        rule_id: Uuid,
        practitioner_id: Uuid,
    ) -> Result<AlertSnapshot, AlertError> {
        let current = self.current();
        let individual_id = current.individual_id.ok_or(AlertError::NoEvaluation)?;
        let alert = current
            .find_by_rule(&rule_id)
            .ok_or(AlertError::AlertNotFound(rule_id))?;
        let (rule_kind, severity) = (alert.rule_kind, alert.severity);

        let ledger = Arc::clone(&self.inner.ledger);
        let written = run_blocking("ledger write", &self.inner.config.retry, move || {
            ledger.acknowledge(&individual_id, &rule_id, rule_kind, severity, &practitioner_id)
        })
        .await;

        if let Err(e) = written {
            tracing::error!(
                individual_id = %individual_id,
                rule_id = %rule_id,
                error = %e,
                "Acknowledgement not persisted"
            );
            return Err(match e {
                AlertError::LedgerWriteFailed(_) => e,
                other => AlertError::LedgerWriteFailed(other.to_string()),
            });
        }

        tracing::info!(
            individual_id = %individual_id,
            rule_id = %rule_id,
            severity = severity.as_str(),
            "Alert acknowledged"
        );
        self.merge_acknowledgement(individual_id, rule_id)
    }

    // ── Pipeline ────────────────────────────────────────────────────────────

    /// The token and `last_request` move together under the state lock, so
    /// `refresh` always replays the request holding the latest token.
    fn issue_token(&self, request: &EvaluationRequest) -> Result<u64, AlertError> {
        let mut state = self.inner.state.lock().map_err(|_| AlertError::LockFailed)?;
        let token = self.inner.latest_token.fetch_add(1, Ordering::SeqCst) + 1;
        state.last_request = Some(request.clone());
        Ok(token)
    }

    fn is_latest(&self, token: u64) -> bool {
        self.inner.latest_token.load(Ordering::SeqCst) == token
    }

    fn ensure_latest(&self, token: u64) -> Result<(), AlertError> {
        if self.is_latest(token) {
            Ok(())
        } else {
            tracing::debug!(token, "Evaluation superseded, discarding");
            Err(AlertError::Superseded { token })
        }
    }

    async fn run(&self, token: u64, request: EvaluationRequest) -> Result<AlertSnapshot, AlertError> {
        let started = Instant::now();
        let individual_id = request.individual_id;
        let retry = &self.inner.config.retry;
        let mut issues = Vec::new();

        let catalog = match self.load_catalog(token).await {
            Ok(catalog) if !catalog.is_unusable() => catalog,
            Ok(catalog) => {
                let reason = catalog
                    .degradation()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "catalog empty".into());
                return self.publish_unavailable(token, individual_id, reason, started);
            }
            Err(e @ AlertError::Superseded { .. }) => return Err(e),
            Err(e) => return self.publish_unavailable(token, individual_id, e.to_string(), started),
        };
        self.ensure_latest(token)?;

        if let Some(AlertError::CatalogUnavailable { tables }) = catalog.degradation() {
            issues.push(EvaluationIssue::CatalogUnavailable { tables });
        }

        let matched = SubstanceMatcher::new(&catalog).match_plan(&request.plan_text);
        if matched.is_empty() {
            return self.apply(token, individual_id, issues, Vec::new(), HashSet::new(), started);
        }

        let intake = {
            let source = Arc::clone(&self.inner.intake);
            run_blocking("intake read", retry, move || source.load_intake(&individual_id)).await
        };
        self.ensure_latest(token)?;

        let inferred = match intake {
            Ok(profile) => self.inner.resolver.infer(&profile, &catalog),
            Err(e) => {
                tracing::warn!(individual_id = %individual_id, error = %e, "Intake unavailable, no conditions inferred");
                issues.push(EvaluationIssue::ConditionInferenceFailed { reason: e.to_string() });
                InferredConditions::default()
            }
        };

        let alerts = evaluate(&individual_id, &matched, &inferred, &catalog);

        let acknowledged = if alerts.is_empty() {
            HashSet::new()
        } else {
            let ledger = Arc::clone(&self.inner.ledger);
            let read =
                run_blocking("ledger read", retry, move || ledger.load_acknowledged(&individual_id)).await;
            self.ensure_latest(token)?;
            read.unwrap_or_else(|e| {
                tracing::warn!(individual_id = %individual_id, error = %e, "Ledger unreadable, alerts shown unacknowledged");
                issues.push(EvaluationIssue::LedgerReadFailed { reason: e.to_string() });
                HashSet::new()
            })
        };

        tracing::debug!(
            token,
            matched = matched.len(),
            inferred = inferred.len(),
            alerts = alerts.len(),
            "Pipeline finished"
        );

        self.apply(token, individual_id, issues, alerts, acknowledged, started)
    }

    /// Catalog snapshot, retrying while tables are missing and attempts remain.
    async fn load_catalog(&self, token: u64) -> Result<Arc<CatalogSnapshot>, AlertError> {
        let retry = &self.inner.config.retry;
        let single = RetryPolicy {
            max_attempts: 1,
            ..retry.clone()
        };

        let store = Arc::clone(&self.inner.catalog);
        let mut snapshot = run_blocking("catalog load", retry, move || store.snapshot()).await?;

        let mut attempt = 1;
        while !snapshot.is_complete() && attempt < retry.attempts() {
            self.ensure_latest(token)?;
            let backoff = retry.backoff_after(attempt);
            tracing::warn!(
                attempt,
                missing = ?snapshot.missing_tables(),
                backoff_ms = backoff.as_millis() as u64,
                "Catalog incomplete, retrying"
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;

            let store = Arc::clone(&self.inner.catalog);
            match run_blocking("catalog load", &single, move || store.snapshot()).await {
                Ok(reloaded) => snapshot = reloaded,
                Err(e) => {
                    tracing::warn!(error = %e, "Catalog reload failed, keeping partial snapshot");
                    break;
                }
            }
        }

        Ok(snapshot)
    }

    fn publish_unavailable(
        &self,
        token: u64,
        individual_id: Uuid,
        reason: String,
        started: Instant,
    ) -> Result<AlertSnapshot, AlertError> {
        tracing::error!(individual_id = %individual_id, token, reason = %reason, "Alert evaluation unavailable");
        self.publish(token, |_| AlertSnapshot {
            individual_id: Some(individual_id),
            token,
            status: EvaluationStatus::Unavailable { reason },
            alerts: Vec::new(),
            unacknowledged: SeverityCounts::default(),
            evaluated_at: Some(chrono::Local::now().naive_local()),
            processing_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn apply(
        &self,
        token: u64,
        individual_id: Uuid,
        issues: Vec<EvaluationIssue>,
        mut alerts: Vec<Alert>,
        acknowledged: HashSet<Uuid>,
        started: Instant,
    ) -> Result<AlertSnapshot, AlertError> {
        let snapshot = self.publish(token, |state| {
            // Confirmed writes are applied even when the ledger read failed:
            // their persistence is already known.
            let confirmed = state.confirmed.get(&individual_id);
            for alert in &mut alerts {
                alert.acknowledged = acknowledged.contains(&alert.rule_id)
                    || confirmed.is_some_and(|c| c.contains(&alert.rule_id));
            }
            // Once the ledger returns a confirmed rule, it no longer needs remembering.
            if let Some(confirmed) = state.confirmed.get_mut(&individual_id) {
                confirmed.retain(|rule_id| !acknowledged.contains(rule_id));
                if confirmed.is_empty() {
                    state.confirmed.remove(&individual_id);
                }
            }
            AlertSnapshot {
                individual_id: Some(individual_id),
                token,
                status: EvaluationStatus::from_issues(issues),
                unacknowledged: SeverityCounts::unacknowledged(&alerts),
                alerts,
                evaluated_at: Some(chrono::Local::now().naive_local()),
                processing_time_ms: started.elapsed().as_millis() as u64,
            }
        })?;

        tracing::info!(
            individual_id = %individual_id,
            token,
            alerts = snapshot.alerts.len(),
            total = snapshot.unacknowledged.total(),
            critical = snapshot.unacknowledged.critical,
            warning = snapshot.unacknowledged.warning,
            info = snapshot.unacknowledged.info,
            complete = snapshot.status.is_complete(),
            processing_ms = snapshot.processing_time_ms,
            "Alert snapshot published"
        );
        Ok(snapshot)
    }

    /// Build and publish unless a newer request was issued. Stamping, the
    /// token check and the send all happen under the state lock so a
    /// concurrent acknowledgement cannot be lost.
    fn publish<F>(&self, token: u64, build: F) -> Result<AlertSnapshot, AlertError>
    where
        F: FnOnce(&mut ControllerState) -> AlertSnapshot,
    {
        let mut state = self.inner.state.lock().map_err(|_| AlertError::LockFailed)?;
        self.ensure_latest(token)?;
        let snapshot = build(&mut *state);
        self.inner.publisher.send_replace(snapshot.clone());
        Ok(snapshot)
    }

    /// Mark one rule acknowledged without re-running the pipeline.
    fn merge_acknowledgement(
        &self,
        individual_id: Uuid,
        rule_id: Uuid,
    ) -> Result<AlertSnapshot, AlertError> {
        let mut state = self.inner.state.lock().map_err(|_| AlertError::LockFailed)?;
        state.confirmed.entry(individual_id).or_default().insert(rule_id);

        let mut snapshot = self.current();
        if snapshot.individual_id != Some(individual_id) {
            return Ok(snapshot);
        }
        for alert in snapshot.alerts.iter_mut().filter(|a| a.rule_id == rule_id) {
            alert.acknowledged = true;
        }
        snapshot.unacknowledged = SeverityCounts::unacknowledged(&snapshot.alerts);
        self.inner.publisher.send_replace(snapshot.clone());
        Ok(snapshot)
    }
}

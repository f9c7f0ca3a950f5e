use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use ethereal_core::{
    DesiredRecord, EtherealError, EtherealResult, InstanceController, InstanceLookup, ReconcileAction, StateStore,
};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{decide, StatusTracker};

/// What happened to one record in one cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordOutcome {
    pub record: String,
    pub instance: String,
    pub action: ReconcileAction,
    /// Counter value written this cycle, if any.
    pub resurrections: Option<u64>,
    pub error: Option<EtherealError>,
}

impl RecordOutcome {
    fn new(record: &DesiredRecord, action: ReconcileAction) -> Self {
        Self { record: record.name.clone(), instance: record.instance_name(), action, resurrections: None, error: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub took_ms: u64,
    pub outcomes: Vec<RecordOutcome>,
}

impl CycleReport {
    pub fn records(&self) -> usize {
        self.outcomes.len()
    }

    pub fn count(&self, action: ReconcileAction) -> usize {
        self.outcomes.iter().filter(|o| o.action == action).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.outcomes.iter().filter(|o| o.error.is_some())
    }

    pub fn outcome(&self, record: &str) -> Option<&RecordOutcome> {
        self.outcomes.iter().find(|o| o.record == record)
    }
}

/// Orchestrates one pass over all desired records.
pub struct Reconciler {
    store: Arc<dyn StateStore>,
    instances: Arc<dyn InstanceController>,
    tracker: StatusTracker,
    default_image: String,
}

impl Reconciler {
    pub fn new(store: Arc<dyn StateStore>, instances: Arc<dyn InstanceController>, default_image: impl Into<String>) -> Self {
        let tracker = StatusTracker::new(Arc::clone(&store));
        Self { store, instances, tracker, default_image: default_image.into() }
    }

    /// Run one cycle. Only a failure to list records is returned as an error;
    /// per-record failures are logged and carried in the report.
    pub async fn run_cycle(&self) -> EtherealResult<CycleReport> {
        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        let t0 = Instant::now();
        counter!("ethereal_cycles_total", 1u64);

        let records = match self.store.list().await {
            Ok(r) => r,
            Err(e) => {
                counter!("ethereal_cycles_failed_total", 1u64);
                error!(cycle = %cycle_id, error = %e, "listing desired records failed");
                return Err(e);
            }
        };
        debug!(cycle = %cycle_id, records = records.len(), "cycle start");

        let mut outcomes = Vec::with_capacity(records.len());
        for record in &records {
            outcomes.push(self.reconcile_record(cycle_id, record).await);
        }

        let took_ms = t0.elapsed().as_millis() as u64;
        histogram!("ethereal_cycle_ms", t0.elapsed().as_secs_f64() * 1000.0);
        let report = CycleReport { cycle_id, started_at, took_ms, outcomes };
        info!(
            cycle = %cycle_id,
            records = report.records(),
            created = report.count(ReconcileAction::Create),
            recreated = report.count(ReconcileAction::Recreate),
            failed = report.failures().count(),
            took_ms,
            "cycle complete"
        );
        Ok(report)
    }

    async fn reconcile_record(&self, cycle_id: Uuid, record: &DesiredRecord) -> RecordOutcome {
        let instance = record.instance_name();
        let image = record.effective_image(&self.default_image);

        let lookup = InstanceLookup::from(self.instances.get(&instance).await);
        let action = decide(record, &lookup, &self.default_image);
        let mut outcome = RecordOutcome::new(record, action);

        if let InstanceLookup::Failed(e) = lookup {
            counter!("ethereal_record_failures_total", 1u64, "stage" => "lookup");
            warn!(cycle = %cycle_id, record = %record.name, instance = %instance, error = %e, "instance lookup failed; skipping record this cycle");
            outcome.error = Some(e);
            return outcome;
        }
        if action.is_corrective() {
            counter!("ethereal_actions_total", 1u64, "action" => action.as_str());
        }

        match action {
            ReconcileAction::NoOp => {
                debug!(cycle = %cycle_id, record = %record.name, instance = %instance, "in sync");
            }
            ReconcileAction::Create => {
                warn!(cycle = %cycle_id, record = %record.name, instance = %instance, image = %image, "instance missing; resurrecting");
                if let Err(e) = self.instances.create(&instance, image).await {
                    counter!("ethereal_record_failures_total", 1u64, "stage" => "create");
                    error!(cycle = %cycle_id, record = %record.name, instance = %instance, action = %action, error = %e, "create failed");
                    outcome.error = Some(e);
                    return outcome;
                }
                match self.tracker.record_correction(record).await {
                    Ok(updated) => outcome.resurrections = updated.resurrections(),
                    Err(e) => {
                        // Not retried: the instance now exists, so this correction goes uncounted.
                        if matches!(e, EtherealError::Conflict(_)) {
                            counter!("ethereal_status_conflicts_total", 1u64);
                        }
                        counter!("ethereal_record_failures_total", 1u64, "stage" => "status");
                        error!(cycle = %cycle_id, record = %record.name, action = %action, error = %e, "recording correction failed");
                        outcome.error = Some(e);
                    }
                }
            }
            ReconcileAction::Recreate => {
                // Delete only; the next cycle sees absence and creates with the new image.
                warn!(cycle = %cycle_id, record = %record.name, instance = %instance, image = %image, "instance drifted from desired image; deleting");
                if let Err(e) = self.instances.delete(&instance).await {
                    counter!("ethereal_record_failures_total", 1u64, "stage" => "delete");
                    error!(cycle = %cycle_id, record = %record.name, instance = %instance, action = %action, error = %e, "delete failed");
                    outcome.error = Some(e);
                }
            }
        }
        outcome
    }
}

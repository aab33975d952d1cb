use super::catalog::Catalog;
use super::cycle::{CycleOutcome, CycleRunner};
use super::error::{SyncError, SyncResult};
use super::progress::{CloseOnDrop, RunRegistry, RunSubscription, SyncRun};
use crate::models::RunSnapshot;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const NO_DEFINITION: &str = "No sync definition found";

/// Starts interactive runs and hands out subscriptions to their logs.
pub struct ProgressReporter {
    catalog: Catalog,
    runner: Arc<CycleRunner>,
    registry: Arc<RunRegistry>,
}

impl ProgressReporter {
    pub fn new(catalog: Catalog, runner: Arc<CycleRunner>, retention: Duration) -> Self {
        Self {
            catalog,
            runner,
            registry: Arc::new(RunRegistry::new(retention)),
        }
    }

    /// Create a run for `object_name` and start its cycle in the background.
    /// The returned id can be subscribed to immediately.
    pub fn start_run(&self, object_name: &str) -> Uuid {
        let run = self.registry.create(object_name);
        let id = run.id();
        log::info!("run {}: started for {}", id, object_name);

        let catalog = self.catalog.clone();
        let runner = Arc::clone(&self.runner);
        tokio::spawn(async move {
            let closer = CloseOnDrop::new(Arc::clone(&run));
            execute(&catalog, &runner, &run).await;
            drop(closer);
            log::info!("run {}: closed", run.id());
        });

        id
    }

    pub fn subscribe(&self, run_id: &Uuid) -> SyncResult<RunSubscription> {
        self.registry
            .get(run_id)
            .map(|run| run.subscribe())
            .ok_or_else(|| SyncError::NotFound(format!("run {run_id}")))
    }

    pub fn snapshot(&self, run_id: &Uuid) -> SyncResult<RunSnapshot> {
        let run = self
            .registry
            .get(run_id)
            .ok_or_else(|| SyncError::NotFound(format!("run {run_id}")))?;

        Ok(RunSnapshot {
            run_id: run.id().to_string(),
            object_name: run.object_name().to_string(),
            started_at: run.started_at(),
            lines: run.lines(),
            closed: run.is_closed(),
        })
    }
}

async fn execute(catalog: &Catalog, runner: &CycleRunner, run: &Arc<SyncRun>) {
    let name = run.object_name().to_string();

    let entry = match catalog.get(&name).await {
        Ok(Some(entry)) => entry,
        Ok(None) => {
            run.append(NO_DEFINITION);
            return;
        }
        Err(e) => {
            log::error!("run {}: failed to load sync definition: {}", run.id(), e);
            run.append(format!("Failed to load sync definition for {name}: {e}"));
            return;
        }
    };

    run.append(format!("Syncing {name}..."));

    match runner.run(&entry, &**run).await {
        Ok(CycleOutcome::Synced { records }) => {
            log::info!("run {}: {} synced, {} records", run.id(), name, records);
            run.append(format!("Finished Syncing {name}."));
        }
        Ok(CycleOutcome::Skipped) => {
            run.append(format!("Sync of {name} already in progress"));
        }
        Err(e @ SyncError::AuthMissing { .. }) => {
            log::warn!("run {}: {}", run.id(), e);
            run.append(format!("Sync of {name} failed: {e}. Log in again to continue."));
        }
        Err(e) => {
            log::warn!("run {}: {} failed: {}", run.id(), name, e);
            run.append(format!("Sync of {name} failed: {e}"));
        }
    }
}

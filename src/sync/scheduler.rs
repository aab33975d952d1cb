use super::catalog::Catalog;
use super::cycle::{CycleOutcome, CycleRunner};
use super::progress::LogSink;
use crate::models::SyncStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Outcome of one scheduler tick, per object.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub synced: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Periodic driver pulling every `PULL` entry once per tick.
pub struct Scheduler {
    catalog: Catalog,
    runner: Arc<CycleRunner>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(catalog: Catalog, runner: Arc<CycleRunner>, interval: Duration) -> Self {
        Self {
            catalog,
            runner,
            interval,
        }
    }

    /// Tick until `shutdown` is cancelled. A tick in progress finishes first.
    pub async fn run(self, shutdown: CancellationToken) {
        log::info!("scheduler: started, interval {:?}", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    if !report.failed.is_empty() || !report.synced.is_empty() {
                        log::info!(
                            "scheduler: tick done - {} synced, {} skipped, {} failed",
                            report.synced.len(),
                            report.skipped.len(),
                            report.failed.len()
                        );
                    }
                }
            }
        }

        log::info!("scheduler: stopped");
    }

    /// Run one cycle for every `PULL` entry concurrently and wait for all of
    /// them. A failing object is logged and reported; it never affects the
    /// other objects of the same tick.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let entries = match self.catalog.list(Some(SyncStatus::Pull)).await {
            Ok(entries) => entries,
            Err(e) => {
                log::error!("scheduler: failed to list sync definitions: {}", e);
                return report;
            }
        };

        let mut cycles = JoinSet::new();
        for entry in entries {
            let runner = Arc::clone(&self.runner);
            cycles.spawn(async move {
                let name = entry.sobject_name.clone();
                let outcome = runner.run(&entry, &LogSink::new(&name)).await;
                (name, outcome)
            });
        }

        while let Some(joined) = cycles.join_next().await {
            match joined {
                Ok((name, Ok(CycleOutcome::Synced { records }))) => {
                    log::info!("cycle {}: synced {} records", name, records);
                    report.synced.push(name);
                }
                Ok((name, Ok(CycleOutcome::Skipped))) => {
                    report.skipped.push(name);
                }
                Ok((name, Err(e))) => {
                    if e.is_transient() {
                        log::warn!("cycle {}: failed, retrying next tick: {}", name, e);
                    } else {
                        log::error!("cycle {}: failed: {}", name, e);
                    }
                    report.failed.push((name, e.to_string()));
                }
                Err(e) => {
                    log::error!("scheduler: cycle task aborted: {}", e);
                    report.failed.push(("<unknown>".to_string(), e.to_string()));
                }
            }
        }

        report.synced.sort();
        report.skipped.sort();
        report.failed.sort();
        report
    }
}

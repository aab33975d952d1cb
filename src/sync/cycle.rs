//! One pull cycle for one object: resolve auth, fetch, upsert, touch.

use super::auth::AuthProvider;
use super::catalog::Catalog;
use super::error::SyncResult;
use super::progress::ProgressSink;
use super::remote::{RemoteObjectApi, with_timeout};
use super::schema::build_soql;
use super::upsert;
use crate::models::CatalogEntry;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::Duration;

/// Per-object in-flight markers. At most one cycle per object name holds a
/// guard at any time; the marker clears when the guard drops.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    active: Arc<DashMap<String, ()>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, object: &str) -> Option<InFlightGuard> {
        match self.active.entry(object.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(InFlightGuard {
                    active: Arc::clone(&self.active),
                    object: object.to_string(),
                })
            }
        }
    }

    pub fn is_active(&self, object: &str) -> bool {
        self.active.contains_key(object)
    }
}

#[derive(Debug)]
pub struct InFlightGuard {
    active: Arc<DashMap<String, ()>>,
    object: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.active.remove(&self.object);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// All pages applied and `last_sync` updated.
    Synced { records: usize },
    /// Another cycle for the same object was already running.
    Skipped,
}

/// Shared cycle logic for the scheduler and interactive runs.
pub struct CycleRunner {
    catalog: Catalog,
    remote: Arc<dyn RemoteObjectApi>,
    auth: Arc<dyn AuthProvider>,
    in_flight: InFlight,
    connection_name: String,
    call_timeout: Duration,
}

impl CycleRunner {
    pub fn new(
        catalog: Catalog,
        remote: Arc<dyn RemoteObjectApi>,
        auth: Arc<dyn AuthProvider>,
        connection_name: impl Into<String>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            remote,
            auth,
            in_flight: InFlight::new(),
            connection_name: connection_name.into(),
            call_timeout,
        }
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Run one cycle for `entry`, reporting progress to `sink`.
    ///
    /// On error nothing in the catalog changes; the remote call or page
    /// already committed stays committed, and the next tick retries.
    pub async fn run(
        &self,
        entry: &CatalogEntry,
        sink: &dyn ProgressSink,
    ) -> SyncResult<CycleOutcome> {
        let name = entry.sobject_name.as_str();
        let Some(_guard) = self.in_flight.try_acquire(name) else {
            log::debug!("cycle {}: already in flight, skipping", name);
            return Ok(CycleOutcome::Skipped);
        };

        let auth = self.auth.resolve(&self.connection_name).await?;

        let schema = entry.table_schema()?;
        let soql = build_soql(&entry.sfdc_definition)?;

        let mut page = with_timeout(self.call_timeout, self.remote.query(&auth, &soql)).await?;
        let total = page.total_size;
        let mut fetched = 0usize;
        let mut applied = 0usize;

        loop {
            fetched += page.records.len();
            sink.emit(&format!("Fetched {} of {} records", fetched, total));

            applied += upsert::apply(self.catalog.pool(), &schema, &page.records).await?;
            sink.emit(&format!("Applied {} records", applied));

            match page.next_records_url.take() {
                Some(next) if !page.done => {
                    page = with_timeout(self.call_timeout, self.remote.query_more(&auth, &next))
                        .await?;
                }
                _ => break,
            }
        }

        self.catalog.touch(name, Utc::now()).await?;

        Ok(CycleOutcome::Synced { records: applied })
    }
}

use super::auth::AuthProvider;
use super::catalog::Catalog;
use super::config::SyncConfig;
use super::cycle::CycleRunner;
use super::error::{SyncError, SyncResult};
use super::progress::RunSubscription;
use super::remote::{RemoteObjectApi, with_timeout};
use super::reporter::ProgressReporter;
use super::scheduler::Scheduler;
use super::schema::build_soql;
use crate::models::{
    AuthBundle, CatalogEntry, ObjectDefinition, ObjectSummary, QueryPage, RunSnapshot,
};
use rocket_db_pools::sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

/// Entry point used by the presentation layer.
///
/// Owns the catalog, the remote client, the credential source and the shared
/// cycle runner, so the scheduler and interactive runs observe the same
/// single-flight markers.
pub struct SyncEngine {
    catalog: Catalog,
    remote: Arc<dyn RemoteObjectApi>,
    auth: Arc<dyn AuthProvider>,
    runner: Arc<CycleRunner>,
    reporter: ProgressReporter,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(
        pool: SqlitePool,
        remote: Arc<dyn RemoteObjectApi>,
        auth: Arc<dyn AuthProvider>,
        config: SyncConfig,
    ) -> Self {
        let catalog = Catalog::new(pool);
        let runner = Arc::new(CycleRunner::new(
            catalog.clone(),
            Arc::clone(&remote),
            Arc::clone(&auth),
            config.connection_name.clone(),
            config.request_timeout,
        ));
        let reporter =
            ProgressReporter::new(catalog.clone(), Arc::clone(&runner), config.run_retention);

        Self {
            catalog,
            remote,
            auth,
            runner,
            reporter,
            config,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn runner(&self) -> &Arc<CycleRunner> {
        &self.runner
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            self.catalog.clone(),
            Arc::clone(&self.runner),
            self.config.tick_interval,
        )
    }

    async fn credentials(&self) -> SyncResult<AuthBundle> {
        self.auth.resolve(&self.config.connection_name).await
    }

    /// Describe `name` remotely and register it for pulling.
    pub async fn enable_sync(&self, name: &str) -> SyncResult<CatalogEntry> {
        let definition = self.describe(name).await?;
        self.catalog.enable_sync(&definition).await
    }

    pub async fn list_status(&self) -> SyncResult<Vec<CatalogEntry>> {
        self.catalog.list(None).await
    }

    pub async fn entry(&self, name: &str) -> SyncResult<CatalogEntry> {
        self.catalog
            .get(name)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("sync definition for '{name}'")))
    }

    pub async fn list_remote_objects(&self) -> SyncResult<Vec<ObjectSummary>> {
        let auth = self.credentials().await?;
        with_timeout(self.config.request_timeout, self.remote.list_objects(&auth)).await
    }

    /// Live definition from the remote API; the catalog is not touched.
    pub async fn describe(&self, name: &str) -> SyncResult<ObjectDefinition> {
        let auth = self.credentials().await?;
        with_timeout(self.config.request_timeout, self.remote.describe(&auth, name)).await
    }

    /// First page of records for every described field, without writing locally.
    pub async fn preview_records(&self, name: &str) -> SyncResult<QueryPage> {
        let auth = self.credentials().await?;
        let definition =
            with_timeout(self.config.request_timeout, self.remote.describe(&auth, name)).await?;
        let soql = build_soql(&definition)?;
        with_timeout(self.config.request_timeout, self.remote.query(&auth, &soql)).await
    }

    pub fn start_run(&self, name: &str) -> Uuid {
        self.reporter.start_run(name)
    }

    pub fn subscribe_run(&self, run_id: &Uuid) -> SyncResult<RunSubscription> {
        self.reporter.subscribe(run_id)
    }

    pub fn run_snapshot(&self, run_id: &Uuid) -> SyncResult<RunSnapshot> {
        self.reporter.snapshot(run_id)
    }
}

//! Remote object synchronization.
//!
//! This module keeps a local SQLite cache in step with a remote CRM object API.
//!
//! # Architecture Overview
//!
//! - **`schema`**: Pure mapping from remote field metadata to column types,
//!   `CREATE TABLE` DDL and the upsert template. Unknown field types are
//!   rejected before any statement is produced.
//!
//! - **`catalog`**: The `syncd_objects` registry. Enabling an object creates its
//!   table and registry row in one transaction.
//!
//! - **`remote`**: The `RemoteObjectApi` seam and its REST implementation.
//!
//! - **`upsert`**: Applies one page of records per transaction.
//!
//! - **`cycle`**: One pull cycle (auth → fetch → upsert → touch) guarded by a
//!   per-object in-flight marker.
//!
//! - **`scheduler`**: Fixed-interval driver over every `PULL` entry.
//!
//! - **`progress`** / **`reporter`**: Interactive runs with replayable logs.
//!
//! ## Data Flow
//!
//! 1. **Enable**: describe the object, derive its schema, register it as `PULL`
//! 2. **Tick**: list `PULL` entries and run one cycle for each, concurrently
//! 3. **Cycle**: resolve credentials, query (following `nextRecordsUrl`),
//!    upsert each page, then stamp `last_sync`
//!
//! Failures stop at the per-object cycle boundary and are retried next tick.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod cycle;
pub mod engine;
pub mod error;
pub mod progress;
pub mod remote;
pub mod reporter;
pub mod scheduler;
pub mod schema;
pub mod upsert;

pub use auth::{AuthProvider, ConnectionStore};
pub use catalog::Catalog;
pub use config::SyncConfig;
pub use cycle::{CycleOutcome, CycleRunner, InFlight};
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use progress::{RunEvent, RunSubscription};
pub use remote::{RemoteObjectApi, SalesforceClient};
pub use reporter::ProgressReporter;
pub use scheduler::{Scheduler, TickReport};

use rocket_db_pools::sqlx::{self, SqlitePool, migrate::Migrator};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Apply pending migrations. Already-applied migrations are skipped.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    log::info!("checking database migration state");
    MIGRATOR.run(pool).await?;
    log::info!("database migrations up to date");
    Ok(())
}

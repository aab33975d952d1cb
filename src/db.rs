use rocket_db_pools::{sqlx, Database};

#[derive(Database)]
#[database("sync_db")]
pub struct SyncDb(sqlx::SqlitePool);

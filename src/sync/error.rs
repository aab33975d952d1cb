use reqwest::StatusCode;
use rocket_db_pools::sqlx;
use std::time::Duration;
use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

/// Failures raised by the sync engine.
///
/// Every variant is contained at the per-object cycle boundary: a failing
/// object never aborts sibling cycles or the scheduler loop.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no valid credentials stored for connection '{connection}'")]
    AuthMissing { connection: String },
    #[error("remote API HTTP error: {0}")]
    Network(reqwest::Error),
    #[error("remote API returned status {status}: {body}")]
    RemoteApi { status: StatusCode, body: String },
    #[error("remote API call timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("field '{field}' has unsupported type '{field_type}'")]
    UnsupportedType { field: String, field_type: String },
    #[error("refusing to follow page URL '{0}'")]
    UnexpectedPageUrl(String),
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("invalid definition for '{object}': {reason}")]
    InvalidDefinition { object: String, reason: String },
    #[error("table '{table}' already exists with an incompatible schema: {detail}")]
    SchemaConflict { table: String, detail: String },
    #[error("failed to upsert into '{table}': {detail}")]
    Upsert { table: String, detail: String },
    #[error("{0} not found")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl SyncError {
    pub fn remote_status(status: StatusCode, body: String) -> Self {
        SyncError::RemoteApi { status, body }
    }

    /// Network-class failures are retried by the scheduler on the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_)
                | SyncError::RemoteApi { .. }
                | SyncError::Timeout(_)
                | SyncError::Decode(_)
        )
    }
}

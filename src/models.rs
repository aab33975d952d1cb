use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One record as returned by the remote query API, keyed by field name.
pub type Record = Map<String, Value>;

// ===== Remote Metadata =====

/// Schema description of one remote object, as captured from `describe`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDefinition {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub custom: bool,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub length: i64,
    #[serde(default)]
    pub name_field: bool,
    #[serde(default)]
    pub id_lookup: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub calculated: bool,
    #[serde(default)]
    pub custom: bool,
}

impl FieldDefinition {
    /// Minimal field with only a name and remote type; everything else defaulted.
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            field_type: field_type.into(),
            length: 0,
            name_field: false,
            id_lookup: false,
            unique: false,
            calculated: false,
            custom: false,
        }
    }
}

/// Entry of the remote object listing.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ObjectSummary {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub custom: bool,
    #[serde(default)]
    pub queryable: bool,
}

/// One page of query results.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryPage {
    pub total_size: u64,
    pub done: bool,
    #[serde(default)]
    pub records: Vec<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_records_url: Option<String>,
}

// ===== Catalog Models =====

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, sqlx::Type, PartialEq, Eq, Hash,
)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncStatus {
    None,
    Pull,
    /// Reserved; no behavior is attached to this status.
    Push,
    /// Reserved; no behavior is attached to this status.
    Sync,
}

/// Registry row for an object enabled for sync.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CatalogEntry {
    pub sobject_name: String,
    pub sfdc_definition: ObjectDefinition,
    pub sql_definition: Value,
    pub status: SyncStatus,
    pub last_sync: Option<DateTime<Utc>>,
}

// ===== Connections =====

/// Credentials the core needs to reach the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthBundle {
    #[serde(alias = "accessToken")]
    pub access_token: String,
    #[serde(alias = "instanceUrl")]
    pub instance_url: String,
}

impl AuthBundle {
    pub fn new(access_token: impl Into<String>, instance_url: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            instance_url: instance_url.into(),
        }
    }
}

// ===== Interactive Runs =====

/// Point-in-time view of an interactive run's log.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub run_id: String,
    pub object_name: String,
    pub started_at: DateTime<Utc>,
    pub lines: Vec<String>,
    pub closed: bool,
}

// ===== API Envelopes =====

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DataResponse<T> {
    pub data: T,
}

//! Persistent registry of objects enabled for sync (`syncd_objects`).

use crate::models::{CatalogEntry, ObjectDefinition, SyncStatus};
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::schema::{self, TableSchema};
use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::{self, FromRow, SqliteConnection, SqlitePool};
use std::collections::BTreeMap;

const ENTRY_COLUMNS: &str = "sobject_name, sfdc_definition, sql_definition, status, last_sync";

#[derive(Debug, FromRow)]
struct CatalogRow {
    sobject_name: String,
    sfdc_definition: String,
    sql_definition: String,
    status: SyncStatus,
    last_sync: Option<DateTime<Utc>>,
}

impl TryFrom<CatalogRow> for CatalogEntry {
    type Error = SyncError;

    fn try_from(row: CatalogRow) -> Result<Self, Self::Error> {
        Ok(CatalogEntry {
            sobject_name: row.sobject_name,
            sfdc_definition: serde_json::from_str(&row.sfdc_definition)?,
            sql_definition: serde_json::from_str(&row.sql_definition)?,
            status: row.status,
            last_sync: row.last_sync,
        })
    }
}

impl CatalogEntry {
    /// Schema derived from the cached definition snapshot.
    pub fn table_schema(&self) -> SyncResult<TableSchema> {
        schema::derive(&self.sfdc_definition)
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Register an object for pulling, creating its local table if needed.
    ///
    /// Schema derivation, table creation and the registry upsert share one
    /// transaction, so an unsupported field type or a conflicting table leaves
    /// no trace. Calling this again for the same object replaces the stored
    /// definition and status without duplicating the row or the table.
    pub async fn enable_sync(&self, def: &ObjectDefinition) -> SyncResult<CatalogEntry> {
        let table = schema::derive(def)?;
        let sfdc_definition = serde_json::to_string(def)?;
        let sql_definition = serde_json::to_string(&table)?;

        let mut tx = self.pool.begin().await?;

        // Write first: the transaction must hold the write lock before its first read.
        sqlx::query(
            r#"INSERT INTO syncd_objects (sobject_name, sfdc_definition, sql_definition, status)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(sobject_name) DO UPDATE SET
                   sfdc_definition = excluded.sfdc_definition,
                   sql_definition = excluded.sql_definition,
                   status = excluded.status,
                   updated_at = CURRENT_TIMESTAMP"#,
        )
        .bind(&def.name)
        .bind(sfdc_definition)
        .bind(sql_definition)
        .bind(SyncStatus::Pull)
        .execute(&mut *tx)
        .await?;

        if ensure_table(&mut tx, &table).await? {
            log::info!("catalog: created table {}", table.table);
        } else {
            log::debug!("catalog: table {} already present", table.table);
        }

        let row: CatalogRow = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM syncd_objects WHERE sobject_name = ?"
        ))
        .bind(&def.name)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        log::info!("catalog: {} enabled for pull", def.name);
        row.try_into()
    }

    pub async fn get(&self, name: &str) -> SyncResult<Option<CatalogEntry>> {
        let row: Option<CatalogRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM syncd_objects WHERE sobject_name = ?"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CatalogEntry::try_from).transpose()
    }

    /// List entries, optionally restricted to one status.
    pub async fn list(&self, status: Option<SyncStatus>) -> SyncResult<Vec<CatalogEntry>> {
        let rows: Vec<CatalogRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM syncd_objects
             WHERE ?1 IS NULL OR status = ?1
             ORDER BY sobject_name ASC"
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CatalogEntry::try_from).collect()
    }

    /// Record a successful pull.
    pub async fn touch(&self, name: &str, last_sync: DateTime<Utc>) -> SyncResult<()> {
        let result = sqlx::query(
            "UPDATE syncd_objects SET last_sync = ?, updated_at = CURRENT_TIMESTAMP WHERE sobject_name = ?",
        )
        .bind(last_sync)
        .bind(name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SyncError::NotFound(format!("sync definition for '{name}'")));
        }

        Ok(())
    }
}

/// Create the table for `schema` unless it exists. Returns whether it was
/// created. An existing table must match the derived columns exactly.
pub(crate) async fn ensure_table(
    conn: &mut SqliteConnection,
    schema: &TableSchema,
) -> SyncResult<bool> {
    let existing: Vec<(String, String, i64)> =
        sqlx::query_as("SELECT name, type, pk FROM pragma_table_info(?)")
            .bind(&schema.table)
            .fetch_all(&mut *conn)
            .await?;

    if existing.is_empty() {
        sqlx::query(&schema.ddl).execute(&mut *conn).await?;
        return Ok(true);
    }

    check_compatible(schema, &existing)?;
    Ok(false)
}

fn check_compatible(schema: &TableSchema, existing: &[(String, String, i64)]) -> SyncResult<()> {
    let expected: BTreeMap<String, (String, bool)> = schema
        .columns
        .iter()
        .map(|c| {
            (
                c.name.to_ascii_lowercase(),
                (c.declared_type().to_string(), c.primary_key),
            )
        })
        .collect();

    let actual: BTreeMap<String, (String, bool)> = existing
        .iter()
        .map(|(name, declared, pk)| {
            (
                name.to_ascii_lowercase(),
                (declared.to_ascii_uppercase(), *pk > 0),
            )
        })
        .collect();

    if expected == actual {
        return Ok(());
    }

    let mut problems = Vec::new();
    for (name, spec) in &expected {
        match actual.get(name) {
            None => problems.push(format!("missing column {name}")),
            Some(found) if found != spec => problems.push(format!(
                "column {name} is {}{} but {}{} is required",
                found.0,
                if found.1 { " PRIMARY KEY" } else { "" },
                spec.0,
                if spec.1 { " PRIMARY KEY" } else { "" },
            )),
            Some(_) => {}
        }
    }
    for name in actual.keys().filter(|name| !expected.contains_key(*name)) {
        problems.push(format!("unexpected column {name}"));
    }

    Err(SyncError::SchemaConflict {
        table: schema.table.clone(),
        detail: problems.join("; "),
    })
}
